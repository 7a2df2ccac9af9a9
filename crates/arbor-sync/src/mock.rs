//! In-memory cluster for testing
//!
//! Implements [`StateStore`], [`ActionExecutor`] and [`EventRecorder`] over
//! plain maps, with optimistic concurrency on resource versions, operation
//! counts for assertions, and failure injection.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::DynamicObject;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cluster::{ActionExecutor, ActionSpec, EventRecorder, StateStore, SyncEvent};
use crate::error::{Result, SyncError};
use crate::labels;
use crate::unit::{SyncUnit, UNIT_KIND};

/// (group, kind, namespace, name)
type ObjectKey = (String, String, String, String);

fn key(spec: &ActionSpec, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        spec.group.clone(),
        spec.kind.clone(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub unit_gets: usize,
    pub unit_replaces: usize,
    pub status_writes: usize,
    pub namespace_gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub events: usize,
}

#[derive(Debug, Default)]
struct MockState {
    units: BTreeMap<String, SyncUnit>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    events: Vec<SyncEvent>,
    counts: OperationCounts,
    /// Upcoming unit replaces that fail with a conflict
    replace_conflicts: usize,
    /// Object names whose create/update/delete fails
    failing_objects: HashSet<String>,
    next_version: u64,
}

impl MockState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
}

impl MockCluster {
    /// Create a new empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a sync unit, assigning it a uid and resource version
    pub fn with_unit(self, mut unit: SyncUnit) -> Self {
        {
            let mut state = self.write();
            let version = state.bump();
            unit.metadata.resource_version = Some(version);
            let uid = format!("uid-{}", unit.name());
            unit.metadata.uid.get_or_insert(uid);
            state.units.insert(unit.name().to_string(), unit);
        }
        self
    }

    /// Add a live object
    pub fn with_object(self, spec: &ActionSpec, mut object: DynamicObject) -> Self {
        {
            let mut state = self.write();
            let version = state.bump();
            object.metadata.resource_version = Some(version);
            object.types.get_or_insert_with(|| spec.type_meta());
            let key = key(
                spec,
                object.metadata.namespace.as_deref(),
                object.metadata.name.as_deref().unwrap_or_default(),
            );
            state.objects.insert(key, object);
        }
        self
    }

    /// Add a live namespace with the given labels
    pub fn with_namespace(self, name: &str, labels: &[(&str, &str)]) -> Self {
        let spec = ActionSpec::namespace();
        let mut namespace = DynamicObject::new(name, &spec.api_resource());
        if !labels.is_empty() {
            namespace.metadata.labels = Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
        self.with_object(&spec, namespace)
    }

    /// Add a namespace labelled for full management
    pub fn with_managed_namespace(self, name: &str, management: &str) -> Self {
        self.with_namespace(name, &[(labels::NAMESPACE_MANAGEMENT, management)])
    }

    /// Make the next `count` unit replaces fail with a conflict
    pub fn fail_replaces(&self, count: usize) {
        self.write().replace_conflicts = count;
    }

    /// Make every write to objects named `name` fail
    pub fn fail_object(&self, name: &str) {
        self.write().failing_objects.insert(name.to_string());
    }

    /// Set a deletion timestamp on a unit
    pub fn mark_deleting(&self, name: &str) {
        if let Some(unit) = self.write().units.get_mut(name) {
            unit.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
    }

    pub fn unit(&self, name: &str) -> Option<SyncUnit> {
        self.read().units.get(name).cloned()
    }

    pub fn object(&self, spec: &ActionSpec, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        self.read().objects.get(&key(spec, namespace, name)).cloned()
    }

    pub fn namespace(&self, name: &str) -> Option<DynamicObject> {
        self.object(&ActionSpec::namespace(), None, name)
    }

    /// All objects of a kind, optionally in one namespace
    pub fn objects(&self, spec: &ActionSpec, namespace: Option<&str>) -> Vec<DynamicObject> {
        self.read()
            .objects
            .iter()
            .filter(|((group, kind, ns, _), _)| {
                *group == spec.group
                    && *kind == spec.kind
                    && namespace.is_none_or(|n| n == ns.as_str())
            })
            .map(|(_, object)| object.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.read().events.clone()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.read().counts.clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        self.write().counts = OperationCounts::default();
    }
}

fn injected_failure(name: &str) -> SyncError {
    SyncError::Api(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected failure for '{}'", name),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

fn object_name(object: &DynamicObject) -> Result<String> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| SyncError::InvalidObject("object has no name".to_string()))
}

#[async_trait]
impl StateStore for MockCluster {
    async fn get_unit(&self, name: &str) -> Result<Option<SyncUnit>> {
        let mut state = self.write();
        state.counts.unit_gets += 1;
        Ok(state.units.get(name).cloned())
    }

    async fn list_units(&self) -> Result<Vec<SyncUnit>> {
        let mut state = self.write();
        state.counts.lists += 1;
        Ok(state.units.values().cloned().collect())
    }

    async fn replace_unit(&self, unit: &SyncUnit) -> Result<SyncUnit> {
        let mut state = self.write();
        state.counts.unit_replaces += 1;

        let name = unit.name().to_string();
        let conflict = |message: &str| SyncError::Conflict {
            kind: UNIT_KIND.to_string(),
            name: name.clone(),
            message: message.to_string(),
        };

        if state.replace_conflicts > 0 {
            state.replace_conflicts -= 1;
            return Err(conflict("the object has been modified"));
        }

        let Some(stored) = state.units.get(&name) else {
            return Err(SyncError::NotFound {
                kind: UNIT_KIND.to_string(),
                name,
            });
        };
        if unit.metadata.resource_version != stored.metadata.resource_version {
            return Err(conflict("stale resource version"));
        }

        let mut updated = unit.clone();
        updated.status = stored.status.clone();
        updated.metadata.resource_version = Some(state.bump());

        let released = updated.is_deleting()
            && updated
                .metadata
                .finalizers
                .as_ref()
                .is_none_or(Vec::is_empty);
        if released {
            state.units.remove(&name);
        } else {
            state.units.insert(name, updated.clone());
        }
        Ok(updated)
    }

    async fn write_status(&self, unit: &SyncUnit) -> Result<SyncUnit> {
        let mut state = self.write();
        state.counts.status_writes += 1;

        let version = state.bump();
        let Some(stored) = state.units.get_mut(unit.name()) else {
            return Err(SyncError::NotFound {
                kind: UNIT_KIND.to_string(),
                name: unit.name().to_string(),
            });
        };
        stored.status = unit.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<DynamicObject>> {
        let mut state = self.write();
        state.counts.namespace_gets += 1;
        Ok(state
            .objects
            .get(&key(&ActionSpec::namespace(), None, name))
            .cloned())
    }
}

#[async_trait]
impl ActionExecutor for MockCluster {
    async fn list(
        &self,
        spec: &ActionSpec,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.write().counts.lists += 1;
        Ok(self
            .objects(spec, namespace)
            .into_iter()
            .filter(|o| {
                label_selector.is_none_or(|s| labels::matches_selector(o.metadata.labels.as_ref(), s))
            })
            .collect())
    }

    async fn create(&self, spec: &ActionSpec, object: &DynamicObject) -> Result<DynamicObject> {
        let mut state = self.write();
        state.counts.creates += 1;

        let name = object_name(object)?;
        if state.failing_objects.contains(&name) {
            return Err(injected_failure(&name));
        }
        let namespace = if spec.namespaced {
            let namespace = object.metadata.namespace.clone().unwrap_or_default();
            let parent = key(&ActionSpec::namespace(), None, &namespace);
            if !state.objects.contains_key(&parent) {
                return Err(SyncError::NotFound {
                    kind: "Namespace".to_string(),
                    name: namespace,
                });
            }
            Some(namespace)
        } else {
            None
        };

        let key = key(spec, namespace.as_deref(), &name);
        if state.objects.contains_key(&key) {
            return Err(SyncError::Conflict {
                kind: spec.kind.clone(),
                name,
                message: "already exists".to_string(),
            });
        }

        let mut created = object.clone();
        created.types.get_or_insert_with(|| spec.type_meta());
        created.metadata.resource_version = Some(state.bump());
        created.metadata.uid = Some(format!("uid-{}", name));
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, spec: &ActionSpec, object: &DynamicObject) -> Result<DynamicObject> {
        let mut state = self.write();
        state.counts.updates += 1;

        let name = object_name(object)?;
        if state.failing_objects.contains(&name) {
            return Err(injected_failure(&name));
        }
        let namespace = spec.namespaced.then(|| object.metadata.namespace.clone().unwrap_or_default());
        let key = key(spec, namespace.as_deref(), &name);

        let Some(stored) = state.objects.get(&key) else {
            return Err(SyncError::NotFound {
                kind: spec.kind.clone(),
                name,
            });
        };
        if object
            .metadata
            .resource_version
            .as_ref()
            .is_some_and(|v| Some(v) != stored.metadata.resource_version.as_ref())
        {
            return Err(SyncError::Conflict {
                kind: spec.kind.clone(),
                name,
                message: "stale resource version".to_string(),
            });
        }

        let mut updated = object.clone();
        updated.types.get_or_insert_with(|| spec.type_meta());
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.resource_version = Some(state.bump());
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, spec: &ActionSpec, namespace: Option<&str>, name: &str) -> Result<()> {
        let mut state = self.write();
        state.counts.deletes += 1;

        if state.failing_objects.contains(name) {
            return Err(injected_failure(name));
        }
        let namespace = if spec.namespaced { namespace } else { None };
        state.objects.remove(&key(spec, namespace, name));

        // Deleting a namespace takes everything inside it along
        if *spec == ActionSpec::namespace() {
            state.objects.retain(|(_, _, ns, _), _| ns.as_str() != name);
        }
        Ok(())
    }
}

#[async_trait]
impl EventRecorder for MockCluster {
    async fn record(&self, event: SyncEvent) -> Result<()> {
        let mut state = self.write();
        state.counts.events += 1;
        state.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::DeclaredState;
    use serde_json::json;

    fn config_map_spec() -> ActionSpec {
        ActionSpec::new("", "v1", "ConfigMap", "configmaps", true)
    }

    #[tokio::test]
    async fn test_replace_checks_resource_version() {
        let cluster = MockCluster::new().with_unit(SyncUnit::new("web", DeclaredState::Namespace));

        let unit = cluster.get_unit("web").await.unwrap().unwrap();
        let updated = cluster.replace_unit(&unit).await.unwrap();
        assert_ne!(updated.metadata.resource_version, unit.metadata.resource_version);

        // Writing the old copy again is stale
        let err = cluster.replace_unit(&unit).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_released_unit_is_removed() {
        let mut unit = SyncUnit::new("web", DeclaredState::Namespace);
        unit.add_finalizer(labels::FINALIZER);
        let cluster = MockCluster::new().with_unit(unit);
        cluster.mark_deleting("web");

        let mut unit = cluster.get_unit("web").await.unwrap().unwrap();
        unit.remove_finalizer(labels::FINALIZER);
        cluster.replace_unit(&unit).await.unwrap();

        assert!(cluster.unit("web").is_none());
    }

    #[tokio::test]
    async fn test_create_requires_namespace() {
        let cluster = MockCluster::new();
        let spec = config_map_spec();
        let cm = DynamicObject::new("cm", &spec.api_resource()).within("web");

        let err = cluster.create(&spec, &cm).await.unwrap_err();
        assert!(err.is_not_found());

        let cluster = cluster.with_namespace("web", &[]);
        cluster.create(&spec, &cm).await.unwrap();
        assert!(cluster.create(&spec, &cm).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_list_filters_by_selector() {
        let spec = config_map_spec();
        let mut managed = DynamicObject::new("managed", &spec.api_resource())
            .within("web")
            .data(json!({ "data": {} }));
        managed.metadata.labels = Some(BTreeMap::from([(
            labels::MANAGED.to_string(),
            labels::MANAGED_ENABLED.to_string(),
        )]));
        let unmanaged = DynamicObject::new("unmanaged", &spec.api_resource()).within("web");

        let cluster = MockCluster::new()
            .with_namespace("web", &[])
            .with_object(&spec, managed)
            .with_object(&spec, unmanaged);

        let all = cluster.list(&spec, Some("web"), None).await.unwrap();
        assert_eq!(all.len(), 2);

        let selector = labels::managed_selector();
        let listed = cluster.list(&spec, Some("web"), Some(&selector)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.name.as_deref(), Some("managed"));
    }

    #[tokio::test]
    async fn test_namespace_delete_cascades() {
        let spec = config_map_spec();
        let cluster = MockCluster::new()
            .with_namespace("web", &[])
            .with_object(&spec, DynamicObject::new("cm", &spec.api_resource()).within("web"));

        cluster.delete(&ActionSpec::namespace(), None, "web").await.unwrap();

        assert!(cluster.namespace("web").is_none());
        assert!(cluster.objects(&spec, None).is_empty());
        // Deleting again is fine
        cluster.delete(&ActionSpec::namespace(), None, "web").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let spec = config_map_spec();
        let cluster = MockCluster::new().with_namespace("web", &[]);
        cluster.fail_object("cm");

        let cm = DynamicObject::new("cm", &spec.api_resource()).within("web");
        assert!(cluster.create(&spec, &cm).await.is_err());
        assert_eq!(cluster.operation_counts().creates, 1);
    }
}
