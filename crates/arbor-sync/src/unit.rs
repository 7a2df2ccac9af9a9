//! Sync units: the declared state for one namespace name
//!
//! A unit is produced for every directory of the hydrated tree. Namespace
//! directories carry the resources to sync; abstract namespaces become
//! policyspace units so the controller knows the name is taken by the
//! hierarchy and must not exist as a live namespace.

use arbor_core::{GroupVersionKind, ObjectModel, TreeNode, TreeRoot};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::{ApiResource, DynamicObject};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::ActionSpec;
use crate::error::{Result, SyncError};
use crate::labels;

pub const UNIT_GROUP: &str = arbor_core::object::CONFIG_GROUP;
pub const UNIT_VERSION: &str = "v1";
pub const UNIT_KIND: &str = "SyncUnit";
pub const UNIT_PLURAL: &str = "syncunits";

/// What the hierarchy says about a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclaredState {
    /// A namespace directory
    Namespace,
    /// An abstract namespace directory
    Policyspace,
    /// Explicitly left alone
    Reserved,
}

impl fmt::Display for DeclaredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredState::Namespace => write!(f, "namespace"),
            DeclaredState::Policyspace => write!(f, "policyspace"),
            DeclaredState::Reserved => write!(f, "reserved"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUnitSpec {
    pub declared: DeclaredState,

    /// Labels for the namespace itself
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Annotations for the namespace itself
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Resources to sync into the namespace
    #[serde(default)]
    pub resources: Vec<DynamicObject>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Pending => write!(f, "Pending"),
            SyncState::Synced => write!(f, "Synced"),
            SyncState::Error => write!(f, "Error"),
        }
    }
}

/// A resource that could not be synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSyncError {
    pub group_version_kind: GroupVersionKind,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub message: String,
}

impl fmt::Display for ResourceSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}: {}",
            self.group_version_kind.kind, self.namespace, self.name, self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUnitStatus {
    #[serde(default)]
    pub sync_state: SyncState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_errors: Vec<ResourceSyncError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_time: Option<DateTime<Utc>>,
}

impl SyncUnitStatus {
    /// Status after a pass that hit `errors`
    pub fn from_errors(errors: Vec<ResourceSyncError>, now: DateTime<Utc>) -> Self {
        let sync_state = if errors.is_empty() {
            SyncState::Synced
        } else {
            SyncState::Error
        };
        Self {
            sync_state,
            sync_errors: errors,
            sync_time: Some(now),
        }
    }
}

/// Declared configuration for one namespace name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncUnit {
    pub metadata: ObjectMeta,
    pub spec: SyncUnitSpec,
    #[serde(default)]
    pub status: SyncUnitStatus,
}

impl SyncUnit {
    pub fn new(name: impl Into<String>, declared: DeclaredState) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: SyncUnitSpec {
                declared,
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                resources: Vec::new(),
            },
            status: SyncUnitStatus::default(),
        }
    }

    /// A unit marking a name as off limits
    pub fn reserved(name: impl Into<String>) -> Self {
        Self::new(name, DeclaredState::Reserved)
    }

    /// Build the unit for a hydrated tree node.
    ///
    /// Inherited objects are assigned to the node's namespace here. Namespace
    /// and selector objects are not synced as resources.
    pub fn from_node(node: &TreeNode) -> Result<Self> {
        let name = node.name();
        if !node.is_namespace() {
            return Ok(Self::new(name, DeclaredState::Policyspace));
        }

        let mut unit = Self::new(name, DeclaredState::Namespace);
        for object in &node.objects {
            if object.is_namespace() {
                unit.spec.labels = object.labels.clone();
                unit.spec.annotations = object.annotations.clone();
            } else if !object.is_selector() {
                unit.spec.resources.push(to_dynamic(object, name)?);
            }
        }
        Ok(unit)
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.metadata
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(finalizer.to_string());
        }
    }

    /// Returns whether the finalizer was present
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let Some(finalizers) = self.metadata.finalizers.as_mut() else {
            return false;
        };
        let before = finalizers.len();
        finalizers.retain(|f| f != finalizer);
        before != finalizers.len()
    }

    pub fn action_spec() -> ActionSpec {
        ActionSpec::new(UNIT_GROUP, UNIT_VERSION, UNIT_KIND, UNIT_PLURAL, false)
    }

    pub fn api_resource() -> ApiResource {
        Self::action_spec().api_resource()
    }

    /// Reference placed on every resource synced for this unit
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: Self::action_spec().api_version(),
            kind: UNIT_KIND.to_string(),
            name: self.name().to_string(),
            uid: self.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: None,
        }
    }

    /// Declared resources, labelled as managed and owned by this unit
    pub fn managed_resources(&self) -> Vec<DynamicObject> {
        let owner = self.owner_reference();
        self.spec
            .resources
            .iter()
            .cloned()
            .map(|mut resource| {
                resource
                    .metadata
                    .labels
                    .get_or_insert_with(BTreeMap::new)
                    .insert(labels::MANAGED.to_string(), labels::MANAGED_ENABLED.to_string());
                resource.metadata.owner_references = Some(vec![owner.clone()]);
                resource
            })
            .collect()
    }

    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        let mut value = serde_json::to_value(self)?;
        if let JsonValue::Object(map) = &mut value {
            let spec = Self::action_spec();
            map.insert("apiVersion".to_string(), JsonValue::String(spec.api_version()));
            map.insert("kind".to_string(), JsonValue::String(spec.kind));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_dynamic(object: DynamicObject) -> Result<Self> {
        let mut value = serde_json::to_value(object)?;
        if let JsonValue::Object(map) = &mut value {
            map.remove("apiVersion");
            map.remove("kind");
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Every unit a hydrated snapshot declares, in tree order.
///
/// The hierarchy root directory itself is not a unit.
pub fn units_from_tree(root: &TreeRoot) -> Result<Vec<SyncUnit>> {
    let mut nodes = Vec::new();
    if let Some(tree) = &root.tree {
        for child in &tree.children {
            child.walk(&mut |node| nodes.push(node));
        }
    }
    nodes.into_iter().map(SyncUnit::from_node).collect()
}

/// Convert a declared object into a cluster object in `namespace`
pub fn to_dynamic(object: &ObjectModel, namespace: &str) -> Result<DynamicObject> {
    let mut body = match &object.body {
        JsonValue::Object(map) => map.clone(),
        JsonValue::Null => Map::new(),
        _ => {
            return Err(SyncError::InvalidObject(format!(
                "{} is not a mapping",
                object.source
            )));
        }
    };

    let mut annotations = object.annotations.clone();
    annotations.insert(labels::SOURCE_PATH.to_string(), object.source.clone());

    let mut metadata = match body.remove("metadata") {
        Some(JsonValue::Object(map)) => map,
        _ => Map::new(),
    };
    metadata.insert("name".to_string(), JsonValue::String(object.name.clone()));
    metadata.insert("namespace".to_string(), JsonValue::String(namespace.to_string()));
    if object.labels.is_empty() {
        metadata.remove("labels");
    } else {
        metadata.insert("labels".to_string(), serde_json::to_value(&object.labels)?);
    }
    metadata.insert("annotations".to_string(), serde_json::to_value(&annotations)?);

    body.insert("apiVersion".to_string(), JsonValue::String(object.gvk.api_version()));
    body.insert("kind".to_string(), JsonValue::String(object.gvk.kind.clone()));
    body.insert("metadata".to_string(), JsonValue::Object(metadata));

    Ok(serde_json::from_value(JsonValue::Object(body))?)
}

/// Group, version and kind of a cluster object
pub fn gvk_of(object: &DynamicObject) -> GroupVersionKind {
    match &object.types {
        Some(types) => GroupVersionKind::from_api_version(&types.api_version, types.kind.clone()),
        None => GroupVersionKind::new("", "", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{FlatRoot, InheritanceHydrator, Scope, build_tree};
    use serde_json::json;

    fn flat(objects: Vec<ObjectModel>) -> FlatRoot {
        let mut root = FlatRoot::new();
        for object in objects {
            root.push(Scope::Namespace, object);
        }
        root
    }

    fn hydrated() -> TreeRoot {
        let mut root = build_tree(flat(vec![
            ObjectModel::new(GroupVersionKind::new("", "v1", "ConfigMap"), "shared", "namespaces/eng/shared.yaml")
                .with_body(json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "shared" }, "data": { "k": "v" } })),
            ObjectModel::new(GroupVersionKind::new("", "v1", "Namespace"), "web", "namespaces/eng/web/ns.yaml")
                .with_label("env", "prod"),
        ]))
        .unwrap();
        InheritanceHydrator::new().hydrate(&mut root).unwrap();
        root
    }

    #[test]
    fn test_units_from_tree() {
        let units = units_from_tree(&hydrated()).unwrap();
        let names: Vec<_> = units.iter().map(|u| (u.name(), u.spec.declared)).collect();
        assert_eq!(
            names,
            vec![("eng", DeclaredState::Policyspace), ("web", DeclaredState::Namespace)]
        );

        let web = &units[1];
        assert_eq!(web.spec.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(web.spec.resources.len(), 1);

        let shared = &web.spec.resources[0];
        assert_eq!(shared.metadata.namespace.as_deref(), Some("web"));
        assert_eq!(shared.data["data"]["k"], json!("v"));
        assert_eq!(
            shared
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(labels::SOURCE_PATH))
                .map(String::as_str),
            Some("namespaces/eng/shared.yaml")
        );
    }

    #[test]
    fn test_finalizer_helpers() {
        let mut unit = SyncUnit::new("web", DeclaredState::Namespace);
        assert!(!unit.has_finalizer(labels::FINALIZER));

        unit.add_finalizer(labels::FINALIZER);
        unit.add_finalizer(labels::FINALIZER);
        assert_eq!(unit.metadata.finalizers.as_ref().map(Vec::len), Some(1));

        assert!(unit.remove_finalizer(labels::FINALIZER));
        assert!(!unit.remove_finalizer(labels::FINALIZER));
    }

    #[test]
    fn test_managed_resources_are_labelled_and_owned() {
        let units = units_from_tree(&hydrated()).unwrap();
        let managed = units[1].managed_resources();

        let managed_labels = managed[0].metadata.labels.as_ref().unwrap();
        assert_eq!(managed_labels.get(labels::MANAGED).map(String::as_str), Some(labels::MANAGED_ENABLED));

        let owners = managed[0].metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners[0].kind, UNIT_KIND);
        assert_eq!(owners[0].name, "web");
    }

    #[test]
    fn test_dynamic_round_trip_keeps_status() {
        let mut unit = SyncUnit::new("web", DeclaredState::Namespace);
        unit.status.sync_state = SyncState::Error;

        let object = unit.to_dynamic().unwrap();
        assert_eq!(object.types.as_ref().map(|t| t.kind.as_str()), Some(UNIT_KIND));

        let back = SyncUnit::from_dynamic(object).unwrap();
        assert_eq!(back.name(), "web");
        assert_eq!(back.status.sync_state, SyncState::Error);
    }

    #[test]
    fn test_to_dynamic_rejects_scalar_body() {
        let object = ObjectModel::new(GroupVersionKind::new("", "v1", "ConfigMap"), "x", "namespaces/x.yaml")
            .with_body(json!("nope"));
        assert!(matches!(to_dynamic(&object, "web"), Err(SyncError::InvalidObject(_))));
    }
}
