//! Cluster access used by the controller
//!
//! The controller never talks to an API server directly. It goes through:
//! - **StateStore**: declared sync units, their status, and live namespaces
//! - **ActionExecutor**: list/create/update/delete for any [`ActionSpec`]
//! - **EventRecorder**: user-facing notifications
//!
//! [`crate::KubeCluster`] implements all three against a real cluster and
//! [`crate::MockCluster`] keeps everything in memory for tests.

use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind as KubeGvk, TypeMeta};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::unit::SyncUnit;

/// Identifies the API a resource lives under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lowercase plural used in URLs
    pub plural: String,
    /// Whether instances live inside a namespace
    pub namespaced: bool,
}

impl ActionSpec {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
        }
    }

    /// Core `v1/Namespace`
    pub fn namespace() -> Self {
        Self::new("", "v1", "Namespace", "namespaces", false)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        let gvk = KubeGvk::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }

    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta {
            api_version: self.api_version(),
            kind: self.kind.clone(),
        }
    }

    /// Does the object's apiVersion group and kind match this spec
    pub fn matches(&self, object: &DynamicObject) -> bool {
        object.types.as_ref().is_some_and(|types| {
            let group = types
                .api_version
                .rsplit_once('/')
                .map(|(group, _)| group)
                .unwrap_or("");
            group == self.group && types.kind == self.kind
        })
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Severity of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// A notification about one sync unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Name of the sync unit
    pub unit: String,
    pub event_type: EventType,
    /// CamelCase machine-readable reason, e.g. `ReconcileComplete`
    pub reason: String,
    pub message: String,
}

impl SyncEvent {
    pub fn normal(unit: impl Into<String>, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            event_type: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn warning(unit: impl Into<String>, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            event_type: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Declared sync units and the live namespaces they map to
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get a sync unit by name
    async fn get_unit(&self, name: &str) -> Result<Option<SyncUnit>>;

    /// List every sync unit
    async fn list_units(&self) -> Result<Vec<SyncUnit>>;

    /// Replace a sync unit. Fails with a conflict when the unit's resource
    /// version is stale.
    async fn replace_unit(&self, unit: &SyncUnit) -> Result<SyncUnit>;

    /// Write only the status of a sync unit
    async fn write_status(&self, unit: &SyncUnit) -> Result<SyncUnit>;

    /// Get the live namespace with this name
    async fn get_namespace(&self, name: &str) -> Result<Option<DynamicObject>>;
}

/// Generic object operations, used both for namespaces and for resources
/// inside them
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// List objects, optionally in one namespace and filtered by an equality
    /// label selector
    async fn list(
        &self,
        spec: &ActionSpec,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Create an object; the namespace comes from its metadata
    async fn create(&self, spec: &ActionSpec, object: &DynamicObject) -> Result<DynamicObject>;

    /// Replace an existing object
    async fn update(&self, spec: &ActionSpec, object: &DynamicObject) -> Result<DynamicObject>;

    /// Delete an object; deleting something already gone is not an error
    async fn delete(&self, spec: &ActionSpec, namespace: Option<&str>, name: &str) -> Result<()>;
}

/// Receives user-facing events
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: SyncEvent) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_spec() {
        let spec = ActionSpec::namespace();
        assert_eq!(spec.api_version(), "v1");
        assert!(!spec.namespaced);

        let resource = spec.api_resource();
        assert_eq!(resource.plural, "namespaces");
        assert_eq!(resource.api_version, "v1");
    }

    #[test]
    fn test_matches_ignores_version() {
        let spec = ActionSpec::new("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings", true);

        let mut object = DynamicObject::new("admins", &spec.api_resource());
        assert!(spec.matches(&object));

        object.types = Some(TypeMeta {
            api_version: "rbac.authorization.k8s.io/v1beta1".to_string(),
            kind: "RoleBinding".to_string(),
        });
        assert!(spec.matches(&object));

        object.types = Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: "RoleBinding".to_string(),
        });
        assert!(!spec.matches(&object));
    }
}
