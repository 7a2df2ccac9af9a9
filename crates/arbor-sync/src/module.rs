//! Per-kind sync modules
//!
//! Each module knows how to find its declared instances on a unit and when a
//! live instance already matches. The set of modules is closed: resources of
//! a kind without a module are reported, never synced blindly.

use kube::core::DynamicObject;
use serde_json::Value as JsonValue;

use crate::cluster::ActionSpec;
use crate::unit::SyncUnit;

/// Sync behaviour for one resource kind
pub trait SyncModule: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// API this module syncs
    fn spec(&self) -> &ActionSpec;

    /// An empty instance of the kind
    fn instance(&self) -> DynamicObject {
        DynamicObject::new("", &self.spec().api_resource())
    }

    /// Whether a live object already has the declared content. Labels and
    /// annotations are compared separately.
    fn equal(&self, declared: &DynamicObject, actual: &DynamicObject) -> bool;

    /// Does this module handle the object
    fn owns(&self, object: &DynamicObject) -> bool {
        self.spec().matches(object)
    }

    /// Declared instances of this kind for a unit, managed and owner-linked
    fn declared(&self, unit: &SyncUnit) -> Vec<DynamicObject> {
        unit.managed_resources()
            .into_iter()
            .filter(|r| self.owns(r))
            .collect()
    }
}

/// A module whose equality is a set of top-level fields
pub struct FieldsModule {
    name: &'static str,
    spec: ActionSpec,
    fields: &'static [&'static str],
}

impl FieldsModule {
    pub fn new(name: &'static str, spec: ActionSpec, fields: &'static [&'static str]) -> Self {
        Self { name, spec, fields }
    }

    pub fn role_bindings() -> Self {
        Self::new(
            "rolebindings",
            ActionSpec::new("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings", true),
            &["roleRef", "subjects"],
        )
    }

    pub fn roles() -> Self {
        Self::new(
            "roles",
            ActionSpec::new("rbac.authorization.k8s.io", "v1", "Role", "roles", true),
            &["rules"],
        )
    }

    pub fn resource_quotas() -> Self {
        Self::new(
            "resourcequotas",
            ActionSpec::new("", "v1", "ResourceQuota", "resourcequotas", true),
            &["spec"],
        )
    }

    pub fn config_maps() -> Self {
        Self::new(
            "configmaps",
            ActionSpec::new("", "v1", "ConfigMap", "configmaps", true),
            &["data", "binaryData"],
        )
    }
}

impl SyncModule for FieldsModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn equal(&self, declared: &DynamicObject, actual: &DynamicObject) -> bool {
        self.fields
            .iter()
            .all(|field| field_value(declared, field) == field_value(actual, field))
    }
}

/// Missing and null compare equal
fn field_value<'a>(object: &'a DynamicObject, field: &str) -> Option<&'a JsonValue> {
    object.data.get(field).filter(|v| !v.is_null())
}

/// The closed set of modules the controller syncs
pub struct ModuleRegistry {
    modules: Vec<Box<dyn SyncModule>>,
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// RoleBinding, Role, ResourceQuota and ConfigMap
    pub fn standard() -> Self {
        Self::empty()
            .with(FieldsModule::role_bindings())
            .with(FieldsModule::roles())
            .with(FieldsModule::resource_quotas())
            .with(FieldsModule::config_maps())
    }

    pub fn with(mut self, module: impl SyncModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SyncModule> {
        self.modules.iter().map(|m| m.as_ref())
    }

    /// Module handling an object, if any
    pub fn find(&self, object: &DynamicObject) -> Option<&dyn SyncModule> {
        self.iter().find(|m| m.owns(object))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
