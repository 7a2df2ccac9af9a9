//! HierarchyConfig: per-kind inheritance policy
//!
//! A HierarchyConfig lives in the system directory and looks like:
//!
//! ```yaml
//! apiVersion: configmanagement.arbor.dev/v1
//! kind: HierarchyConfig
//! metadata:
//!   name: rbac
//! spec:
//!   resources:
//!   - group: rbac.authorization.k8s.io
//!     kinds: [RoleBinding]
//!     hierarchyMode: none
//! ```
//!
//! Kinds that no HierarchyConfig mentions are inherited.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::object::{GroupKind, ObjectModel, kinds};

/// How objects of one kind propagate from abstract namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HierarchyMode {
    /// Not inheritable; declaring it above a namespace is an error
    None,
    /// Copied into every descendant namespace
    Inherit,
    /// Inherited, and additionally enforced as a hierarchical quota (ResourceQuota only)
    HierarchicalQuota,
    /// Resolves to `Inherit`
    #[default]
    Default,
}

impl HierarchyMode {
    /// Collapse `Default` into the concrete mode it stands for
    pub fn resolve(self) -> Self {
        match self {
            HierarchyMode::Default => HierarchyMode::Inherit,
            other => other,
        }
    }

    /// Whether objects with this mode are copied into descendant namespaces
    pub fn propagates(self) -> bool {
        !matches!(self.resolve(), HierarchyMode::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyMode::None => "none",
            HierarchyMode::Inherit => "inherit",
            HierarchyMode::HierarchicalQuota => "hierarchicalQuota",
            HierarchyMode::Default => "default",
        }
    }
}

impl fmt::Display for HierarchyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(HierarchyMode::None),
            "inherit" => Ok(HierarchyMode::Inherit),
            "hierarchicalQuota" => Ok(HierarchyMode::HierarchicalQuota),
            "default" | "" => Ok(HierarchyMode::Default),
            other => Err(format!("unknown hierarchyMode '{}'", other)),
        }
    }
}

/// One flattened `(group, kind) -> mode` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyConfigEntry {
    pub group_kind: GroupKind,
    pub mode: HierarchyMode,
    /// File that declared it
    pub source: String,
}

#[derive(Debug, Default, Deserialize)]
struct HierarchyConfigBody {
    #[serde(default)]
    spec: HierarchyConfigSpec,
}

#[derive(Debug, Default, Deserialize)]
struct HierarchyConfigSpec {
    #[serde(default)]
    resources: Vec<HierarchyConfigResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HierarchyConfigResource {
    #[serde(default)]
    group: String,
    #[serde(default)]
    kinds: Vec<String>,
    #[serde(default)]
    hierarchy_mode: String,
}

/// Flatten one HierarchyConfig object into its entries, in declaration order
pub fn parse_hierarchy_config(
    object: &ObjectModel,
) -> Result<Vec<HierarchyConfigEntry>, ValidationError> {
    let invalid = |message: String| ValidationError::InvalidHierarchyConfig {
        source_path: object.source.clone(),
        message,
    };

    let body: HierarchyConfigBody = if object.body.is_null() {
        HierarchyConfigBody::default()
    } else {
        serde_json::from_value(object.body.clone()).map_err(|e| invalid(e.to_string()))?
    };

    let mut entries = Vec::new();
    for resource in body.spec.resources {
        let mode: HierarchyMode = resource.hierarchy_mode.parse().map_err(invalid)?;
        for kind in resource.kinds {
            entries.push(HierarchyConfigEntry {
                group_kind: GroupKind::new(resource.group.clone(), kind),
                mode,
                source: object.source.clone(),
            });
        }
    }
    Ok(entries)
}

/// Every HierarchyConfig entry from a set of system objects, in parse order.
///
/// Objects that fail to parse are skipped; the HierarchyConfig validator
/// reports them.
pub fn collect_entries(system_objects: &[ObjectModel]) -> Vec<HierarchyConfigEntry> {
    system_objects
        .iter()
        .filter(|o| o.is(&kinds::hierarchy_config()))
        .filter_map(|o| parse_hierarchy_config(o).ok())
        .flatten()
        .collect()
}

/// Kinds that can never appear in a HierarchyConfig
pub fn is_supported_kind(group_kind: &GroupKind) -> bool {
    ![
        kinds::namespace(),
        kinds::repo(),
        kinds::hierarchy_config(),
        kinds::namespace_selector(),
        kinds::cluster_selector(),
        kinds::sync(),
    ]
    .contains(group_kind)
}

/// Resolved inheritance policy for a whole snapshot
#[derive(Debug, Clone, Default)]
pub struct HierarchyModes {
    modes: IndexMap<GroupKind, HierarchyMode>,
}

impl HierarchyModes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from system-scope objects. A later declaration of the same kind
    /// replaces an earlier one; conflicting declarations are rejected by
    /// validation before hydration runs.
    pub fn from_objects(system_objects: &[ObjectModel]) -> Self {
        let mut modes = Self::new();
        for entry in collect_entries(system_objects) {
            modes.set(entry.group_kind, entry.mode);
        }
        modes
    }

    pub fn set(&mut self, group_kind: GroupKind, mode: HierarchyMode) {
        self.modes.insert(group_kind, mode);
    }

    /// Resolved mode for a kind; unlisted kinds inherit
    pub fn mode_for(&self, group_kind: &GroupKind) -> HierarchyMode {
        self.modes
            .get(group_kind)
            .copied()
            .unwrap_or(HierarchyMode::Inherit)
            .resolve()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{CONFIG_GROUP, GroupVersionKind};
    use serde_json::json;

    fn hierarchy_config(name: &str, resources: serde_json::Value) -> ObjectModel {
        ObjectModel::new(
            GroupVersionKind::new(CONFIG_GROUP, "v1", kinds::HIERARCHY_CONFIG),
            name,
            format!("system/{}.yaml", name),
        )
        .with_body(json!({ "spec": { "resources": resources } }))
    }

    #[test]
    fn test_mode_resolution() {
        assert_eq!(HierarchyMode::Default.resolve(), HierarchyMode::Inherit);
        assert_eq!(HierarchyMode::None.resolve(), HierarchyMode::None);
        assert!(HierarchyMode::HierarchicalQuota.propagates());
        assert!(HierarchyMode::Default.propagates());
        assert!(!HierarchyMode::None.propagates());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("none".parse::<HierarchyMode>(), Ok(HierarchyMode::None));
        assert_eq!("".parse::<HierarchyMode>(), Ok(HierarchyMode::Default));
        assert_eq!(
            "hierarchicalQuota".parse::<HierarchyMode>(),
            Ok(HierarchyMode::HierarchicalQuota)
        );
        assert!("sometimes".parse::<HierarchyMode>().is_err());
    }

    #[test]
    fn test_parse_flattens_kinds() {
        let config = hierarchy_config(
            "rbac",
            json!([{
                "group": "rbac.authorization.k8s.io",
                "kinds": ["Role", "RoleBinding"],
                "hierarchyMode": "none"
            }]),
        );

        let entries = parse_hierarchy_config(&config).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].group_kind, GroupKind::new("rbac.authorization.k8s.io", "RoleBinding"));
        assert_eq!(entries[1].mode, HierarchyMode::None);
        assert_eq!(entries[1].source, "system/rbac.yaml");
    }

    #[test]
    fn test_parse_unknown_mode() {
        let config = hierarchy_config("bad", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "maybe" }]));
        let err = parse_hierarchy_config(&config).unwrap_err();
        assert_eq!(err.code(), "ARB1017");
    }

    #[test]
    fn test_modes_last_declaration_wins() {
        let first = hierarchy_config("a", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "none" }]));
        let second = hierarchy_config("b", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "inherit" }]));

        let modes = HierarchyModes::from_objects(&[first, second]);
        assert_eq!(modes.mode_for(&GroupKind::new("", "ConfigMap")), HierarchyMode::Inherit);
        assert_eq!(modes.len(), 1);
    }

    #[test]
    fn test_unlisted_kind_inherits() {
        let modes = HierarchyModes::new();
        assert_eq!(modes.mode_for(&GroupKind::new("", "Secret")), HierarchyMode::Inherit);
    }

    #[test]
    fn test_supported_kinds() {
        assert!(!is_supported_kind(&kinds::namespace()));
        assert!(!is_supported_kind(&kinds::namespace_selector()));
        assert!(is_supported_kind(&kinds::resource_quota()));
    }
}
