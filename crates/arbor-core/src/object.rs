//! Declared object model
//!
//! An [`ObjectModel`] is one resource as it was written in the source tree,
//! already decoded by the parsing front end. It is treated as an immutable
//! value; hydration copies objects rather than sharing them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// API group for Arbor's own configuration kinds
pub const CONFIG_GROUP: &str = "configmanagement.arbor.dev";

/// Well-known kinds the hierarchy logic needs to recognize
pub mod kinds {
    use super::{CONFIG_GROUP, GroupKind};

    pub const NAMESPACE: &str = "Namespace";
    pub const RESOURCE_QUOTA: &str = "ResourceQuota";
    pub const REPO: &str = "Repo";
    pub const HIERARCHY_CONFIG: &str = "HierarchyConfig";
    pub const NAMESPACE_SELECTOR: &str = "NamespaceSelector";
    pub const CLUSTER_SELECTOR: &str = "ClusterSelector";
    pub const SYNC: &str = "Sync";

    pub fn namespace() -> GroupKind {
        GroupKind::new("", NAMESPACE)
    }

    pub fn resource_quota() -> GroupKind {
        GroupKind::new("", RESOURCE_QUOTA)
    }

    pub fn repo() -> GroupKind {
        GroupKind::new(CONFIG_GROUP, REPO)
    }

    pub fn hierarchy_config() -> GroupKind {
        GroupKind::new(CONFIG_GROUP, HIERARCHY_CONFIG)
    }

    pub fn namespace_selector() -> GroupKind {
        GroupKind::new(CONFIG_GROUP, NAMESPACE_SELECTOR)
    }

    pub fn cluster_selector() -> GroupKind {
        GroupKind::new(CONFIG_GROUP, CLUSTER_SELECTOR)
    }

    pub fn sync() -> GroupKind {
        GroupKind::new(CONFIG_GROUP, SYNC)
    }
}

/// Group, version and kind of a resource. The core group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Parse from an `apiVersion` string (`v1`, `apps/v1`) and a kind
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self::new(group, version, kind)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Group and kind, without the version. Inheritance policy is keyed on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Identity of a declared object: (group/version/kind, namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.gvk.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.gvk.kind, self.name)
        }
    }
}

/// One declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectModel {
    /// Group, version and kind
    pub gvk: GroupVersionKind,

    /// `metadata.name`
    pub name: String,

    /// `metadata.namespace`, empty when not set
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Path of the declaring file relative to the repository root, `/`-separated
    pub source: String,

    /// The decoded manifest
    #[serde(default)]
    pub body: JsonValue,
}

impl ObjectModel {
    /// Create an object with empty metadata and body
    pub fn new(gvk: GroupVersionKind, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            gvk,
            name: name.into(),
            namespace: String::new(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            source: normalize_path(&source.into()),
            body: JsonValue::Null,
        }
    }

    /// Build an object from a decoded manifest (`apiVersion`, `kind`, `metadata`)
    pub fn from_manifest(manifest: JsonValue, source: impl Into<String>) -> crate::Result<Self> {
        let source = normalize_path(&source.into());
        let field = |name: &str| {
            manifest
                .get(name)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| crate::CoreError::InvalidObject {
                    source_path: source.clone(),
                    message: format!("missing '{}'", name),
                })
        };
        let api_version = field("apiVersion")?;
        let kind = field("kind")?;

        let metadata = manifest.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| crate::CoreError::InvalidObject {
                source_path: source.clone(),
                message: "missing 'metadata.name'".to_string(),
            })?
            .to_string();
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let string_map = |key: &str| -> BTreeMap<String, String> {
            metadata
                .and_then(|m| m.get(key))
                .and_then(JsonValue::as_object)
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default()
        };
        let labels = string_map("labels");
        let annotations = string_map("annotations");

        Ok(Self {
            gvk: GroupVersionKind::from_api_version(&api_version, kind),
            name,
            namespace,
            labels,
            annotations,
            source,
            body: manifest,
        })
    }

    /// Parse a single YAML document
    pub fn from_yaml(yaml: &str, source: impl Into<String>) -> crate::Result<Self> {
        let manifest: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_manifest(manifest, source)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = body;
        self
    }

    pub fn group_kind(&self) -> GroupKind {
        self.gvk.group_kind()
    }

    pub fn id(&self) -> ObjectId {
        ObjectId {
            gvk: self.gvk.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Check group and kind, ignoring the version
    pub fn is(&self, group_kind: &GroupKind) -> bool {
        self.gvk.group == group_kind.group && self.gvk.kind == group_kind.kind
    }

    pub fn is_namespace(&self) -> bool {
        self.is(&kinds::namespace())
    }

    /// Selectors are resolved before hydration and never inherited
    pub fn is_selector(&self) -> bool {
        self.is(&kinds::namespace_selector()) || self.is(&kinds::cluster_selector())
    }

    /// Directory containing the declaring file
    pub fn directory(&self) -> &str {
        parent_dir(&self.source)
    }
}

/// Strip `./` prefixes and trailing separators so paths compare cleanly
pub fn normalize_path(path: &str) -> String {
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_end_matches('/').to_string()
}

/// Parent of a `/`-separated path, or `""` for a top-level entry
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Last component of a `/`-separated path
pub fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}
