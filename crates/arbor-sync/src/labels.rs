//! Labels, annotations and finalizers Arbor writes onto cluster objects

use std::collections::{BTreeMap, BTreeSet};

/// Marks a namespace as managed and how far
pub const NAMESPACE_MANAGEMENT: &str = "arbor.dev/namespace-management";

/// Values of [`NAMESPACE_MANAGEMENT`]
pub mod management {
    /// Arbor owns the namespace itself and may delete it
    pub const FULL: &str = "full";
    /// Arbor only syncs resources inside the namespace
    pub const POLICIES: &str = "policies";
}

/// Marks a resource inside a namespace as owned by Arbor
pub const MANAGED: &str = "arbor.dev/managed";
pub const MANAGED_ENABLED: &str = "enabled";

/// Path of the file a synced resource was declared in
pub const SOURCE_PATH: &str = "arbor.dev/source-path";

/// Finalizer held on sync units until their namespace is cleaned up
pub const FINALIZER: &str = "arbor.dev/finalizer";

/// Label keys Arbor last wrote onto a namespace, comma separated
pub const DECLARED_LABELS: &str = "arbor.dev/declared-labels";

/// Annotation keys Arbor last wrote onto a namespace, comma separated
pub const DECLARED_ANNOTATIONS: &str = "arbor.dev/declared-annotations";

/// Label selector matching managed resources
pub fn managed_selector() -> String {
    format!("{}={}", MANAGED, MANAGED_ENABLED)
}

/// Check a label map for `key=value`
pub fn has_label(labels: Option<&BTreeMap<String, String>>, key: &str, value: &str) -> bool {
    labels
        .and_then(|l| l.get(key))
        .is_some_and(|v| v == value)
}

/// Parse a simple equality selector (`a=b,c=d`)
pub fn parse_selector(selector: &str) -> Vec<(&str, &str)> {
    selector
        .split(',')
        .filter_map(|term| term.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

/// Check whether labels satisfy an equality selector
pub fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    parse_selector(selector)
        .into_iter()
        .all(|(key, value)| has_label(labels, key, value))
}

/// Render map keys as a key list annotation value
pub fn key_list(map: &BTreeMap<String, String>) -> String {
    map.keys().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Parse a key list annotation value; a missing value is an empty list
pub fn parse_key_list(value: Option<&String>) -> BTreeSet<String> {
    value
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
