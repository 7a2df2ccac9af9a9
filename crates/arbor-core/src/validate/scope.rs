//! Per-object scope and naming checks, run before the tree exists

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::SYSTEM_NAMESPACE;
use crate::error::ValidationError;
use crate::object::{ObjectModel, base_name, parent_dir};
use crate::root::{FlatRoot, NAMESPACES_DIR};

use super::Validator;

/// DNS-1123 label: lowercase alphanumerics and '-', at most 63 characters
static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

const MAX_LABEL_LEN: usize = 63;

pub fn is_dns_label(name: &str) -> bool {
    name.len() <= MAX_LABEL_LEN && DNS_LABEL.is_match(name)
}

/// Cluster-scoped objects must not set `metadata.namespace`
pub struct ClusterScopeValidator;

impl Validator<FlatRoot> for ClusterScopeValidator {
    fn name(&self) -> &'static str {
        "cluster-scope"
    }

    fn validate(&self, root: &FlatRoot) -> Vec<ValidationError> {
        root.cluster_objects
            .iter()
            .chain(&root.cluster_registry_objects)
            .filter(|o| !o.namespace.is_empty())
            .map(|o| ValidationError::ClusterScopedWithNamespace {
                namespace: o.namespace.clone(),
                source_path: o.source.clone(),
            })
            .collect()
    }
}

/// Every directory below `namespaces/` must be usable as a namespace name
pub struct DirectoryNameValidator {
    reserved: BTreeSet<String>,
}

impl DirectoryNameValidator {
    pub fn new() -> Self {
        Self {
            reserved: BTreeSet::from([SYSTEM_NAMESPACE.to_string()]),
        }
    }

    /// Also reject `name` as a directory name
    pub fn with_reserved(mut self, name: impl Into<String>) -> Self {
        self.reserved.insert(name.into());
        self
    }
}

impl Default for DirectoryNameValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator<FlatRoot> for DirectoryNameValidator {
    fn name(&self) -> &'static str {
        "directory-name"
    }

    fn validate(&self, root: &FlatRoot) -> Vec<ValidationError> {
        let mut directories = BTreeSet::new();
        for object in &root.namespace_objects {
            let mut dir = object.directory();
            while let Some(rest) = dir.strip_prefix(NAMESPACES_DIR)
                && rest.starts_with('/')
            {
                directories.insert(dir);
                dir = parent_dir(dir);
            }
        }

        let mut errors = Vec::new();
        for directory in directories {
            let name = base_name(directory);
            if !is_dns_label(name) {
                errors.push(ValidationError::InvalidDirectoryName {
                    name: name.to_string(),
                    directory: directory.to_string(),
                });
            } else if self.reserved.contains(name) {
                errors.push(ValidationError::ReservedDirectoryName {
                    name: name.to_string(),
                    directory: directory.to_string(),
                });
            }
        }
        errors
    }
}

/// A namespace-scope object that sets `metadata.namespace` must name the
/// namespace directory it lives in. Objects in abstract namespaces must not
/// set it at all, since they are copied into several namespaces.
pub struct MetadataNamespaceValidator;

impl Validator<FlatRoot> for MetadataNamespaceValidator {
    fn name(&self) -> &'static str {
        "metadata-namespace"
    }

    fn validate(&self, root: &FlatRoot) -> Vec<ValidationError> {
        let namespace_dirs: BTreeSet<&str> = root
            .namespace_objects
            .iter()
            .filter(|o| o.is_namespace())
            .map(ObjectModel::directory)
            .collect();

        root.namespace_objects
            .iter()
            .filter(|o| !o.namespace.is_empty() && !o.is_namespace())
            .filter_map(|o| {
                let dir = o.directory();
                let expected = if namespace_dirs.contains(dir) {
                    base_name(dir)
                } else {
                    ""
                };
                (o.namespace != expected).then(|| ValidationError::IllegalMetadataNamespace {
                    namespace: o.namespace.clone(),
                    expected: expected.to_string(),
                    source_path: o.source.clone(),
                })
            })
            .collect()
    }
}
