//! Core error types

use std::fmt;

use thiserror::Error;

use crate::object::GroupKind;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object in {source_path}: {message}")]
    InvalidObject {
        source_path: String,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A structural problem in the declared configuration.
///
/// These are deterministic: re-running against the same snapshot reports the
/// same errors, and only a change to the source tree resolves them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("ARB1001: no Repo object declared in the system directory")]
    MissingRepo,

    #[error("ARB1002: only one Repo object may be declared, found {}: {}", .sources.len(), .sources.join(", "))]
    MultipleRepos { sources: Vec<String> },

    #[error("ARB1003: hierarchy mode '{mode}' is not allowed for {group_kind} (declared in {source_path})")]
    IllegalHierarchyMode {
        group_kind: GroupKind,
        mode: String,
        source_path: String,
    },

    #[error("ARB1004: {group_kind} cannot be configured in a HierarchyConfig (declared in {source_path})")]
    UnsupportedHierarchyKind {
        group_kind: GroupKind,
        source_path: String,
    },

    #[error("ARB1005: conflicting hierarchy modes for {group_kind}: {}", .declarations.join(", "))]
    ConflictingHierarchyMode {
        group_kind: GroupKind,
        declarations: Vec<String>,
    },

    #[error("ARB1006: {group_kind} '{name}' in abstract namespace '{directory}' is not inheritable (declared in {source_path})")]
    IllegalAbstractNamespaceObject {
        group_kind: GroupKind,
        name: String,
        directory: String,
        source_path: String,
    },

    #[error("ARB1007: namespace directory '{directory}' must not contain subdirectories: {}", .children.join(", "))]
    IllegalNamespaceSubdirectory {
        directory: String,
        children: Vec<String>,
    },

    #[error("ARB1008: directory '{directory}' declares more than one Namespace: {}", .sources.join(", "))]
    MultipleNamespaces {
        directory: String,
        sources: Vec<String>,
    },

    #[error("ARB1009: Namespace '{name}' must match its directory '{directory}' (declared in {source_path})")]
    NamespaceNameMismatch {
        name: String,
        directory: String,
        source_path: String,
    },

    #[error("ARB1010: {source_path} sets metadata.namespace '{namespace}' but lives in directory '{expected}'")]
    IllegalMetadataNamespace {
        namespace: String,
        expected: String,
        source_path: String,
    },

    #[error("ARB1011: cluster-scoped object {source_path} must not set metadata.namespace '{namespace}'")]
    ClusterScopedWithNamespace {
        namespace: String,
        source_path: String,
    },

    #[error("ARB1012: directory name '{name}' in '{directory}' is not a valid namespace name")]
    InvalidDirectoryName { name: String, directory: String },

    #[error("ARB1013: directory '{directory}' uses the reserved name '{name}'")]
    ReservedDirectoryName { name: String, directory: String },

    #[error("ARB1014: {group_kind} '{name}' is declared more than once for namespace '{namespace}': {}", .sources.join(", "))]
    NameCollision {
        group_kind: GroupKind,
        name: String,
        namespace: String,
        sources: Vec<String>,
    },

    #[error("ARB1015: abstract namespace '{directory}' declares objects but has no namespace below it")]
    UnsyncableResources { directory: String },

    #[error("ARB1016: {source_path} is not under the '{root}' directory")]
    ObjectOutsideTree { source_path: String, root: String },

    #[error("ARB1017: invalid HierarchyConfig in {source_path}: {message}")]
    InvalidHierarchyConfig {
        source_path: String,
        message: String,
    },

    #[error("ARB1018: {source_path} is not in a recognized top-level directory")]
    UnknownTopLevelDirectory { source_path: String },

    #[error("ARB1019: directory name '{name}' is used more than once: {}", .directories.join(", "))]
    DuplicateDirectoryName {
        name: String,
        directories: Vec<String>,
    },
}

impl ValidationError {
    /// Stable error code, e.g. `ARB1006`.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingRepo => "ARB1001",
            ValidationError::MultipleRepos { .. } => "ARB1002",
            ValidationError::IllegalHierarchyMode { .. } => "ARB1003",
            ValidationError::UnsupportedHierarchyKind { .. } => "ARB1004",
            ValidationError::ConflictingHierarchyMode { .. } => "ARB1005",
            ValidationError::IllegalAbstractNamespaceObject { .. } => "ARB1006",
            ValidationError::IllegalNamespaceSubdirectory { .. } => "ARB1007",
            ValidationError::MultipleNamespaces { .. } => "ARB1008",
            ValidationError::NamespaceNameMismatch { .. } => "ARB1009",
            ValidationError::IllegalMetadataNamespace { .. } => "ARB1010",
            ValidationError::ClusterScopedWithNamespace { .. } => "ARB1011",
            ValidationError::InvalidDirectoryName { .. } => "ARB1012",
            ValidationError::ReservedDirectoryName { .. } => "ARB1013",
            ValidationError::NameCollision { .. } => "ARB1014",
            ValidationError::UnsyncableResources { .. } => "ARB1015",
            ValidationError::ObjectOutsideTree { .. } => "ARB1016",
            ValidationError::InvalidHierarchyConfig { .. } => "ARB1017",
            ValidationError::UnknownTopLevelDirectory { .. } => "ARB1018",
            ValidationError::DuplicateDirectoryName { .. } => "ARB1019",
        }
    }
}

/// Every validation error found in one pass.
///
/// Validators never stop at the first problem; this collects all of them so
/// a single run reports everything the user has to fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// Check whether any collected error carries the given code
    pub fn contains_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code() == code)
    }

    /// `Ok(())` when nothing was collected, otherwise `Err(self)`
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no validation errors"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                write!(f, "{} validation errors:", n)?;
                for error in &self.errors {
                    write!(f, "\n  {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }
}

impl Extend<ValidationError> for ValidationErrors {
    fn extend<I: IntoIterator<Item = ValidationError>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
