//! Error types for arbor-sync

use thiserror::Error;

/// Result type for arbor-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while reconciling
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Write rejected because the stored copy changed underneath us
    #[error("conflict writing {kind} '{name}': {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    /// Object does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid controller configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object is missing a field the API needs
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Some resources of a unit failed to sync; details are on the unit status
    #[error("{count} resource(s) failed to sync for '{unit}'")]
    ResourceSync { unit: String, count: usize },

    /// Declared configuration error
    #[error(transparent)]
    Core(#[from] arbor_core::CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(e: serde_yaml::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl SyncError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Api(kube::Error::Api(resp)) => resp.code == 404,
            SyncError::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            SyncError::Api(kube::Error::Api(resp)) => resp.code == 409,
            SyncError::Conflict { .. } => true,
            _ => false,
        }
    }
}
