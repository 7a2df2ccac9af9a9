//! Controller configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Namespaces that are never created, changed or deleted
pub const ALWAYS_RESERVED: &[&str] = &["default", "kube-system", "kube-public", "kube-node-lease"];

/// How aggressively live namespaces are converged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Only touch namespaces carrying the management label; warn otherwise
    #[default]
    Soft,
    /// Make every declared name match, taking over unlabelled namespaces
    Hard,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::Soft => write!(f, "soft"),
            ReconcileMode::Hard => write!(f, "hard"),
        }
    }
}

/// When a repeated warning is worth surfacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarningConfig {
    /// Occurrences before a warning is emitted
    pub count_threshold: u32,

    /// Time since the first occurrence before a warning is emitted
    #[serde(with = "humantime_serde")]
    pub time_threshold: Duration,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            count_threshold: 3,
            time_threshold: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    pub mode: ReconcileMode,

    /// Attempts at removing the finalizer from a deleted unit
    pub finalizer_attempts: u32,

    pub warnings: WarningConfig,

    /// Extra names treated like the built-in reserved namespaces
    pub reserved_namespaces: Vec<String>,

    /// Namespace the controller runs in; always reserved
    pub system_namespace: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: ReconcileMode::Soft,
            finalizer_attempts: 5,
            warnings: WarningConfig::default(),
            reserved_namespaces: Vec::new(),
            system_namespace: arbor_core::SYSTEM_NAMESPACE.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Parse from YAML; missing fields take their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.finalizer_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "finalizerAttempts must be at least 1".to_string(),
            ));
        }
        if self.system_namespace.is_empty() {
            return Err(SyncError::InvalidConfig(
                "systemNamespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a namespace is off limits no matter what is declared
    pub fn is_reserved(&self, name: &str) -> bool {
        ALWAYS_RESERVED.contains(&name)
            || name == self.system_namespace
            || self.reserved_namespaces.iter().any(|n| n == name)
    }
}
