//! Namespace reconcile decisions
//!
//! [`decide`] maps what the hierarchy declares and what the cluster holds to
//! a single [`Action`]. It is a pure table lookup; the controller executes
//! the result.

use kube::core::DynamicObject;
use std::fmt;

use crate::config::ReconcileMode;
use crate::labels::{self, management};
use crate::unit::{DeclaredState, SyncUnit};

/// Declared side of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    /// No unit exists. `reserved` names are never touched.
    NotFound { reserved: bool },
    Namespace,
    Policyspace,
    Reserved,
}

impl Declared {
    pub fn classify(unit: Option<&SyncUnit>, reserved: bool) -> Self {
        match unit.map(|u| u.spec.declared) {
            None => Declared::NotFound { reserved },
            Some(DeclaredState::Namespace) => Declared::Namespace,
            Some(DeclaredState::Policyspace) => Declared::Policyspace,
            Some(DeclaredState::Reserved) => Declared::Reserved,
        }
    }
}

impl fmt::Display for Declared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declared::NotFound { reserved: true } => write!(f, "not found (reserved)"),
            Declared::NotFound { reserved: false } => write!(f, "not found"),
            Declared::Namespace => write!(f, "namespace"),
            Declared::Policyspace => write!(f, "policyspace"),
            Declared::Reserved => write!(f, "reserved"),
        }
    }
}

/// Live side of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actual {
    NotFound,
    /// Exists without the management label
    Exists,
    ManagedPolicies,
    ManagedFull,
}

impl Actual {
    /// Classify a live namespace by its management label
    pub fn classify(namespace: Option<&DynamicObject>) -> Self {
        let Some(namespace) = namespace else {
            return Actual::NotFound;
        };
        let labels = namespace.metadata.labels.as_ref();
        if labels::has_label(labels, labels::NAMESPACE_MANAGEMENT, management::FULL) {
            Actual::ManagedFull
        } else if labels::has_label(labels, labels::NAMESPACE_MANAGEMENT, management::POLICIES) {
            Actual::ManagedPolicies
        } else {
            Actual::Exists
        }
    }
}

impl fmt::Display for Actual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actual::NotFound => write!(f, "not found"),
            Actual::Exists => write!(f, "exists"),
            Actual::ManagedPolicies => write!(f, "managed (policies)"),
            Actual::ManagedFull => write!(f, "managed (full)"),
        }
    }
}

/// Why a state needs a human to look at it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// A managed namespace has no declaration
    Undeclared,
    /// Declared namespace exists but is not labelled for management
    NotManaged,
    /// An abstract namespace name exists as a live namespace
    PolicyspaceExists,
    /// A reserved namespace carries the management label
    Reserved,
}

impl Warning {
    /// CamelCase event reason
    pub fn reason(&self) -> &'static str {
        match self {
            Warning::Undeclared => "UndeclaredNamespace",
            Warning::NotManaged => "UnmanagedNamespace",
            Warning::PolicyspaceExists => "PolicyspaceExists",
            Warning::Reserved => "ReservedNamespace",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Undeclared => write!(f, "namespace is managed but not declared"),
            Warning::NotManaged => write!(
                f,
                "namespace is declared but lacks the {} label",
                labels::NAMESPACE_MANAGEMENT
            ),
            Warning::PolicyspaceExists => {
                write!(f, "name belongs to an abstract namespace but exists in the cluster")
            }
            Warning::Reserved => write!(f, "namespace is reserved but labelled for management"),
        }
    }
}

/// What to do about a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Noop,
    Warn(Warning),
    /// Create the namespace, fully managed, then sync resources
    Create,
    /// Update labels, keep policies management, then sync resources
    Relabel,
    /// Create or update the namespace as fully managed, then sync resources
    Upsert,
    /// Delete the namespace
    Delete,
}

impl Action {
    /// Whether resources are synced after the namespace step
    pub fn syncs(&self) -> bool {
        matches!(self, Action::Create | Action::Relabel | Action::Upsert)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Noop => write!(f, "noop"),
            Action::Warn(w) => write!(f, "warn({})", w.reason()),
            Action::Create => write!(f, "create"),
            Action::Relabel => write!(f, "relabel"),
            Action::Upsert => write!(f, "upsert"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Decide the namespace action for one name
pub fn decide(mode: ReconcileMode, declared: Declared, actual: Actual) -> Action {
    match mode {
        ReconcileMode::Soft => decide_soft(declared, actual),
        ReconcileMode::Hard => decide_hard(declared, actual),
    }
}

fn decide_soft(declared: Declared, actual: Actual) -> Action {
    use Actual as A;
    use Declared as D;

    match (declared, actual) {
        (D::NotFound { reserved: true }, _) => Action::Noop,

        (D::NotFound { .. }, A::NotFound) => Action::Noop,
        (D::NotFound { .. }, A::Exists | A::ManagedPolicies) => Action::Warn(Warning::Undeclared),
        (D::NotFound { .. }, A::ManagedFull) => Action::Delete,

        (D::Namespace, A::NotFound) => Action::Create,
        (D::Namespace, A::Exists) => Action::Warn(Warning::NotManaged),
        (D::Namespace, A::ManagedPolicies) => Action::Relabel,
        (D::Namespace, A::ManagedFull) => Action::Upsert,

        (D::Policyspace, A::NotFound) => Action::Noop,
        (D::Policyspace, A::Exists | A::ManagedPolicies) => Action::Warn(Warning::PolicyspaceExists),
        (D::Policyspace, A::ManagedFull) => Action::Delete,

        (D::Reserved, A::NotFound | A::Exists) => Action::Noop,
        (D::Reserved, A::ManagedPolicies | A::ManagedFull) => Action::Warn(Warning::Reserved),
    }
}

fn decide_hard(declared: Declared, actual: Actual) -> Action {
    match (declared, actual) {
        (Declared::Reserved, _) | (Declared::NotFound { reserved: true }, _) => Action::Noop,
        (Declared::NotFound { .. } | Declared::Policyspace, Actual::NotFound) => Action::Noop,
        (Declared::NotFound { .. } | Declared::Policyspace, _) => Action::Delete,
        (Declared::Namespace, _) => Action::Upsert,
    }
}
