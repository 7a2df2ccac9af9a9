//! Declared-vs-actual comparison
//!
//! [`compare`] is a pure function: given what should exist, what does exist
//! and an equality predicate, it returns the changes needed to converge.
//! Objects are matched by name only; callers pass lists already scoped to a
//! single kind and namespace.

use indexmap::IndexMap;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Something with a name to match on
pub trait Named {
    fn name(&self) -> &str;
}

/// Labels and annotations of an object
pub trait Metadata {
    fn labels(&self) -> Option<&BTreeMap<String, String>>;
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;
}

impl Named for DynamicObject {
    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl Metadata for DynamicObject {
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }
}

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Add => write!(f, "add"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// One change needed to make the actual state match the declared state
#[derive(Debug, Clone, PartialEq)]
pub enum Diff<T> {
    /// Declared but missing
    Add { declared: T },
    /// Present on both sides but different
    Update { declared: T, actual: T },
    /// Present but no longer declared
    Delete { actual: T },
}

impl<T: Named> Diff<T> {
    pub fn name(&self) -> &str {
        match self {
            Diff::Add { declared } | Diff::Update { declared, .. } => declared.name(),
            Diff::Delete { actual } => actual.name(),
        }
    }
}

impl<T> Diff<T> {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Diff::Add { .. } => ChangeType::Add,
            Diff::Update { .. } => ChangeType::Update,
            Diff::Delete { .. } => ChangeType::Delete,
        }
    }

    pub fn declared(&self) -> Option<&T> {
        match self {
            Diff::Add { declared } | Diff::Update { declared, .. } => Some(declared),
            Diff::Delete { .. } => None,
        }
    }

    pub fn actual(&self) -> Option<&T> {
        match self {
            Diff::Update { actual, .. } | Diff::Delete { actual } => Some(actual),
            Diff::Add { .. } => None,
        }
    }
}

/// Compute the changes that turn `actual` into `declared`.
///
/// Declared names must be unique. Duplicate actual names are collapsed, the
/// last one wins. A name present on both sides yields an update unless
/// `equals` holds and every label and annotation the declared object sets is
/// already present on the actual object.
///
/// # Panics
///
/// Panics if two declared objects share a name.
pub fn compare<T, F>(equals: F, declared: Vec<T>, actual: Vec<T>) -> Vec<Diff<T>>
where
    T: Named + Metadata,
    F: Fn(&T, &T) -> bool,
{
    let mut declared_by_name: IndexMap<String, T> = IndexMap::with_capacity(declared.len());
    for object in declared {
        let name = object.name().to_string();
        if declared_by_name.contains_key(&name) {
            panic!("duplicate declared name '{}'", name);
        }
        declared_by_name.insert(name, object);
    }

    let mut actual_by_name: IndexMap<String, T> = IndexMap::with_capacity(actual.len());
    for object in actual {
        actual_by_name.insert(object.name().to_string(), object);
    }

    let mut diffs = Vec::new();
    for (name, declared) in declared_by_name {
        match actual_by_name.shift_remove(&name) {
            None => diffs.push(Diff::Add { declared }),
            Some(actual) => {
                if !(equals(&declared, &actual) && metadata_subset(&declared, &actual)) {
                    diffs.push(Diff::Update { declared, actual });
                }
            }
        }
    }
    diffs.extend(
        actual_by_name
            .into_values()
            .map(|actual| Diff::Delete { actual }),
    );
    diffs
}

/// Every label and annotation set on `declared` has the same value on `actual`
pub fn metadata_subset<T: Metadata>(declared: &T, actual: &T) -> bool {
    fn subset(want: Option<&BTreeMap<String, String>>, have: Option<&BTreeMap<String, String>>) -> bool {
        want.into_iter()
            .flatten()
            .all(|(k, v)| have.and_then(|h| h.get(k)) == Some(v))
    }
    subset(declared.labels(), actual.labels()) && subset(declared.annotations(), actual.annotations())
}

/// Change counts for a set of diffs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl DiffSummary {
    pub fn from_diffs<T>(diffs: &[Diff<T>]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            summary.record(diff.change_type());
        }
        summary
    }

    pub fn record(&mut self, change: ChangeType) {
        match change {
            ChangeType::Add => self.added += 1,
            ChangeType::Update => self.updated += 1,
            ChangeType::Delete => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::ops::AddAssign for DiffSummary {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to update, {} to delete",
            self.added, self.updated, self.deleted
        )
    }
}
