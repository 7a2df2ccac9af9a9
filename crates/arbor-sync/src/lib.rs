//! Arbor Sync - converges a cluster towards a hydrated hierarchy
//!
//! This crate provides:
//! - **Sync Units**: one declared unit per namespace or abstract namespace name
//! - **Diff Engine**: name-keyed comparison of declared and live resources
//! - **State Machine**: the soft/hard namespace decision table
//! - **Controller**: per-unit reconcile with status, events and finalizers
//! - **Dispatcher**: concurrent reconciles, serialized per name
//! - **Warning Filter**: throttles warnings that keep recurring
//! - **Cluster Access**: a kube-backed implementation and an in-memory mock

pub mod client;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod finalizer;
pub mod labels;
pub mod mock;
pub mod module;
pub mod state;
pub mod unit;
pub mod warnings;

pub use client::KubeCluster;
pub use cluster::{ActionExecutor, ActionSpec, EventRecorder, EventType, StateStore, SyncEvent};
pub use config::{ControllerConfig, ReconcileMode, WarningConfig};
pub use controller::{Controller, RECONCILE_COMPLETE, RESOURCE_SYNC_FAILED};
pub use diff::{ChangeType, Diff, DiffSummary, compare};
pub use dispatch::{Dispatcher, Outcome};
pub use error::{Result, SyncError};
pub use finalizer::remove_finalizer;
pub use mock::{MockCluster, OperationCounts};
pub use module::{FieldsModule, ModuleRegistry, SyncModule};
pub use state::{Action, Actual, Declared, Warning, decide};
pub use unit::{
    DeclaredState, ResourceSyncError, SyncState, SyncUnit, SyncUnitSpec, SyncUnitStatus,
    units_from_tree,
};
pub use warnings::WarningFilter;
