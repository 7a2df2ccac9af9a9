//! Per-unit reconciliation
//!
//! One call to [`Controller::reconcile`] converges one name:
//! 1. make sure a live unit holds the finalizer
//! 2. classify declared and live state and decide the namespace action
//! 3. create, relabel, upsert or delete the namespace
//! 4. for namespaces, diff and sync every module's resources
//! 5. write the unit status and emit events
//!
//! A deleting unit is treated as undeclared, then released by removing the
//! finalizer. Waiting is expressed only by returning an error, so the caller
//! re-queues.

use kube::core::DynamicObject;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

use arbor_core::GroupVersionKind;

use crate::cluster::{ActionExecutor, ActionSpec, EventRecorder, StateStore, SyncEvent};
use crate::config::ControllerConfig;
use crate::diff::{Diff, DiffSummary, Named, compare};
use crate::error::{Result, SyncError};
use crate::finalizer::remove_finalizer;
use crate::labels::{self, FINALIZER, management};
use crate::module::{ModuleRegistry, SyncModule};
use crate::state::{Action, Actual, Declared, decide};
use crate::unit::{ResourceSyncError, SyncUnit, SyncUnitStatus, gvk_of};
use crate::warnings::WarningFilter;

/// Reason on the event emitted after a fully successful sync
pub const RECONCILE_COMPLETE: &str = "ReconcileComplete";
/// Reason on the throttled event emitted when resources fail to sync
pub const RESOURCE_SYNC_FAILED: &str = "ResourceSyncFailed";

/// Reconciles sync units against the cluster
pub struct Controller<S, E, R> {
    store: S,
    executor: E,
    recorder: R,
    modules: ModuleRegistry,
    config: ControllerConfig,
    warnings: WarningFilter,
}

impl<S, E, R> Controller<S, E, R>
where
    S: StateStore,
    E: ActionExecutor,
    R: EventRecorder,
{
    /// Create a controller with the standard modules
    pub fn new(store: S, executor: E, recorder: R, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            executor,
            recorder,
            modules: ModuleRegistry::standard(),
            warnings: WarningFilter::from_config(&config.warnings),
            config,
        })
    }

    /// Replace the module registry
    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn warnings(&self) -> &WarningFilter {
        &self.warnings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converge the namespace `name` and its resources
    #[instrument(skip(self), fields(mode = %self.config.mode))]
    pub async fn reconcile(&self, name: &str) -> Result<()> {
        let unit = match self.store.get_unit(name).await? {
            Some(unit) if unit.is_deleting() => return self.finalize(unit).await,
            Some(mut unit) if !unit.has_finalizer(FINALIZER) => {
                unit.add_finalizer(FINALIZER);
                debug!("adding finalizer");
                Some(self.store.replace_unit(&unit).await?)
            }
            other => other,
        };

        let declared = Declared::classify(unit.as_ref(), self.config.is_reserved(name));
        let namespace = match self.store.get_namespace(name).await {
            Ok(namespace) => namespace,
            Err(e) => return self.namespace_failed(unit, name, e).await,
        };
        let actual = Actual::classify(namespace.as_ref());
        let action = self.guard(name, decide(self.config.mode, declared, actual));
        debug!(%declared, %actual, %action, "decided namespace action");

        let mut warned = false;
        if let Action::Warn(warning) = action {
            warned = true;
            self.warn(name, warning.reason(), &warning.to_string()).await;
        }
        let applied = self.apply_namespace(name, action, unit.as_ref(), namespace).await;
        if let Err(e) = applied {
            return self.namespace_failed(unit, name, e).await;
        }

        let result = match unit {
            Some(unit) if !matches!(action, Action::Warn(_)) => {
                let (summary, errors) = if action.syncs() {
                    self.sync_resources(&unit).await
                } else {
                    (DiffSummary::default(), Vec::new())
                };
                if !errors.is_empty() {
                    warned = true;
                }
                self.finish(unit, action, summary, errors).await
            }
            _ => Ok(()),
        };

        if !warned {
            self.warnings.clear(name);
        }
        result
    }

    /// Tear down a deleting unit and release its finalizer
    async fn finalize(&self, unit: SyncUnit) -> Result<()> {
        let name = unit.name();
        let declared = Declared::NotFound {
            reserved: self.config.is_reserved(name),
        };
        let namespace = self.store.get_namespace(name).await?;
        let actual = Actual::classify(namespace.as_ref());
        let action = self.guard(name, decide(self.config.mode, declared, actual));
        debug!(%actual, %action, "finalizing unit");

        let mut warned = false;
        match action {
            Action::Delete => self.apply_namespace(name, action, None, namespace).await?,
            Action::Warn(warning) => {
                warned = true;
                self.warn(name, warning.reason(), &warning.to_string()).await;
            }
            _ => {}
        }

        remove_finalizer(&self.store, name, FINALIZER, self.config.finalizer_attempts).await?;
        if !warned {
            self.warnings.clear(name);
        }
        info!(name, "released unit");
        Ok(())
    }

    /// Record a failed namespace step on the unit status and skip module sync.
    ///
    /// Without a unit there is no status to write, so the error is returned
    /// as is.
    async fn namespace_failed(&self, unit: Option<SyncUnit>, name: &str, error: SyncError) -> Result<()> {
        let Some(unit) = unit else {
            return Err(error);
        };
        warn!(name, error = %error, "namespace step failed");

        let spec = ActionSpec::namespace();
        let failure = resource_error(
            GroupVersionKind::new(&spec.group, &spec.version, &spec.kind),
            "",
            name,
            format!("namespace step failed: {}", error),
        );
        self.finish(unit, Action::Noop, DiffSummary::default(), vec![failure])
            .await
    }

    /// Reserved names are never deleted, whatever the table says
    fn guard(&self, name: &str, action: Action) -> Action {
        if action == Action::Delete && self.config.is_reserved(name) {
            Action::Noop
        } else {
            action
        }
    }

    async fn apply_namespace(
        &self,
        name: &str,
        action: Action,
        unit: Option<&SyncUnit>,
        existing: Option<DynamicObject>,
    ) -> Result<()> {
        let spec = ActionSpec::namespace();
        match action {
            Action::Noop | Action::Warn(_) => {}
            Action::Create => {
                let namespace = desired_namespace(name, None, unit, management::FULL);
                self.executor.create(&spec, &namespace).await?;
                info!(name, "created namespace");
            }
            Action::Relabel => {
                let namespace = desired_namespace(name, existing, unit, management::POLICIES);
                self.executor.update(&spec, &namespace).await?;
                debug!(name, "relabelled namespace");
            }
            Action::Upsert => match existing {
                Some(existing) => {
                    let namespace = desired_namespace(name, Some(existing), unit, management::FULL);
                    self.executor.update(&spec, &namespace).await?;
                }
                None => {
                    let namespace = desired_namespace(name, None, unit, management::FULL);
                    self.executor.create(&spec, &namespace).await?;
                    info!(name, "created namespace");
                }
            },
            Action::Delete => {
                self.executor.delete(&spec, None, name).await?;
                info!(name, "deleted namespace");
            }
        }
        Ok(())
    }

    /// Sync every module's resources into the unit's namespace.
    ///
    /// Failures are collected, never short-circuit the remaining work.
    async fn sync_resources(&self, unit: &SyncUnit) -> (DiffSummary, Vec<ResourceSyncError>) {
        let namespace = unit.name();
        let selector = labels::managed_selector();
        let mut summary = DiffSummary::default();
        let mut errors = Vec::new();

        for resource in &unit.spec.resources {
            if self.modules.find(resource).is_none() {
                errors.push(resource_error(
                    gvk_of(resource),
                    namespace,
                    resource.name(),
                    "no sync module handles this kind".to_string(),
                ));
            }
        }

        for module in self.modules.iter() {
            let spec = module.spec();
            let gvk = GroupVersionKind::new(&spec.group, &spec.version, &spec.kind);

            let actual = match self.executor.list(spec, Some(namespace), Some(&selector)).await {
                Ok(actual) => actual,
                Err(e) => {
                    errors.push(resource_error(gvk, namespace, "", format!("list failed: {}", e)));
                    continue;
                }
            };
            let declared = module.declared(unit);
            let diffs = compare(|d, a| module.equal(d, a), declared, actual);
            debug!(module = module.name(), changes = diffs.len(), "computed diff");

            for diff in diffs {
                let name = diff.name().to_string();
                let change = diff.change_type();
                match self.execute(module, namespace, diff).await {
                    Ok(()) => summary.record(change),
                    Err(e) => {
                        warn!(module = module.name(), name = %name, %change, error = %e, "sync action failed");
                        errors.push(resource_error(gvk.clone(), namespace, &name, format!("{} failed: {}", change, e)));
                    }
                }
            }
        }

        (summary, errors)
    }

    async fn execute(&self, module: &dyn SyncModule, namespace: &str, diff: Diff<DynamicObject>) -> Result<()> {
        let spec = module.spec();
        match diff {
            Diff::Add { declared } => {
                self.executor.create(spec, &declared).await?;
            }
            Diff::Update { mut declared, actual } => {
                declared.metadata.resource_version = actual.metadata.resource_version;
                self.executor.update(spec, &declared).await?;
            }
            Diff::Delete { actual } => {
                self.executor.delete(spec, Some(namespace), actual.name()).await?;
            }
        }
        Ok(())
    }

    /// Write status and emit the outcome event
    async fn finish(
        &self,
        mut unit: SyncUnit,
        action: Action,
        summary: DiffSummary,
        errors: Vec<ResourceSyncError>,
    ) -> Result<()> {
        let name = unit.name().to_string();
        let failed = errors.len();
        let first_error = errors.first().map(ToString::to_string);

        unit.status = SyncUnitStatus::from_errors(errors, chrono::Utc::now());
        self.store.write_status(&unit).await?;

        if let Some(first_error) = first_error {
            let detail = format!("{} resource(s) failed to sync, first: {}", failed, first_error);
            self.warn(&name, RESOURCE_SYNC_FAILED, &detail).await;
            return Err(SyncError::ResourceSync { unit: name, count: failed });
        }

        if action.syncs() {
            info!(name = %name, %summary, "reconciled");
            self.emit(SyncEvent::normal(
                &name,
                RECONCILE_COMPLETE,
                format!("{} change(s): {}", summary.total(), summary),
            ))
            .await;
        }
        Ok(())
    }

    /// Record an occurrence and emit a warning event once the filter allows
    async fn warn(&self, name: &str, reason: &str, detail: &str) {
        debug!(name, reason, detail, "warning");
        if let Some(message) = self.warnings.warning(name) {
            self.emit(SyncEvent::warning(name, reason, format!("{}: {}", detail, message)))
                .await;
        }
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.recorder.record(event).await {
            warn!(error = %e, "failed to record event");
        }
    }
}

/// The namespace object to write, starting from the live one when present.
///
/// Keys recorded on the previous write but no longer declared are removed.
/// Keys set by anyone else are left alone.
fn desired_namespace(
    name: &str,
    existing: Option<DynamicObject>,
    unit: Option<&SyncUnit>,
    management: &str,
) -> DynamicObject {
    let mut namespace =
        existing.unwrap_or_else(|| DynamicObject::new(name, &ActionSpec::namespace().api_resource()));
    let (declared_labels, declared_annotations) = unit
        .map(|u| (u.spec.labels.clone(), u.spec.annotations.clone()))
        .unwrap_or_default();

    let annotations = namespace.metadata.annotations.get_or_insert_with(BTreeMap::new);
    let previous_labels = labels::parse_key_list(annotations.get(labels::DECLARED_LABELS));
    let previous_annotations = labels::parse_key_list(annotations.get(labels::DECLARED_ANNOTATIONS));
    set_key_list(annotations, labels::DECLARED_LABELS, &declared_labels);
    set_key_list(annotations, labels::DECLARED_ANNOTATIONS, &declared_annotations);
    converge_keys(annotations, &previous_annotations, declared_annotations);
    if annotations.is_empty() {
        namespace.metadata.annotations = None;
    }

    let namespace_labels = namespace.metadata.labels.get_or_insert_with(BTreeMap::new);
    converge_keys(namespace_labels, &previous_labels, declared_labels);
    namespace_labels.insert(labels::NAMESPACE_MANAGEMENT.to_string(), management.to_string());
    namespace
}

fn converge_keys(
    live: &mut BTreeMap<String, String>,
    previous: &BTreeSet<String>,
    declared: BTreeMap<String, String>,
) {
    live.retain(|k, _| declared.contains_key(k) || !previous.contains(k));
    live.extend(declared);
}

fn set_key_list(annotations: &mut BTreeMap<String, String>, key: &str, declared: &BTreeMap<String, String>) {
    if declared.is_empty() {
        annotations.remove(key);
    } else {
        annotations.insert(key.to_string(), labels::key_list(declared));
    }
}

fn resource_error(gvk: GroupVersionKind, namespace: &str, name: &str, message: String) -> ResourceSyncError {
    ResourceSyncError {
        group_version_kind: gvk,
        namespace: namespace.to_string(),
        name: name.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileMode;
    use crate::mock::MockCluster;
    use crate::unit::{DeclaredState, SyncState};
    use serde_json::json;

    fn controller(cluster: &MockCluster, mode: ReconcileMode) -> Controller<MockCluster, MockCluster, MockCluster> {
        let config = ControllerConfig {
            mode,
            ..Default::default()
        };
        Controller::new(cluster.clone(), cluster.clone(), cluster.clone(), config).unwrap()
    }

    fn config_map_spec() -> ActionSpec {
        ActionSpec::new("", "v1", "ConfigMap", "configmaps", true)
    }

    fn config_map(name: &str, namespace: &str, value: &str) -> DynamicObject {
        DynamicObject::new(name, &config_map_spec().api_resource())
            .within(namespace)
            .data(json!({ "data": { "key": value } }))
    }

    fn namespace_unit(name: &str, resources: Vec<DynamicObject>) -> SyncUnit {
        let mut unit = SyncUnit::new(name, DeclaredState::Namespace);
        unit.spec.labels.insert("team".to_string(), "web".to_string());
        unit.spec.resources = resources;
        unit
    }

    #[tokio::test]
    async fn test_create_namespace_and_sync() {
        let cluster = MockCluster::new().with_unit(namespace_unit("web", vec![config_map("settings", "web", "1")]));
        controller(&cluster, ReconcileMode::Soft).reconcile("web").await.unwrap();

        let namespace = cluster.namespace("web").unwrap();
        let ns_labels = namespace.metadata.labels.unwrap();
        assert_eq!(ns_labels.get(labels::NAMESPACE_MANAGEMENT).map(String::as_str), Some(management::FULL));
        assert_eq!(ns_labels.get("team").map(String::as_str), Some("web"));

        let unit = cluster.unit("web").unwrap();
        assert!(unit.has_finalizer(FINALIZER));
        assert_eq!(unit.status.sync_state, SyncState::Synced);

        let events = cluster.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, RECONCILE_COMPLETE);
        assert!(events[0].message.starts_with("1 change(s)"));
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let cluster = MockCluster::new().with_unit(namespace_unit("web", vec![config_map("settings", "web", "1")]));
        let controller = controller(&cluster, ReconcileMode::Soft);
        controller.reconcile("web").await.unwrap();

        cluster.reset_counts();
        controller.reconcile("web").await.unwrap();

        let counts = cluster.operation_counts();
        assert_eq!(counts.creates, 0);
        assert_eq!(counts.deletes, 0);
        // Only the namespace upsert
        assert_eq!(counts.updates, 1);
        assert_eq!(counts.unit_replaces, 0);
    }

    #[tokio::test]
    async fn test_unlabelled_namespace_warns_in_soft_mode() {
        let cluster = MockCluster::new()
            .with_unit(namespace_unit("web", vec![config_map("settings", "web", "1")]))
            .with_namespace("web", &[]);
        let controller = controller(&cluster, ReconcileMode::Soft);

        controller.reconcile("web").await.unwrap();

        assert!(cluster.objects(&config_map_spec(), Some("web")).is_empty());
        assert_eq!(controller.warnings().tracked(), 1);
        // Below the count threshold: nothing emitted yet
        assert!(cluster.events().is_empty());
    }

    #[tokio::test]
    async fn test_unlabelled_namespace_taken_over_in_hard_mode() {
        let cluster = MockCluster::new()
            .with_unit(namespace_unit("web", vec![config_map("settings", "web", "1")]))
            .with_namespace("web", &[]);

        controller(&cluster, ReconcileMode::Hard).reconcile("web").await.unwrap();

        let ns_labels = cluster.namespace("web").unwrap().metadata.labels.unwrap();
        assert_eq!(ns_labels.get(labels::NAMESPACE_MANAGEMENT).map(String::as_str), Some(management::FULL));
        assert_eq!(cluster.objects(&config_map_spec(), Some("web")).len(), 1);
    }

    #[tokio::test]
    async fn test_relabel_keeps_policies_management() {
        let cluster = MockCluster::new()
            .with_unit(namespace_unit("web", vec![]))
            .with_managed_namespace("web", management::POLICIES);

        controller(&cluster, ReconcileMode::Soft).reconcile("web").await.unwrap();

        let ns_labels = cluster.namespace("web").unwrap().metadata.labels.unwrap();
        assert_eq!(ns_labels.get(labels::NAMESPACE_MANAGEMENT).map(String::as_str), Some(management::POLICIES));
        assert_eq!(ns_labels.get("team").map(String::as_str), Some("web"));
    }

    #[tokio::test]
    async fn test_undeclared_managed_namespace_deleted() {
        let cluster = MockCluster::new().with_managed_namespace("old", management::FULL);
        controller(&cluster, ReconcileMode::Soft).reconcile("old").await.unwrap();
        assert!(cluster.namespace("old").is_none());
    }

    #[tokio::test]
    async fn test_reserved_namespace_never_deleted() {
        let cluster = MockCluster::new().with_namespace("kube-system", &[]);
        controller(&cluster, ReconcileMode::Hard).reconcile("kube-system").await.unwrap();
        assert!(cluster.namespace("kube-system").is_some());

        // A policyspace that shares a reserved name is not deleted either
        let cluster = MockCluster::new()
            .with_unit(SyncUnit::new("default", DeclaredState::Policyspace))
            .with_managed_namespace("default", management::FULL);
        controller(&cluster, ReconcileMode::Soft).reconcile("default").await.unwrap();
        assert!(cluster.namespace("default").is_some());
    }

    #[tokio::test]
    async fn test_updates_and_prunes_managed_resources() {
        let spec = config_map_spec();
        let unit = namespace_unit("web", vec![config_map("settings", "web", "new")]);

        let mut stale = config_map("settings", "web", "old");
        stale.metadata.labels = Some(BTreeMap::from([(labels::MANAGED.to_string(), labels::MANAGED_ENABLED.to_string())]));
        let mut orphan = config_map("orphan", "web", "x");
        orphan.metadata.labels = stale.metadata.labels.clone();
        let unmanaged = config_map("hand-made", "web", "x");

        let cluster = MockCluster::new()
            .with_unit(unit)
            .with_managed_namespace("web", management::FULL)
            .with_object(&spec, stale)
            .with_object(&spec, orphan)
            .with_object(&spec, unmanaged);

        controller(&cluster, ReconcileMode::Soft).reconcile("web").await.unwrap();

        let settings = cluster.object(&spec, Some("web"), "settings").unwrap();
        assert_eq!(settings.data["data"]["key"], json!("new"));
        assert!(cluster.object(&spec, Some("web"), "orphan").is_none());
        assert!(cluster.object(&spec, Some("web"), "hand-made").is_some());
        assert!(cluster.events()[0].message.contains("1 to update, 1 to delete"));
    }

    #[tokio::test]
    async fn test_partial_failure_recorded_on_status() {
        let cluster = MockCluster::new().with_unit(namespace_unit(
            "web",
            vec![config_map("good", "web", "1"), config_map("bad", "web", "2")],
        ));
        cluster.fail_object("bad");

        let err = controller(&cluster, ReconcileMode::Soft).reconcile("web").await.unwrap_err();
        assert!(matches!(err, SyncError::ResourceSync { count: 1, .. }));

        // The healthy resource still synced
        assert!(cluster.object(&config_map_spec(), Some("web"), "good").is_some());

        let status = cluster.unit("web").unwrap().status;
        assert_eq!(status.sync_state, SyncState::Error);
        assert_eq!(status.sync_errors.len(), 1);
        assert_eq!(status.sync_errors[0].name, "bad");
        assert!(cluster.events().iter().all(|e| e.reason != RECONCILE_COMPLETE));
    }

    #[tokio::test]
    async fn test_unknown_kind_reported() {
        let secret = DynamicObject::new("creds", &ActionSpec::new("", "v1", "Secret", "secrets", true).api_resource())
            .within("web");
        let cluster = MockCluster::new().with_unit(namespace_unit("web", vec![secret]));

        let err = controller(&cluster, ReconcileMode::Soft).reconcile("web").await.unwrap_err();
        assert!(matches!(err, SyncError::ResourceSync { count: 1, .. }));
        assert!(cluster.unit("web").unwrap().status.sync_errors[0].message.contains("no sync module"));
    }

    #[tokio::test]
    async fn test_deleting_unit_removes_namespace_and_finalizer() {
        let cluster = MockCluster::new().with_unit(namespace_unit("web", vec![config_map("settings", "web", "1")]));
        let controller = controller(&cluster, ReconcileMode::Soft);
        controller.reconcile("web").await.unwrap();

        cluster.mark_deleting("web");
        controller.reconcile("web").await.unwrap();

        assert!(cluster.namespace("web").is_none());
        assert!(cluster.unit("web").is_none());
        assert!(cluster.objects(&config_map_spec(), None).is_empty());
    }

    #[tokio::test]
    async fn test_finalizer_conflict_on_add_requeues() {
        let cluster = MockCluster::new().with_unit(namespace_unit("web", vec![]));
        cluster.fail_replaces(1);

        let controller = controller(&cluster, ReconcileMode::Soft);
        let err = controller.reconcile("web").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(cluster.namespace("web").is_none());

        controller.reconcile("web").await.unwrap();
        assert!(cluster.namespace("web").is_some());
    }

    fn eager(mode: ReconcileMode) -> ControllerConfig {
        ControllerConfig {
            mode,
            warnings: crate::config::WarningConfig {
                count_threshold: 2,
                time_threshold: std::time::Duration::ZERO,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_namespace_failure_recorded_on_status() {
        let cluster = MockCluster::new().with_unit(namespace_unit("web", vec![config_map("settings", "web", "1")]));
        cluster.fail_object("web");
        let controller =
            Controller::new(cluster.clone(), cluster.clone(), cluster.clone(), eager(ReconcileMode::Soft)).unwrap();

        let err = controller.reconcile("web").await.unwrap_err();
        assert!(matches!(err, SyncError::ResourceSync { count: 1, .. }));

        let status = cluster.unit("web").unwrap().status;
        assert_eq!(status.sync_state, SyncState::Error);
        assert_eq!(status.sync_errors[0].group_version_kind.kind, "Namespace");
        assert_eq!(status.sync_errors[0].name, "web");
        // Module sync never ran
        assert_eq!(cluster.operation_counts().lists, 0);
        assert!(cluster.events().is_empty());

        // Repeated failures surface as a throttled warning
        controller.reconcile("web").await.unwrap_err();
        let events = cluster.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, RESOURCE_SYNC_FAILED);
        assert_eq!(controller.warnings().tracked(), 1);
    }

    #[tokio::test]
    async fn test_finalize_keeps_warning_state() {
        let mut unit = namespace_unit("web", vec![]);
        unit.add_finalizer(FINALIZER);
        let cluster = MockCluster::new().with_unit(unit).with_namespace("web", &[]);
        cluster.mark_deleting("web");
        let controller =
            Controller::new(cluster.clone(), cluster.clone(), cluster.clone(), eager(ReconcileMode::Soft)).unwrap();

        controller.reconcile("web").await.unwrap();

        // Released, but the unmanaged namespace still warns
        assert!(cluster.unit("web").is_none());
        assert!(cluster.namespace("web").is_some());
        assert_eq!(controller.warnings().tracked(), 1);
    }

    #[tokio::test]
    async fn test_dropped_namespace_keys_removed() {
        let mut unit = namespace_unit("web", vec![]);
        unit.spec.annotations.insert("contact".to_string(), "eng@example.com".to_string());
        let cluster = MockCluster::new()
            .with_unit(unit)
            .with_namespace("web", &[(labels::NAMESPACE_MANAGEMENT, management::FULL), ("owner", "ops")]);
        let controller = controller(&cluster, ReconcileMode::Soft);
        controller.reconcile("web").await.unwrap();

        let namespace = cluster.namespace("web").unwrap();
        assert_eq!(namespace.metadata.labels.unwrap().get("team").map(String::as_str), Some("web"));
        assert!(namespace.metadata.annotations.unwrap().contains_key("contact"));

        // A later snapshot swaps the team label and drops the annotation
        let mut unit = cluster.unit("web").unwrap();
        unit.spec.labels = BTreeMap::from([("tier".to_string(), "1".to_string())]);
        unit.spec.annotations.clear();
        let cluster = cluster.with_unit(unit);
        controller.reconcile("web").await.unwrap();

        let namespace = cluster.namespace("web").unwrap();
        let ns_labels = namespace.metadata.labels.unwrap();
        assert!(!ns_labels.contains_key("team"));
        assert_eq!(ns_labels.get("tier").map(String::as_str), Some("1"));
        assert_eq!(ns_labels.get("owner").map(String::as_str), Some("ops"));
        assert_eq!(ns_labels.get(labels::NAMESPACE_MANAGEMENT).map(String::as_str), Some(management::FULL));

        let annotations = namespace.metadata.annotations.unwrap();
        assert!(!annotations.contains_key("contact"));
        assert!(!annotations.contains_key(labels::DECLARED_ANNOTATIONS));
        assert_eq!(annotations.get(labels::DECLARED_LABELS).map(String::as_str), Some("tier"));
    }
}
