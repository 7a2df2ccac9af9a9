//! Kubernetes-backed cluster access
//!
//! Sync units are stored as cluster-scoped `SyncUnit` custom resources.
//! Events are written to the controller's system namespace with the unit as
//! the involved object.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use tracing::debug;

use crate::cluster::{ActionExecutor, ActionSpec, EventRecorder, StateStore, SyncEvent};
use crate::error::{Result, SyncError};
use crate::unit::SyncUnit;

/// Field manager used for status patches
const FIELD_MANAGER: &str = "arbor-sync";

/// Cluster access through a live API server
#[derive(Clone)]
pub struct KubeCluster {
    client: kube::Client,
    system_namespace: String,
}

impl KubeCluster {
    /// Connect using the default kubeconfig or in-cluster config
    pub async fn try_default(system_namespace: impl Into<String>) -> Result<Self> {
        let client = kube::Client::try_default().await?;
        Ok(Self::with_client(client, system_namespace))
    }

    /// Use an existing Kubernetes client
    pub fn with_client(client: kube::Client, system_namespace: impl Into<String>) -> Self {
        Self {
            client,
            system_namespace: system_namespace.into(),
        }
    }

    /// Get the underlying Kubernetes client
    pub fn kube_client(&self) -> &kube::Client {
        &self.client
    }

    fn units(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &SyncUnit::api_resource())
    }

    fn api(&self, spec: &ActionSpec, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = spec.api_resource();
        match namespace {
            Some(ns) if spec.namespaced => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn object_name(object: &DynamicObject) -> Result<&str> {
    object
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| SyncError::InvalidObject("object has no name".to_string()))
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl StateStore for KubeCluster {
    async fn get_unit(&self, name: &str) -> Result<Option<SyncUnit>> {
        match self.units().get_opt(name).await? {
            Some(object) => Ok(Some(SyncUnit::from_dynamic(object)?)),
            None => Ok(None),
        }
    }

    async fn list_units(&self) -> Result<Vec<SyncUnit>> {
        self.units()
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .map(SyncUnit::from_dynamic)
            .collect()
    }

    async fn replace_unit(&self, unit: &SyncUnit) -> Result<SyncUnit> {
        let object = unit.to_dynamic()?;
        let replaced = self
            .units()
            .replace(unit.name(), &PostParams::default(), &object)
            .await?;
        SyncUnit::from_dynamic(replaced)
    }

    async fn write_status(&self, unit: &SyncUnit) -> Result<SyncUnit> {
        let patch = serde_json::json!({ "status": unit.status });
        let patched = self
            .units()
            .patch_status(unit.name(), &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        SyncUnit::from_dynamic(patched)
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<DynamicObject>> {
        Ok(self.api(&ActionSpec::namespace(), None).get_opt(name).await?)
    }
}

#[async_trait]
impl ActionExecutor for KubeCluster {
    async fn list(
        &self,
        spec: &ActionSpec,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self.api(spec, namespace).list(&params).await?;
        debug!(kind = %spec.kind, count = list.items.len(), "listed objects");
        Ok(list.items)
    }

    async fn create(&self, spec: &ActionSpec, object: &DynamicObject) -> Result<DynamicObject> {
        let mut object = object.clone();
        object.types.get_or_insert_with(|| spec.type_meta());
        let api = self.api(spec, object.metadata.namespace.as_deref());
        Ok(api.create(&PostParams::default(), &object).await?)
    }

    async fn update(&self, spec: &ActionSpec, object: &DynamicObject) -> Result<DynamicObject> {
        let mut object = object.clone();
        object.types.get_or_insert_with(|| spec.type_meta());
        let name = object_name(&object)?.to_string();
        let api = self.api(spec, object.metadata.namespace.as_deref());
        Ok(api.replace(&name, &PostParams::default(), &object).await?)
    }

    async fn delete(&self, spec: &ActionSpec, namespace: Option<&str>, name: &str) -> Result<()> {
        match self.api(spec, namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeCluster {
    async fn record(&self, event: SyncEvent) -> Result<()> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &self.system_namespace);
        let spec = SyncUnit::action_spec();
        let time = chrono::Utc::now();

        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", event.unit)),
                namespace: Some(self.system_namespace.clone()),
                ..Default::default()
            },
            type_: Some(event.event_type.to_string()),
            reason: Some(event.reason),
            message: Some(event.message),
            involved_object: ObjectReference {
                api_version: Some(spec.api_version()),
                kind: Some(spec.kind),
                name: Some(event.unit),
                ..Default::default()
            },
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            reporting_component: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        events.create(&PostParams::default(), &event).await?;
        Ok(())
    }
}
