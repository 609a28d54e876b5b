//! [`ClusterSource`] backed by a live `kube::Client`

use super::{ClusterSource, ContainerUsage, PodUsage, SourceError, SourceResult};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Node, Pod};
use kube::api::{Api, ApiResource, AttachParams, DynamicObject, GroupVersionKind, ListParams};
use kube::Client;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Cluster source talking to the API server through an injected client
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from kubeconfig or the in-cluster service account
    pub async fn try_default() -> SourceResult<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn pod_metrics_resource() -> ApiResource {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        ApiResource::from_gvk_with_plural(&gvk, "pods")
    }
}

#[async_trait]
impl ClusterSource for KubeSource {
    async fn list_nodes(&self) -> SourceResult<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_deployments(&self, namespace: Option<&str>) -> SourceResult<Vec<Deployment>> {
        let api: Api<Deployment> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn read_deployment(&self, namespace: &str, name: &str) -> SourceResult<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn list_pods(&self, field_selector: Option<&str>) -> SourceResult<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if let Some(selector) = field_selector {
            params = params.fields(selector);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn list_events(&self) -> SourceResult<Vec<Event>> {
        let api: Api<Event> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_pod_usage(&self) -> SourceResult<Vec<PodUsage>> {
        let resource = Self::pod_metrics_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let list = api.list(&ListParams::default()).await?;

        let mut samples = Vec::with_capacity(list.items.len());
        for object in list.items {
            let containers: Vec<ContainerUsage> = match object.data.get("containers") {
                Some(value) => serde_json::from_value(value.clone())?,
                None => Vec::new(),
            };
            samples.push(PodUsage {
                namespace: object.metadata.namespace.unwrap_or_default(),
                name: object.metadata.name.unwrap_or_default(),
                containers,
            });
        }

        debug!(pods = samples.len(), "Fetched pod usage from metrics API");
        Ok(samples)
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> SourceResult<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(false);

        let exec_error = |message: String| SourceError::Exec {
            pod: pod.to_string(),
            container: container.to_string(),
            message,
        };

        let mut attached = api.exec(pod, command.to_vec(), &params).await?;

        let mut output = String::new();
        {
            let mut stdout = attached
                .stdout()
                .ok_or_else(|| exec_error("stdout not attached".to_string()))?;
            stdout
                .read_to_string(&mut output)
                .await
                .map_err(|e| exec_error(e.to_string()))?;
        }

        attached
            .join()
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        Ok(output)
    }
}
