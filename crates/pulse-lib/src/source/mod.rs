//! Read-only access to cluster state
//!
//! Detectors and the resource aggregator never talk to the API server
//! directly; they receive a [`ClusterSource`] handle. Production code uses
//! [`KubeSource`], tests use an in-memory fake.

mod kubernetes;

#[cfg(test)]
pub(crate) mod fake;

pub use kubernetes::KubeSource;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Node, Pod};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised by a cluster source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("exec into {pod}/{container} failed: {message}")]
    Exec {
        pod: String,
        container: String,
        message: String,
    },

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// One pod sample from the metrics API (`metrics.k8s.io/v1beta1`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PodUsage {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<ContainerUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    #[serde(default)]
    pub usage: UsageValues,
}

/// Raw usage quantities, unparsed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UsageValues {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// Read-only view over the Kubernetes API
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_nodes(&self) -> SourceResult<Vec<Node>>;

    /// List deployments in one namespace, or in all namespaces when `None`
    async fn list_deployments(&self, namespace: Option<&str>) -> SourceResult<Vec<Deployment>>;

    async fn read_deployment(&self, namespace: &str, name: &str) -> SourceResult<Deployment>;

    /// List pods in all namespaces, optionally filtered by a field selector
    async fn list_pods(&self, field_selector: Option<&str>) -> SourceResult<Vec<Pod>>;

    async fn list_events(&self) -> SourceResult<Vec<Event>>;

    /// Live usage samples for all pods; fails when the metrics API is absent
    async fn list_pod_usage(&self) -> SourceResult<Vec<PodUsage>>;

    /// Run a command in a container and return its stdout
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> SourceResult<String>;
}
