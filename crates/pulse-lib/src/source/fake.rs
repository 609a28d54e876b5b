//! In-memory cluster source and object fixtures for tests

use super::{ClusterSource, PodUsage, SourceError, SourceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus,
    Event, Node, NodeCondition, NodeStatus, Pod, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Operation names accepted by [`FakeSource::fail`]
pub const OP_NODES: &str = "list_nodes";
pub const OP_DEPLOYMENTS: &str = "list_deployments";
pub const OP_READ_DEPLOYMENT: &str = "read_deployment";
pub const OP_PODS: &str = "list_pods";
pub const OP_EVENTS: &str = "list_events";
pub const OP_USAGE: &str = "list_pod_usage";

#[derive(Default)]
pub struct FakeSource {
    pub nodes: Vec<Node>,
    pub deployments: Vec<Deployment>,
    pub pods: Vec<Pod>,
    pub events: Vec<Event>,
    /// `None` behaves like a cluster without metrics-server
    pub usage: Option<Vec<PodUsage>>,
    /// Keyed by `(pod, container)`; missing keys make exec fail
    pub exec_output: HashMap<(String, String), String>,
    pub(crate) failing: HashSet<&'static str>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }

    fn check(&self, op: &'static str) -> SourceResult<()> {
        if self.failing.contains(op) {
            return Err(SourceError::Other(format!("{op} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterSource for FakeSource {
    async fn list_nodes(&self) -> SourceResult<Vec<Node>> {
        self.check(OP_NODES)?;
        Ok(self.nodes.clone())
    }

    async fn list_deployments(&self, namespace: Option<&str>) -> SourceResult<Vec<Deployment>> {
        self.check(OP_DEPLOYMENTS)?;
        Ok(self
            .deployments
            .iter()
            .filter(|d| namespace.is_none() || d.metadata.namespace.as_deref() == namespace)
            .cloned()
            .collect())
    }

    async fn read_deployment(&self, namespace: &str, name: &str) -> SourceResult<Deployment> {
        self.check(OP_READ_DEPLOYMENT)?;
        self.deployments
            .iter()
            .find(|d| {
                d.metadata.namespace.as_deref() == Some(namespace)
                    && d.metadata.name.as_deref() == Some(name)
            })
            .cloned()
            .ok_or_else(|| SourceError::Other(format!("deployment {namespace}/{name} not found")))
    }

    async fn list_pods(&self, field_selector: Option<&str>) -> SourceResult<Vec<Pod>> {
        self.check(OP_PODS)?;
        let non_running_only = field_selector == Some("status.phase!=Running");
        Ok(self
            .pods
            .iter()
            .filter(|p| {
                !non_running_only
                    || p.status.as_ref().and_then(|s| s.phase.as_deref()) != Some("Running")
            })
            .cloned()
            .collect())
    }

    async fn list_events(&self) -> SourceResult<Vec<Event>> {
        self.check(OP_EVENTS)?;
        Ok(self.events.clone())
    }

    async fn list_pod_usage(&self) -> SourceResult<Vec<PodUsage>> {
        self.check(OP_USAGE)?;
        self.usage
            .clone()
            .ok_or_else(|| SourceError::Other("metrics API not registered".to_string()))
    }

    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        _command: &[String],
    ) -> SourceResult<String> {
        self.exec_output
            .get(&(pod.to_string(), container.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::Exec {
                pod: pod.to_string(),
                container: container.to_string(),
                message: "container not running".to_string(),
            })
    }
}

fn labels(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn meta(namespace: &str, name: &str, label_pairs: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        labels: labels(label_pairs),
        ..Default::default()
    }
}

pub fn deployment(
    namespace: &str,
    name: &str,
    replicas: Option<i32>,
    ready: Option<i32>,
    label_pairs: &[(&str, &str)],
) -> Deployment {
    Deployment {
        metadata: meta(namespace, name, label_pairs),
        spec: Some(DeploymentSpec {
            replicas,
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            ready_replicas: ready,
            ..Default::default()
        }),
    }
}

pub fn crashlooping_pod(namespace: &str, name: &str, label_pairs: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: meta(namespace, name, label_pairs),
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "app".to_string(),
                restart_count: 7,
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some("CrashLoopBackOff".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod owned by `replicaset` whose container last terminated at `finished_at`
pub fn restarted_pod(
    namespace: &str,
    name: &str,
    replicaset: &str,
    restart_count: i32,
    finished_at: DateTime<Utc>,
) -> Pod {
    let mut metadata = meta(namespace, name, &[]);
    metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: replicaset.to_string(),
        uid: format!("uid-{replicaset}"),
        ..Default::default()
    }]);

    Pod {
        metadata,
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "app".to_string(),
                restart_count,
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code: 1,
                        finished_at: Some(Time(finished_at)),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod_in_phase(
    namespace: &str,
    name: &str,
    phase: &str,
    started_at: Option<DateTime<Utc>>,
    containers: &[&str],
) -> Pod {
    Pod {
        metadata: meta(namespace, name, &[]),
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|c| Container {
                    name: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            start_time: started_at.map(Time),
            ..Default::default()
        }),
    }
}

pub fn node(name: &str, ready_status: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            conditions: Some(vec![
                NodeCondition {
                    type_: "MemoryPressure".to_string(),
                    status: "False".to_string(),
                    ..Default::default()
                },
                NodeCondition {
                    type_: "Ready".to_string(),
                    status: ready_status.to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn event(namespace: &str, type_: &str, reason: &str, message: &str) -> Event {
    Event {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some(type_.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        ..Default::default()
    }
}
