//! Node, event and system-deployment status detectors

use crate::models::{NodeIssue, SemaphoreStatus, UnusualEvent};
use crate::source::{ClusterSource, SourceResult};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Node};
use std::collections::HashMap;
use tracing::warn;

/// Maximum number of grouped events returned
pub const MAX_UNUSUAL_EVENTS: usize = 50;

const METRICS_SERVER_PREFIX: &str = "metrics-server";
const KUBE_SYSTEM: &str = "kube-system";
const CAST_AI_NAMESPACE: &str = "castai-agent";

/// Nodes whose `Ready` condition is present and not `"True"`
pub fn nodes_with_issues(nodes: &[Node]) -> Vec<NodeIssue> {
    let mut issues = Vec::new();

    for node in nodes {
        let conditions = node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(Vec::as_slice)
            .unwrap_or_default();

        for condition in conditions {
            if condition.type_ == "Ready" && condition.status != "True" {
                issues.push(NodeIssue {
                    name: node.metadata.name.clone().unwrap_or_default(),
                    status: condition.status.clone(),
                    description: describe_node(node),
                });
            }
        }
    }

    issues
}

fn describe_node(node: &Node) -> String {
    serde_yaml::to_string(node).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize node for diagnostics");
        format!("<node could not be serialized: {e}>")
    })
}

pub async fn detect_nodes_with_issues(source: &dyn ClusterSource) -> SourceResult<Vec<NodeIssue>> {
    Ok(nodes_with_issues(&source.list_nodes().await?))
}

/// Group non-Normal events by (namespace, reason, message), most frequent first
pub fn summarize_unusual_events(events: &[Event]) -> Vec<UnusualEvent> {
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut summary: Vec<UnusualEvent> = Vec::new();

    for event in events {
        if event.type_.as_deref() == Some("Normal") {
            continue;
        }

        let key = (
            event.metadata.namespace.clone().unwrap_or_default(),
            event.reason.clone().unwrap_or_default(),
            event.message.clone().unwrap_or_default(),
        );
        let first_timestamp = event.first_timestamp.as_ref().map(|t| t.0);
        let last_timestamp = event.last_timestamp.as_ref().map(|t| t.0);

        match index.get(&key) {
            Some(&position) => {
                let entry = &mut summary[position];
                entry.count += 1;
                entry.first_timestamp = first_timestamp;
                entry.last_timestamp = last_timestamp;
            }
            None => {
                index.insert(key.clone(), summary.len());
                summary.push(UnusualEvent {
                    namespace: key.0,
                    reason: key.1,
                    message: key.2,
                    count: 1,
                    first_timestamp,
                    last_timestamp,
                });
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts
    summary.sort_by(|a, b| b.count.cmp(&a.count));
    summary.truncate(MAX_UNUSUAL_EVENTS);
    summary
}

pub async fn unusual_events(source: &dyn ClusterSource) -> SourceResult<Vec<UnusualEvent>> {
    Ok(summarize_unusual_events(&source.list_events().await?))
}

fn has_ready_replicas(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .map(|ready| ready > 0)
        .unwrap_or(false)
}

async fn metrics_server_ready(source: &dyn ClusterSource) -> bool {
    match source.list_deployments(Some(KUBE_SYSTEM)).await {
        Ok(deployments) => deployments
            .iter()
            .find(|d| {
                d.metadata
                    .name
                    .as_deref()
                    .map(|n| n.starts_with(METRICS_SERVER_PREFIX))
                    .unwrap_or(false)
            })
            .map(has_ready_replicas)
            .unwrap_or(false),
        Err(e) => {
            warn!(error = %e, "Error fetching metrics-server status");
            false
        }
    }
}

async fn named_deployment_ready(source: &dyn ClusterSource, namespace: &str, name: &str) -> bool {
    match source.read_deployment(namespace, name).await {
        Ok(deployment) => has_ready_replicas(&deployment),
        Err(e) => {
            warn!(namespace = %namespace, deployment = %name, error = %e, "Error fetching deployment status");
            false
        }
    }
}

/// Readiness of the well-known system deployments.
///
/// Each lookup is independent; a missing deployment or an API error only
/// clears its own flag.
pub async fn semaphore_status(source: &dyn ClusterSource) -> SemaphoreStatus {
    let (metrics_server, kube_dns, cast_ai_agent, cast_ai_workload_autoscaler, cast_ai_cluster_controller) = tokio::join!(
        metrics_server_ready(source),
        named_deployment_ready(source, KUBE_SYSTEM, "kube-dns"),
        named_deployment_ready(source, CAST_AI_NAMESPACE, "castai-agent"),
        named_deployment_ready(source, CAST_AI_NAMESPACE, "castai-workload-autoscaler"),
        named_deployment_ready(source, CAST_AI_NAMESPACE, "castai-cluster-controller"),
    );

    SemaphoreStatus {
        metrics_server,
        kube_dns,
        cast_ai_agent,
        cast_ai_workload_autoscaler,
        cast_ai_cluster_controller,
    }
}
