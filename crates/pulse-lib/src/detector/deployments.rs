//! Deployment replica-health detectors

use crate::source::{ClusterSource, SourceResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Restarts finished within this many minutes count as recent
pub const RECENT_RESTART_WINDOW_MINUTES: i64 = 10;

/// Pod labels that name the owning application, in lookup order
pub const APP_LABEL_KEYS: [&str; 2] = ["app", "app.kubernetes.io/name"];

const CRASH_LOOP_REASON: &str = "CrashLoopBackOff";

fn desired_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(0)
}

fn ready_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

/// Deployments declaring at least one replica
pub fn count_deployments(deployments: &[Deployment]) -> i64 {
    deployments.iter().filter(|d| desired_replicas(d) > 0).count() as i64
}

/// Declared replicas > 0 and at least one ready
pub fn count_with_replicas(deployments: &[Deployment]) -> i64 {
    deployments
        .iter()
        .filter(|d| desired_replicas(d) > 0 && ready_replicas(d) > 0)
        .count() as i64
}

/// Declared replicas > 0 and none ready
pub fn count_with_zero_replicas(deployments: &[Deployment]) -> i64 {
    deployments
        .iter()
        .filter(|d| desired_replicas(d) > 0 && ready_replicas(d) == 0)
        .count() as i64
}

/// Ready replicas equal declared replicas, both positive
pub fn count_with_exact_replicas(deployments: &[Deployment]) -> i64 {
    deployments
        .iter()
        .filter(|d| {
            let desired = desired_replicas(d);
            desired > 0 && ready_replicas(d) == desired
        })
        .count() as i64
}

pub async fn deployments_count(source: &dyn ClusterSource) -> SourceResult<i64> {
    Ok(count_deployments(&source.list_deployments(None).await?))
}

pub async fn deployments_with_replicas(source: &dyn ClusterSource) -> SourceResult<i64> {
    Ok(count_with_replicas(&source.list_deployments(None).await?))
}

pub async fn deployments_with_zero_replicas(source: &dyn ClusterSource) -> SourceResult<i64> {
    Ok(count_with_zero_replicas(&source.list_deployments(None).await?))
}

pub async fn deployments_with_exact_replicas(source: &dyn ClusterSource) -> SourceResult<i64> {
    Ok(count_with_exact_replicas(&source.list_deployments(None).await?))
}

/// A crash-looping application as identified by its pod labels
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CrashLoopApp {
    pub namespace: String,
    pub app_label: String,
}

/// First pass: `(namespace, app label)` of every pod with a container
/// waiting in `CrashLoopBackOff`. Pods without an app label are ignored.
pub fn crashlooping_apps(pods: &[Pod]) -> BTreeSet<CrashLoopApp> {
    let mut apps = BTreeSet::new();

    for pod in pods {
        let crash_looping = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| {
                statuses.iter().any(|cs| {
                    cs.state
                        .as_ref()
                        .and_then(|state| state.waiting.as_ref())
                        .and_then(|w| w.reason.as_deref())
                        == Some(CRASH_LOOP_REASON)
                })
            })
            .unwrap_or(false);
        if !crash_looping {
            continue;
        }

        let Some(labels) = pod.metadata.labels.as_ref() else {
            continue;
        };
        let app_label = APP_LABEL_KEYS.iter().find_map(|key| labels.get(*key));
        if let Some(app_label) = app_label {
            apps.insert(CrashLoopApp {
                namespace: pod.metadata.namespace.clone().unwrap_or_default(),
                app_label: app_label.clone(),
            });
        }
    }

    apps
}

/// Strategy joining crash-looping apps back to deployments
#[async_trait]
pub trait CrashLoopJoin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn count_deployments(
        &self,
        source: &dyn ClusterSource,
        apps: &BTreeSet<CrashLoopApp>,
    ) -> SourceResult<i64>;
}

/// Matches deployments whose own `app` or `app.kubernetes.io/name` label
/// equals a crash-looping pod's app label.
///
/// This is a label heuristic, not an owner-reference walk: two deployments
/// sharing a label value in one namespace are both counted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelJoin;

impl LabelJoin {
    pub fn matches(deployment: &Deployment, app_label: &str) -> bool {
        deployment
            .metadata
            .labels
            .as_ref()
            .map(|labels| {
                APP_LABEL_KEYS
                    .iter()
                    .any(|key| labels.get(*key).map(String::as_str) == Some(app_label))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl CrashLoopJoin for LabelJoin {
    fn name(&self) -> &'static str {
        "label"
    }

    async fn count_deployments(
        &self,
        source: &dyn ClusterSource,
        apps: &BTreeSet<CrashLoopApp>,
    ) -> SourceResult<i64> {
        let mut by_namespace: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for app in apps {
            by_namespace
                .entry(app.namespace.as_str())
                .or_default()
                .push(app.app_label.as_str());
        }

        let mut count = 0i64;
        for (namespace, labels) in by_namespace {
            let deployments = source.list_deployments(Some(namespace)).await?;
            for label in labels {
                count += deployments
                    .iter()
                    .filter(|d| Self::matches(d, label))
                    .count() as i64;
            }
        }

        Ok(count)
    }
}

pub async fn deployments_with_crashloopbackoff(
    source: &dyn ClusterSource,
    join: &dyn CrashLoopJoin,
) -> SourceResult<i64> {
    let pods = source.list_pods(None).await?;
    let apps = crashlooping_apps(&pods);
    debug!(apps = apps.len(), strategy = join.name(), "Crash-looping apps found");

    if apps.is_empty() {
        return Ok(0);
    }
    join.count_deployments(source, &apps).await
}

/// Deployment name behind a ReplicaSet name (`web-7d9f8` -> `web`)
pub fn deployment_name_from_replicaset(replicaset: &str) -> &str {
    replicaset
        .rsplit_once('-')
        .map(|(name, _)| name)
        .unwrap_or(replicaset)
}

/// Distinct deployments owning a pod whose container terminated after a
/// restart within `window` of `now`.
pub fn recently_restarted_deployments(
    pods: &[Pod],
    now: DateTime<Utc>,
    window: Duration,
) -> BTreeSet<String> {
    let cutoff = now - window;
    let mut names = BTreeSet::new();

    for pod in pods {
        let Some(statuses) = pod.status.as_ref().and_then(|s| s.container_statuses.as_ref())
        else {
            continue;
        };

        let restarted = statuses.iter().any(|cs| {
            cs.restart_count > 0
                && cs
                    .state
                    .as_ref()
                    .and_then(|state| state.terminated.as_ref())
                    .and_then(|t| t.finished_at.as_ref())
                    .map(|finished| finished.0 >= cutoff)
                    .unwrap_or(false)
        });
        if !restarted {
            continue;
        }

        for owner in pod.metadata.owner_references.iter().flatten() {
            if owner.kind == "ReplicaSet" {
                names.insert(deployment_name_from_replicaset(&owner.name).to_string());
            }
        }
    }

    names
}

pub async fn deployments_with_recent_restarts(
    source: &dyn ClusterSource,
    now: DateTime<Utc>,
) -> SourceResult<i64> {
    let pods = source.list_pods(None).await?;
    let names = recently_restarted_deployments(
        &pods,
        now,
        Duration::minutes(RECENT_RESTART_WINDOW_MINUTES),
    );
    Ok(names.len() as i64)
}
