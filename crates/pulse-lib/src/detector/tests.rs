//! Detector tests against an in-memory cluster

use super::*;
use crate::source::fake::{
    crashlooping_pod, deployment, event, node, pod_in_phase, restarted_pod, FakeSource, OP_DEPLOYMENTS,
    OP_READ_DEPLOYMENT,
};
use chrono::{Duration, TimeZone, Utc};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_replica_counters() {
    let source = FakeSource {
        deployments: vec![
            deployment("default", "healthy", Some(3), Some(3), &[]),
            deployment("default", "partial", Some(3), Some(1), &[]),
            deployment("default", "down", Some(2), None, &[]),
            deployment("default", "zeroed", Some(2), Some(0), &[]),
            deployment("default", "scaled-to-zero", Some(0), None, &[]),
            deployment("default", "no-spec-replicas", None, Some(1), &[]),
        ],
        ..Default::default()
    };

    assert_eq!(deployments_count(&source).await.unwrap(), 4);
    assert_eq!(deployments_with_replicas(&source).await.unwrap(), 2);
    assert_eq!(deployments_with_zero_replicas(&source).await.unwrap(), 2);
    assert_eq!(deployments_with_exact_replicas(&source).await.unwrap(), 1);
}

#[tokio::test]
async fn test_replica_counter_propagates_listing_error() {
    let source = FakeSource::new().fail(OP_DEPLOYMENTS);
    assert!(deployments_with_replicas(&source).await.is_err());
}

#[tokio::test]
async fn test_recent_restarts_count_distinct_deployments() {
    let source = FakeSource {
        pods: vec![
            restarted_pod("default", "web-abc12-x1", "web-abc12", 2, now() - Duration::minutes(3)),
            restarted_pod("default", "web-abc12-x2", "web-abc12", 1, now() - Duration::minutes(1)),
            restarted_pod("default", "api-f00d-y1", "api-f00d", 4, now() - Duration::minutes(9)),
            // finished too long ago
            restarted_pod("default", "old-1234-z1", "old-1234", 3, now() - Duration::minutes(30)),
            // terminated recently but never restarted
            restarted_pod("default", "job-99-q1", "job-99", 0, now() - Duration::minutes(2)),
        ],
        ..Default::default()
    };

    assert_eq!(deployments_with_recent_restarts(&source, now()).await.unwrap(), 2);
}

#[test]
fn test_deployment_name_from_replicaset() {
    assert_eq!(deployment_name_from_replicaset("web-7d9f8c6b5"), "web");
    assert_eq!(deployment_name_from_replicaset("my-app-7d9f8c6b5"), "my-app");
    assert_eq!(deployment_name_from_replicaset("standalone"), "standalone");
}

#[tokio::test]
async fn test_crashloop_label_join() {
    let source = FakeSource {
        pods: vec![
            crashlooping_pod("shop", "cart-1", &[("app", "cart")]),
            crashlooping_pod("shop", "cart-2", &[("app", "cart")]),
            crashlooping_pod("billing", "invoice-1", &[("app.kubernetes.io/name", "invoice")]),
            crashlooping_pod("shop", "unlabeled-1", &[]),
        ],
        deployments: vec![
            deployment("shop", "cart", Some(2), Some(0), &[("app", "cart")]),
            deployment("shop", "catalog", Some(1), Some(1), &[("app", "catalog")]),
            deployment("billing", "invoice", Some(1), Some(0), &[("app.kubernetes.io/name", "invoice")]),
            // same label in another namespace is not a match
            deployment("staging", "cart", Some(1), Some(0), &[("app", "cart")]),
        ],
        ..Default::default()
    };

    let count = deployments_with_crashloopbackoff(&source, &LabelJoin).await.unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_crashloop_label_join_counts_shared_labels_twice() {
    let source = FakeSource {
        pods: vec![crashlooping_pod("shop", "cart-1", &[("app", "cart")])],
        deployments: vec![
            deployment("shop", "cart", Some(1), Some(0), &[("app", "cart")]),
            deployment("shop", "cart-canary", Some(1), Some(1), &[("app", "cart")]),
        ],
        ..Default::default()
    };

    let count = deployments_with_crashloopbackoff(&source, &LabelJoin).await.unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_crashloop_without_crashing_pods_skips_deployment_lookup() {
    let source = FakeSource::new().fail(OP_DEPLOYMENTS);
    assert_eq!(deployments_with_crashloopbackoff(&source, &LabelJoin).await.unwrap(), 0);
}

#[tokio::test]
async fn test_nodes_with_issues() {
    let source = FakeSource {
        nodes: vec![
            node("node-a", "True"),
            node("node-b", "False"),
            node("node-c", "Unknown"),
        ],
        ..Default::default()
    };

    let issues = detect_nodes_with_issues(&source).await.unwrap();
    let names: Vec<_> = issues.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["node-b", "node-c"]);
    assert_eq!(issues[0].status, "False");
    assert!(issues[0].description.contains("node-b"));
    assert!(issues[1].description.contains("Unknown"));
}

#[tokio::test]
async fn test_unusual_events_grouped_and_sorted() {
    let mut events = vec![
        event("default", "Normal", "Scheduled", "assigned"),
        event("default", "Warning", "BackOff", "restarting failed container"),
        event("shop", "Warning", "FailedMount", "secret missing"),
        event("default", "Warning", "BackOff", "restarting failed container"),
        event("default", "Warning", "BackOff", "restarting failed container"),
        event("shop", "Warning", "FailedMount", "secret missing"),
    ];
    events.push(event("kube-system", "Warning", "Unhealthy", "probe failed"));

    let source = FakeSource {
        events,
        ..Default::default()
    };

    let summary = unusual_events(&source).await.unwrap();
    assert_eq!(summary.len(), 3);
    assert_eq!(summary[0].reason, "BackOff");
    assert_eq!(summary[0].count, 3);
    assert_eq!(summary[1].reason, "FailedMount");
    assert_eq!(summary[1].count, 2);
    assert_eq!(summary[2].namespace, "kube-system");
    assert!(summary.iter().all(|e| e.reason != "Scheduled"));
}

#[test]
fn test_unusual_events_truncated() {
    let events: Vec<_> = (0..MAX_UNUSUAL_EVENTS + 20)
        .map(|i| event("default", "Warning", "Failed", &format!("message {i}")))
        .collect();

    let summary = summarize_unusual_events(&events);
    assert_eq!(summary.len(), MAX_UNUSUAL_EVENTS);
}

#[tokio::test]
async fn test_semaphore_status_with_missing_deployments() {
    let source = FakeSource {
        deployments: vec![
            deployment("kube-system", "metrics-server-v0.6", Some(1), Some(1), &[]),
            deployment("kube-system", "kube-dns", Some(2), Some(0), &[]),
            deployment("castai-agent", "castai-agent", Some(1), Some(1), &[]),
        ],
        ..Default::default()
    };

    let status = semaphore_status(&source).await;
    assert!(status.metrics_server);
    assert!(!status.kube_dns);
    assert!(status.cast_ai_agent);
    assert!(!status.cast_ai_workload_autoscaler);
    assert!(!status.cast_ai_cluster_controller);
}

#[tokio::test]
async fn test_semaphore_status_tolerates_api_errors() {
    let source = FakeSource {
        deployments: vec![deployment("kube-system", "metrics-server", Some(1), Some(1), &[])],
        ..Default::default()
    }
    .fail(OP_READ_DEPLOYMENT);

    let status = semaphore_status(&source).await;
    assert!(status.metrics_server);
    assert!(!status.kube_dns);
    assert!(!status.cast_ai_agent);
}

#[tokio::test]
async fn test_zombie_detection_skips_young_pods_and_failed_exec() {
    let scan = "/proc/1\nState:\tS (sleeping)\nName:\tpause\n/proc/31\nState:\tZ (zombie)\nName:\tcron\n";
    let mut source = FakeSource {
        pods: vec![
            pod_in_phase("jobs", "stuck", "Pending", Some(now() - Duration::hours(1)), &["main", "sidecar"]),
            pod_in_phase("jobs", "young", "Pending", Some(now() - Duration::seconds(60)), &["main"]),
            pod_in_phase("jobs", "unscheduled", "Pending", None, &["main"]),
            pod_in_phase("jobs", "running", "Running", Some(now() - Duration::hours(5)), &["main"]),
        ],
        ..Default::default()
    };
    source
        .exec_output
        .insert(("stuck".to_string(), "main".to_string()), scan.to_string());
    source
        .exec_output
        .insert(("young".to_string(), "main".to_string()), scan.to_string());
    source
        .exec_output
        .insert(("running".to_string(), "main".to_string()), scan.to_string());

    let zombies = detect_zombie_processes(&source, now(), Duration::seconds(DEFAULT_MIN_POD_AGE_SECS))
        .await
        .unwrap();

    assert_eq!(zombies.len(), 1);
    assert_eq!(zombies[0].namespace, "jobs");
    assert_eq!(zombies[0].pod, "stuck");
    assert_eq!(zombies[0].container, "main");
    assert_eq!(zombies[0].pid, 31);
    assert_eq!(zombies[0].process_name, "cron");
}
