use super::*;
use crate::collaborators::{CollaboratorError, CollaboratorResult};
use crate::health::ComponentStatus;
use crate::source::fake::{
    crashlooping_pod, deployment, event, node, FakeSource, OP_EVENTS, OP_PODS,
};
use crate::source::{ContainerUsage, PodUsage, UsageValues};
use async_trait::async_trait;
use chrono::TimeZone;
use k8s_openapi::api::core::v1::{Node, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn sized_node(name: &str, cpu: &str, memory: &str) -> Node {
    let mut n = node(name, "True");
    let mut capacity = BTreeMap::new();
    capacity.insert("cpu".to_string(), Quantity(cpu.to_string()));
    capacity.insert("memory".to_string(), Quantity(memory.to_string()));
    let status = n.status.get_or_insert_with(NodeStatus::default);
    status.capacity = Some(capacity);
    n
}

fn cluster() -> FakeSource {
    FakeSource {
        nodes: vec![sized_node("node-a", "4", "8Gi"), node("node-b", "False")],
        deployments: vec![
            deployment("shop", "cart", Some(2), Some(0), &[("app", "cart")]),
            deployment("shop", "catalog", Some(3), Some(3), &[("app", "catalog")]),
            deployment("kube-system", "kube-dns", Some(2), Some(2), &[]),
        ],
        pods: vec![crashlooping_pod("shop", "cart-1", &[("app", "cart")])],
        events: vec![event("shop", "Warning", "BackOff", "restarting failed container")],
        usage: Some(vec![PodUsage {
            namespace: "shop".to_string(),
            name: "catalog-1".to_string(),
            containers: vec![ContainerUsage {
                name: "app".to_string(),
                usage: UsageValues {
                    cpu: Some("1".to_string()),
                    memory: Some("2Gi".to_string()),
                },
            }],
        }]),
        ..Default::default()
    }
}

struct StaticRecommender(&'static str);

#[async_trait]
impl Recommender for StaticRecommender {
    async fn recommend(&self, report_path: &Path, _model: &str) -> CollaboratorResult<String> {
        assert!(report_path.exists(), "report must be rendered before asking");
        Ok(self.0.to_string())
    }
}

struct FailingRecommender;

#[async_trait]
impl Recommender for FailingRecommender {
    async fn recommend(&self, _report_path: &Path, _model: &str) -> CollaboratorResult<String> {
        Err(CollaboratorError::EmptyResponse)
    }
}

async fn build_cycle(dir: &TempDir, source: FakeSource) -> MonitorCycleBuilder {
    let store = HistoryStore::open(dir.path().join("history.db")).await.unwrap();
    let config = CycleConfig {
        env_name: "staging".to_string(),
        docs_dir: dir.path().join("docs"),
        ..Default::default()
    };
    MonitorCycleBuilder::new()
        .source(Arc::new(source))
        .store(store)
        .health(HealthRegistry::with_default_components().await)
        .config(config)
}

#[tokio::test]
async fn test_collect_merges_all_detectors() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster()).await.build().unwrap();

    let state = cycle.collect(now()).await;

    assert!(state.failures.is_empty());
    assert_eq!(state.total_deployments, 3);
    assert_eq!(state.deployments_with_replicas, 2);
    assert_eq!(state.deployments_with_zero_replicas, 1);
    assert_eq!(state.deployments_with_exact_replicas, 2);
    assert_eq!(state.deployments_with_crashloopbackoff, 1);
    assert_eq!(state.node_issues.len(), 1);
    assert_eq!(state.unusual_events.len(), 1);
    assert!(state.semaphore.kube_dns);
    assert!(state.resources.metrics_available);

    let record = state.to_record(now());
    assert_eq!(record.cpu_used_percentage, 25.0);
    assert_eq!(record.memory_used_percentage, 25.0);
}

#[tokio::test]
async fn test_failing_detector_gets_default_slot() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource {
        usage: None,
        ..cluster()
    }
    .fail(OP_EVENTS)
    .fail(OP_PODS);
    let cycle = build_cycle(&dir, source).await.build().unwrap();

    let state = cycle.collect(now()).await;

    // deployment listings still succeed
    assert_eq!(state.total_deployments, 3);
    assert_eq!(state.deployments_with_replicas, 2);
    assert_eq!(state.node_issues.len(), 1);

    // pod- and event-backed slots fall back to defaults
    assert!(state.unusual_events.is_empty());
    assert_eq!(state.deployments_with_crashloopbackoff, 0);
    assert_eq!(state.deployments_with_recent_start, 0);
    assert_eq!(state.resources, ClusterResourceSnapshot::default());

    let failed: Vec<&str> = state.failures.iter().map(|f| f.detector).collect();
    assert!(failed.contains(&keys::UNUSUAL_EVENTS));
    assert!(failed.contains(&keys::CRASHLOOPBACKOFF));
    assert!(failed.contains(&keys::RECENT_START));
    assert!(failed.contains(&keys::RESOURCE_METRICS));
    assert!(!failed.contains(&keys::TOTAL_DEPLOYMENTS));
}

#[tokio::test]
async fn test_run_once_stores_renders_and_indexes() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster())
        .await
        .recommender(Arc::new(StaticRecommender("<p>Fix the cart deployment</p>")))
        .build()
        .unwrap();

    let outcome = cycle.run_once(now()).await.unwrap();

    assert_eq!(outcome.report_path, dir.path().join("docs/staging_statistics.html"));
    assert_eq!(outcome.report.history.len(), 1);
    assert_eq!(outcome.report.recommendation, "<p>Fix the cart deployment</p>");
    assert_eq!(cycle.store().count().await.unwrap(), 1);

    let html = tokio::fs::read_to_string(&outcome.report_path).await.unwrap();
    assert!(html.contains("<p>Fix the cart deployment</p>"));
    let index = tokio::fs::read_to_string(dir.path().join("docs/index.html"))
        .await
        .unwrap();
    assert!(index.contains("staging_statistics.html"));

    assert_eq!(
        cycle.health().status_of(components::HISTORY_STORE).await,
        Some(ComponentStatus::Healthy)
    );
}

#[tokio::test]
async fn test_failed_recommendation_yields_empty_string() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster())
        .await
        .recommender(Arc::new(FailingRecommender))
        .build()
        .unwrap();

    let outcome = cycle.run_once(now()).await.unwrap();

    assert_eq!(outcome.report.recommendation, "");
    assert_eq!(
        cycle.health().status_of(components::RECOMMENDER).await,
        Some(ComponentStatus::Degraded)
    );
}

#[tokio::test]
async fn test_audit_event_failure_degrades_its_own_component() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/audit")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    let audit =
        AuditEventsClient::new(server.url(), Some("key".to_string()), Some("c-1".to_string()))
            .unwrap();
    let cycle = build_cycle(&dir, cluster())
        .await
        .recommender(Arc::new(StaticRecommender("<p>ok</p>")))
        .audit_events(Arc::new(audit))
        .build()
        .unwrap();

    let outcome = cycle.run_once(now()).await.unwrap();

    assert!(outcome.report.audit_events.is_empty());
    assert_eq!(outcome.report.recommendation, "<p>ok</p>");
    assert_eq!(
        cycle.health().status_of(components::AUDIT_EVENTS).await,
        Some(ComponentStatus::Degraded)
    );
    assert_eq!(
        cycle.health().status_of(components::RECOMMENDER).await,
        Some(ComponentStatus::Healthy)
    );
}

#[tokio::test]
async fn test_unbounded_history_window_reads_everything() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster())
        .await
        .config(CycleConfig {
            env_name: "staging".to_string(),
            docs_dir: dir.path().join("docs"),
            history_window: std::time::Duration::MAX,
            zombie_min_age: std::time::Duration::MAX,
            ..Default::default()
        })
        .build()
        .unwrap();

    cycle.run_once(now() - chrono::Duration::days(3650)).await.unwrap();
    let outcome = cycle.run_once(now()).await.unwrap();

    assert_eq!(outcome.report.history.len(), 2);
}

#[tokio::test]
async fn test_missing_metrics_api_degrades_health() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource {
        usage: None,
        ..cluster()
    };
    let cycle = build_cycle(&dir, source).await.build().unwrap();

    let outcome = cycle.run_once(now()).await.unwrap();

    assert!(!outcome.report.resources.metrics_available);
    assert_eq!(outcome.report.record.cpu_used_percentage, 0.0);
    assert_eq!(outcome.report.record.cpu_requested_percentage, 0.0);
    assert_eq!(
        cycle.health().status_of(components::METRICS_API).await,
        Some(ComponentStatus::Degraded)
    );
}

#[tokio::test]
async fn test_same_second_cycle_is_a_store_error() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster()).await.build().unwrap();

    cycle.run_once(now()).await.unwrap();
    let err = cycle
        .run_once(now() + chrono::Duration::milliseconds(400))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CycleError::Store(StoreError::DuplicateTimestamp { .. })
    ));
    assert_eq!(
        cycle.health().status_of(components::HISTORY_STORE).await,
        Some(ComponentStatus::Unhealthy)
    );
}

#[tokio::test]
async fn test_history_window_in_report() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster()).await.build().unwrap();

    cycle.run_once(now() - chrono::Duration::hours(30)).await.unwrap();
    cycle.run_once(now() - chrono::Duration::hours(1)).await.unwrap();
    let outcome = cycle.run_once(now()).await.unwrap();

    assert_eq!(outcome.report.history.len(), 2);
    assert_eq!(outcome.report.history[0].timestamp, now());
    assert_eq!(cycle.store().count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_builder_requires_source_and_store() {
    assert!(MonitorCycleBuilder::new().build().is_err());
}

#[tokio::test]
async fn test_loop_stops_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster()).await.build().unwrap();
    let health = cycle.health().clone();
    let store = cycle.store().clone();

    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();

    MonitorLoop::new(cycle, Duration::from_secs(3600))
        .run(rx)
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert!(health.readiness().await.ready);
}

#[tokio::test]
async fn test_loop_halts_on_store_failure() {
    let dir = TempDir::new().unwrap();
    let cycle = build_cycle(&dir, cluster()).await.build().unwrap();
    cycle.store().close().await;

    let (_tx, rx) = broadcast::channel(1);
    let result = MonitorLoop::new(cycle, Duration::from_secs(3600)).run(rx).await;

    assert!(result.is_err());
}
