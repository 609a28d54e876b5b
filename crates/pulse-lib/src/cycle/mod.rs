//! Monitoring cycle orchestration
//!
//! A cycle fans out every detector and the resource aggregator at once,
//! merges their results by slot into one [`ReportHistoryRecord`], stores it,
//! reads the history window back and renders the report. Detector failures
//! never abort a cycle; store failures always do.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::MonitorLoop;

use crate::collaborators::{AuditEventsClient, GitPublisher, Recommender, DEFAULT_AUDIT_EVENT_LIMIT};
use crate::detector::{self, CrashLoopJoin, LabelJoin, DEFAULT_MIN_POD_AGE_SECS};
use crate::health::{components, HealthRegistry};
use crate::history::{self, HistoryStore, StoreError};
use crate::models::{
    ClusterResourceSnapshot, CycleReport, NodeIssue, ReportHistoryRecord, SemaphoreStatus,
    UnusualEvent, ZombieProcess,
};
use crate::observability::{PulseMetrics, StructuredLogger};
use crate::report::{self, HtmlReportRenderer, RenderError, ReportRenderer};
use crate::resources::compute_cluster_resource_metrics;
use crate::source::ClusterSource;
use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Slot keys, used in logs and the detector failure metric
pub mod keys {
    pub const TOTAL_DEPLOYMENTS: &str = "total_deployments";
    pub const WITH_REPLICAS: &str = "deployments_with_replicas";
    pub const ZERO_REPLICAS: &str = "deployments_with_zero_replicas";
    pub const EXACT_REPLICAS: &str = "deployments_with_exact_replicas";
    pub const CRASHLOOPBACKOFF: &str = "deployments_with_crashloopbackoff";
    pub const RECENT_START: &str = "deployments_with_recent_start";
    pub const NODES_WITH_ISSUES: &str = "nodes_with_issues";
    pub const UNUSUAL_EVENTS: &str = "unusual_events";
    pub const RESOURCE_METRICS: &str = "resource_metrics";
    pub const ZOMBIE_PROCESSES: &str = "zombie_processes";
    pub const AUDIT_EVENTS: &str = "audit_events";
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("history store: {0}")]
    Store(#[from] StoreError),

    #[error("report rendering: {0}")]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub env_name: String,
    pub docs_dir: PathBuf,
    /// How far back the report's history table reaches
    pub history_window: Duration,
    pub gpt_model: String,
    pub zombies: bool,
    /// Pods younger than this are skipped by the zombie scan
    pub zombie_min_age: Duration,
    pub audit_event_limit: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            env_name: "staging".to_string(),
            docs_dir: PathBuf::from("docs"),
            history_window: Duration::from_secs(24 * 3600),
            gpt_model: "gpt-4o".to_string(),
            zombies: false,
            zombie_min_age: Duration::from_secs(DEFAULT_MIN_POD_AGE_SECS as u64),
            audit_event_limit: DEFAULT_AUDIT_EVENT_LIMIT,
        }
    }
}

/// A task that failed and had its slot filled with the default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorFailure {
    pub detector: &'static str,
    pub component: &'static str,
    pub message: String,
}

/// Merged results of one fan-out
#[derive(Debug, Clone, Default)]
pub struct CollectedState {
    pub total_deployments: i64,
    pub deployments_with_replicas: i64,
    pub deployments_with_zero_replicas: i64,
    pub deployments_with_exact_replicas: i64,
    pub deployments_with_crashloopbackoff: i64,
    pub deployments_with_recent_start: i64,
    pub node_issues: Vec<NodeIssue>,
    pub unusual_events: Vec<UnusualEvent>,
    pub semaphore: SemaphoreStatus,
    pub resources: ClusterResourceSnapshot,
    pub zombie_processes: Vec<ZombieProcess>,
    pub audit_events: Vec<serde_json::Value>,
    pub failures: Vec<DetectorFailure>,
}

impl CollectedState {
    /// Persistable record stamped at `timestamp` (second precision)
    pub fn to_record(&self, timestamp: DateTime<Utc>) -> ReportHistoryRecord {
        ReportHistoryRecord {
            timestamp: timestamp.trunc_subsecs(0),
            total_deployments: self.total_deployments,
            deployments_with_replicas: self.deployments_with_replicas,
            deployments_with_zero_replicas: self.deployments_with_zero_replicas,
            deployments_with_exact_replicas: self.deployments_with_exact_replicas,
            deployments_with_crashloopbackoff: self.deployments_with_crashloopbackoff,
            deployments_with_recent_start: self.deployments_with_recent_start,
            cpu_used_percentage: self.resources.cpu_used_percentage(),
            cpu_requested_percentage: self.resources.cpu_requested_percentage(),
            memory_used_percentage: self.resources.memory_used_percentage(),
            memory_requested_percentage: self.resources.memory_requested_percentage(),
            node_issues: self.node_issues.clone(),
            zombie_processes: self.zombie_processes.clone(),
        }
    }
}

/// What a successful cycle produced
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub report: CycleReport,
    pub report_path: PathBuf,
    pub failures: Vec<DetectorFailure>,
}

fn settle<T: Default, E: Display>(
    failures: &mut Vec<DetectorFailure>,
    detector: &'static str,
    component: &'static str,
    result: Result<T, E>,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            failures.push(DetectorFailure {
                detector,
                component,
                message: e.to_string(),
            });
            T::default()
        }
    }
}

pub struct MonitorCycle {
    source: Arc<dyn ClusterSource>,
    store: HistoryStore,
    renderer: Arc<dyn ReportRenderer>,
    crash_loop_join: Arc<dyn CrashLoopJoin>,
    recommender: Option<Arc<dyn Recommender>>,
    audit_events: Option<Arc<AuditEventsClient>>,
    publisher: Option<GitPublisher>,
    health: HealthRegistry,
    metrics: Option<PulseMetrics>,
    logger: StructuredLogger,
    config: CycleConfig,
    cycles: AtomicU64,
}

impl MonitorCycle {
    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Run every detector concurrently and merge the results by slot
    pub async fn collect(&self, now: DateTime<Utc>) -> CollectedState {
        let source = self.source.as_ref();
        let join = self.crash_loop_join.as_ref();
        let min_age = i64::try_from(self.config.zombie_min_age.as_secs())
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        let zombies = async {
            if self.config.zombies {
                Some(detector::detect_zombie_processes(source, now, min_age).await)
            } else {
                None
            }
        };
        let audit = async {
            match &self.audit_events {
                Some(client) => Some(client.fetch_audit_events(self.config.audit_event_limit).await),
                None => None,
            }
        };

        let (
            total,
            with_replicas,
            zero_replicas,
            exact_replicas,
            crashloop,
            recent_start,
            nodes,
            events,
            semaphore,
            resources,
            zombies,
            audit,
        ) = tokio::join!(
            detector::deployments_count(source),
            detector::deployments_with_replicas(source),
            detector::deployments_with_zero_replicas(source),
            detector::deployments_with_exact_replicas(source),
            detector::deployments_with_crashloopbackoff(source, join),
            detector::deployments_with_recent_restarts(source, now),
            detector::detect_nodes_with_issues(source),
            detector::unusual_events(source),
            detector::semaphore_status(source),
            compute_cluster_resource_metrics(source),
            zombies,
            audit,
        );

        let mut failures = Vec::new();
        let f = &mut failures;
        let kube = components::KUBE_API;

        let mut state = CollectedState {
            total_deployments: settle(f, keys::TOTAL_DEPLOYMENTS, kube, total),
            deployments_with_replicas: settle(f, keys::WITH_REPLICAS, kube, with_replicas),
            deployments_with_zero_replicas: settle(f, keys::ZERO_REPLICAS, kube, zero_replicas),
            deployments_with_exact_replicas: settle(f, keys::EXACT_REPLICAS, kube, exact_replicas),
            deployments_with_crashloopbackoff: settle(f, keys::CRASHLOOPBACKOFF, kube, crashloop),
            deployments_with_recent_start: settle(f, keys::RECENT_START, kube, recent_start),
            node_issues: settle(f, keys::NODES_WITH_ISSUES, kube, nodes),
            unusual_events: settle(f, keys::UNUSUAL_EVENTS, kube, events),
            semaphore,
            resources: settle(f, keys::RESOURCE_METRICS, kube, resources),
            zombie_processes: zombies
                .map(|r| settle(f, keys::ZOMBIE_PROCESSES, kube, r))
                .unwrap_or_default(),
            audit_events: audit
                .map(|r| settle(f, keys::AUDIT_EVENTS, components::AUDIT_EVENTS, r))
                .unwrap_or_default(),
            failures: Vec::new(),
        };
        state.failures = failures;

        for failure in &state.failures {
            self.logger.log_detector_failed(failure.detector, &failure.message);
            if let Some(metrics) = &self.metrics {
                metrics.inc_detector_failure(failure.detector);
            }
        }

        state
    }

    async fn update_health(&self, state: &CollectedState) {
        let kube_failures: Vec<&str> = state
            .failures
            .iter()
            .filter(|f| f.component == components::KUBE_API)
            .map(|f| f.detector)
            .collect();
        if kube_failures.is_empty() {
            self.health.set_healthy(components::KUBE_API).await;
        } else {
            self.health
                .set_degraded(
                    components::KUBE_API,
                    format!("failed: {}", kube_failures.join(", ")),
                )
                .await;
        }

        if state.resources.metrics_available {
            self.health.set_healthy(components::METRICS_API).await;
        } else {
            self.health
                .set_degraded(components::METRICS_API, "pod usage unavailable")
                .await;
        }

        match state
            .failures
            .iter()
            .find(|f| f.component == components::AUDIT_EVENTS)
        {
            Some(failure) => {
                self.health
                    .set_degraded(components::AUDIT_EVENTS, failure.message.clone())
                    .await
            }
            None => self.health.set_healthy(components::AUDIT_EVENTS).await,
        }
    }

    async fn write_report(&self, report: &CycleReport, path: &std::path::Path) -> Result<(), CycleError> {
        let html = self.renderer.render(report)?;
        tokio::fs::write(path, html).await.map_err(RenderError::from)?;
        Ok(())
    }

    /// One full cycle stamped at `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        self.logger.log_cycle_started(cycle);

        let state = self.collect(now).await;
        self.update_health(&state).await;
        let record = state.to_record(now);

        if let Err(e) = self.store.append(&record).await {
            self.health
                .set_unhealthy(components::HISTORY_STORE, e.to_string())
                .await;
            if let Some(metrics) = &self.metrics {
                metrics.inc_cycle_failures();
            }
            return Err(e.into());
        }
        let history = self
            .store
            .load_since(history::window_cutoff(now, self.config.history_window))
            .await?;
        self.health.set_healthy(components::HISTORY_STORE).await;

        let mut report = CycleReport {
            env_name: self.config.env_name.clone(),
            record: record.clone(),
            resources: state.resources,
            unusual_events: state.unusual_events.clone(),
            semaphore: state.semaphore,
            audit_events: state.audit_events.clone(),
            history,
            recommendation: String::new(),
            zombies_enabled: self.config.zombies,
        };

        tokio::fs::create_dir_all(&self.config.docs_dir)
            .await
            .map_err(RenderError::from)?;
        let report_path = report::report_path(&self.config.docs_dir, &self.config.env_name);
        self.write_report(&report, &report_path).await?;
        info!(path = %report_path.display(), "Report saved");

        if let Some(recommender) = &self.recommender {
            match recommender.recommend(&report_path, &self.config.gpt_model).await {
                Ok(recommendation) => {
                    report.recommendation = recommendation;
                    self.write_report(&report, &report_path).await?;
                    self.health.set_healthy(components::RECOMMENDER).await;
                }
                Err(e) => {
                    warn!(error = %e, "Recommendation unavailable, continuing without it");
                    self.health
                        .set_degraded(components::RECOMMENDER, e.to_string())
                        .await;
                }
            }
        }

        report::write_index(self.renderer.as_ref(), &self.config.docs_dir).await?;

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(&report_path, &self.config.env_name).await {
                warn!(error = %e, "Failed to publish report");
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(&record);
            metrics.set_history_records(report.history.len());
            metrics.observe_cycle_duration(elapsed);
        }
        self.logger
            .log_cycle_completed(cycle, &record, state.failures.len(), elapsed);

        Ok(CycleOutcome {
            report,
            report_path,
            failures: state.failures,
        })
    }
}

/// Builder for [`MonitorCycle`]
pub struct MonitorCycleBuilder {
    source: Option<Arc<dyn ClusterSource>>,
    store: Option<HistoryStore>,
    renderer: Option<Arc<dyn ReportRenderer>>,
    crash_loop_join: Arc<dyn CrashLoopJoin>,
    recommender: Option<Arc<dyn Recommender>>,
    audit_events: Option<Arc<AuditEventsClient>>,
    publisher: Option<GitPublisher>,
    health: Option<HealthRegistry>,
    metrics: Option<PulseMetrics>,
    config: CycleConfig,
}

impl MonitorCycleBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            renderer: None,
            crash_loop_join: Arc::new(LabelJoin),
            recommender: None,
            audit_events: None,
            publisher: None,
            health: None,
            metrics: None,
            config: CycleConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn ClusterSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn crash_loop_join(mut self, join: Arc<dyn CrashLoopJoin>) -> Self {
        self.crash_loop_join = join;
        self
    }

    pub fn recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = Some(recommender);
        self
    }

    pub fn audit_events(mut self, client: Arc<AuditEventsClient>) -> Self {
        self.audit_events = Some(client);
        self
    }

    pub fn publisher(mut self, publisher: GitPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: PulseMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<MonitorCycle> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Cluster source is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("History store is required"))?;
        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(HtmlReportRenderer::new()?),
        };

        Ok(MonitorCycle {
            source,
            store,
            renderer,
            crash_loop_join: self.crash_loop_join,
            recommender: self.recommender,
            audit_events: self.audit_events,
            publisher: self.publisher,
            health: self.health.unwrap_or_default(),
            metrics: self.metrics,
            logger: StructuredLogger::new(self.config.env_name.clone()),
            config: self.config,
            cycles: AtomicU64::new(0),
        })
    }
}

impl Default for MonitorCycleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
