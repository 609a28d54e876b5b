//! Prometheus metrics and structured event logging for monitoring cycles

use crate::models::ReportHistoryRecord;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Cycle durations in seconds; a cycle is dominated by API listings and
/// the optional recommendation call
const CYCLE_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

static GLOBAL_METRICS: OnceLock<Result<PulseMetricsInner, String>> = OnceLock::new();

struct PulseMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    cycle_failures_total: IntCounter,
    detector_failures_total: IntCounterVec,
    deployments: IntGaugeVec,
    resource_percentage: GaugeVec,
    node_issues: IntGauge,
    zombie_processes: IntGauge,
    history_records: IntGauge,
}

impl PulseMetricsInner {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            cycle_duration_seconds: register_histogram!(
                "k8spulse_cycle_duration_seconds",
                "Wall time of one monitoring cycle",
                CYCLE_BUCKETS.to_vec()
            )?,
            cycles_total: register_int_counter!(
                "k8spulse_cycles_total",
                "Monitoring cycles completed"
            )?,
            cycle_failures_total: register_int_counter!(
                "k8spulse_cycle_failures_total",
                "Monitoring cycles aborted with an error"
            )?,
            detector_failures_total: register_int_counter_vec!(
                "k8spulse_detector_failures_total",
                "Detector runs that failed and fell back to their default",
                &["detector"]
            )?,
            deployments: register_int_gauge_vec!(
                "k8spulse_deployments",
                "Deployment counts from the latest cycle",
                &["state"]
            )?,
            resource_percentage: register_gauge_vec!(
                "k8spulse_resource_percentage",
                "Cluster resource usage and requests as a percentage of capacity",
                &["resource", "kind"]
            )?,
            node_issues: register_int_gauge!(
                "k8spulse_node_issues",
                "Nodes whose Ready condition is not True"
            )?,
            zombie_processes: register_int_gauge!(
                "k8spulse_zombie_processes",
                "Zombie processes found in the latest cycle"
            )?,
            history_records: register_int_gauge!(
                "k8spulse_history_records",
                "Records in the current history window"
            )?,
        })
    }
}

/// Handle to the process-wide metrics, registered on first use
#[derive(Clone, Copy)]
pub struct PulseMetrics {
    inner: &'static PulseMetricsInner,
}

impl PulseMetrics {
    pub fn new() -> prometheus::Result<Self> {
        match GLOBAL_METRICS.get_or_init(|| PulseMetricsInner::new().map_err(|e| e.to_string())) {
            Ok(inner) => Ok(Self { inner }),
            Err(message) => Err(prometheus::Error::Msg(message.clone())),
        }
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner.cycle_duration_seconds.observe(duration_secs);
        self.inner.cycles_total.inc();
    }

    pub fn inc_cycle_failures(&self) {
        self.inner.cycle_failures_total.inc();
    }

    pub fn inc_detector_failure(&self, detector: &str) {
        self.inner
            .detector_failures_total
            .with_label_values(&[detector])
            .inc();
    }

    /// Publish the figures of a freshly stored record
    pub fn record_cycle(&self, record: &ReportHistoryRecord) {
        let deployments = &self.inner.deployments;
        for (state, value) in [
            ("total", record.total_deployments),
            ("with_replicas", record.deployments_with_replicas),
            ("zero_replicas", record.deployments_with_zero_replicas),
            ("exact_replicas", record.deployments_with_exact_replicas),
            ("crashloopbackoff", record.deployments_with_crashloopbackoff),
            ("recent_restart", record.deployments_with_recent_start),
        ] {
            deployments.with_label_values(&[state]).set(value);
        }

        let resources = &self.inner.resource_percentage;
        for (resource, kind, value) in [
            ("cpu", "used", record.cpu_used_percentage),
            ("cpu", "requested", record.cpu_requested_percentage),
            ("memory", "used", record.memory_used_percentage),
            ("memory", "requested", record.memory_requested_percentage),
        ] {
            resources.with_label_values(&[resource, kind]).set(value);
        }

        self.inner.node_issues.set(record.node_issues.len() as i64);
        self.inner
            .zombie_processes
            .set(record.zombie_processes.len() as i64);
    }

    pub fn set_history_records(&self, count: usize) {
        self.inner.history_records.set(count as i64);
    }
}

/// Event-tagged log records for the agent lifecycle and its cycles
#[derive(Clone)]
pub struct StructuredLogger {
    env_name: String,
}

impl StructuredLogger {
    pub fn new(env_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
        }
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "agent_started",
            env = %self.env_name,
            agent_version = %version,
            interval_secs = interval_secs,
            "k8spulse agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            env = %self.env_name,
            reason = %reason,
            "k8spulse agent shutting down"
        );
    }

    pub fn log_cycle_started(&self, cycle: u64) {
        info!(
            event = "cycle_started",
            env = %self.env_name,
            cycle = cycle,
            "Starting Kubernetes monitoring cycle"
        );
    }

    pub fn log_cycle_completed(
        &self,
        cycle: u64,
        record: &ReportHistoryRecord,
        failed_detectors: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "cycle_completed",
            env = %self.env_name,
            cycle = cycle,
            total_deployments = record.total_deployments,
            deployments_with_zero_replicas = record.deployments_with_zero_replicas,
            deployments_with_crashloopbackoff = record.deployments_with_crashloopbackoff,
            node_issues = record.node_issues.len(),
            cpu_used_percentage = record.cpu_used_percentage,
            memory_used_percentage = record.memory_used_percentage,
            failed_detectors = failed_detectors,
            duration_secs = duration_secs,
            "Monitoring cycle completed"
        );
    }

    pub fn log_detector_failed(&self, detector: &str, error: &str) {
        warn!(
            event = "detector_failed",
            env = %self.env_name,
            detector = %detector,
            error = %error,
            "Detector failed, using default"
        );
    }
}
