//! Core data models for k8spulse

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted row per monitoring cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportHistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub total_deployments: i64,
    pub deployments_with_replicas: i64,
    pub deployments_with_zero_replicas: i64,
    pub deployments_with_exact_replicas: i64,
    pub deployments_with_crashloopbackoff: i64,
    pub deployments_with_recent_start: i64,
    pub cpu_used_percentage: f64,
    pub cpu_requested_percentage: f64,
    pub memory_used_percentage: f64,
    pub memory_requested_percentage: f64,
    pub node_issues: Vec<NodeIssue>,
    pub zombie_processes: Vec<ZombieProcess>,
}

/// A node whose Ready condition is not "True"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIssue {
    pub name: String,
    pub status: String,
    /// YAML dump of the full node object
    pub description: String,
}

/// A process in state `Z` found inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZombieProcess {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub pid: i64,
    pub process_name: String,
}

/// Non-Normal events grouped by (namespace, reason, message)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusualEvent {
    pub namespace: String,
    pub reason: String,
    pub message: String,
    pub count: u32,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Readiness of well-known system deployments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreStatus {
    pub metrics_server: bool,
    pub kube_dns: bool,
    pub cast_ai_agent: bool,
    pub cast_ai_workload_autoscaler: bool,
    pub cast_ai_cluster_controller: bool,
}

/// Cluster-wide capacity, requests and usage at one point in time.
///
/// CPU figures are millicores, memory figures are MiB. Construction clamps
/// requested and used to capacity, so every percentage lies in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterResourceSnapshot {
    pub cpu_capacity_millicores: f64,
    pub cpu_requested_millicores: f64,
    pub cpu_used_millicores: f64,
    pub memory_capacity_mib: f64,
    pub memory_requested_mib: f64,
    pub memory_used_mib: f64,
    /// False when the metrics API could not be read and used totals are zero
    pub metrics_available: bool,
}

impl ClusterResourceSnapshot {
    pub fn new(cpu: ResourceTotals, memory: ResourceTotals, metrics_available: bool) -> Self {
        let cpu = cpu.clamped();
        let memory = memory.clamped();
        Self {
            cpu_capacity_millicores: cpu.capacity,
            cpu_requested_millicores: cpu.requested,
            cpu_used_millicores: cpu.used,
            memory_capacity_mib: memory.capacity,
            memory_requested_mib: memory.requested,
            memory_used_mib: memory.used,
            metrics_available,
        }
    }

    pub fn cpu_used_percentage(&self) -> f64 {
        percentage(self.cpu_used_millicores, self.cpu_capacity_millicores)
    }

    pub fn cpu_requested_percentage(&self) -> f64 {
        percentage(self.cpu_requested_millicores, self.cpu_capacity_millicores)
    }

    pub fn memory_used_percentage(&self) -> f64 {
        percentage(self.memory_used_mib, self.memory_capacity_mib)
    }

    pub fn memory_requested_percentage(&self) -> f64 {
        percentage(self.memory_requested_mib, self.memory_capacity_mib)
    }
}

/// Raw capacity/requested/used sums for one resource, before clamping
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceTotals {
    pub capacity: f64,
    pub requested: f64,
    pub used: f64,
}

impl ResourceTotals {
    fn clamped(self) -> Self {
        let capacity = self.capacity.max(0.0);
        Self {
            capacity,
            requested: self.requested.clamp(0.0, capacity),
            used: self.used.clamp(0.0, capacity),
        }
    }
}

fn percentage(value: f64, capacity: f64) -> f64 {
    if capacity <= 0.0 {
        return 0.0;
    }
    (value / capacity * 100.0).clamp(0.0, 100.0)
}

/// Everything a single cycle produced, handed to the report renderer
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub env_name: String,
    pub record: ReportHistoryRecord,
    pub resources: ClusterResourceSnapshot,
    pub unusual_events: Vec<UnusualEvent>,
    pub semaphore: SemaphoreStatus,
    pub audit_events: Vec<serde_json::Value>,
    /// History window, most recent first
    pub history: Vec<ReportHistoryRecord>,
    /// HTML fragment from the recommendation collaborator, empty when disabled or failed
    pub recommendation: String,
    pub zombies_enabled: bool,
}
