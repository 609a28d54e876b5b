//! Cluster-wide resource aggregation
//!
//! Sums node capacity, container requests and live container usage, then
//! clamps and normalizes them into a [`ClusterResourceSnapshot`]. Quantities
//! that fail to parse are logged and skipped; they never count as zero.

use crate::models::{ClusterResourceSnapshot, ResourceTotals};
use crate::quantity::{parse_cpu, parse_memory, QuantityError};
use crate::source::{ClusterSource, PodUsage, SourceResult};
use k8s_openapi::api::core::v1::{Node, Pod};
use tracing::{info, warn};

/// Running totals for one aggregation pass
#[derive(Debug, Default)]
pub struct ResourceAccumulator {
    cpu: ResourceTotals,
    memory: ResourceTotals,
    skipped: usize,
}

#[derive(Clone, Copy)]
enum Field {
    Capacity,
    Requested,
    Used,
}

impl ResourceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node's `status.capacity` cpu and memory
    pub fn add_node_capacity(&mut self, node: &Node) {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        let Some(capacity) = node.status.as_ref().and_then(|s| s.capacity.as_ref()) else {
            warn!(node = %name, "Node reports no capacity");
            return;
        };

        if let Some(cpu) = capacity.get("cpu") {
            self.add_cpu(Field::Capacity, &cpu.0, name);
        }
        if let Some(memory) = capacity.get("memory") {
            self.add_memory(Field::Capacity, &memory.0, name);
        }
    }

    /// Add the declared requests of every container in a pod
    pub fn add_pod_requests(&mut self, pod: &Pod) {
        let Some(spec) = pod.spec.as_ref() else {
            return;
        };
        let pod_name = pod.metadata.name.as_deref().unwrap_or_default();

        for container in &spec.containers {
            let Some(requests) = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
            else {
                continue;
            };
            let origin = format!("{}/{}", pod_name, container.name);
            if let Some(cpu) = requests.get("cpu") {
                self.add_cpu(Field::Requested, &cpu.0, &origin);
            }
            if let Some(memory) = requests.get("memory") {
                self.add_memory(Field::Requested, &memory.0, &origin);
            }
        }
    }

    /// Add one metrics-API pod sample
    pub fn add_usage(&mut self, sample: &PodUsage) {
        for container in &sample.containers {
            let origin = format!("{}/{}/{}", sample.namespace, sample.name, container.name);
            if let Some(cpu) = container.usage.cpu.as_deref() {
                self.add_cpu(Field::Used, cpu, &origin);
            }
            if let Some(memory) = container.usage.memory.as_deref() {
                self.add_memory(Field::Used, memory, &origin);
            }
        }
    }

    /// Number of quantities skipped because they failed to parse
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn raw_totals(&self) -> (ResourceTotals, ResourceTotals) {
        (self.cpu, self.memory)
    }

    pub fn snapshot(&self, metrics_available: bool) -> ClusterResourceSnapshot {
        ClusterResourceSnapshot::new(self.cpu, self.memory, metrics_available)
    }

    fn add_cpu(&mut self, field: Field, text: &str, origin: &str) {
        let parsed = parse_cpu(text);
        self.record(field, parsed, origin, true);
    }

    fn add_memory(&mut self, field: Field, text: &str, origin: &str) {
        let parsed = parse_memory(text);
        self.record(field, parsed, origin, false);
    }

    fn record(&mut self, field: Field, parsed: Result<f64, QuantityError>, origin: &str, cpu: bool) {
        let value = match parsed {
            Ok(value) => value,
            Err(e) => {
                self.skipped += 1;
                warn!(origin = %origin, error = %e, "Skipping unparseable resource quantity");
                return;
            }
        };

        let totals = if cpu { &mut self.cpu } else { &mut self.memory };
        match field {
            Field::Capacity => totals.capacity += value,
            Field::Requested => totals.requested += value,
            Field::Used => totals.used += value,
        }
    }
}

/// Compute capacity, requested and used figures for the whole cluster.
///
/// Node and pod listing failures propagate. A metrics API failure does not:
/// used totals stay zero and the snapshot is flagged `metrics_available = false`.
pub async fn compute_cluster_resource_metrics(
    source: &dyn ClusterSource,
) -> SourceResult<ClusterResourceSnapshot> {
    let mut acc = ResourceAccumulator::new();

    let nodes = source.list_nodes().await?;
    for node in &nodes {
        acc.add_node_capacity(node);
    }

    let pods = source.list_pods(None).await?;
    for pod in &pods {
        acc.add_pod_requests(pod);
    }

    let metrics_available = match source.list_pod_usage().await {
        Ok(samples) => {
            for sample in &samples {
                acc.add_usage(sample);
            }
            true
        }
        Err(e) => {
            warn!(error = %e, "Metrics server not available, usage totals left at zero");
            false
        }
    };

    let (cpu, memory) = acc.raw_totals();
    info!(
        nodes = nodes.len(),
        pods = pods.len(),
        cpu_capacity_mcores = cpu.capacity,
        cpu_requested_mcores = cpu.requested,
        cpu_used_mcores = cpu.used,
        memory_capacity_mib = memory.capacity,
        memory_requested_mib = memory.requested,
        memory_used_mib = memory.used,
        skipped_quantities = acc.skipped(),
        "Cluster resource totals computed"
    );

    Ok(acc.snapshot(metrics_available))
}
