//! Static HTML report rendering

mod gauge;

pub use gauge::{Gauge, GaugeDirection};

use crate::models::{CycleReport, ReportHistoryRecord, SemaphoreStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;

const REPORT_TEMPLATE: &str = "report.html";
const INDEX_TEMPLATE: &str = "index.html";
const INDEX_FILE: &str = "index.html";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// One entry of the report index page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub link: String,
    pub date: String,
    #[serde(skip)]
    pub modified_at: DateTime<Utc>,
}

/// Turns a cycle report into a document
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &CycleReport) -> RenderResult<String>;

    fn render_index(&self, entries: &[IndexEntry]) -> RenderResult<String>;
}

/// Renders the report and index pages with built-in tera templates
pub struct HtmlReportRenderer {
    tera: Tera,
}

impl HtmlReportRenderer {
    pub fn new() -> RenderResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (REPORT_TEMPLATE, include_str!("../../templates/report.html")),
            (INDEX_TEMPLATE, include_str!("../../templates/index.html")),
        ])?;
        Ok(Self { tera })
    }
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    recorded_at: String,
    #[serde(flatten)]
    record: &'a ReportHistoryRecord,
}

#[derive(Serialize)]
struct ComponentRow {
    name: &'static str,
    ready: bool,
}

fn component_rows(semaphore: &SemaphoreStatus) -> Vec<ComponentRow> {
    [
        ("metrics-server", semaphore.metrics_server),
        ("kube-dns", semaphore.kube_dns),
        ("castai-agent", semaphore.cast_ai_agent),
        ("castai-workload-autoscaler", semaphore.cast_ai_workload_autoscaler),
        ("castai-cluster-controller", semaphore.cast_ai_cluster_controller),
    ]
    .into_iter()
    .map(|(name, ready)| ComponentRow { name, ready })
    .collect()
}

/// Deployment gauges plus the four resource gauges, in display order
pub fn report_gauges(report: &CycleReport) -> Vec<Gauge> {
    let record = &report.record;
    let total = record.total_deployments as f64;

    vec![
        Gauge::new(
            "With Replicas",
            record.deployments_with_replicas as f64,
            total,
            GaugeDirection::Direct,
            80.0,
            60.0,
        ),
        Gauge::new(
            "Zero Replicas",
            record.deployments_with_zero_replicas as f64,
            total,
            GaugeDirection::Inverse,
            50.0,
            70.0,
        ),
        Gauge::new(
            "Exact Replicas",
            record.deployments_with_exact_replicas as f64,
            total,
            GaugeDirection::Direct,
            65.0,
            50.0,
        ),
        Gauge::new(
            "CrashLoopBackOff",
            record.deployments_with_crashloopbackoff as f64,
            total,
            GaugeDirection::Inverse,
            30.0,
            50.0,
        ),
        Gauge::new(
            "Restarted",
            record.deployments_with_recent_start as f64,
            100.0,
            GaugeDirection::Inverse,
            30.0,
            60.0,
        ),
        Gauge::percent("CPU Used", record.cpu_used_percentage, GaugeDirection::Inverse, 70.0, 85.0),
        Gauge::percent(
            "CPU Requested",
            record.cpu_requested_percentage,
            GaugeDirection::Inverse,
            70.0,
            85.0,
        ),
        Gauge::percent(
            "Memory Used",
            record.memory_used_percentage,
            GaugeDirection::Inverse,
            70.0,
            85.0,
        ),
        Gauge::percent(
            "Memory Requested",
            record.memory_requested_percentage,
            GaugeDirection::Inverse,
            70.0,
            85.0,
        ),
    ]
}

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, report: &CycleReport) -> RenderResult<String> {
        let history: Vec<HistoryRow<'_>> = report
            .history
            .iter()
            .map(|record| HistoryRow {
                recorded_at: record.timestamp.format(DATE_FORMAT).to_string(),
                record,
            })
            .collect();

        let mut context = Context::new();
        context.insert("env_name", &report.env_name);
        context.insert("generated_at", &report.record.timestamp.format(DATE_FORMAT).to_string());
        context.insert("record", &report.record);
        context.insert("resources", &report.resources);
        context.insert("gauges", &report_gauges(report));
        context.insert("components", &component_rows(&report.semaphore));
        context.insert("unusual_events", &report.unusual_events);
        context.insert("audit_events", &report.audit_events);
        context.insert("history", &history);
        context.insert("recommendation", &report.recommendation);
        context.insert("zombies_enabled", &report.zombies_enabled);

        Ok(self.tera.render(REPORT_TEMPLATE, &context)?)
    }

    fn render_index(&self, entries: &[IndexEntry]) -> RenderResult<String> {
        let mut context = Context::new();
        context.insert("reports", entries);
        Ok(self.tera.render(INDEX_TEMPLATE, &context)?)
    }
}

/// `<docs_dir>/<env_name>_statistics.html`
pub fn report_path(docs_dir: &Path, env_name: &str) -> PathBuf {
    docs_dir.join(format!("{env_name}_statistics.html"))
}

/// `staging_statistics` -> `Staging statistics`
fn display_name(stem: &str) -> String {
    let spaced = stem.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Every `.html` report in `docs_dir` except the index, newest first
pub async fn index_entries(docs_dir: &Path) -> RenderResult<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(docs_dir).await?;

    while let Some(entry) = dir.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name == INDEX_FILE {
            continue;
        }
        let Some(stem) = file_name.strip_suffix(".html") else {
            continue;
        };

        let modified_at: DateTime<Utc> = entry.metadata().await?.modified()?.into();
        entries.push(IndexEntry {
            name: display_name(stem),
            link: file_name.clone(),
            date: modified_at.format(DATE_FORMAT).to_string(),
            modified_at,
        });
    }

    entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok(entries)
}

/// Regenerate `<docs_dir>/index.html` from the reports present on disk
pub async fn write_index(renderer: &dyn ReportRenderer, docs_dir: &Path) -> RenderResult<PathBuf> {
    let entries = index_entries(docs_dir).await?;
    let html = renderer.render_index(&entries)?;
    let path = docs_dir.join(INDEX_FILE);
    tokio::fs::write(&path, html).await?;
    Ok(path)
}
