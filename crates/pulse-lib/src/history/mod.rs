//! Persistent per-cycle history
//!
//! One `report_history` row per cycle plus ordered child rows for node issues
//! and zombie processes, stored in SQLite. Records are immutable once written
//! and are never pruned; reads select a time window.

mod schema;

use crate::models::{NodeIssue, ReportHistoryRecord, ZombieProcess};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("a report for timestamp {timestamp} already exists")]
    DuplicateTimestamp { timestamp: DateTime<Utc> },

    #[error("stored timestamp {value} is out of range")]
    InvalidTimestamp { value: i64 },
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_CONNECTIONS: u32 = 4;

const SELECT_HEADERS: &str = r#"
SELECT id, timestamp, total_deployments, deployments_with_replicas,
       deployments_with_zero_replicas, deployments_with_exact_replicas,
       deployments_with_crashloopbackoff, deployments_with_recent_start,
       cpu_used_percentage, cpu_requested_percentage,
       memory_used_percentage, memory_requested_percentage
FROM report_history
"#;

#[derive(Debug, FromRow)]
struct HeaderRow {
    id: i64,
    timestamp: i64,
    total_deployments: i64,
    deployments_with_replicas: i64,
    deployments_with_zero_replicas: i64,
    deployments_with_exact_replicas: i64,
    deployments_with_crashloopbackoff: i64,
    deployments_with_recent_start: i64,
    cpu_used_percentage: f64,
    cpu_requested_percentage: f64,
    memory_used_percentage: f64,
    memory_requested_percentage: f64,
}

#[derive(Debug, FromRow)]
struct NodeIssueRow {
    report_id: i64,
    name: String,
    status: String,
    description: String,
}

#[derive(Debug, FromRow)]
struct ZombieRow {
    report_id: i64,
    namespace: String,
    pod: String,
    container: String,
    pid: i64,
    process_name: String,
}

/// SQLite-backed history of monitoring cycles
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (creating if missing) the database file and its schema
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!(path = %path.as_ref().display(), "Opened history store");
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        schema::initialize(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert a record and its children atomically.
    ///
    /// The timestamp is stored at second precision and must be unique.
    pub async fn append(&self, record: &ReportHistoryRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO report_history (
                timestamp, total_deployments, deployments_with_replicas,
                deployments_with_zero_replicas, deployments_with_exact_replicas,
                deployments_with_crashloopbackoff, deployments_with_recent_start,
                cpu_used_percentage, cpu_requested_percentage,
                memory_used_percentage, memory_requested_percentage
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(record.timestamp.timestamp())
        .bind(record.total_deployments)
        .bind(record.deployments_with_replicas)
        .bind(record.deployments_with_zero_replicas)
        .bind(record.deployments_with_exact_replicas)
        .bind(record.deployments_with_crashloopbackoff)
        .bind(record.deployments_with_recent_start)
        .bind(record.cpu_used_percentage)
        .bind(record.cpu_requested_percentage)
        .bind(record.memory_used_percentage)
        .bind(record.memory_requested_percentage)
        .execute(&mut *tx)
        .await;

        let report_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                return Err(StoreError::DuplicateTimestamp {
                    timestamp: record.timestamp,
                });
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(StoreError::Database(e));
            }
        };

        for issue in &record.node_issues {
            sqlx::query(
                "INSERT INTO node_issues (report_id, name, status, description) VALUES (?, ?, ?, ?)",
            )
            .bind(report_id)
            .bind(&issue.name)
            .bind(&issue.status)
            .bind(&issue.description)
            .execute(&mut *tx)
            .await?;
        }

        for zombie in &record.zombie_processes {
            sqlx::query(
                "INSERT INTO zombie_processes (report_id, namespace, pod, container, pid, process_name)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(report_id)
            .bind(&zombie.namespace)
            .bind(&zombie.pod)
            .bind(&zombie.container)
            .bind(zombie.pid)
            .bind(&zombie.process_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            report_id = report_id,
            timestamp = %record.timestamp,
            node_issues = record.node_issues.len(),
            zombies = record.zombie_processes.len(),
            "Appended history record"
        );
        Ok(())
    }

    /// Records from the last `window`, most recent first
    pub async fn load(&self, window: Duration) -> StoreResult<Vec<ReportHistoryRecord>> {
        self.load_since(window_cutoff(Utc::now(), window)).await
    }

    /// Records with `timestamp >= cutoff`, most recent first
    pub async fn load_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ReportHistoryRecord>> {
        let cutoff = cutoff.timestamp();

        let headers = sqlx::query_as::<_, HeaderRow>(&format!(
            "{SELECT_HEADERS} WHERE timestamp >= ? ORDER BY timestamp DESC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let issues = sqlx::query_as::<_, NodeIssueRow>(
            r#"
            SELECT n.report_id, n.name, n.status, n.description
            FROM node_issues n
            JOIN report_history r ON r.id = n.report_id
            WHERE r.timestamp >= ?
            ORDER BY n.id
        "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let zombies = sqlx::query_as::<_, ZombieRow>(
            r#"
            SELECT z.report_id, z.namespace, z.pod, z.container, z.pid, z.process_name
            FROM zombie_processes z
            JOIN report_history r ON r.id = z.report_id
            WHERE r.timestamp >= ?
            ORDER BY z.id
        "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        assemble(headers, issues, zombies)
    }

    /// The newest record, if any
    pub async fn latest(&self) -> StoreResult<Option<ReportHistoryRecord>> {
        let header = sqlx::query_as::<_, HeaderRow>(&format!(
            "{SELECT_HEADERS} ORDER BY timestamp DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let issues = sqlx::query_as::<_, NodeIssueRow>(
            "SELECT report_id, name, status, description FROM node_issues WHERE report_id = ? ORDER BY id",
        )
        .bind(header.id)
        .fetch_all(&self.pool)
        .await?;

        let zombies = sqlx::query_as::<_, ZombieRow>(
            "SELECT report_id, namespace, pod, container, pid, process_name
             FROM zombie_processes WHERE report_id = ? ORDER BY id",
        )
        .bind(header.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assemble(vec![header], issues, zombies)?.into_iter().next())
    }

    /// Total number of stored records
    pub async fn count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM report_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Cheap connectivity probe for readiness checks
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Start of the window ending at `now`. A window reaching past the
/// representable range saturates to the earliest instant, so every record
/// is inside it.
pub fn window_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    i64::try_from(window.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn assemble(
    headers: Vec<HeaderRow>,
    issues: Vec<NodeIssueRow>,
    zombies: Vec<ZombieRow>,
) -> StoreResult<Vec<ReportHistoryRecord>> {
    let mut issues_by_report: HashMap<i64, Vec<NodeIssue>> = HashMap::new();
    for row in issues {
        issues_by_report.entry(row.report_id).or_default().push(NodeIssue {
            name: row.name,
            status: row.status,
            description: row.description,
        });
    }

    let mut zombies_by_report: HashMap<i64, Vec<ZombieProcess>> = HashMap::new();
    for row in zombies {
        zombies_by_report.entry(row.report_id).or_default().push(ZombieProcess {
            namespace: row.namespace,
            pod: row.pod,
            container: row.container,
            pid: row.pid,
            process_name: row.process_name,
        });
    }

    headers
        .into_iter()
        .map(|h| {
            let timestamp = Utc
                .timestamp_opt(h.timestamp, 0)
                .single()
                .ok_or(StoreError::InvalidTimestamp { value: h.timestamp })?;
            Ok(ReportHistoryRecord {
                timestamp,
                total_deployments: h.total_deployments,
                deployments_with_replicas: h.deployments_with_replicas,
                deployments_with_zero_replicas: h.deployments_with_zero_replicas,
                deployments_with_exact_replicas: h.deployments_with_exact_replicas,
                deployments_with_crashloopbackoff: h.deployments_with_crashloopbackoff,
                deployments_with_recent_start: h.deployments_with_recent_start,
                cpu_used_percentage: h.cpu_used_percentage,
                cpu_requested_percentage: h.cpu_requested_percentage,
                memory_used_percentage: h.memory_used_percentage,
                memory_requested_percentage: h.memory_requested_percentage,
                node_issues: issues_by_report.remove(&h.id).unwrap_or_default(),
                zombie_processes: zombies_by_report.remove(&h.id).unwrap_or_default(),
            })
        })
        .collect()
}
