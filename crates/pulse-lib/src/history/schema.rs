use super::StoreResult;
use sqlx::SqlitePool;

const CREATE_REPORT_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS report_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL UNIQUE,
    total_deployments INTEGER NOT NULL,
    deployments_with_replicas INTEGER NOT NULL,
    deployments_with_zero_replicas INTEGER NOT NULL,
    deployments_with_exact_replicas INTEGER NOT NULL,
    deployments_with_crashloopbackoff INTEGER NOT NULL,
    deployments_with_recent_start INTEGER NOT NULL,
    cpu_used_percentage REAL NOT NULL,
    cpu_requested_percentage REAL NOT NULL,
    memory_used_percentage REAL NOT NULL,
    memory_requested_percentage REAL NOT NULL
)
"#;

const CREATE_NODE_ISSUES: &str = r#"
CREATE TABLE IF NOT EXISTS node_issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES report_history(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    description TEXT NOT NULL
)
"#;

const CREATE_ZOMBIE_PROCESSES: &str = r#"
CREATE TABLE IF NOT EXISTS zombie_processes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES report_history(id) ON DELETE CASCADE,
    namespace TEXT NOT NULL,
    pod TEXT NOT NULL,
    container TEXT NOT NULL,
    pid INTEGER NOT NULL,
    process_name TEXT NOT NULL
)
"#;

const CREATE_INDEXES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_node_issues_report ON node_issues(report_id)",
    "CREATE INDEX IF NOT EXISTS idx_zombie_processes_report ON zombie_processes(report_id)",
];

/// Create the history tables if they do not exist yet
pub(super) async fn initialize(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(CREATE_REPORT_HISTORY).execute(pool).await?;
    sqlx::query(CREATE_NODE_ISSUES).execute(pool).await?;
    sqlx::query(CREATE_ZOMBIE_PROCESSES).execute(pool).await?;
    for statement in CREATE_INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
