use ptp_perf_common::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{EndpointMetrics, SummaryMetrics};

pub(crate) const SCHEMA_VERSION: i64 = 1;

const BASE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    benchmark_id TEXT NOT NULL,
    vendor_id TEXT NOT NULL,
    cluster_id TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    stop_time INTEGER,
    is_running INTEGER NOT NULL DEFAULT 1,
    is_successful INTEGER NOT NULL DEFAULT 0,
    is_processed INTEGER NOT NULL DEFAULT 0,
    is_corrupted INTEGER NOT NULL DEFAULT 0,
    log TEXT
);
CREATE INDEX IF NOT EXISTS idx_runs_key ON runs (benchmark_id, vendor_id, cluster_id);
CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL,
    sample_type TEXT NOT NULL,
    value INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_endpoint ON samples (endpoint_id, sample_type, timestamp);
CREATE TABLE IF NOT EXISTS log_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL,
    source TEXT NOT NULL,
    message TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_log_records_endpoint ON log_records (endpoint_id, source);
CREATE TABLE IF NOT EXISTS analysis_log_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    level TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    message TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS schedule_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    command TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    original_priority INTEGER,
    paused INTEGER NOT NULL DEFAULT 0,
    estimated_time_ms INTEGER NOT NULL,
    slack_time_ms INTEGER NOT NULL,
    start_time INTEGER,
    completion_time INTEGER,
    success INTEGER
);
";

fn metric_columns(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!(",\n    {} REAL", column))
        .collect()
}

fn endpoints_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS endpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    machine_id TEXT NOT NULL,
    endpoint_type TEXT NOT NULL,
    restart_count INTEGER NOT NULL DEFAULT 0,
    clock_step_timestamp INTEGER,
    convergence_timestamp INTEGER{}
);
CREATE INDEX IF NOT EXISTS idx_endpoints_run ON endpoints (run_id);",
        metric_columns(EndpointMetrics::COLUMNS)
    )
}

fn summaries_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS benchmark_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    benchmark_id TEXT NOT NULL,
    vendor_id TEXT NOT NULL,
    cluster_id TEXT NOT NULL,
    count INTEGER NOT NULL{},
    UNIQUE (benchmark_id, vendor_id, cluster_id)
);",
        metric_columns(SummaryMetrics::COLUMNS)
    )
}

/// Creates the tables on first use and rejects databases of another version.
pub(crate) fn initialize_schema(connection: &mut Connection) -> Result<()> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(BASE_TABLES)?;
            tx.execute_batch(&endpoints_table())?;
            tx.execute_batch(&summaries_table())?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(Error::invalid_state(
                "run store",
                format!("unsupported schema version {}", other),
            ));
        }
    }

    tx.commit()?;
    Ok(())
}
