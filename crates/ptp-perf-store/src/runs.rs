//! Run rows.

use chrono::{DateTime, Utc};
use ptp_perf_common::{Error, Result, RunId};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::models::{Run, RunKey};
use crate::store::{optional_timestamp_at, timestamp_at, to_micros, RunStore};

const RUN_COLUMNS: &str = "id, benchmark_id, vendor_id, cluster_id, start_time, stop_time, \
                           is_running, is_successful, is_processed, is_corrupted, log";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        benchmark_id: row.get(1)?,
        vendor_id: row.get(2)?,
        cluster_id: row.get(3)?,
        start_time: timestamp_at(row, 4)?,
        stop_time: optional_timestamp_at(row, 5)?,
        is_running: row.get(6)?,
        is_successful: row.get(7)?,
        is_processed: row.get(8)?,
        is_corrupted: row.get(9)?,
        log: row.get(10)?,
    })
}

/// Selection of runs for listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub key: Option<RunKey>,
    pub benchmark_id: Option<String>,
    pub running: Option<bool>,
    pub successful: Option<bool>,
    pub processed: Option<bool>,
    pub corrupted: Option<bool>,
}

impl RunFilter {
    /// Finished runs, optionally only those not analysed yet.
    pub fn finished(include_processed: bool) -> Self {
        Self {
            running: Some(false),
            processed: if include_processed { None } else { Some(false) },
            ..Default::default()
        }
    }

    /// Runs that count towards a benchmark's target run count.
    pub fn usable(key: RunKey) -> Self {
        Self {
            key: Some(key),
            running: Some(false),
            successful: Some(true),
            corrupted: Some(false),
            ..Default::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<rusqlite::types::Value>) {
        use rusqlite::types::Value;

        let mut conditions = Vec::new();
        let mut values = Vec::new();
        if let Some(key) = &self.key {
            conditions.push("benchmark_id = ? AND vendor_id = ? AND cluster_id = ?");
            values.push(Value::Text(key.benchmark_id.clone()));
            values.push(Value::Text(key.vendor_id.clone()));
            values.push(Value::Text(key.cluster_id.clone()));
        }
        if let Some(benchmark_id) = &self.benchmark_id {
            conditions.push("benchmark_id = ?");
            values.push(Value::Text(benchmark_id.clone()));
        }
        for (column, flag) in [
            ("is_running = ?", self.running),
            ("is_successful = ?", self.successful),
            ("is_processed = ?", self.processed),
            ("is_corrupted = ?", self.corrupted),
        ] {
            if let Some(flag) = flag {
                conditions.push(column);
                values.push(Value::Integer(flag as i64));
            }
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

impl RunStore {
    /// Inserts a run in the running state.
    pub fn create_run(&self, key: &RunKey, start_time: DateTime<Utc>) -> Result<Run> {
        let id = self.with_connection(|c| {
            c.execute(
                "INSERT INTO runs (benchmark_id, vendor_id, cluster_id, start_time, is_running) \
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![key.benchmark_id, key.vendor_id, key.cluster_id, to_micros(start_time)],
            )?;
            Ok(c.last_insert_rowid())
        })?;
        debug!(run_id = id, key = %key, "Created run");
        self.get_run(id)
    }

    pub fn get_run(&self, id: RunId) -> Result<Run> {
        self.with_connection(|c| {
            c.query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![id],
                run_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| Error::config_not_found(format!("run {}", id)))
    }

    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let (clause, values) = filter.where_clause();
        self.with_connection(|c| {
            let mut statement =
                c.prepare(&format!("SELECT {} FROM runs{} ORDER BY id", RUN_COLUMNS, clause))?;
            let runs = statement
                .query_map(rusqlite::params_from_iter(values), run_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(runs)
        })
    }

    pub fn count_runs(&self, filter: &RunFilter) -> Result<usize> {
        let (clause, values) = filter.where_clause();
        let count: i64 = self.with_connection(|c| {
            c.query_row(
                &format!("SELECT COUNT(*) FROM runs{}", clause),
                rusqlite::params_from_iter(values),
                |row| row.get(0),
            )
        })?;
        Ok(count as usize)
    }

    /// Distinct keys that have at least one run matching `filter`.
    pub fn run_keys(&self, filter: &RunFilter) -> Result<Vec<RunKey>> {
        let (clause, values) = filter.where_clause();
        self.with_connection(|c| {
            let mut statement = c.prepare(&format!(
                "SELECT DISTINCT benchmark_id, vendor_id, cluster_id FROM runs{} \
                 ORDER BY benchmark_id, vendor_id, cluster_id",
                clause
            ))?;
            let keys = statement
                .query_map(rusqlite::params_from_iter(values), |row| {
                    Ok(RunKey::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
    }

    /// Writes the terminal fields of a run. A run finalizes only once.
    pub fn finalize_run(
        &self,
        id: RunId,
        stop_time: DateTime<Utc>,
        successful: bool,
        log: Option<&str>,
    ) -> Result<Run> {
        let run = self.get_run(id)?;
        if !run.is_running {
            return Err(Error::invalid_state(format!("run {}", id), "already finalized"));
        }
        // A successful run must end after it started.
        let successful = successful && stop_time > run.start_time;

        self.with_connection(|c| {
            c.execute(
                "UPDATE runs SET is_running = 0, is_successful = ?2, stop_time = ?3, log = ?4 \
                 WHERE id = ?1",
                params![id, successful, to_micros(stop_time), log],
            )
        })?;
        debug!(run_id = id, successful, "Finalized run");
        self.get_run(id)
    }

    /// Records the outcome of an analysis pass.
    pub fn mark_processed(&self, id: RunId, corrupted: bool) -> Result<()> {
        self.with_connection(|c| {
            c.execute(
                "UPDATE runs SET is_processed = 1, is_corrupted = ?2 WHERE id = ?1",
                params![id, corrupted],
            )
        })?;
        Ok(())
    }

    /// Resets the analysis flags so the run is analysed again.
    pub fn mark_unprocessed(&self, id: RunId) -> Result<()> {
        self.with_connection(|c| {
            c.execute(
                "UPDATE runs SET is_processed = 0, is_corrupted = 0 WHERE id = ?1",
                params![id],
            )
        })?;
        Ok(())
    }

    /// Deletes a run together with its endpoints, samples and logs.
    pub fn delete_run(&self, id: RunId) -> Result<()> {
        self.with_connection(|c| c.execute("DELETE FROM runs WHERE id = ?1", params![id]))?;
        Ok(())
    }
}
