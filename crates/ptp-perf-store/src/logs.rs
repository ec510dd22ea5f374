//! Log records captured during runs and during their analysis.

use chrono::{DateTime, Utc};
use ptp_perf_common::{EndpointId, Result, RunId};
use rusqlite::params;

use crate::models::{AnalysisLogRecord, LogRecord};
use crate::store::{timestamp_at, to_micros, RunStore};

impl RunStore {
    pub fn insert_log_record(
        &self,
        endpoint_id: EndpointId,
        timestamp: DateTime<Utc>,
        source: &str,
        message: &str,
    ) -> Result<i64> {
        self.with_connection(|c| {
            c.execute(
                "INSERT INTO log_records (endpoint_id, timestamp, source, message) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![endpoint_id, to_micros(timestamp), source, message],
            )?;
            Ok(c.last_insert_rowid())
        })
    }

    /// Records of one endpoint in arrival order, optionally of one source.
    pub fn log_records(&self, endpoint_id: EndpointId, source: Option<&str>) -> Result<Vec<LogRecord>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(
                "SELECT id, endpoint_id, timestamp, source, message FROM log_records \
                 WHERE endpoint_id = ?1 AND (?2 IS NULL OR source = ?2) ORDER BY id",
            )?;
            let records = statement
                .query_map(params![endpoint_id, source], |row| {
                    Ok(LogRecord {
                        id: row.get(0)?,
                        endpoint_id: row.get(1)?,
                        timestamp: timestamp_at(row, 2)?,
                        source: row.get(3)?,
                        message: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Records of `source` over every endpoint of a run.
    pub fn run_log_records(&self, run_id: RunId, source: &str) -> Result<Vec<LogRecord>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(
                "SELECT l.id, l.endpoint_id, l.timestamp, l.source, l.message FROM log_records l \
                 JOIN endpoints e ON e.id = l.endpoint_id \
                 WHERE e.run_id = ?1 AND l.source = ?2 ORDER BY l.id",
            )?;
            let records = statement
                .query_map(params![run_id, source], |row| {
                    Ok(LogRecord {
                        id: row.get(0)?,
                        endpoint_id: row.get(1)?,
                        timestamp: timestamp_at(row, 2)?,
                        source: row.get(3)?,
                        message: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    pub fn insert_analysis_log_record(
        &self,
        run_id: RunId,
        level: &str,
        timestamp: DateTime<Utc>,
        message: &str,
    ) -> Result<i64> {
        self.with_connection(|c| {
            c.execute(
                "INSERT INTO analysis_log_records (run_id, level, timestamp, message) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, level, to_micros(timestamp), message],
            )?;
            Ok(c.last_insert_rowid())
        })
    }

    pub fn analysis_log_records(&self, run_id: RunId) -> Result<Vec<AnalysisLogRecord>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(
                "SELECT id, run_id, level, timestamp, message FROM analysis_log_records \
                 WHERE run_id = ?1 ORDER BY id",
            )?;
            let records = statement
                .query_map(params![run_id], |row| {
                    Ok(AnalysisLogRecord {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        level: row.get(2)?,
                        timestamp: timestamp_at(row, 3)?,
                        message: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Drops the analysis log of a run before it is analysed again.
    pub fn clear_analysis_log(&self, run_id: RunId) -> Result<()> {
        self.with_connection(|c| {
            c.execute("DELETE FROM analysis_log_records WHERE run_id = ?1", params![run_id])
        })?;
        Ok(())
    }
}
