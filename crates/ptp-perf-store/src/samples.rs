//! Typed samples derived by the analysis.

use chrono::{DateTime, Utc};
use ptp_perf_common::{EndpointId, EndpointType, Result, RunId, SampleType};
use rusqlite::params;

use crate::models::{RunKey, Sample};
use crate::store::{parsed_at, timestamp_at, to_micros, RunStore};

impl RunStore {
    /// Inserts all samples in one transaction, in the given order.
    pub fn insert_samples(&self, samples: &[Sample]) -> Result<usize> {
        self.with_connection(|c| {
            let tx = c.transaction()?;
            {
                let mut statement = tx.prepare(
                    "INSERT INTO samples (endpoint_id, timestamp, sample_type, value) \
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for sample in samples {
                    statement.execute(params![
                        sample.endpoint_id,
                        to_micros(sample.timestamp),
                        sample.sample_type.as_str(),
                        sample.value,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(samples.len())
        })
    }

    pub fn delete_samples(&self, endpoint_id: EndpointId) -> Result<usize> {
        Ok(self.with_connection(|c| {
            c.execute("DELETE FROM samples WHERE endpoint_id = ?1", params![endpoint_id])
        })?)
    }

    pub fn delete_run_samples(&self, run_id: RunId) -> Result<usize> {
        Ok(self.with_connection(|c| {
            c.execute(
                "DELETE FROM samples WHERE endpoint_id IN (SELECT id FROM endpoints WHERE run_id = ?1)",
                params![run_id],
            )
        })?)
    }

    /// Samples of one endpoint, optionally of one kind, in insertion order.
    pub fn samples(&self, endpoint_id: EndpointId, sample_type: Option<SampleType>) -> Result<Vec<Sample>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(
                "SELECT endpoint_id, timestamp, sample_type, value FROM samples \
                 WHERE endpoint_id = ?1 AND (?2 IS NULL OR sample_type = ?2) ORDER BY id",
            )?;
            let samples = statement
                .query_map(params![endpoint_id, sample_type.map(|t| t.as_str())], |row| {
                    Ok(Sample {
                        endpoint_id: row.get(0)?,
                        timestamp: timestamp_at(row, 1)?,
                        sample_type: parsed_at(row, 2)?,
                        value: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(samples)
        })
    }

    /// Fault markers recorded for any endpoint of a run, in time order.
    pub fn fault_samples_of_run(&self, run_id: RunId) -> Result<Vec<Sample>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(
                "SELECT s.endpoint_id, s.timestamp, s.sample_type, s.value FROM samples s \
                 JOIN endpoints e ON e.id = s.endpoint_id \
                 WHERE e.run_id = ?1 AND s.sample_type = ?2 ORDER BY s.timestamp, s.id",
            )?;
            let samples = statement
                .query_map(params![run_id, SampleType::Fault.as_str()], |row| {
                    Ok(Sample {
                        endpoint_id: row.get(0)?,
                        timestamp: timestamp_at(row, 1)?,
                        sample_type: parsed_at(row, 2)?,
                        value: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(samples)
        })
    }

    /// Values of one kind over all usable endpoints of `endpoint_type`
    /// matching `key`, as `(timestamp, nanoseconds)`.
    pub fn summary_series(
        &self,
        key: &RunKey,
        endpoint_type: EndpointType,
        sample_type: SampleType,
    ) -> Result<Vec<(DateTime<Utc>, i64)>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(
                "SELECT s.timestamp, s.value FROM samples s \
                 JOIN endpoints e ON e.id = s.endpoint_id \
                 JOIN runs r ON r.id = e.run_id \
                 WHERE r.benchmark_id = ?1 AND r.vendor_id = ?2 AND r.cluster_id = ?3 \
                 AND r.is_processed = 1 AND r.is_corrupted = 0 \
                 AND e.endpoint_type = ?4 AND s.sample_type = ?5 \
                 AND (e.convergence_timestamp IS NULL OR s.timestamp >= e.convergence_timestamp) \
                 ORDER BY s.id",
            )?;
            let series = statement
                .query_map(
                    params![
                        key.benchmark_id,
                        key.vendor_id,
                        key.cluster_id,
                        endpoint_type.as_str(),
                        sample_type.as_str(),
                    ],
                    |row| Ok((timestamp_at(row, 0)?, row.get(1)?)),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(series)
        })
    }
}
