use ptp_perf_common::Result;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::debug;

use crate::models::{BenchmarkSummary, RunKey, SummaryMetrics};
use crate::store::RunStore;

fn select_columns() -> String {
    let mut columns = vec!["benchmark_id", "vendor_id", "cluster_id", "count"];
    columns.extend_from_slice(SummaryMetrics::COLUMNS);
    columns.join(", ")
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<BenchmarkSummary> {
    let values = (0..SummaryMetrics::COLUMNS.len())
        .map(|index| row.get::<_, Option<f64>>(4 + index))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(BenchmarkSummary {
        key: RunKey::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ),
        count: row.get(3)?,
        metrics: SummaryMetrics::from_values(&values),
    })
}

impl RunStore {
    /// Inserts or replaces the summary row of `summary.key`.
    pub fn upsert_summary(&self, summary: &BenchmarkSummary) -> Result<()> {
        let columns = select_columns();
        let placeholders = (1..=4 + SummaryMetrics::COLUMNS.len())
            .map(|index| format!("?{}", index))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = std::iter::once("count")
            .chain(SummaryMetrics::COLUMNS.iter().copied())
            .map(|column| format!("{0} = excluded.{0}", column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO benchmark_summaries ({}) VALUES ({}) \
             ON CONFLICT (benchmark_id, vendor_id, cluster_id) DO UPDATE SET {}",
            columns, placeholders, updates
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            summary.key.benchmark_id.clone().into(),
            summary.key.vendor_id.clone().into(),
            summary.key.cluster_id.clone().into(),
            summary.count.into(),
        ];
        values.extend(summary.metrics.values().into_iter().map(rusqlite::types::Value::from));

        self.with_connection(|c| c.execute(&sql, params_from_iter(values)))?;
        debug!(key = %summary.key, count = summary.count, "Stored benchmark summary");
        Ok(())
    }

    pub fn get_summary(&self, key: &RunKey) -> Result<Option<BenchmarkSummary>> {
        self.with_connection(|c| {
            c.query_row(
                &format!(
                    "SELECT {} FROM benchmark_summaries \
                     WHERE benchmark_id = ?1 AND vendor_id = ?2 AND cluster_id = ?3",
                    select_columns()
                ),
                params![key.benchmark_id, key.vendor_id, key.cluster_id],
                summary_from_row,
            )
            .optional()
        })
    }

    pub fn list_summaries(&self) -> Result<Vec<BenchmarkSummary>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(&format!(
                "SELECT {} FROM benchmark_summaries ORDER BY benchmark_id, vendor_id, cluster_id",
                select_columns()
            ))?;
            let summaries = statement
                .query_map([], summary_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
    }

    /// Deletes the summary row so the next pass recomputes it.
    pub fn invalidate_summary(&self, key: &RunKey) -> Result<bool> {
        let deleted = self.with_connection(|c| {
            c.execute(
                "DELETE FROM benchmark_summaries \
                 WHERE benchmark_id = ?1 AND vendor_id = ?2 AND cluster_id = ?3",
                params![key.benchmark_id, key.vendor_id, key.cluster_id],
            )
        })?;
        Ok(deleted > 0)
    }
}
