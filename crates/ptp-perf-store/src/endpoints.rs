//! Endpoint rows and their derived metrics.

use chrono::{DateTime, Utc};
use ptp_perf_common::{EndpointId, EndpointType, Error, Result, RunId};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::models::{Endpoint, EndpointMetrics};
use crate::store::{optional_timestamp_at, parsed_at, to_micros, RunStore};

const FIXED_COLUMNS: [&str; 7] = [
    "id",
    "run_id",
    "machine_id",
    "endpoint_type",
    "restart_count",
    "clock_step_timestamp",
    "convergence_timestamp",
];

fn select_columns() -> String {
    FIXED_COLUMNS
        .iter()
        .chain(EndpointMetrics::COLUMNS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn endpoint_from_row(row: &Row<'_>) -> rusqlite::Result<Endpoint> {
    let offset = FIXED_COLUMNS.len();
    let values = (0..EndpointMetrics::COLUMNS.len())
        .map(|index| row.get::<_, Option<f64>>(offset + index))
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Endpoint {
        id: row.get(0)?,
        run_id: row.get(1)?,
        machine_id: row.get(2)?,
        endpoint_type: parsed_at(row, 3)?,
        restart_count: row.get(4)?,
        clock_step_timestamp: optional_timestamp_at(row, 5)?,
        convergence_timestamp: optional_timestamp_at(row, 6)?,
        metrics: EndpointMetrics::from_values(&values),
    })
}

impl RunStore {
    pub fn create_endpoint(
        &self,
        run_id: RunId,
        machine_id: &str,
        endpoint_type: EndpointType,
    ) -> Result<Endpoint> {
        let id = self.with_connection(|c| {
            c.execute(
                "INSERT INTO endpoints (run_id, machine_id, endpoint_type) VALUES (?1, ?2, ?3)",
                params![run_id, machine_id, endpoint_type.as_str()],
            )?;
            Ok(c.last_insert_rowid())
        })?;
        self.get_endpoint(id)
    }

    pub fn get_endpoint(&self, id: EndpointId) -> Result<Endpoint> {
        self.with_connection(|c| {
            c.query_row(
                &format!("SELECT {} FROM endpoints WHERE id = ?1", select_columns()),
                params![id],
                endpoint_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| Error::config_not_found(format!("endpoint {}", id)))
    }

    pub fn endpoints_of_run(&self, run_id: RunId) -> Result<Vec<Endpoint>> {
        self.with_connection(|c| {
            let mut statement = c.prepare(&format!(
                "SELECT {} FROM endpoints WHERE run_id = ?1 ORDER BY id",
                select_columns()
            ))?;
            let endpoints = statement
                .query_map(params![run_id], endpoint_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(endpoints)
        })
    }

    /// Processed, non-corrupted endpoints of `endpoint_type` across all runs
    /// of one benchmark, vendor and cluster.
    pub fn analyzed_endpoints(
        &self,
        benchmark_id: &str,
        vendor_id: &str,
        cluster_id: &str,
        endpoint_type: EndpointType,
    ) -> Result<Vec<Endpoint>> {
        let columns = select_columns()
            .split(", ")
            .map(|column| format!("e.{}", column))
            .collect::<Vec<_>>()
            .join(", ");
        self.with_connection(|c| {
            let mut statement = c.prepare(&format!(
                "SELECT {} FROM endpoints e JOIN runs r ON r.id = e.run_id \
                 WHERE r.benchmark_id = ?1 AND r.vendor_id = ?2 AND r.cluster_id = ?3 \
                 AND r.is_processed = 1 AND r.is_corrupted = 0 AND e.endpoint_type = ?4 \
                 ORDER BY e.id",
                columns
            ))?;
            let endpoints = statement
                .query_map(
                    params![benchmark_id, vendor_id, cluster_id, endpoint_type.as_str()],
                    endpoint_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(endpoints)
        })
    }

    pub fn set_restart_count(&self, id: EndpointId, restart_count: u32) -> Result<()> {
        self.with_connection(|c| {
            c.execute(
                "UPDATE endpoints SET restart_count = ?2 WHERE id = ?1",
                params![id, restart_count],
            )
        })?;
        Ok(())
    }

    /// Persists the analysis results of one endpoint.
    pub fn save_endpoint_metrics(
        &self,
        id: EndpointId,
        clock_step_timestamp: Option<DateTime<Utc>>,
        convergence_timestamp: Option<DateTime<Utc>>,
        metrics: &EndpointMetrics,
    ) -> Result<()> {
        let assignments = EndpointMetrics::COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{} = ?{}", column, index + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE endpoints SET clock_step_timestamp = ?2, convergence_timestamp = ?3, {} \
             WHERE id = ?1",
            assignments
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            id.into(),
            clock_step_timestamp.map(to_micros).into(),
            convergence_timestamp.map(to_micros).into(),
        ];
        values.extend(metrics.values().into_iter().map(rusqlite::types::Value::from));

        self.with_connection(|c| c.execute(&sql, params_from_iter(values)))?;
        Ok(())
    }

    /// Clears derived metrics ahead of a new analysis pass.
    pub fn reset_endpoint_metrics(&self, id: EndpointId) -> Result<()> {
        self.save_endpoint_metrics(id, None, None, &EndpointMetrics::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunKey;
    use ptp_perf_common::ErrorKind;

    #[test]
    fn test_endpoint_round_trip() {
        let store = RunStore::open_in_memory().unwrap();
        let run = store
            .create_run(&RunKey::new("base", "ptpd", "rpi-4"), Utc::now())
            .unwrap();
        let orchestrator = store
            .create_endpoint(run.id, "rpi-serv", EndpointType::Orchestrator)
            .unwrap();
        let slave = store
            .create_endpoint(run.id, "rpi08", EndpointType::PrimarySlave)
            .unwrap();
        assert_eq!(slave.metrics, EndpointMetrics::default());

        let step = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let metrics = EndpointMetrics {
            clock_diff_median: Some(2.5e-6),
            convergence_duration: Some(14.0),
            ..Default::default()
        };
        store
            .save_endpoint_metrics(slave.id, Some(step), None, &metrics)
            .unwrap();
        store.set_restart_count(slave.id, 2).unwrap();

        let slave = store.get_endpoint(slave.id).unwrap();
        assert_eq!(slave.metrics, metrics);
        assert_eq!(slave.clock_step_timestamp, Some(step));
        assert_eq!(slave.restart_count, 2);
        assert_eq!(slave.endpoint_type, EndpointType::PrimarySlave);

        let ids: Vec<_> = store
            .endpoints_of_run(run.id)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![orchestrator.id, slave.id]);

        store.reset_endpoint_metrics(slave.id).unwrap();
        assert_eq!(store.get_endpoint(slave.id).unwrap().metrics, EndpointMetrics::default());
    }

    #[test]
    fn test_deleting_run_cascades() {
        let store = RunStore::open_in_memory().unwrap();
        let run = store
            .create_run(&RunKey::new("base", "ptpd", "rpi-4"), Utc::now())
            .unwrap();
        let endpoint = store
            .create_endpoint(run.id, "rpi08", EndpointType::PrimarySlave)
            .unwrap();

        store.delete_run(run.id).unwrap();
        assert_eq!(
            store.get_endpoint(endpoint.id).unwrap_err().kind(),
            ErrorKind::ConfigNotFound
        );
    }

    #[test]
    fn test_analyzed_endpoints_skip_corrupted_runs() {
        let store = RunStore::open_in_memory().unwrap();
        let key = RunKey::new("base", "ptpd", "rpi-4");
        for corrupted in [false, true] {
            let run = store.create_run(&key, Utc::now()).unwrap();
            store
                .create_endpoint(run.id, "rpi08", EndpointType::PrimarySlave)
                .unwrap();
            store
                .create_endpoint(run.id, "rpi07", EndpointType::SecondarySlave)
                .unwrap();
            store.mark_processed(run.id, corrupted).unwrap();
        }

        let primaries = store
            .analyzed_endpoints("base", "ptpd", "rpi-4", EndpointType::PrimarySlave)
            .unwrap();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].machine_id, "rpi08");
    }
}
