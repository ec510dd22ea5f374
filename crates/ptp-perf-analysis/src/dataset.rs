//! The gzip JSON dataset of processed runs.

use std::path::PathBuf;

use ptp_perf_common::Result;
use ptp_perf_config::Paths;
use ptp_perf_store::{export_run, RunFilter, RunStore};
use tracing::info;

/// Writes every processed run below the dataset directory and returns the
/// written files.
pub fn export_dataset(store: &RunStore, paths: &Paths) -> Result<Vec<PathBuf>> {
    let filter = RunFilter {
        running: Some(false),
        processed: Some(true),
        ..Default::default()
    };
    let runs = store.list_runs(&filter)?;
    info!("Exporting {} runs to {}", runs.len(), paths.dataset_dir().display());

    let mut written = Vec::with_capacity(runs.len());
    for run in runs {
        let path = paths.dataset_file(&run.benchmark_id, &run.vendor_id, run.id);
        export_run(store, run.id, &path)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ptp_perf_store::{RunExport, RunKey};

    #[test]
    fn test_only_processed_runs_are_exported() {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths::new(root.path());
        let store = RunStore::open_in_memory().unwrap();
        let key = RunKey::new("base", "ptpd", "rpi-4");

        let processed = store.create_run(&key, Utc::now()).unwrap();
        store
            .finalize_run(processed.id, Utc::now() + chrono::Duration::seconds(1), true, None)
            .unwrap();
        store.mark_processed(processed.id, false).unwrap();
        let pending = store.create_run(&key, Utc::now()).unwrap();
        store.finalize_run(pending.id, Utc::now(), true, None).unwrap();

        let written = export_dataset(&store, &paths).unwrap();
        assert_eq!(written, vec![paths.dataset_file("base", "ptpd", processed.id)]);
        assert_eq!(RunExport::read(&written[0]).unwrap().run.id, processed.id);
    }
}
