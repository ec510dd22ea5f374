//! Log writers persisting events into the Run Store.

use ptp_perf_common::{EndpointId, Result, RunId};
use ptp_perf_log_collection::{LogEntry, LogLevel, OutputWriter};

use crate::store::RunStore;

/// Stores every event as a log record of one endpoint.
pub struct StoreLogWriter {
    store: RunStore,
    endpoint_id: EndpointId,
}

impl StoreLogWriter {
    pub fn new(store: RunStore, endpoint_id: EndpointId) -> Self {
        Self { store, endpoint_id }
    }
}

impl OutputWriter for StoreLogWriter {
    fn write(&mut self, entry: &LogEntry) -> Result<()> {
        self.store
            .insert_log_record(self.endpoint_id, entry.timestamp, &entry.source, &entry.message)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Stores warnings and errors raised while analysing one run.
pub struct AnalysisLogWriter {
    store: RunStore,
    run_id: RunId,
}

impl AnalysisLogWriter {
    pub const MIN_LEVEL: LogLevel = LogLevel::Warn;

    pub fn new(store: RunStore, run_id: RunId) -> Self {
        Self { store, run_id }
    }
}

impl OutputWriter for AnalysisLogWriter {
    fn write(&mut self, entry: &LogEntry) -> Result<()> {
        if entry.level < Self::MIN_LEVEL {
            return Ok(());
        }
        self.store.insert_analysis_log_record(
            self.run_id,
            entry.level.as_str(),
            entry.timestamp,
            &entry.message,
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
