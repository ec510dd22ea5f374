//! # PTP-Perf Store
//!
//! The SQLite Run Store shared by orchestrator, workers, analysis and
//! scheduler.
//!
//! This crate provides:
//! - [`RunStore`], a cloneable handle on one database connection
//! - Entity types: [`Run`], [`Endpoint`], [`Sample`], [`LogRecord`],
//!   [`AnalysisLogRecord`], [`ScheduleTask`] and [`BenchmarkSummary`]
//! - [`StoreLogWriter`] and [`AnalysisLogWriter`], log writers persisting
//!   tracing events as records
//! - Export of runs into the gzip JSON dataset

pub mod endpoints;
pub mod export;
pub mod log_writer;
pub mod logs;
pub mod models;
pub mod runs;
pub mod samples;
pub mod schedule;
mod schema;
pub mod store;
pub mod summary;

pub use export::{export_run, EndpointExport, RunExport};
pub use log_writer::{AnalysisLogWriter, StoreLogWriter};
pub use models::{
    AnalysisLogRecord, BenchmarkSummary, Endpoint, EndpointMetrics, LogRecord, NewScheduleTask, Run,
    RunKey, Sample, ScheduleTask, SummaryMetrics,
};
pub use runs::RunFilter;
pub use schedule::RUNNING_PRIORITY;
pub use store::RunStore;
