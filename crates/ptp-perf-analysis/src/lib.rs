//! # PTP-Perf Analysis
//!
//! Turns the log records of finished runs into samples, per-endpoint
//! metrics and per-benchmark summaries.
//!
//! For every endpoint of a run the pipeline parses the vendor output,
//! detects the initial clock step and the point of convergence, and derives
//! offset, path delay, fault recovery and resource metrics from the
//! converged part of the profile. Profiles that cannot be interpreted mark
//! their run corrupted; other failures leave the run for the next pass.
//!
//! ```no_run
//! use ptp_perf_analysis::Analyzer;
//! use ptp_perf_store::RunStore;
//!
//! # fn main() -> ptp_perf_common::Result<()> {
//! let store = RunStore::open("data/ptp-perf.sqlite3")?;
//! let report = Analyzer::new(store).analyze(false)?;
//! println!("{} runs processed", report.processed);
//! # Ok(())
//! # }
//! ```

pub mod clock_step;
pub mod convergence;
pub mod dataset;
pub mod faults;
pub mod log_writer;
pub mod pipeline;
pub mod resources;
pub mod series;
pub mod stats;
pub mod summary;

pub use clock_step::{detect_clock_step, DetectedClockStep};
pub use convergence::{detect_convergence, DetectedConvergence};
pub use dataset::export_dataset;
pub use faults::{process_fault_data, FaultWindow};
pub use log_writer::MarkdownOutputWriter;
pub use pipeline::{AnalysisReport, Analyzer, RunOutcome};
pub use series::{Point, TimeSeries};
pub use summary::SummaryBuilder;
