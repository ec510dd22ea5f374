//! Execution of benchmark runs across the testbed.
//!
//! This crate provides:
//! - [`Orchestrator`]: plans a run, starts one worker per cluster machine
//!   and records the outcome in the Run Store
//! - [`Worker`]: the per-endpoint side running the vendor, load generators
//!   and fault injection for the benchmark duration
//! - [`Remote`]: SSH, rsync and reboot helpers for the testbed machines
//!
//! ```no_run
//! use ptp_perf_config::PtpPerfConfig;
//! use ptp_perf_engine::{OrchestrationOptions, Orchestrator};
//! use ptp_perf_log_collection::initialize_logging;
//! use ptp_perf_store::RunStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PtpPerfConfig::load(None)?;
//! let store = RunStore::open(config.database_file())?;
//! let orchestrator = Orchestrator::new(config, store, initialize_logging(false));
//! let run = orchestrator
//!     .run(&OrchestrationOptions::new("test/test", "ptpd", "rpi-4"))
//!     .await?;
//! println!("Run {} successful: {}", run.id, run.is_successful);
//! # Ok(())
//! # }
//! ```

pub mod orchestrator;
pub mod remote;
pub mod worker;

pub use orchestrator::{OrchestrationOptions, Orchestrator, RunPlan, SshLauncher, WorkerLauncher};
pub use remote::Remote;
pub use worker::{Worker, WorkerContext, WorkerOptions};
