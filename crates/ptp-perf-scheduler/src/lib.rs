//! Queue of shell tasks executed one at a time, mostly orchestrations.
//!
//! This crate provides:
//! - [`ScheduleQueue`]: queueing of single tasks and of the benchmark runs
//!   missing to reach a target run count
//! - [`Scheduler`]: the loop executing the queue with per-task timeouts
//! - [`report`]: the `info` and `available` listings

pub mod queue;
pub mod report;
pub mod runner;

pub use queue::{QueueBenchmarks, ScheduleQueue, DEFAULT_ORCHESTRATION_COMMAND};
pub use report::{render_available, render_info, TaskEta};
pub use runner::Scheduler;
