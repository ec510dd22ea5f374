//! # PTP-Perf Invoke
//!
//! Supervision of external processes and composition of concurrent
//! activities.
//!
//! This crate provides:
//! - [`Invocation`]: launches one child process, drains its output into the
//!   log, restarts it on demand or when kept alive, and terminates it with a
//!   bounded grace period
//! - [`InvocationHandle`]: a shared view on a running invocation used to
//!   request restarts from other activities
//! - [`TaskGroup`]: runs several activities under one cancellation scope with
//!   first-exit, all-exit and timeout semantics

pub mod invocation;
pub mod task_group;

pub use invocation::{shell_join, Invocation, InvocationHandle};
pub use task_group::{GroupOutcome, TaskGroup};
