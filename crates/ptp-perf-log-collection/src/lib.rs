//! # PTP-Perf Log Collection
//!
//! Log capture and fan-out for the PTP-Perf binaries.
//!
//! This crate provides:
//! - [`LogEntry`], the flattened form of a tracing event
//! - The [`OutputWriter`] trait with file and in-memory implementations
//! - [`LogCollectionService`], a tracing layer whose writers can be
//!   installed and uninstalled for the lifetime of a run
//! - [`initialize_logging`], the subscriber setup shared by all binaries

pub mod init;
pub mod output;
pub mod service;
pub mod types;

pub use init::{initialize_logging, log_exceptions, LOG_EXCEPTIONS_ENV};
pub use output::{CircularBufferOutputWriter, FileOutputWriter, OutputWriter};
pub use service::{InstalledWriter, LogCollectionLayer, LogCollectionService};
pub use types::{LogEntry, LogLevel};
