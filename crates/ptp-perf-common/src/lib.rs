//! # PTP-Perf Common
//!
//! Types and errors shared across the PTP-Perf workspace.
//!
//! This crate provides:
//! - The workspace [`Error`] type with one variant per failure kind
//! - Endpoint roles, vendor client types and sample kinds
//! - Unit conversions between seconds and nanoseconds

pub mod errors;
pub mod types;
pub mod units;

pub use errors::{Error, ErrorKind, Result, ResultExt};
pub use types::{ClientType, EndpointId, EndpointType, RunId, SampleType};
pub use units::{nanos_to_seconds, seconds_to_nanos, NANOS_PER_SECOND};
