//! Unit conversions for sample values.
//!
//! Samples are stored as signed integer nanoseconds; derived metrics are
//! stored as floating point seconds.

pub const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Converts a value in seconds to rounded integer nanoseconds.
pub fn seconds_to_nanos(seconds: f64) -> i64 {
    (seconds * NANOS_PER_SECOND).round() as i64
}

/// Converts integer nanoseconds to floating point seconds.
pub fn nanos_to_seconds(nanos: i64) -> f64 {
    nanos as f64 / NANOS_PER_SECOND
}
