//! Detection of the initial clock step.
//!
//! Workers shift their clock by about a minute before the daemon starts, so
//! a healthy profile shows exactly one jump of roughly 60 seconds in its
//! first minutes.

use chrono::{DateTime, Duration, Utc};
use ptp_perf_common::{nanos_to_seconds, seconds_to_nanos, Error, Result};
use tracing::warn;

use crate::series::TimeSeries;

const EXPECTED_MAGNITUDE_SECONDS: std::ops::RangeInclusive<f64> = 50.0..=70.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedClockStep {
    pub timestamp: DateTime<Utc>,
    /// Absolute size of the step in seconds.
    pub magnitude: f64,
}

/// Finds jumps of at least one second between neighbouring clock offsets.
///
/// No step at all is tolerated and yields a synthetic step one second
/// before the first sample. More than `max_permissible_steps` steps make
/// the profile unusable.
pub fn detect_clock_step(series: &TimeSeries, max_permissible_steps: Option<usize>) -> Result<DetectedClockStep> {
    let series = series.trim_leading_zeros();
    let first = series
        .first_timestamp()
        .ok_or_else(|| Error::profile_corrupt("no clock offsets to detect a clock step in"))?;

    let threshold = seconds_to_nanos(1.0);
    let steps: Vec<(DateTime<Utc>, i64)> = series
        .points()
        .windows(2)
        .map(|pair| (pair[1].timestamp, (pair[1].value - pair[0].value).abs()))
        .filter(|(_, difference)| *difference >= threshold)
        .collect();

    if let Some(limit) = max_permissible_steps {
        if steps.len() > limit {
            return Err(Error::profile_corrupt(format!(
                "found {} clock steps, at most {} permitted",
                steps.len(),
                limit
            )));
        }
    }

    let Some((timestamp, difference)) = steps.first().copied() else {
        warn!("No clock step found in profile of length {}.", series.len());
        return Ok(DetectedClockStep {
            timestamp: first - Duration::seconds(1),
            magnitude: 0.0,
        });
    };

    let magnitude = nanos_to_seconds(difference);
    if !EXPECTED_MAGNITUDE_SECONDS.contains(&magnitude) {
        warn!("The clock step was not of a magnitude close to 1 minute: {:.3}s", magnitude);
    }
    if timestamp - first >= Duration::minutes(2) {
        warn!("The clock step was not within the first 2 minutes of runtime: {}", timestamp);
    }
    Ok(DetectedClockStep { timestamp, magnitude })
}
