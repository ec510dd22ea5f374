//! Detection of the point where the clock offset settles around zero.

use chrono::{DateTime, Duration, Utc};
use ptp_perf_common::{Error, Result};
use tracing::warn;

use crate::series::{duration_seconds, TimeSeries};
use crate::stats;

/// Convergence is never placed earlier than this many seconds after the
/// first sample.
pub const MINIMUM_CONVERGENCE_SECONDS: i64 = 10;
/// Samples per window of the rolling "currently converged" test.
pub const CONVERGED_WINDOW: usize = 15;
/// A window is converged with more sign changes than this.
pub const CONVERGED_WINDOW_SIGN_CHANGES: f64 = 3.0;

const MINIMUM_CONVERGED_SHARE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedConvergence {
    pub timestamp: DateTime<Utc>,
    /// Time from the first sample after the step until convergence.
    pub duration: Duration,
    /// Largest absolute offset before convergence, in seconds.
    pub max_offset: f64,
    /// `max_offset` per second of `duration`.
    pub rate: f64,
    pub converged_samples: Option<f64>,
    pub converged_share: Option<f64>,
}

impl DetectedConvergence {
    pub fn duration_seconds(&self) -> f64 {
        duration_seconds(self.duration)
    }
}

/// Sign change events between neighbouring values: 1 for a flip from
/// negative to positive or back, 0.5 for a change to or from zero.
fn sign_changes(series: &TimeSeries) -> Vec<f64> {
    let points = series.points();
    let mut changes = Vec::with_capacity(points.len());
    changes.push(0.0);
    changes.extend(
        points
            .windows(2)
            .map(|pair| (pair[1].value.signum() - pair[0].value.signum()).abs() as f64 / 2.0),
    );
    changes.truncate(points.len());
    changes
}

/// Whether each sample lies in a window of [`CONVERGED_WINDOW`] samples
/// with enough sign changes. Samples without a full window count as not
/// converged.
fn rolling_converged(changes: &[f64]) -> Vec<bool> {
    (0..changes.len())
        .map(|end| {
            end + 1 >= CONVERGED_WINDOW
                && changes[end + 1 - CONVERGED_WINDOW..=end].iter().sum::<f64>() > CONVERGED_WINDOW_SIGN_CHANGES
        })
        .collect()
}

/// Detects convergence in the clock offsets following the clock step.
///
/// The clock counts as converged at the `required_sign_changes`-th sign
/// change of its offset, and never sooner than
/// [`MINIMUM_CONVERGENCE_SECONDS`] after the first sample.
pub fn detect_convergence(
    after_step: &TimeSeries,
    required_sign_changes: usize,
    benchmark_duration: std::time::Duration,
) -> Result<DetectedConvergence> {
    let (Some(first), Some(last)) = (after_step.first_timestamp(), after_step.last_timestamp()) else {
        return Err(Error::profile_corrupt("no clock offsets after the clock step"));
    };

    let changes = sign_changes(after_step);
    let mut cumulative = 0.0;
    let initial = changes.iter().zip(after_step.points()).find_map(|(change, point)| {
        cumulative += change;
        (cumulative >= required_sign_changes as f64).then_some(point.timestamp)
    });
    let Some(initial) = initial else {
        return Err(Error::profile_corrupt(format!(
            "clock never converged, fewer than {} sign changes",
            required_sign_changes
        )));
    };

    let minimum = Duration::seconds(MINIMUM_CONVERGENCE_SECONDS);
    let timestamp = if initial - first < minimum {
        first + minimum
    } else {
        initial
    };
    if timestamp >= last {
        return Err(Error::profile_corrupt(format!(
            "profile ends at {} before convergence at {}",
            last, timestamp
        )));
    }

    let duration = timestamp - first;
    let max_offset = stats::max(&after_step.between(first, timestamp).abs_seconds()).unwrap_or(0.0);
    let rate = max_offset / duration_seconds(duration);

    let converged = rolling_converged(&changes);
    let after: Vec<bool> = after_step
        .points()
        .iter()
        .zip(converged)
        .filter(|(point, _)| point.timestamp > timestamp)
        .map(|(_, converged)| converged)
        .collect();
    let converged_count = after.iter().filter(|converged| **converged).count();
    let converged_share = (!after.is_empty()).then(|| converged_count as f64 / after.len() as f64);

    if let Some(share) = converged_share {
        if share < MINIMUM_CONVERGED_SHARE {
            warn!(
                "Clock diverged after converging ({:.0}% of samples in converged state).",
                share * 100.0
            );
        }
    }
    let remaining = last - timestamp;
    if duration_seconds(remaining) < benchmark_duration.as_secs_f64() / 2.0 {
        warn!(
            "Only {}s of the profile remain after convergence at {}.",
            remaining.num_seconds(),
            timestamp
        );
    }

    Ok(DetectedConvergence {
        timestamp,
        duration,
        max_offset,
        rate,
        converged_samples: Some(converged_count as f64),
        converged_share,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::testing::{at, series};
    use ptp_perf_common::ErrorKind;

    const BENCHMARK: std::time::Duration = std::time::Duration::from_secs(60);

    fn oscillating(settle: usize, total: usize) -> Vec<i64> {
        (0..total)
            .map(|i| {
                if i < settle {
                    -50_000 + (i as i64) * 100
                } else if i % 2 == 0 {
                    300
                } else {
                    -300
                }
            })
            .collect()
    }

    #[test]
    fn test_sign_changes() {
        let s = series(&[5, -5, 0, 5, 5]);
        assert_eq!(sign_changes(&s), vec![0.0, 1.0, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_converges_at_nth_sign_change() {
        let s = series(&oscillating(20, 80));
        let convergence = detect_convergence(&s, 5, BENCHMARK).unwrap();
        // Flips start between samples 19 and 20 (20 is positive), the 5th at 24.
        assert_eq!(convergence.timestamp, at(24.0));
        assert_eq!(convergence.duration, Duration::seconds(24));
        assert!((convergence.max_offset - 50e-6).abs() < 1e-12);
        assert_eq!(convergence.converged_share, Some(1.0));
        assert_eq!(convergence.converged_samples, Some(55.0));
    }

    #[test]
    fn test_clamps_early_convergence() {
        let s = series(&oscillating(0, 60));
        let convergence = detect_convergence(&s, 5, BENCHMARK).unwrap();
        assert_eq!(convergence.timestamp, at(10.0));
        assert!(convergence.rate > 0.0);
    }

    #[test]
    fn test_never_converging() {
        let values: Vec<i64> = (0..100).map(|i| -1_000_000 + i).collect();
        let err = detect_convergence(&series(&values), 5, BENCHMARK).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProfileCorrupt);
    }
}
