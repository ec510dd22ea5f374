//! Time-indexed sample series.

use chrono::{DateTime, Duration, Utc};
use ptp_perf_common::{nanos_to_seconds, Error, Result};
use ptp_perf_store::Sample;

/// One value per timestamp, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub value: i64,
}

impl Point {
    pub fn seconds(&self) -> f64 {
        nanos_to_seconds(self.value)
    }

    pub fn abs_seconds(&self) -> f64 {
        self.seconds().abs()
    }
}

/// Samples of one kind ordered by time.
///
/// A series is only built through [`TimeSeries::from_samples`], which
/// rejects unordered or duplicated timestamps, so every other operation may
/// rely on strictly increasing timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeries {
    points: Vec<Point>,
}

/// Missing-data figures of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissingSamples {
    /// Sync intervals without a sample inside the large gaps.
    pub count: f64,
    /// Share of the covered time lost to large gaps.
    pub percent: f64,
}

impl TimeSeries {
    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        let points: Vec<Point> = samples
            .iter()
            .map(|sample| Point {
                timestamp: sample.timestamp,
                value: sample.value,
            })
            .collect();
        Self::from_points(points)
    }

    pub fn from_points(points: Vec<Point>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].timestamp == pair[0].timestamp {
                return Err(Error::profile_corrupt(format!(
                    "duplicate sample timestamp {}",
                    pair[1].timestamp
                )));
            }
            if pair[1].timestamp < pair[0].timestamp {
                return Err(Error::profile_corrupt(format!(
                    "samples not monotonic: {} follows {}",
                    pair[1].timestamp, pair[0].timestamp
                )));
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// The series without its leading zero values.
    pub fn trim_leading_zeros(&self) -> TimeSeries {
        let start = self
            .points
            .iter()
            .position(|p| p.value != 0)
            .unwrap_or(self.points.len());
        TimeSeries {
            points: self.points[start..].to_vec(),
        }
    }

    /// Points strictly after `timestamp`.
    pub fn after(&self, timestamp: DateTime<Utc>) -> TimeSeries {
        self.filter(|p| p.timestamp > timestamp)
    }

    /// Points at or after `timestamp`.
    pub fn since(&self, timestamp: DateTime<Utc>) -> TimeSeries {
        self.filter(|p| p.timestamp >= timestamp)
    }

    /// Points in `[start, end]`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeSeries {
        self.filter(|p| p.timestamp >= start && p.timestamp <= end)
    }

    fn filter(&self, predicate: impl Fn(&Point) -> bool) -> TimeSeries {
        TimeSeries {
            points: self.points.iter().copied().filter(|p| predicate(p)).collect(),
        }
    }

    pub fn seconds(&self) -> Vec<f64> {
        self.points.iter().map(Point::seconds).collect()
    }

    pub fn abs_seconds(&self) -> Vec<f64> {
        self.points.iter().map(Point::abs_seconds).collect()
    }

    /// Sums the gaps of at least `3 × sync_interval` between neighbouring
    /// samples.
    pub fn missing_samples(&self, sync_interval: Duration) -> Option<MissingSamples> {
        let covered = self.last_timestamp()? - self.first_timestamp()?;
        let threshold = sync_interval * 3;
        let missing: Duration = self
            .points
            .windows(2)
            .map(|pair| pair[1].timestamp - pair[0].timestamp)
            .filter(|gap| *gap >= threshold)
            .fold(Duration::zero(), |total, gap| total + gap);

        let interval_seconds = duration_seconds(sync_interval);
        let covered_seconds = duration_seconds(covered);
        if interval_seconds <= 0.0 || covered_seconds <= 0.0 {
            return None;
        }
        Some(MissingSamples {
            count: duration_seconds(missing) / interval_seconds,
            percent: duration_seconds(missing) / covered_seconds,
        })
    }
}

pub fn duration_seconds(duration: Duration) -> f64 {
    duration
        .num_nanoseconds()
        .map(|nanos| nanos as f64 / 1e9)
        .unwrap_or_else(|| duration.num_milliseconds() as f64 / 1e3)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn at(second: f64) -> DateTime<Utc> {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        base + Duration::nanoseconds((second * 1e9).round() as i64)
    }

    /// A series sampled once per second starting at `at(0.0)`.
    pub fn series(values: &[i64]) -> TimeSeries {
        TimeSeries::from_points(
            values
                .iter()
                .enumerate()
                .map(|(i, value)| Point {
                    timestamp: at(i as f64),
                    value: *value,
                })
                .collect(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{at, series};
    use super::*;
    use ptp_perf_common::ErrorKind;

    #[test]
    fn test_rejects_unordered_timestamps() {
        let points = vec![
            Point { timestamp: at(1.0), value: 1 },
            Point { timestamp: at(0.0), value: 2 },
        ];
        let err = TimeSeries::from_points(points).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProfileCorrupt);

        let duplicate = vec![
            Point { timestamp: at(1.0), value: 1 },
            Point { timestamp: at(1.0), value: 2 },
        ];
        assert!(TimeSeries::from_points(duplicate).unwrap_err().is_profile_corrupt());
    }

    #[test]
    fn test_missing_samples() {
        let mut points: Vec<Point> = series(&[1; 10]).points().to_vec();
        // Remove seconds 4..=7, leaving a five second gap.
        points.retain(|p| p.timestamp < at(4.0) || p.timestamp > at(7.0));
        let gappy = TimeSeries::from_points(points).unwrap();

        let missing = gappy.missing_samples(Duration::seconds(1)).unwrap();
        assert_eq!(missing.count, 5.0);
        assert!((missing.percent - 5.0 / 9.0).abs() < 1e-12);

        let complete = series(&[1; 10]).missing_samples(Duration::seconds(1)).unwrap();
        assert_eq!(complete.count, 0.0);
    }

    #[test]
    fn test_trim_and_slices() {
        let s = series(&[0, 0, 5, -3, 2]);
        let trimmed = s.trim_leading_zeros();
        assert_eq!(trimmed.len(), 3);
        assert_eq!(trimmed.first_timestamp(), Some(at(2.0)));
        assert_eq!(s.after(at(2.0)).len(), 2);
        assert_eq!(s.since(at(2.0)).len(), 3);
        assert_eq!(s.between(at(1.0), at(3.0)).len(), 3);
    }
}
