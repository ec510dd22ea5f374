//! Rows of the Run Store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ptp_perf_common::{EndpointId, EndpointType, RunId, SampleType};
use serde::{Deserialize, Serialize};

/// The (benchmark, vendor, cluster) triple identifying comparable runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub benchmark_id: String,
    pub vendor_id: String,
    pub cluster_id: String,
}

impl RunKey {
    pub fn new(
        benchmark_id: impl Into<String>,
        vendor_id: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            benchmark_id: benchmark_id.into(),
            vendor_id: vendor_id.into(),
            cluster_id: cluster_id.into(),
        }
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.benchmark_id, self.vendor_id, self.cluster_id)
    }
}

/// One execution of a benchmark with one vendor on one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub benchmark_id: String,
    pub vendor_id: String,
    pub cluster_id: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub is_successful: bool,
    pub is_processed: bool,
    pub is_corrupted: bool,
    pub log: Option<String>,
}

impl Run {
    pub fn key(&self) -> RunKey {
        RunKey::new(&self.benchmark_id, &self.vendor_id, &self.cluster_id)
    }
}

macro_rules! metric_columns {
    ($(#[$meta:meta])* $vis:vis struct $struct:ident { $($(#[$doc:meta])* $name:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        $vis struct $struct {
            $($(#[$doc])* pub $name: Option<f64>,)*
        }

        impl $struct {
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($name)),*];

            pub fn values(&self) -> Vec<Option<f64>> {
                vec![$(self.$name),*]
            }

            pub(crate) fn from_values(values: &[Option<f64>]) -> Self {
                let mut values = values.iter().copied();
                Self {
                    $($name: values.next().flatten(),)*
                }
            }
        }
    };
}

metric_columns! {
    /// Metrics derived by the analysis, all `None` until it ran.
    ///
    /// Durations are in seconds. Clock offsets and path delays are in
    /// seconds as well, converted from the nanosecond samples.
    pub struct EndpointMetrics {
        clock_diff_median,
        clock_diff_p05,
        clock_diff_p95,
        clock_diff_max,
        path_delay_median,
        path_delay_p05,
        path_delay_p95,
        path_delay_std,

        /// Sync intervals without a sample, summed over all large gaps.
        missing_samples,
        missing_samples_percent,

        clock_step_magnitude,

        convergence_duration,
        convergence_max_offset,
        convergence_rate,
        converged_samples,
        converged_percentage,

        /// Time between the fault start and end markers.
        fault_actual_duration,
        fault_clock_diff_pre_median,
        fault_clock_diff_pre_p95,
        fault_clock_diff_post_median,
        fault_clock_diff_post_p95,
        fault_clock_diff_post_max,
        fault_clock_diff_mid_max,
        fault_ratio_clock_diff_median,
        fault_ratio_clock_diff_p95,
        fault_ratio_clock_diff_post_max_pre_median,
        /// Seconds after the fault end until the offset settled again.
        fault_clock_diff_return_to_normal_time,

        proc_cpu_percent,
        proc_cpu_percent_user,
        proc_cpu_percent_system,
        proc_mem_uss,
        proc_mem_pss,
        proc_mem_rss,
        proc_mem_vms,
        proc_ctx_switches_voluntary,
        proc_ctx_switches_involuntary,
        sys_cpu_frequency,
        sys_sensors_temperature_cpu,
        sys_net_ptp_iface_bytes_sent,
        sys_net_ptp_iface_bytes_recv,
        sys_net_ptp_iface_packets_sent,
        sys_net_ptp_iface_packets_recv,
        sys_net_ptp_iface_bytes_total,
        sys_net_ptp_iface_packets_total,
        /// Seconds covered by the resource snapshots.
        resource_profile_length,
    }
}

/// One machine's participation in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub run_id: RunId,
    pub machine_id: String,
    pub endpoint_type: EndpointType,
    pub restart_count: i64,
    pub clock_step_timestamp: Option<DateTime<Utc>>,
    pub convergence_timestamp: Option<DateTime<Utc>>,
    pub metrics: EndpointMetrics,
}

/// A typed measurement derived from the log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub endpoint_id: EndpointId,
    pub timestamp: DateTime<Utc>,
    pub sample_type: SampleType,
    /// Nanoseconds, or 1/0 for fault start/end.
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub endpoint_id: EndpointId,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub message: String,
}

/// A warning or error raised while analysing a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisLogRecord {
    pub id: i64,
    pub run_id: RunId,
    pub level: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A queued shell command of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTask {
    pub id: i64,
    pub name: String,
    pub command: String,
    pub priority: i64,
    /// Priority before the task was marked running.
    pub original_priority: Option<i64>,
    pub paused: bool,
    pub estimated_time: Duration,
    pub slack_time: Duration,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub success: Option<bool>,
}

impl ScheduleTask {
    pub fn is_running(&self) -> bool {
        self.start_time.is_some() && self.completion_time.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.completion_time.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.estimated_time + self.slack_time
    }

    pub fn estimated_time_remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.start_time {
            Some(start) if self.is_running() => {
                let elapsed = (now - start).to_std().unwrap_or_default();
                self.estimated_time.saturating_sub(elapsed)
            }
            _ => self.estimated_time,
        }
    }
}

impl std::fmt::Display for ScheduleTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Fields of a task about to be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduleTask {
    pub name: String,
    pub command: String,
    pub priority: i64,
    pub paused: bool,
    pub estimated_time: Duration,
    pub slack_time: Duration,
}

impl NewScheduleTask {
    pub const DEFAULT_SLACK: Duration = Duration::from_secs(5 * 60);

    pub fn new(name: impl Into<String>, command: impl Into<String>, estimated_time: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            priority: 0,
            paused: false,
            estimated_time,
            slack_time: Self::DEFAULT_SLACK,
        }
    }

    /// A marker that holds the queue until it is unpaused or removed.
    pub fn pause() -> Self {
        Self {
            paused: true,
            ..Self::new("Pause", "true", Duration::ZERO)
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

metric_columns! {
    /// Aggregates over the primary slave endpoints of one [`RunKey`], in seconds.
    pub struct SummaryMetrics {
        clock_diff_p05,
        clock_diff_median,
        clock_diff_p95,
        clock_diff_p99,
        clock_diff_max,
        clock_diff_mean,
        path_delay_p05,
        path_delay_median,
        path_delay_p95,
        path_delay_p99,
        path_delay_max,
        path_delay_mean,
        path_delay_std,
        convergence_duration_mean,
        convergence_max_offset_mean,
        convergence_rate_mean,
        missing_samples_percent_primary,
        missing_samples_percent_all_slaves,
        fault_clock_diff_post_max_max,
        fault_clock_diff_post_max_min,
        fault_ratio_clock_diff_median_mean,
        fault_clock_diff_return_to_normal_time_mean,
        proc_cpu_percent_mean,
        proc_mem_uss_mean,
        sys_net_ptp_iface_bytes_total_mean,
    }
}

/// Aggregate statistics over all usable runs of one [`RunKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub key: RunKey,
    /// Number of primary slave endpoints aggregated.
    pub count: i64,
    pub metrics: SummaryMetrics,
}

impl BenchmarkSummary {
    pub fn empty(key: RunKey) -> Self {
        Self {
            key,
            count: 0,
            metrics: SummaryMetrics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_metric_columns_match_values() {
        let metrics = EndpointMetrics {
            clock_diff_median: Some(1.5),
            resource_profile_length: Some(60.0),
            ..Default::default()
        };
        let values = metrics.values();
        assert_eq!(values.len(), EndpointMetrics::COLUMNS.len());
        assert_eq!(EndpointMetrics::from_values(&values), metrics);
        assert_eq!(EndpointMetrics::COLUMNS[0], "clock_diff_median");
    }

    #[test]
    fn test_task_remaining_time() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut task = NewScheduleTask::new("t", "true", Duration::from_secs(600));
        task.priority = 3;
        let mut task = ScheduleTask {
            id: 1,
            name: task.name,
            command: task.command,
            priority: task.priority,
            original_priority: None,
            paused: false,
            estimated_time: task.estimated_time,
            slack_time: task.slack_time,
            start_time: None,
            completion_time: None,
            success: None,
        };
        assert_eq!(task.estimated_time_remaining(start), Duration::from_secs(600));
        assert_eq!(task.timeout(), Duration::from_secs(900));

        task.start_time = Some(start);
        let later = start + chrono::Duration::minutes(4);
        assert_eq!(task.estimated_time_remaining(later), Duration::from_secs(360));
        let much_later = start + chrono::Duration::minutes(40);
        assert_eq!(task.estimated_time_remaining(much_later), Duration::ZERO);
    }
}
