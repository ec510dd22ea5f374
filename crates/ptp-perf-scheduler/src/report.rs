//! Plain-text reports printed by the scheduler CLI.

use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use ptp_perf_config::BenchmarkDb;
use ptp_perf_store::ScheduleTask;
use ptp_perf_vendor::VendorDb;

/// One pending task with its expected completion.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEta {
    pub task: ScheduleTask,
    pub remaining: Duration,
    pub eta: DateTime<Utc>,
}

/// Expected completion of each pending task, executed in queue order from
/// `now`.
pub fn estimate(pending: &[ScheduleTask], now: DateTime<Utc>) -> Vec<TaskEta> {
    let mut eta = now;
    pending
        .iter()
        .map(|task| {
            let remaining = task.estimated_time_remaining(now);
            eta += chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
            TaskEta {
                task: task.clone(),
                remaining,
                eta,
            }
        })
        .collect()
}

/// `H:MM:SS`, hours unbounded.
pub fn format_hms(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}

pub fn render_info(pending: &[ScheduleTask], now: DateTime<Utc>) -> String {
    let estimates = estimate(pending, now);
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:<50}  {:>20}  {:>20}", "Id", "Name", "Est. Time Remaining", "ETA");
    for estimate in &estimates {
        let task = &estimate.task;
        let mut name = task.name.clone();
        if task.is_running() {
            name.push_str(" (running)");
        } else if task.paused {
            name.push_str(" (paused)");
        }
        let _ = writeln!(
            out,
            "{:>4}  {:<50}  {:>20}  {:>20}",
            task.id,
            name,
            format_hms(estimate.remaining),
            estimate.eta.with_timezone(&Local).format("%H:%M")
        );
    }
    let total = estimates
        .last()
        .map(|last| (last.eta - now).to_std().unwrap_or_default())
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "Estimated completion of {} tasks in {}",
        estimates.len(),
        format_hms(total)
    );
    out
}

/// Registered benchmarks and vendors, vendors with their installation state.
pub fn render_available() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Benchmarks:");
    for benchmark in BenchmarkDb::all() {
        let _ = writeln!(out, "  {:<50}  {}", benchmark.id, benchmark.name);
    }
    let _ = writeln!(out, "Vendors:");
    for vendor in VendorDb::all() {
        let state = if vendor.installed() { "installed" } else { "not installed" };
        let _ = writeln!(out, "  {:<20}  {:<30}  {}", vendor.id, vendor.name, state);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_perf_store::{NewScheduleTask, RunStore};

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_hms(Duration::from_secs(20 * 60)), "0:20:00");
        assert_eq!(format_hms(Duration::from_secs(26 * 3600 + 61)), "26:01:01");
    }

    #[test]
    fn test_estimates_accumulate() {
        let store = RunStore::open_in_memory().unwrap();
        // The store keeps microseconds.
        let now = DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap();
        let running = store
            .add_task(&NewScheduleTask::new("first", "true", Duration::from_secs(600)))
            .unwrap();
        store
            .add_task(&NewScheduleTask::new("second", "true", Duration::from_secs(300)))
            .unwrap();
        store
            .mark_task_running(running.id, now - chrono::Duration::seconds(120))
            .unwrap();

        let estimates = estimate(&store.pending_tasks().unwrap(), now);
        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates[0].task.id, running.id);
        assert_eq!(estimates[0].remaining, Duration::from_secs(480));
        assert_eq!(estimates[1].eta - now, chrono::Duration::seconds(780));

        let info = render_info(&store.pending_tasks().unwrap(), now);
        assert!(info.contains("first (running)"));
        assert!(info.contains("Estimated completion of 2 tasks in 0:13:00"));
    }

    #[test]
    fn test_available_lists_registries() {
        let available = render_available();
        assert!(available.contains("test/test"));
        assert!(available.contains("ptpd"));
        assert!(available.contains("installed"));
    }
}
