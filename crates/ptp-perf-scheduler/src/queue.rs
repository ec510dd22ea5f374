//! Queueing of tasks and benchmark runs.

use std::time::Duration;

use ptp_perf_common::Result;
use ptp_perf_config::{Benchmark, BenchmarkDb};
use ptp_perf_invoke::shell_join;
use ptp_perf_store::{NewScheduleTask, RunFilter, RunKey, RunStore, ScheduleTask};
use ptp_perf_vendor::{Vendor, VendorDb};
use tracing::info;

/// Orchestration entry point used in queued benchmark commands.
pub const DEFAULT_ORCHESTRATION_COMMAND: &str = "target/release/run_orchestration";

/// Request to top up the run count of matching benchmarks.
#[derive(Debug, Clone)]
pub struct QueueBenchmarks {
    /// Anchored regular expression over benchmark ids.
    pub benchmark_regex: String,
    /// Vendor ids, all analysed vendors when empty.
    pub vendors: Vec<String>,
    pub clusters: Vec<String>,
    /// Runs wanted per (benchmark, vendor, cluster), counting usable runs
    /// already stored.
    pub target_count: usize,
    pub priority: i64,
    pub duration: Option<Duration>,
    pub test_mode: bool,
    pub analyze: bool,
    /// Appends a pause marker holding the queue after the new tasks.
    pub add_pause: bool,
    pub orchestration_command: String,
}

impl QueueBenchmarks {
    pub fn new(benchmark_regex: impl Into<String>, clusters: Vec<String>) -> Self {
        Self {
            benchmark_regex: benchmark_regex.into(),
            vendors: Vec::new(),
            clusters,
            target_count: 1,
            priority: 0,
            duration: None,
            test_mode: false,
            analyze: false,
            add_pause: false,
            orchestration_command: DEFAULT_ORCHESTRATION_COMMAND.to_string(),
        }
    }

    fn vendors(&self) -> Result<Vec<&'static Vendor>> {
        if self.vendors.is_empty() {
            return Ok(VendorDb::analyzed());
        }
        self.vendors.iter().map(|id| VendorDb::get(id)).collect()
    }

    /// The orchestration command line of one run.
    pub fn command(&self, benchmark: &Benchmark, vendor: &Vendor, cluster_id: &str) -> String {
        let mut args = vec![
            self.orchestration_command.clone(),
            "--benchmark".to_string(),
            benchmark.id.clone(),
            "--vendor".to_string(),
            vendor.id.to_string(),
            "--cluster".to_string(),
            cluster_id.to_string(),
        ];
        if let Some(duration) = self.duration {
            args.push("--duration".to_string());
            // Whole minutes on the command line, partial minutes round up.
            args.push(duration.as_secs().div_ceil(60).to_string());
        }
        if self.test_mode {
            args.push("--test".to_string());
        }
        if self.analyze {
            args.push("--analyze".to_string());
        }
        format!("LOG_EXCEPTIONS=1 {}", shell_join(&args))
    }
}

/// The scheduler's view on the Run Store queue.
pub struct ScheduleQueue<'a> {
    store: &'a RunStore,
}

impl<'a> ScheduleQueue<'a> {
    pub fn new(store: &'a RunStore) -> Self {
        Self { store }
    }

    pub fn queue_task(&self, task: &NewScheduleTask) -> Result<ScheduleTask> {
        let task = self.store.add_task(task)?;
        info!(task_id = task.id, "Scheduled task {}: {}", task.id, task.command);
        Ok(task)
    }

    /// Queues the runs missing to reach the target count of every matching
    /// (benchmark, vendor, cluster). Returns the queued tasks.
    pub fn queue_benchmarks(&self, request: &QueueBenchmarks) -> Result<Vec<ScheduleTask>> {
        let benchmarks = BenchmarkDb::matching(&request.benchmark_regex)?;
        let vendors = request.vendors()?;
        if benchmarks.is_empty() {
            info!("No benchmark matches '{}'", request.benchmark_regex);
        }

        let mut queued = Vec::new();
        for benchmark in &benchmarks {
            for vendor in &vendors {
                for cluster_id in &request.clusters {
                    let key = RunKey::new(benchmark.id.as_str(), vendor.id, cluster_id.as_str());
                    let existing = self.store.count_runs(&RunFilter::usable(key.clone()))?;
                    let missing = request.target_count.saturating_sub(existing);
                    info!("{}: {} of {} runs exist, queueing {}", key, existing, request.target_count, missing);

                    let duration = request.duration.unwrap_or(benchmark.duration);
                    for _ in 0..missing {
                        let task = NewScheduleTask::new(
                            format!("{} ({}, {})", benchmark.name, vendor.name, cluster_id),
                            request.command(benchmark, vendor, cluster_id),
                            duration,
                        )
                        .with_priority(request.priority);
                        queued.push(self.queue_task(&task)?);
                    }
                }
            }
        }

        if request.add_pause {
            queued.push(self.queue_task(&NewScheduleTask::pause().with_priority(request.priority))?);
        }
        Ok(queued)
    }
}
