//! The benchmark side of one endpoint, started remotely by the orchestrator.

use std::time::Duration;

use ptp_perf_adapters::{CpuPerformanceDegrader, NetworkPerformanceDegrader, ResourceMonitor, SoftwareFaultGenerator};
use ptp_perf_common::{EndpointId, Error, Result};
use ptp_perf_config::{format_duration, Benchmark, BenchmarkDb, Cluster, Machine, Paths, PtpPerfConfig};
use ptp_perf_invoke::{GroupOutcome, Invocation, TaskGroup};
use ptp_perf_log_collection::LogCollectionService;
use ptp_perf_store::{Endpoint, Run, RunStore, StoreLogWriter};
use ptp_perf_vendor::{systemd_ntp, Vendor, VendorContext, VendorDb, VendorHandle};
use tracing::{error, info, warn};

/// Upper bound of the NTP synchronization before the benchmark starts.
pub const NTP_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Replaces the benchmark duration, as passed on by the orchestrator.
    pub duration: Option<Duration>,
    /// Skips the NTP synchronization and the initial clock offset.
    pub skip_time_sync: bool,
}

/// Everything the worker of one endpoint resolved from the store and the
/// configuration.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub endpoint: Endpoint,
    pub run: Run,
    pub benchmark: Benchmark,
    pub vendor: &'static Vendor,
    pub cluster: Cluster,
    pub machine: Machine,
    pub paths: Paths,
}

impl WorkerContext {
    pub fn vendor_context(&self) -> VendorContext<'_> {
        VendorContext {
            benchmark: &self.benchmark,
            machine: &self.machine,
            cluster: &self.cluster,
            paths: &self.paths,
        }
    }

    /// Whether the software faults of the benchmark target this machine.
    pub fn receives_software_faults(&self) -> bool {
        self.benchmark.fault_software && self.benchmark.fault_location == Some(self.machine.endpoint_type)
    }
}

pub struct Worker {
    config: PtpPerfConfig,
    store: RunStore,
    log_collection: LogCollectionService,
}

impl Worker {
    pub fn new(config: PtpPerfConfig, store: RunStore, log_collection: LogCollectionService) -> Self {
        Self {
            config,
            store,
            log_collection,
        }
    }

    pub fn resolve(&self, endpoint_id: EndpointId, options: &WorkerOptions) -> Result<WorkerContext> {
        let endpoint = self.store.get_endpoint(endpoint_id)?;
        let run = self.store.get_run(endpoint.run_id)?;
        if !run.is_running {
            return Err(Error::invalid_state(format!("run {}", run.id), "already finished"));
        }

        let mut benchmark = BenchmarkDb::get(&run.benchmark_id)?;
        if let Some(duration) = options.duration {
            benchmark = benchmark.with_duration(duration);
        }
        let vendor = VendorDb::get(&run.vendor_id)?;
        let cluster = self.config.cluster(&run.cluster_id)?.subset(benchmark.num_machines);
        let machine = cluster.machine_by_id(&endpoint.machine_id)?.clone();
        if machine.endpoint_type != endpoint.endpoint_type {
            return Err(Error::validation(format!(
                "Endpoint {} is a {} but machine {} is declared as {}",
                endpoint.id, endpoint.endpoint_type, machine.id, machine.endpoint_type
            )));
        }

        Ok(WorkerContext {
            endpoint,
            run,
            benchmark,
            vendor,
            cluster,
            machine,
            paths: self.config.paths(),
        })
    }

    /// Runs the benchmark of `endpoint_id` for the benchmark duration.
    ///
    /// Every event logged meanwhile is stored with the endpoint.
    pub async fn run(&self, endpoint_id: EndpointId, options: &WorkerOptions) -> Result<()> {
        let _store_log = self
            .log_collection
            .install(StoreLogWriter::new(self.store.clone(), endpoint_id));

        let context = self.resolve(endpoint_id, options)?;
        info!(
            endpoint_id,
            "Worker of {} ({}) starting run {}",
            context.machine.id,
            context.machine.endpoint_type,
            context.run.id
        );

        if let Some(path) = context.vendor.create_configuration_file(&context.vendor_context())? {
            info!("Created {} configuration {}", context.vendor, path.display());
        }
        if options.skip_time_sync {
            info!("Skipping initial time synchronization.");
        } else {
            synchronize_time(&context).await?;
        }

        let (mut group, vendor) = self.activities(&context)?;
        let result = self.benchmark(&context, &mut group).await;

        info!("Stopping background tasks...");
        let stopped = group.cancel_pending().await;
        if let Err(e) = &stopped {
            error!(endpoint_id, "Benchmark {} failed: {}", context.run.id, e);
        }
        self.store.set_restart_count(endpoint_id, vendor.restart_count())?;
        result.and(stopped)
    }

    async fn benchmark(&self, context: &WorkerContext, group: &mut TaskGroup) -> Result<()> {
        info!("Benchmarking for {}...", format_duration(context.benchmark.duration));
        match group.run(Some(context.benchmark.duration), false).await {
            GroupOutcome::TimedOut => Ok(()),
            GroupOutcome::FirstCompleted(label) => {
                warn!("{} ended before the benchmark did", label);
                Err(Error::invalid_state(label, "ended before the benchmark duration"))
            }
            outcome => Err(Error::invalid_state(
                format!("endpoint {}", context.endpoint.id),
                format!("unexpected benchmark outcome {:?}", outcome),
            )),
        }
    }

    /// The vendor and its sibling activities, already started.
    fn activities(&self, context: &WorkerContext) -> Result<(TaskGroup, VendorHandle)> {
        let benchmark = &context.benchmark;
        let mut group = TaskGroup::new(format!("endpoint {}", context.endpoint.id));

        if benchmark.artificial_load_network > 0 {
            let iperf = NetworkPerformanceDegrader::new(benchmark, &context.machine, &context.cluster)?;
            group.add("iperf", move |cancel| iperf.run(cancel));
        }
        if benchmark.artificial_load_cpu > 0 {
            let stress = CpuPerformanceDegrader::new(benchmark, &context.machine)?;
            group.add("stress-ng", move |cancel| stress.run(cancel));
        }

        let processes = context.vendor.prepare(&context.vendor_context())?;
        let vendor = processes.handle();

        if context.receives_software_faults() {
            let (Some(interval), Some(duration)) = (benchmark.fault_interval, benchmark.fault_duration) else {
                return Err(Error::validation(format!(
                    "Benchmark {} injects software faults without interval and duration",
                    benchmark.id
                )));
            };
            let faults = SoftwareFaultGenerator::new(context.machine.id.as_str(), interval, duration, vendor.clone());
            group.add("software faults", move |cancel| faults.run(cancel));
        }
        if benchmark.monitor_resource_consumption {
            let monitor = ResourceMonitor::new(vendor.clone());
            group.add("resource monitor", move |cancel| monitor.run(cancel));
        }

        info!("Starting {}...", context.vendor);
        group.add(context.vendor.name, move |cancel| processes.run(cancel));
        Ok((group, vendor))
    }
}

/// Brings the clock close to NTP time, then applies the machine's initial
/// clock offset.
pub async fn synchronize_time(context: &WorkerContext) -> Result<()> {
    info!("Starting initial time synchronization via SystemD-NTP.");
    systemd_ntp::toggle_ntp_service(true).await?;
    if let Err(e) = systemd_ntp::wait_synchronized(NTP_SYNC_TIMEOUT).await {
        info!("Continuing without NTP synchronization: {}", e);
    }
    systemd_ntp::toggle_ntp_service(false).await?;

    if let Some(offset) = initial_clock_offset(context) {
        info!("Adjusting node {} time by {}.", context.machine, offset);
        jmptime(&context.paths, offset).run().await?;
    }
    info!("{} time is now {}", context.machine, chrono::Local::now());
    Ok(())
}

fn initial_clock_offset(context: &WorkerContext) -> Option<chrono::Duration> {
    if context.benchmark.setup_use_initial_clock_offset {
        context.machine.initial_clock_offset
    } else {
        None
    }
}

/// Shifts the system clock by `offset`.
pub fn jmptime(paths: &Paths, offset: chrono::Duration) -> Invocation {
    let seconds = offset.num_milliseconds() as f64 / 1000.0;
    Invocation::of_command([paths.jmptime().display().to_string(), seconds.to_string()])
        .as_privileged()
        .set_working_directory(paths.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ptp_perf_common::EndpointType;
    use ptp_perf_store::RunKey;

    const CONFIG: &str = r#"
repository_root: /srv/ptp-perf
machines:
  - id: rpi06
    endpoint_type: master
    ptp_interface: eth0
  - id: rpi08
    endpoint_type: primary-slave
    ptp_interface: eth0
    initial_clock_offset: -1m
clusters:
  - id: rpi-4
    name: Raspberry Pi 4
    machines: [rpi06, rpi08]
"#;

    fn worker() -> Worker {
        Worker::new(
            PtpPerfConfig::load_from_string(CONFIG).unwrap(),
            RunStore::open_in_memory().unwrap(),
            LogCollectionService::new(),
        )
    }

    fn endpoint(worker: &Worker, benchmark_id: &str, machine_id: &str, endpoint_type: EndpointType) -> Endpoint {
        let run = worker
            .store
            .create_run(&RunKey::new(benchmark_id, "ptpd", "rpi-4"), Utc::now())
            .unwrap();
        worker.store.create_endpoint(run.id, machine_id, endpoint_type).unwrap()
    }

    #[test]
    fn test_resolve_endpoint() {
        let worker = worker();
        let slave = endpoint(&worker, "test/test", "rpi08", EndpointType::PrimarySlave);
        let options = WorkerOptions {
            duration: Some(Duration::from_secs(90)),
            skip_time_sync: true,
        };

        let context = worker.resolve(slave.id, &options).unwrap();
        assert_eq!(context.machine.id, "rpi08");
        assert_eq!(context.benchmark.duration, Duration::from_secs(90));
        assert_eq!(context.vendor.id, "ptpd");
        assert!(!context.receives_software_faults());
        assert_eq!(
            initial_clock_offset(&context).is_some(),
            context.benchmark.setup_use_initial_clock_offset
        );
    }

    #[test]
    fn test_resolve_rejects_mismatched_role() {
        let worker = worker();
        let wrong = endpoint(&worker, "test/test", "rpi08", EndpointType::Master);
        assert!(worker.resolve(wrong.id, &WorkerOptions::default()).is_err());
    }

    #[test]
    fn test_resolve_rejects_finished_run() {
        let worker = worker();
        let slave = endpoint(&worker, "test/test", "rpi08", EndpointType::PrimarySlave);
        worker.store.finalize_run(slave.run_id, Utc::now(), true, None).unwrap();
        assert!(worker.resolve(slave.id, &WorkerOptions::default()).is_err());
    }

    #[test]
    fn test_software_fault_target() {
        let worker = worker();
        let slave = endpoint(&worker, "fault/software/slave", "rpi08", EndpointType::PrimarySlave);
        let master = endpoint(&worker, "fault/software/slave", "rpi06", EndpointType::Master);

        assert!(worker.resolve(slave.id, &WorkerOptions::default()).unwrap().receives_software_faults());
        assert!(!worker.resolve(master.id, &WorkerOptions::default()).unwrap().receives_software_faults());
    }

    #[test]
    fn test_jmptime_command() {
        let paths = Paths::new("/srv/ptp-perf");
        let jump = jmptime(&paths, chrono::Duration::seconds(-60));
        assert!(jump.command_line().ends_with("lib/ppsi/tools/jmptime -60"));
    }
}
