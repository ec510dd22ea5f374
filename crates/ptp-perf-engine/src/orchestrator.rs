//! End-to-end execution of one (benchmark, vendor, cluster) run.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ptp_perf_adapters::{CommandPowerSwitch, DeviceController, HardwareFaultGenerator};
use ptp_perf_analysis::Analyzer;
use ptp_perf_common::{EndpointId, EndpointType, Error, Result};
use ptp_perf_config::{format_duration, Benchmark, BenchmarkDb, Cluster, Machine, PtpPerfConfig};
use ptp_perf_invoke::{Invocation, InvocationHandle, TaskGroup};
use ptp_perf_log_collection::{FileOutputWriter, LogCollectionService};
use ptp_perf_store::{Run, RunKey, RunStore, StoreLogWriter};
use ptp_perf_vendor::{Vendor, VendorDb};
use tracing::{error, info, warn};

use crate::remote::Remote;

/// Peers get this long to finish after the first worker exits.
pub const WORKER_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Benchmark duration in test mode unless overridden.
pub const TEST_MODE_DURATION: Duration = Duration::from_secs(60);

/// Machine id of the orchestrator endpoint when the configuration declares
/// no orchestrator machine.
pub const ORCHESTRATOR_MACHINE_ID: &str = "orchestrator";

/// Starts workers on the cluster machines.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Brings the machines into a clean state before a run.
    async fn prepare(&self, cluster: &Cluster, reboot: bool) -> Result<()>;

    /// The supervised command running the worker of `endpoint_id`.
    fn worker(&self, machine: &Machine, endpoint_id: EndpointId, duration_override: Option<Duration>) -> Invocation;
}

/// Launches workers through SSH after synchronizing the repository.
pub struct SshLauncher {
    remote: Remote,
}

impl SshLauncher {
    pub fn new(config: &PtpPerfConfig) -> Self {
        Self {
            remote: Remote::new(config),
        }
    }
}

#[async_trait]
impl WorkerLauncher for SshLauncher {
    async fn prepare(&self, cluster: &Cluster, reboot: bool) -> Result<()> {
        self.remote.sync_repository(cluster).await?;
        if reboot {
            self.remote.restart_cluster(cluster).await;
        } else {
            info!("Skipping cluster restart due to test mode.");
        }
        Ok(())
    }

    fn worker(&self, machine: &Machine, endpoint_id: EndpointId, duration_override: Option<Duration>) -> Invocation {
        self.remote.worker(machine, endpoint_id, duration_override)
    }
}

/// Command line choices of one orchestration.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationOptions {
    pub benchmark_id: String,
    pub vendor_id: String,
    pub cluster_id: String,
    pub duration: Option<Duration>,
    pub test_mode: bool,
    pub analyze: bool,
}

impl OrchestrationOptions {
    pub fn new(benchmark_id: impl Into<String>, vendor_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            benchmark_id: benchmark_id.into(),
            vendor_id: vendor_id.into(),
            cluster_id: cluster_id.into(),
            ..Default::default()
        }
    }

    /// The duration the workers run for, if it differs from the benchmark's.
    pub fn duration_override(&self) -> Option<Duration> {
        match self.duration {
            Some(duration) => Some(duration),
            None if self.test_mode => Some(TEST_MODE_DURATION),
            None => None,
        }
    }
}

/// A resolved orchestration, checked before any run is created.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub benchmark: Benchmark,
    pub vendor: &'static Vendor,
    pub cluster: Cluster,
    pub duration_override: Option<Duration>,
}

impl RunPlan {
    pub fn key(&self) -> RunKey {
        RunKey::new(self.benchmark.id.as_str(), self.vendor.id, self.cluster.id.as_str())
    }

    /// Machines that run a worker, in cluster order.
    pub fn worker_machines(&self) -> impl Iterator<Item = &Machine> {
        self.cluster
            .machines
            .iter()
            .filter(|machine| machine.endpoint_type.runs_worker())
    }
}

pub struct Orchestrator<L: WorkerLauncher = SshLauncher> {
    config: PtpPerfConfig,
    store: RunStore,
    log_collection: LogCollectionService,
    launcher: L,
}

impl Orchestrator<SshLauncher> {
    pub fn new(config: PtpPerfConfig, store: RunStore, log_collection: LogCollectionService) -> Self {
        let launcher = SshLauncher::new(&config);
        Self::with_launcher(config, store, log_collection, launcher)
    }
}

impl<L: WorkerLauncher> Orchestrator<L> {
    pub fn with_launcher(config: PtpPerfConfig, store: RunStore, log_collection: LogCollectionService, launcher: L) -> Self {
        Self {
            config,
            store,
            log_collection,
            launcher,
        }
    }

    /// Resolves benchmark, vendor and cluster of `options`.
    ///
    /// A vendor that is not installed is rejected unless in test mode.
    pub fn plan(&self, options: &OrchestrationOptions) -> Result<RunPlan> {
        let duration_override = options.duration_override();
        let mut benchmark = BenchmarkDb::get(&options.benchmark_id)?;
        if let Some(duration) = duration_override {
            info!("Applying benchmark duration override of {}", format_duration(duration));
            benchmark = benchmark.with_duration(duration);
        }

        let vendor = VendorDb::get(&options.vendor_id)?;
        if options.test_mode {
            info!("Skipping installation check of {} due to test mode.", vendor);
        } else {
            vendor.ensure_installed()?;
        }

        let mut cluster = self.config.cluster(&options.cluster_id)?;
        if benchmark.num_machines < cluster.machines.len() {
            cluster = cluster.subset(benchmark.num_machines);
        }

        Ok(RunPlan {
            benchmark,
            vendor,
            cluster,
            duration_override,
        })
    }

    /// Executes one run and returns its final record.
    ///
    /// A failing worker only marks the run unsuccessful. Errors are returned
    /// when the run could not be created or finalized.
    pub async fn run(&self, options: &OrchestrationOptions) -> Result<Run> {
        let plan = self.plan(options)?;
        self.launcher.prepare(&plan.cluster, !options.test_mode).await?;

        let run = self.store.create_run(&plan.key(), Utc::now())?;
        let orchestrator = self
            .store
            .create_endpoint(run.id, &self.orchestrator_machine_id(), EndpointType::Orchestrator)?;

        let run_log_file = self.config.paths().run_log_file(run.id);
        let store_log = self
            .log_collection
            .install(StoreLogWriter::new(self.store.clone(), orchestrator.id));
        let file_log = self.log_collection.install(FileOutputWriter::new(&run_log_file)?);

        info!(
            run_id = run.id,
            "Now running benchmark {} for vendor {} on {}",
            plan.benchmark.id,
            plan.vendor.id,
            plan.cluster.id
        );
        let mut success = match self.execute(&plan, &run).await {
            Ok(()) => true,
            Err(e) => {
                error!(run_id = run.id, "Run {} failed: {}", run.id, e);
                false
            }
        };

        if let Err(e) = file_log.uninstall() {
            warn!("Failed to close {}: {}", run_log_file.display(), e);
            success = false;
        }
        drop(store_log);

        let log = std::fs::read_to_string(&run_log_file).ok();
        let run = self
            .store
            .finalize_run(run.id, Utc::now(), success, log.as_deref())?;
        info!(run_id = run.id, "Run {} finished, success: {}", run.id, run.is_successful);

        if options.analyze {
            let outcome = Analyzer::new(self.store.clone())
                .with_config(self.config.clone())
                .with_log_collection(self.log_collection.clone())
                .analyze_run_id(run.id)?;
            info!(run_id = run.id, "Analysis of run {}: {:?}", run.id, outcome);
            return self.store.get_run(run.id);
        }
        Ok(run)
    }

    async fn execute(&self, plan: &RunPlan, run: &Run) -> Result<()> {
        let mut group = TaskGroup::new(format!("run {}", run.id));

        let mut sessions: Vec<(String, InvocationHandle)> = Vec::new();
        for machine in plan.worker_machines() {
            let endpoint = self.store.create_endpoint(run.id, &machine.id, machine.endpoint_type)?;
            let worker = self.launcher.worker(machine, endpoint.id, plan.duration_override);
            sessions.push((machine.id.clone(), worker.handle()));
            group.add(format!("worker {}", machine.id), move |cancel| async move {
                worker.run_until(cancel).await
            });
        }
        if group.is_empty() {
            return Err(Error::invalid_state(
                format!("cluster {}", plan.cluster.id),
                "no machine runs a worker",
            ));
        }

        if plan.benchmark.fault_hardware {
            let generator = self.hardware_fault_generator(plan, sessions)?;
            group.add("hardware faults", move |cancel| generator.run(cancel));
        }

        // First exit, then a grace window for the peers.
        let outcome = group.run(None, false).await;
        info!(run_id = run.id, "First activity ended: {:?}", outcome);
        group.run(Some(WORKER_GRACE_PERIOD), true).await;
        group.cancel_pending().await
    }

    fn hardware_fault_generator(
        &self,
        plan: &RunPlan,
        sessions: Vec<(String, InvocationHandle)>,
    ) -> Result<HardwareFaultGenerator> {
        let benchmark = &plan.benchmark;
        let (Some(interval), Some(duration)) = (benchmark.fault_interval, benchmark.fault_duration) else {
            return Err(Error::validation(format!(
                "Benchmark {} injects hardware faults without interval and duration",
                benchmark.id
            )));
        };
        let location = benchmark.fault_location.ok_or_else(|| {
            Error::validation(format!("Benchmark {} has no fault location", benchmark.id))
        })?;
        let target = match location {
            EndpointType::Switch => self.config.machine_by_type(EndpointType::Switch)?,
            endpoint_type => plan.cluster.machine_by_type(endpoint_type)?,
        };

        let controller = DeviceController::new(CommandPowerSwitch::new(&self.config.power_strips));
        let generator = HardwareFaultGenerator::new(controller, vec![target.id.clone()], interval, duration);
        if !benchmark.fault_ssh_keepalive {
            info!("Not engaging SSH session keep-alive");
            return Ok(generator);
        }
        // Only the powered machine loses its session.
        let target_sessions = sessions
            .into_iter()
            .filter(|(machine_id, _)| *machine_id == target.id)
            .map(|(_, session)| session)
            .collect();
        Ok(generator.with_ssh_keepalive(target_sessions))
    }

    fn orchestrator_machine_id(&self) -> String {
        self.config
            .machine_by_type(EndpointType::Orchestrator)
            .map(|machine| machine.id.clone())
            .unwrap_or_else(|_| ORCHESTRATOR_MACHINE_ID.to_string())
    }
}
