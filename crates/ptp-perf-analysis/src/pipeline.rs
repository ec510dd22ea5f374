//! Conversion of a finished run's log records into samples and metrics.

use chrono::{DateTime, Utc};
use ptp_perf_common::{Error, Result, RunId, SampleType};
use ptp_perf_config::{Benchmark, BenchmarkDb, PtpPerfConfig};
use ptp_perf_log_collection::{LogCollectionService, LogLevel};
use ptp_perf_store::{AnalysisLogWriter, Endpoint, EndpointMetrics, Run, RunFilter, RunStore, Sample};
use ptp_perf_vendor::{Vendor, VendorDb};
use tracing::{debug, error, info, warn};

use crate::clock_step::detect_clock_step;
use crate::convergence::detect_convergence;
use crate::faults::{fault_metrics, process_fault_data, FaultWindow};
use crate::resources::{load_snapshots, resource_metrics};
use crate::series::TimeSeries;
use crate::stats;
use crate::summary::SummaryBuilder;

/// How the analysis of one run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Processed,
    /// Processed, but at least one endpoint profile is unusable.
    Corrupted,
    /// Not processed because of an error unrelated to the profile. The run
    /// is left for the next pass.
    Failed(String),
}

/// Totals of one [`Analyzer::analyze`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    pub processed: usize,
    pub corrupted: usize,
    pub failed: usize,
    pub summaries: usize,
}

impl AnalysisReport {
    fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Processed => self.processed += 1,
            RunOutcome::Corrupted => {
                self.processed += 1;
                self.corrupted += 1;
            }
            RunOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Drives the analysis of runs in the Run Store.
pub struct Analyzer {
    store: RunStore,
    config: Option<PtpPerfConfig>,
    log_collection: Option<LogCollectionService>,
}

impl Analyzer {
    pub fn new(store: RunStore) -> Self {
        Self {
            store,
            config: None,
            log_collection: None,
        }
    }

    /// Machine declarations supply the PTP interface for network metrics.
    pub fn with_config(mut self, config: PtpPerfConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Warnings raised while a run is analysed are stored with that run.
    pub fn with_log_collection(mut self, service: LogCollectionService) -> Self {
        self.log_collection = Some(service);
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Analyses the finished runs not processed yet, or all finished runs
    /// with `force`, then refreshes the benchmark summaries.
    pub fn analyze(&self, force: bool) -> Result<AnalysisReport> {
        let runs = self.store.list_runs(&RunFilter::finished(force))?;
        info!("Analyzing {} runs", runs.len());

        let mut report = AnalysisReport::default();
        for run in &runs {
            let outcome = self.analyze_run(run)?;
            report.record(&outcome);
        }
        let summaries = SummaryBuilder::new(&self.store);
        report.summaries = if force {
            summaries.refresh_all()?
        } else {
            summaries.refresh_stale()?
        };
        Ok(report)
    }

    /// Analyses a single run regardless of its processed state.
    pub fn analyze_run_id(&self, run_id: RunId) -> Result<RunOutcome> {
        let run = self.store.get_run(run_id)?;
        if run.is_running {
            return Err(Error::invalid_state(format!("run {}", run_id), "still running"));
        }
        let outcome = self.analyze_run(&run)?;
        SummaryBuilder::new(&self.store).refresh_stale()?;
        Ok(outcome)
    }

    /// Analyses one run. Only store failures while recording the outcome
    /// are returned as errors.
    pub fn analyze_run(&self, run: &Run) -> Result<RunOutcome> {
        self.store.clear_analysis_log(run.id)?;
        let _analysis_log = self.log_collection.as_ref().map(|service| {
            service.install_with_level(AnalysisLogWriter::new(self.store.clone(), run.id), LogLevel::Warn)
        });

        info!(run_id = run.id, "Analyzing run {} ({})", run.id, run.key());
        let outcome = match self.process_run(run) {
            Ok(corrupted) => {
                self.store.mark_processed(run.id, corrupted)?;
                if corrupted {
                    RunOutcome::Corrupted
                } else {
                    RunOutcome::Processed
                }
            }
            Err(e) => {
                error!(run_id = run.id, "Failed to analyze run {}: {}", run.id, e);
                self.store.delete_run_samples(run.id)?;
                self.store.mark_unprocessed(run.id)?;
                RunOutcome::Failed(e.to_string())
            }
        };

        if self.store.invalidate_summary(&run.key())? {
            debug!(run_id = run.id, "Invalidated summary of {}", run.key());
        }
        Ok(outcome)
    }

    /// Returns whether the run turned out corrupted.
    fn process_run(&self, run: &Run) -> Result<bool> {
        let benchmark = BenchmarkDb::get(&run.benchmark_id)?;
        let vendor = VendorDb::get(&run.vendor_id)?;
        let endpoints = self.store.endpoints_of_run(run.id)?;

        // Fault samples of every endpoint must exist before any endpoint
        // derives its fault metrics.
        let mut total_samples = 0;
        for endpoint in &endpoints {
            self.store.reset_endpoint_metrics(endpoint.id)?;
            self.store.delete_samples(endpoint.id)?;
            let parsed = vendor.parse_log_data(&self.store, endpoint.id)?;
            info!(
                endpoint_id = endpoint.id,
                "{} {} converted {} samples.",
                endpoint.endpoint_type,
                endpoint.machine_id,
                parsed.len()
            );
            total_samples += parsed.len();
            process_fault_data(&self.store, endpoint)?;
        }

        let mut corrupted = false;
        if total_samples == 0 && vendor.log_source().is_some() {
            warn!(run_id = run.id, "No samples on entire profile, corrupt.");
            corrupted = true;
        }

        let fault_samples = self.store.fault_samples_of_run(run.id)?;
        let fault_window = FaultWindow::from_samples(&fault_samples);
        if benchmark.has_faults() && fault_window.is_none() {
            warn!(run_id = run.id, "Benchmark {} injects faults but no complete fault was recorded.", benchmark.id);
        }

        for endpoint in &endpoints {
            let analysis = EndpointAnalysis {
                store: &self.store,
                benchmark: &benchmark,
                vendor,
                endpoint,
                fault_window,
                ptp_interface: self.ptp_interface(&endpoint.machine_id),
            };
            match analysis.run() {
                Ok(()) => {}
                Err(e) if e.is_profile_corrupt() => {
                    warn!(
                        run_id = run.id,
                        endpoint_id = endpoint.id,
                        "Endpoint {} ({}) is corrupt: {}",
                        endpoint.machine_id,
                        endpoint.endpoint_type,
                        e
                    );
                    corrupted = true;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(corrupted)
    }

    fn ptp_interface(&self, machine_id: &str) -> Option<String> {
        self.config
            .as_ref()
            .and_then(|config| config.machine(machine_id).ok())
            .map(|machine| machine.ptp_interface.clone())
    }
}

/// Derives the metrics of one endpoint from its stored samples.
struct EndpointAnalysis<'a> {
    store: &'a RunStore,
    benchmark: &'a Benchmark,
    vendor: &'a Vendor,
    endpoint: &'a Endpoint,
    fault_window: Option<FaultWindow>,
    ptp_interface: Option<String>,
}

impl EndpointAnalysis<'_> {
    fn run(&self) -> Result<()> {
        self.check_targeted_fault()?;

        let mut metrics = EndpointMetrics::default();
        let timestamps = self.timeseries_metrics(&mut metrics)?;

        let snapshots = load_snapshots(self.store, self.endpoint.id)?;
        resource_metrics(&snapshots, self.ptp_interface.as_deref(), &mut metrics);

        let (clock_step, convergence) = timestamps.unzip();
        self.store
            .save_endpoint_metrics(self.endpoint.id, clock_step, convergence, &metrics)
    }

    /// Returns the clock step and convergence timestamps, or nothing for an
    /// endpoint without clock offsets.
    fn timeseries_metrics(
        &self,
        metrics: &mut EndpointMetrics,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let clock_diff = self.series(SampleType::ClockDiff)?;
        if clock_diff.is_empty() {
            if self.endpoint.endpoint_type.is_slave() && self.vendor.log_source().is_some() {
                warn!(endpoint_id = self.endpoint.id, "No clock offsets recorded on {}.", self.endpoint.machine_id);
            } else {
                debug!(endpoint_id = self.endpoint.id, "No clock offsets on {}", self.endpoint.machine_id);
            }
            return Ok(None);
        }

        if let Some(missing) = clock_diff.missing_samples(sync_interval(self.benchmark)) {
            metrics.missing_samples = Some(missing.count);
            metrics.missing_samples_percent = Some(missing.percent);
        }

        let step = detect_clock_step(&clock_diff, self.benchmark.analyze_limit_permissible_clock_steps)?;
        metrics.clock_step_magnitude = Some(step.magnitude);

        let after_step = clock_diff.after(step.timestamp);
        let convergence = detect_convergence(
            &after_step,
            self.benchmark.convergence_sign_changes,
            self.benchmark.duration,
        )?;
        metrics.convergence_duration = Some(convergence.duration_seconds());
        metrics.convergence_max_offset = Some(convergence.max_offset);
        metrics.convergence_rate = Some(convergence.rate);
        metrics.converged_samples = convergence.converged_samples;
        metrics.converged_percentage = convergence.converged_share;

        let converged = clock_diff.since(convergence.timestamp);
        let offsets = converged.abs_seconds();
        let offset_quantiles = stats::quantiles(&offsets, &[0.05, 0.5, 0.95]);
        metrics.clock_diff_p05 = offset_quantiles[0];
        metrics.clock_diff_median = offset_quantiles[1];
        metrics.clock_diff_p95 = offset_quantiles[2];
        metrics.clock_diff_max = stats::max(&offsets);

        let delays = self.series(SampleType::PathDelay)?.since(convergence.timestamp).seconds();
        let delay_quantiles = stats::quantiles(&delays, &[0.05, 0.5, 0.95]);
        metrics.path_delay_p05 = delay_quantiles[0];
        metrics.path_delay_median = delay_quantiles[1];
        metrics.path_delay_p95 = delay_quantiles[2];
        metrics.path_delay_std = stats::std_dev(&delays);

        self.fault_metrics(&converged, convergence.timestamp, metrics)?;
        Ok(Some((step.timestamp, convergence.timestamp)))
    }

    fn fault_metrics(
        &self,
        converged: &TimeSeries,
        convergence: DateTime<Utc>,
        metrics: &mut EndpointMetrics,
    ) -> Result<()> {
        let Some(window) = self.fault_window else {
            return Ok(());
        };
        if window.start <= convergence {
            return Err(Error::profile_corrupt(format!(
                "fault at {} started before convergence at {}",
                window.start, convergence
            )));
        }
        fault_metrics(converged, window, metrics);
        Ok(())
    }

    /// The endpoint a benchmark injects faults into needs a complete fault,
    /// whether or not it records clock offsets.
    fn check_targeted_fault(&self) -> Result<()> {
        let targeted = self.benchmark.fault_location == Some(self.endpoint.endpoint_type);
        if targeted && self.benchmark.has_faults() && self.fault_window.is_none() {
            return Err(Error::profile_corrupt(format!(
                "no fault recorded on targeted {}",
                self.endpoint.endpoint_type
            )));
        }
        Ok(())
    }

    fn series(&self, sample_type: SampleType) -> Result<TimeSeries> {
        let samples: Vec<Sample> = self.store.samples(self.endpoint.id, Some(sample_type))?;
        TimeSeries::from_samples(&samples)
    }
}

fn sync_interval(benchmark: &Benchmark) -> chrono::Duration {
    chrono::Duration::nanoseconds((benchmark.sync_interval_seconds() * 1e9).round() as i64)
}
