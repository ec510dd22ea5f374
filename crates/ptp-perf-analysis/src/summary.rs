//! Aggregation of processed runs into benchmark summaries.

use ptp_perf_common::{nanos_to_seconds, EndpointType, Error, ErrorKind, Result, SampleType};
use ptp_perf_store::{BenchmarkSummary, Endpoint, EndpointMetrics, RunFilter, RunKey, RunStore, SummaryMetrics};
use ptp_perf_vendor::VendorDb;
use tracing::{debug, info};

use crate::stats;

const SUMMARY_QUANTILES: [f64; 5] = [0.05, 0.5, 0.95, 0.99, 1.0];
const SLAVES: [EndpointType; 3] = [
    EndpointType::PrimarySlave,
    EndpointType::SecondarySlave,
    EndpointType::TertiarySlave,
];

/// Builds [`BenchmarkSummary`] rows from the primary slave endpoints of
/// processed, non-corrupted runs.
pub struct SummaryBuilder<'a> {
    store: &'a RunStore,
}

impl<'a> SummaryBuilder<'a> {
    pub fn new(store: &'a RunStore) -> Self {
        Self { store }
    }

    /// Keys of analysed vendors with at least one usable processed run.
    pub fn keys(&self) -> Result<Vec<RunKey>> {
        let filter = RunFilter {
            running: Some(false),
            processed: Some(true),
            corrupted: Some(false),
            ..Default::default()
        };
        let analyzed = VendorDb::analyzed();
        Ok(self
            .store
            .run_keys(&filter)?
            .into_iter()
            .filter(|key| analyzed.iter().any(|vendor| vendor.id == key.vendor_id))
            .collect())
    }

    /// Recomputes the summaries that are missing, such as those
    /// invalidated by a new analysis of one of their runs.
    pub fn refresh_stale(&self) -> Result<usize> {
        let mut refreshed = 0;
        for key in self.keys()? {
            if self.store.get_summary(&key)?.is_none() && self.refresh(&key)?.is_some() {
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    /// Recomputes every summary.
    pub fn refresh_all(&self) -> Result<usize> {
        let mut refreshed = 0;
        for key in self.keys()? {
            if self.refresh(&key)?.is_some() {
                refreshed += 1;
            }
        }
        info!("Refreshed {} benchmark summaries", refreshed);
        Ok(refreshed)
    }

    /// Recomputes and stores the summary of `key`. A key without usable
    /// primary slave data is skipped.
    pub fn refresh(&self, key: &RunKey) -> Result<Option<BenchmarkSummary>> {
        match self.build(key) {
            Ok(summary) => {
                self.store.upsert_summary(&summary)?;
                debug!(count = summary.count, "Stored summary of {}", key);
                Ok(Some(summary))
            }
            Err(e) if e.kind() == ErrorKind::NoData => {
                debug!("Skipping summary of {}: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn build(&self, key: &RunKey) -> Result<BenchmarkSummary> {
        let primary = self.endpoints(key, EndpointType::PrimarySlave)?;
        if primary.is_empty() {
            return Err(Error::no_data(format!("primary slave endpoints of {}", key)));
        }
        let mut slaves = Vec::new();
        for endpoint_type in SLAVES {
            slaves.extend(self.endpoints(key, endpoint_type)?);
        }

        let clock_diff: Vec<f64> = self
            .series(key, SampleType::ClockDiff)?
            .into_iter()
            .map(f64::abs)
            .collect();
        let path_delay = self.series(key, SampleType::PathDelay)?;
        let clock_quantiles = stats::quantiles(&clock_diff, &SUMMARY_QUANTILES);
        let delay_quantiles = stats::quantiles(&path_delay, &SUMMARY_QUANTILES);

        let metrics = SummaryMetrics {
            clock_diff_p05: clock_quantiles[0],
            clock_diff_median: clock_quantiles[1],
            clock_diff_p95: clock_quantiles[2],
            clock_diff_p99: clock_quantiles[3],
            clock_diff_max: clock_quantiles[4],
            clock_diff_mean: stats::mean(&clock_diff),
            path_delay_p05: delay_quantiles[0],
            path_delay_median: delay_quantiles[1],
            path_delay_p95: delay_quantiles[2],
            path_delay_p99: delay_quantiles[3],
            path_delay_max: delay_quantiles[4],
            path_delay_mean: stats::mean(&path_delay),
            path_delay_std: stats::std_dev(&path_delay),
            convergence_duration_mean: mean_of(&primary, |m| m.convergence_duration),
            convergence_max_offset_mean: mean_of(&primary, |m| m.convergence_max_offset),
            convergence_rate_mean: mean_of(&primary, |m| m.convergence_rate),
            missing_samples_percent_primary: mean_of(&primary, |m| m.missing_samples_percent),
            missing_samples_percent_all_slaves: mean_of(&slaves, |m| m.missing_samples_percent),
            fault_clock_diff_post_max_max: stats::max(&present(&primary, |m| m.fault_clock_diff_post_max)),
            fault_clock_diff_post_max_min: stats::min(&present(&primary, |m| m.fault_clock_diff_post_max)),
            fault_ratio_clock_diff_median_mean: mean_of(&primary, |m| m.fault_ratio_clock_diff_median),
            fault_clock_diff_return_to_normal_time_mean: mean_of(&primary, |m| {
                m.fault_clock_diff_return_to_normal_time
            }),
            proc_cpu_percent_mean: mean_of(&primary, |m| m.proc_cpu_percent),
            proc_mem_uss_mean: mean_of(&primary, |m| m.proc_mem_uss),
            sys_net_ptp_iface_bytes_total_mean: mean_of(&primary, |m| m.sys_net_ptp_iface_bytes_total),
        };

        Ok(BenchmarkSummary {
            key: key.clone(),
            count: primary.len() as i64,
            metrics,
        })
    }

    fn endpoints(&self, key: &RunKey, endpoint_type: EndpointType) -> Result<Vec<Endpoint>> {
        self.store
            .analyzed_endpoints(&key.benchmark_id, &key.vendor_id, &key.cluster_id, endpoint_type)
    }

    /// Converged primary slave values of all matching runs, in seconds.
    fn series(&self, key: &RunKey, sample_type: SampleType) -> Result<Vec<f64>> {
        Ok(self
            .store
            .summary_series(key, EndpointType::PrimarySlave, sample_type)?
            .into_iter()
            .map(|(_, value)| nanos_to_seconds(value))
            .collect())
    }
}

fn present(endpoints: &[Endpoint], metric: fn(&EndpointMetrics) -> Option<f64>) -> Vec<f64> {
    endpoints.iter().filter_map(|endpoint| metric(&endpoint.metrics)).collect()
}

fn mean_of(endpoints: &[Endpoint], metric: fn(&EndpointMetrics) -> Option<f64>) -> Option<f64> {
    stats::mean_of_present(endpoints.iter().map(|endpoint| metric(&endpoint.metrics)))
}
