//! Fault markers and the recovery metrics around them.

use chrono::{DateTime, Utc};
use ptp_perf_adapters::{FaultEventParser, FAULT_LOG_SOURCE};
use ptp_perf_common::{EndpointType, Result, SampleType};
use ptp_perf_store::{Endpoint, EndpointMetrics, RunStore, Sample};
use tracing::{debug, warn};

use crate::series::{duration_seconds, TimeSeries};
use crate::stats;

/// Samples of a 5-sample rolling median below twice the pre-fault median
/// mark the return to normal.
const RETURN_TO_NORMAL_WINDOW: usize = 5;
const RETURN_TO_NORMAL_FACTOR: f64 = 2.0;

/// Turns the fault announcements of a run into fault samples of `endpoint`.
///
/// Machine endpoints receive the faults injected into their own machine.
/// The orchestrator endpoint receives every fault of the run, which covers
/// targets without an endpoint of their own such as the switch.
pub fn process_fault_data(store: &RunStore, endpoint: &Endpoint) -> Result<Vec<Sample>> {
    let parser = FaultEventParser::new()?;
    let records = store.run_log_records(endpoint.run_id, FAULT_LOG_SOURCE)?;

    let mut samples: Vec<Sample> = Vec::new();
    for record in &records {
        let Some(event) = parser.parse(&record.message) else {
            continue;
        };
        let relevant =
            endpoint.endpoint_type == EndpointType::Orchestrator || event.machine_id == endpoint.machine_id;
        if !relevant {
            continue;
        }
        // Timestamps of one kind stay strictly increasing per endpoint.
        if samples.last().is_some_and(|last| last.timestamp >= record.timestamp) {
            debug!(endpoint_id = endpoint.id, "Skipping simultaneous fault marker: {}", record.message);
            continue;
        }
        samples.push(Sample {
            endpoint_id: endpoint.id,
            timestamp: record.timestamp,
            sample_type: SampleType::Fault,
            value: event.phase.sample_value(),
        });
    }

    store.insert_samples(&samples)?;
    Ok(samples)
}

/// The first complete fault of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FaultWindow {
    /// Pairs the first fault start with the first fault end following it.
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let start = samples
            .iter()
            .filter(|s| s.sample_type == SampleType::Fault)
            .find(|s| s.value == 1)?
            .timestamp;
        let end = samples
            .iter()
            .filter(|s| s.sample_type == SampleType::Fault)
            .find(|s| s.value == 0 && s.timestamp > start)?
            .timestamp;
        Some(Self { start, end })
    }

    pub fn duration_seconds(&self) -> f64 {
        duration_seconds(self.end - self.start)
    }
}

/// Fills the fault metrics of `metrics` from the converged clock offsets.
pub fn fault_metrics(converged: &TimeSeries, window: FaultWindow, metrics: &mut EndpointMetrics) {
    let pre = converged.between(converged.first_timestamp().unwrap_or(window.start), window.start);
    let post = converged.since(window.end);
    let mid: Vec<f64> = converged
        .points()
        .iter()
        .filter(|p| p.timestamp > window.start && p.timestamp < window.end)
        .map(|p| p.abs_seconds())
        .collect();

    let pre_values = pre.abs_seconds();
    let post_values = post.abs_seconds();
    if pre_values.is_empty() {
        warn!("No converged samples before the fault at {}.", window.start);
    }
    if post_values.is_empty() {
        warn!("No samples after the fault resolved at {}.", window.end);
    }

    let pre_quantiles = stats::quantiles(&pre_values, &[0.5, 0.95]);
    let post_quantiles = stats::quantiles(&post_values, &[0.5, 0.95]);

    metrics.fault_actual_duration = Some(window.duration_seconds());
    metrics.fault_clock_diff_pre_median = pre_quantiles[0];
    metrics.fault_clock_diff_pre_p95 = pre_quantiles[1];
    metrics.fault_clock_diff_post_median = post_quantiles[0];
    metrics.fault_clock_diff_post_p95 = post_quantiles[1];
    metrics.fault_clock_diff_post_max = stats::max(&post_values);
    metrics.fault_clock_diff_mid_max = stats::max(&mid);
    metrics.fault_ratio_clock_diff_median = stats::ratio(post_quantiles[0], pre_quantiles[0]);
    metrics.fault_ratio_clock_diff_p95 = stats::ratio(post_quantiles[1], pre_quantiles[1]);
    metrics.fault_ratio_clock_diff_post_max_pre_median =
        stats::ratio(metrics.fault_clock_diff_post_max, pre_quantiles[0]);
    metrics.fault_clock_diff_return_to_normal_time = pre_quantiles[0].and_then(|pre_median| {
        return_to_normal(&post, window.end, pre_median * RETURN_TO_NORMAL_FACTOR)
    });
}

/// Seconds after `end` until the rolling median drops below `threshold`.
fn return_to_normal(post: &TimeSeries, end: DateTime<Utc>, threshold: f64) -> Option<f64> {
    let medians = stats::rolling_median(&post.abs_seconds(), RETURN_TO_NORMAL_WINDOW);
    post.points()
        .iter()
        .zip(medians)
        .find(|(_, median)| median.is_some_and(|median| median < threshold))
        .map(|(point, _)| duration_seconds(point.timestamp - end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::testing::{at, series};
    use ptp_perf_adapters::fault::{fault_message, FaultKind, FaultPhase};
    use ptp_perf_store::RunKey;

    fn fault(second: f64, value: i64) -> Sample {
        Sample {
            endpoint_id: 1,
            timestamp: at(second),
            sample_type: SampleType::Fault,
            value,
        }
    }

    #[test]
    fn test_fault_window_pairs_start_and_end() {
        let samples = [fault(5.0, 0), fault(10.0, 1), fault(70.0, 0), fault(80.0, 1)];
        let window = FaultWindow::from_samples(&samples).unwrap();
        assert_eq!(window.start, at(10.0));
        assert_eq!(window.end, at(70.0));
        assert_eq!(window.duration_seconds(), 60.0);
        assert!(FaultWindow::from_samples(&[fault(10.0, 1)]).is_none());
    }

    #[test]
    fn test_fault_metrics() {
        // 20 quiet seconds, a 10 second fault, a slow recovery.
        let mut values = vec![100; 20];
        values.extend([5_000; 10]);
        values.extend([4_000, 3_000, 1_000, 150, 150, 150, 150, 150, 150, 150]);
        let s = series(&values);
        let window = FaultWindow {
            start: at(19.0),
            end: at(30.0),
        };

        let mut metrics = EndpointMetrics::default();
        fault_metrics(&s, window, &mut metrics);

        assert_eq!(metrics.fault_actual_duration, Some(11.0));
        assert_eq!(metrics.fault_clock_diff_pre_median, Some(100e-9));
        assert_eq!(metrics.fault_clock_diff_mid_max, Some(5e-6));
        assert_eq!(metrics.fault_clock_diff_post_max, Some(4e-6));
        assert!((metrics.fault_ratio_clock_diff_post_max_pre_median.unwrap() - 40.0).abs() < 1e-9);
        // Medians of [4000,3000,1000,150,150] is 1000, of [3000,1000,150,150,150] is 150.
        assert_eq!(metrics.fault_clock_diff_return_to_normal_time, Some(5.0));
    }

    #[test]
    fn test_process_fault_data_per_endpoint() {
        let store = RunStore::open_in_memory().unwrap();
        let run = store.create_run(&RunKey::new("fault/hardware/switch", "ptpd", "rpi-4"), Utc::now()).unwrap();
        let orchestrator = store.create_endpoint(run.id, "rpi-serv", EndpointType::Orchestrator).unwrap();
        let slave = store.create_endpoint(run.id, "rpi08", EndpointType::PrimarySlave).unwrap();

        let start = Utc::now();
        for (offset, message) in [
            (0, fault_message(FaultKind::Hardware, FaultPhase::Imminent, "switch2")),
            (60, fault_message(FaultKind::Hardware, FaultPhase::Resolved, "switch2")),
        ] {
            store
                .insert_log_record(
                    orchestrator.id,
                    start + chrono::Duration::seconds(offset),
                    FAULT_LOG_SOURCE,
                    &message,
                )
                .unwrap();
        }
        store
            .insert_log_record(slave.id, start, FAULT_LOG_SOURCE, "Scheduling software faults every 10m")
            .unwrap();

        let orchestrator_faults = process_fault_data(&store, &orchestrator).unwrap();
        assert_eq!(
            orchestrator_faults.iter().map(|s| s.value).collect::<Vec<_>>(),
            vec![1, 0]
        );
        assert!(process_fault_data(&store, &slave).unwrap().is_empty());

        let window = FaultWindow::from_samples(&store.fault_samples_of_run(run.id).unwrap()).unwrap();
        assert_eq!(window.duration_seconds(), 60.0);
    }
}
