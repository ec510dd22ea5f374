//! Resource consumption metrics from the resource monitor snapshots.

use chrono::{DateTime, Utc};
use ptp_perf_adapters::resource_monitor::{MemoryInfo, NetIoCounters, ProcessSnapshot};
use ptp_perf_adapters::{ResourceSnapshot, RESOURCE_MONITOR_SOURCE};
use ptp_perf_common::{EndpointId, Result};
use ptp_perf_store::{EndpointMetrics, RunStore};
use tracing::{debug, warn};

use crate::series::duration_seconds;
use crate::stats;

/// Reads the snapshots logged for one endpoint, skipping unreadable ones.
pub fn load_snapshots(store: &RunStore, endpoint_id: EndpointId) -> Result<Vec<(DateTime<Utc>, ResourceSnapshot)>> {
    let records = store.log_records(endpoint_id, Some(RESOURCE_MONITOR_SOURCE))?;
    let mut snapshots = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_str::<ResourceSnapshot>(&record.message) {
            Ok(snapshot) => snapshots.push((record.timestamp, snapshot)),
            Err(e) => warn!(endpoint_id, error = %e, "Skipping unreadable resource snapshot"),
        }
    }
    Ok(snapshots)
}

/// Growth of a counter over the snapshots. Decreases, as after a restart
/// of the monitored process, start a new count instead of subtracting.
fn counter_growth(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let values: Vec<f64> = values.into_iter().flatten().collect();
    if values.len() < 2 {
        return None;
    }
    Some(
        values
            .windows(2)
            .map(|pair| if pair[1] >= pair[0] { pair[1] - pair[0] } else { pair[1] })
            .sum(),
    )
}

fn gauge_mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    stats::mean_of_present(values)
}

fn process_values(
    snapshots: &[(DateTime<Utc>, ResourceSnapshot)],
    value: impl Fn(&ProcessSnapshot) -> Option<f64>,
) -> Vec<Option<f64>> {
    snapshots
        .iter()
        .map(|(_, snapshot)| snapshot.process.as_ref().and_then(&value))
        .collect()
}

fn memory_mean(
    snapshots: &[(DateTime<Utc>, ResourceSnapshot)],
    value: fn(&MemoryInfo) -> Option<u64>,
) -> Option<f64> {
    gauge_mean(process_values(snapshots, |p| {
        p.memory_full_info.as_ref().and_then(value).map(|bytes| bytes as f64)
    }))
}

fn network_values(
    snapshots: &[(DateTime<Utc>, ResourceSnapshot)],
    interface: &str,
    value: fn(&NetIoCounters) -> u64,
) -> Vec<Option<f64>> {
    snapshots
        .iter()
        .map(|(_, snapshot)| {
            snapshot
                .system
                .net_io_counters
                .get(interface)
                .map(|counters| value(counters) as f64)
        })
        .collect()
}

/// Fills the resource metrics of `metrics`.
///
/// `ptp_interface` selects the network counters; without it the network
/// metrics stay empty.
pub fn resource_metrics(
    snapshots: &[(DateTime<Utc>, ResourceSnapshot)],
    ptp_interface: Option<&str>,
    metrics: &mut EndpointMetrics,
) {
    let (Some((first, _)), Some((last, _))) = (snapshots.first(), snapshots.last()) else {
        return;
    };
    let elapsed = duration_seconds(*last - *first);
    if snapshots.len() < 2 || elapsed <= 0.0 {
        debug!("Too few resource snapshots to derive metrics");
        return;
    }
    metrics.resource_profile_length = Some(elapsed);

    let user = counter_growth(process_values(snapshots, |p| p.cpu_times.map(|t| t.user)));
    let system = counter_growth(process_values(snapshots, |p| p.cpu_times.map(|t| t.system)));
    metrics.proc_cpu_percent_user = user.map(|seconds| 100.0 * seconds / elapsed);
    metrics.proc_cpu_percent_system = system.map(|seconds| 100.0 * seconds / elapsed);
    metrics.proc_cpu_percent = match (metrics.proc_cpu_percent_user, metrics.proc_cpu_percent_system) {
        (Some(user), Some(system)) => Some(user + system),
        (user, system) => user.or(system),
    };

    metrics.proc_mem_uss = memory_mean(snapshots, |m| m.uss);
    metrics.proc_mem_pss = memory_mean(snapshots, |m| m.pss);
    metrics.proc_mem_rss = memory_mean(snapshots, |m| m.rss);
    metrics.proc_mem_vms = memory_mean(snapshots, |m| m.vms);
    metrics.proc_ctx_switches_voluntary =
        counter_growth(process_values(snapshots, |p| p.num_ctx_switches.map(|c| c.voluntary as f64)));
    metrics.proc_ctx_switches_involuntary =
        counter_growth(process_values(snapshots, |p| p.num_ctx_switches.map(|c| c.involuntary as f64)));

    metrics.sys_cpu_frequency = gauge_mean(
        snapshots
            .iter()
            .map(|(_, snapshot)| snapshot.system.cpu_freq.map(|f| f.current)),
    );
    metrics.sys_sensors_temperature_cpu =
        gauge_mean(snapshots.iter().map(|(_, snapshot)| snapshot.system.cpu_temperature()));

    let Some(interface) = ptp_interface.filter(|name| !name.is_empty()) else {
        return;
    };
    let network = |value: fn(&NetIoCounters) -> u64| counter_growth(network_values(snapshots, interface, value));
    metrics.sys_net_ptp_iface_bytes_sent = network(|c| c.bytes_sent);
    metrics.sys_net_ptp_iface_bytes_recv = network(|c| c.bytes_recv);
    metrics.sys_net_ptp_iface_packets_sent = network(|c| c.packets_sent);
    metrics.sys_net_ptp_iface_packets_recv = network(|c| c.packets_recv);
    metrics.sys_net_ptp_iface_bytes_total = sum(metrics.sys_net_ptp_iface_bytes_sent, metrics.sys_net_ptp_iface_bytes_recv);
    metrics.sys_net_ptp_iface_packets_total =
        sum(metrics.sys_net_ptp_iface_packets_sent, metrics.sys_net_ptp_iface_packets_recv);
}

fn sum(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? + b?)
}
