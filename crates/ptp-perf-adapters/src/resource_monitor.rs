//! Periodic snapshots of the vendor's and the system's resource usage.
//!
//! Each snapshot is logged as one JSON document under the source
//! [`RESOURCE_MONITOR_SOURCE`]; the analysis reads them back into
//! [`ResourceSnapshot`]. All fields are optional so that a partially
//! readable host still yields the values it has.

use std::collections::BTreeMap;
use std::time::Duration;

use ptp_perf_common::Result;
use ptp_perf_vendor::VendorHandle;
use serde::{Deserialize, Serialize};
use sysinfo::{Components, Networks, Pid, System};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const RESOURCE_MONITOR_SOURCE: &str = "resource_monitor";
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Clock ticks per second used by `/proc/<pid>/stat`.
const USER_HZ: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(default)]
    pub process: Option<ProcessSnapshot>,
    #[serde(default)]
    pub system: SystemSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    #[serde(default)]
    pub cpu_times: Option<CpuTimes>,
    #[serde(default)]
    pub memory_full_info: Option<MemoryInfo>,
    #[serde(default)]
    pub num_ctx_switches: Option<ContextSwitches>,
}

/// Seconds of CPU time consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
}

/// Memory in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub uss: Option<u64>,
    pub pss: Option<u64>,
    pub rss: Option<u64>,
    pub vms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSwitches {
    pub voluntary: u64,
    pub involuntary: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    #[serde(default)]
    pub cpu_freq: Option<CpuFrequency>,
    #[serde(default)]
    pub sensors_temperature: BTreeMap<String, Vec<Temperature>>,
    #[serde(default)]
    pub net_io_counters: BTreeMap<String, NetIoCounters>,
}

/// Mean frequency over all cores in MHz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuFrequency {
    pub current: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub current: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetIoCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

impl SystemSnapshot {
    /// CPU temperature as reported by the Raspberry Pi (`cpu_thermal`) or
    /// Jetson (`CPU-therm`) sensor.
    pub fn cpu_temperature(&self) -> Option<f64> {
        ["cpu_thermal", "CPU-therm"]
            .iter()
            .find_map(|name| self.sensors_temperature.get(*name))
            .and_then(|readings| readings.first())
            .map(|reading| reading.current)
    }
}

fn parse_stat_cpu_times(stat: &str) -> Option<CpuTimes> {
    // The command name may contain spaces; fields restart after its ')'.
    let (_, rest) = stat.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let user = fields.get(11)?.parse::<f64>().ok()?;
    let system = fields.get(12)?.parse::<f64>().ok()?;
    Some(CpuTimes {
        user: user / USER_HZ,
        system: system / USER_HZ,
    })
}

/// Values of `Key:   123 kB` lines, in bytes.
fn parse_kb_fields(text: &str) -> BTreeMap<&str, u64> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let mut parts = value.split_whitespace();
            let amount = parts.next()?.parse::<u64>().ok()?;
            let factor = if parts.next() == Some("kB") { 1024 } else { 1 };
            Some((key.trim(), amount * factor))
        })
        .collect()
}

fn parse_smaps_rollup(text: &str) -> MemoryInfo {
    let fields = parse_kb_fields(text);
    let private = ["Private_Clean", "Private_Dirty", "Private_Hugetlb"]
        .iter()
        .filter_map(|key| fields.get(key))
        .copied()
        .reduce(|a, b| a + b);
    MemoryInfo {
        uss: private,
        pss: fields.get("Pss").copied(),
        rss: fields.get("Rss").copied(),
        vms: None,
    }
}

fn parse_status(text: &str) -> (Option<ContextSwitches>, Option<u64>, Option<u64>) {
    let fields = parse_kb_fields(text);
    let switches = match (
        fields.get("voluntary_ctxt_switches"),
        fields.get("nonvoluntary_ctxt_switches"),
    ) {
        (Some(voluntary), Some(involuntary)) => Some(ContextSwitches {
            voluntary: *voluntary,
            involuntary: *involuntary,
        }),
        _ => None,
    };
    (switches, fields.get("VmRSS").copied(), fields.get("VmSize").copied())
}

/// Reads resource usage from sysinfo and `/proc`.
pub struct ResourceCollector {
    system: System,
    networks: Networks,
    components: Components,
}

impl Default for ResourceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
        }
    }

    pub fn snapshot(&mut self, pid: Option<u32>) -> ResourceSnapshot {
        ResourceSnapshot {
            process: pid.map(|pid| self.process_snapshot(pid)),
            system: self.system_snapshot(),
        }
    }

    fn process_snapshot(&mut self, pid: u32) -> ProcessSnapshot {
        let proc_dir = format!("/proc/{}", pid);
        let cpu_times = std::fs::read_to_string(format!("{}/stat", proc_dir))
            .ok()
            .and_then(|stat| parse_stat_cpu_times(&stat));
        let (num_ctx_switches, status_rss, status_vms) = std::fs::read_to_string(format!("{}/status", proc_dir))
            .map(|status| parse_status(&status))
            .unwrap_or((None, None, None));
        let mut memory = std::fs::read_to_string(format!("{}/smaps_rollup", proc_dir))
            .map(|smaps| parse_smaps_rollup(&smaps))
            .unwrap_or_default();
        memory.rss = memory.rss.or(status_rss);
        memory.vms = status_vms;

        if memory.rss.is_none() || memory.vms.is_none() {
            let sysinfo_pid = Pid::from_u32(pid);
            if self.system.refresh_process(sysinfo_pid) {
                if let Some(process) = self.system.process(sysinfo_pid) {
                    memory.rss = memory.rss.or(Some(process.memory()));
                    memory.vms = memory.vms.or(Some(process.virtual_memory()));
                }
            }
        }

        ProcessSnapshot {
            cpu_times,
            memory_full_info: Some(memory),
            num_ctx_switches,
        }
    }

    fn system_snapshot(&mut self) -> SystemSnapshot {
        self.system.refresh_cpu();
        let cpus = self.system.cpus();
        let cpu_freq = (!cpus.is_empty()).then(|| CpuFrequency {
            current: cpus.iter().map(|cpu| cpu.frequency() as f64).sum::<f64>() / cpus.len() as f64,
        });

        self.components.refresh();
        let mut sensors_temperature: BTreeMap<String, Vec<Temperature>> = BTreeMap::new();
        for component in self.components.iter() {
            let name = component
                .label()
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            sensors_temperature.entry(name).or_default().push(Temperature {
                current: f64::from(component.temperature()),
            });
        }

        self.networks.refresh();
        let net_io_counters = self
            .networks
            .iter()
            .map(|(name, data)| {
                (
                    name.clone(),
                    NetIoCounters {
                        bytes_sent: data.total_transmitted(),
                        bytes_recv: data.total_received(),
                        packets_sent: data.total_packets_transmitted(),
                        packets_recv: data.total_packets_received(),
                    },
                )
            })
            .collect();

        SystemSnapshot {
            cpu_freq,
            sensors_temperature,
            net_io_counters,
        }
    }
}

/// Logs a [`ResourceSnapshot`] of the vendor process and the system at a
/// fixed interval until cancelled.
pub struct ResourceMonitor {
    vendor: VendorHandle,
    interval: Duration,
}

impl ResourceMonitor {
    pub fn new(vendor: VendorHandle) -> Self {
        Self {
            vendor,
            interval: DEFAULT_MONITOR_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("Monitoring resource consumption every {:?}", self.interval);
        let mut collector = ResourceCollector::new();
        let mut ticks = interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {}
                _ = cancel.cancelled() => return Ok(()),
            }
            let snapshot = collector.snapshot(self.vendor.pid());
            match serde_json::to_string(&snapshot) {
                Ok(json) => info!(source = RESOURCE_MONITOR_SOURCE, "{}", json),
                Err(e) => debug!(error = %e, "Failed to serialize resource snapshot"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat() {
        let stat = "1234 (ptp4l (main)) S 1 1234 1234 0 -1 4194560 120 0 0 0 250 75 0 0 20 0 1 0 100 0";
        let times = parse_stat_cpu_times(stat).unwrap();
        assert_eq!(times.user, 2.5);
        assert_eq!(times.system, 0.75);
    }

    #[test]
    fn test_parse_memory_and_switches() {
        let smaps = "55d0c0000000-7ffd00000000 ---p 00000000 00:00 0 [rollup]\n\
                     Rss:                3000 kB\n\
                     Pss:                1500 kB\n\
                     Private_Clean:       200 kB\n\
                     Private_Dirty:       800 kB\n";
        let memory = parse_smaps_rollup(smaps);
        assert_eq!(memory.rss, Some(3000 * 1024));
        assert_eq!(memory.pss, Some(1500 * 1024));
        assert_eq!(memory.uss, Some(1000 * 1024));

        let status = "Name:\tptp4l\nVmSize:\t   10000 kB\nVmRSS:\t    3000 kB\n\
                      voluntary_ctxt_switches:\t42\nnonvoluntary_ctxt_switches:\t7\n";
        let (switches, rss, vms) = parse_status(status);
        assert_eq!(
            switches,
            Some(ContextSwitches {
                voluntary: 42,
                involuntary: 7
            })
        );
        assert_eq!(rss, Some(3000 * 1024));
        assert_eq!(vms, Some(10000 * 1024));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = r#"{
            "process": {"cpu_times": {"user": 1.0, "system": 0.5}},
            "system": {
                "cpu_freq": {"current": 1500.0},
                "sensors_temperature": {"cpu_thermal": [{"current": 48.2}]},
                "net_io_counters": {"eth0": {"bytes_sent": 1, "bytes_recv": 2, "packets_sent": 3, "packets_recv": 4}}
            }
        }"#;
        let snapshot: ResourceSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.system.cpu_temperature(), Some(48.2));
        assert_eq!(snapshot.system.net_io_counters["eth0"].packets_recv, 4);
        let process = snapshot.process.unwrap();
        assert!(process.memory_full_info.is_none());
        assert_eq!(process.cpu_times.unwrap().system, 0.5);
    }

    #[test]
    fn test_collects_own_process() {
        let mut collector = ResourceCollector::new();
        let snapshot = collector.snapshot(Some(std::process::id()));
        let process = snapshot.process.unwrap();
        assert!(process.cpu_times.is_some());
        assert!(process.memory_full_info.unwrap().rss.is_some());
    }
}
