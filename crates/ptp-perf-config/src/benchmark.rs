//! Benchmark definitions.

use std::fmt;
use std::time::Duration;

use ptp_perf_common::EndpointType;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BENCHMARK_DURATION: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_CONVERGENCE_SIGN_CHANGES: usize = 5;

/// Tags used to categorize benchmarks.
pub mod tags {
    pub const CATEGORY_FAULT: &str = "category_fault";
    pub const CATEGORY_LOAD: &str = "category_load";
    pub const CATEGORY_CONFIGURATION: &str = "category_configuration";
    pub const FAULT_SOFTWARE: &str = "fault_software";
    pub const FAULT_HARDWARE: &str = "fault_hardware";
    pub const FAULT_LOCATION_SWITCH: &str = "fault_location_switch";
    pub const FAULT_LOCATION_SLAVE: &str = "fault_location_slave";
    pub const FAULT_LOCATION_MASTER: &str = "fault_location_master";
    pub const COMPONENT_NET: &str = "component_net";
    pub const COMPONENT_CPU: &str = "component_cpu";
    pub const ISOLATION_UNPRIORITIZED: &str = "isolation_unprioritized";
    pub const ISOLATION_PRIORITIZED: &str = "isolation_prioritized";
    pub const ISOLATION_ISOLATED: &str = "isolation_isolated";
    pub const CONFIGURATION_INTERVAL: &str = "configuration_interval";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayMechanism {
    E2E,
    P2P,
}

impl fmt::Display for DelayMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayMechanism::E2E => write!(f, "E2E"),
            DelayMechanism::P2P => write!(f, "P2P"),
        }
    }
}

/// PTP daemon settings rendered into the vendor configuration file.
///
/// Intervals are log2 seconds as in the PTP standard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtpConfig {
    pub delay_mechanism: DelayMechanism,
    pub log_announce_interval: i32,
    pub log_sync_interval: i32,
    pub log_delayreq_interval: i32,
}

impl Default for PtpConfig {
    fn default() -> Self {
        Self {
            delay_mechanism: DelayMechanism::E2E,
            log_announce_interval: 1,
            log_sync_interval: 0,
            log_delayreq_interval: 0,
        }
    }
}

impl PtpConfig {
    /// The smallest of the configured intervals.
    pub fn log_log_interval(&self) -> i32 {
        self.log_announce_interval
            .min(self.log_sync_interval)
            .min(self.log_delayreq_interval)
    }

    pub fn has_non_standard_intervals(&self) -> bool {
        self.log_announce_interval != 1 || self.log_sync_interval != 0 || self.log_delayreq_interval != 0
    }

    /// Value of a field by its template name.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "delay_mechanism" => self.delay_mechanism.to_string(),
            "log_announce_interval" => self.log_announce_interval.to_string(),
            "log_sync_interval" => self.log_sync_interval.to_string(),
            "log_delayreq_interval" => self.log_delayreq_interval.to_string(),
            "log_log_interval" => self.log_log_interval().to_string(),
            _ => return None,
        };
        Some(value)
    }
}

/// What a measurement run does and how its results are judged.
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub version: u32,
    pub duration: Duration,
    pub num_machines: usize,
    pub ptp_config: PtpConfig,
    /// Restart the PTP daemon whenever it exits.
    pub ptp_keepalive: bool,
    /// Clock steps tolerated by the analysis. `None` means unlimited.
    pub analyze_limit_permissible_clock_steps: Option<usize>,
    /// Sign changes after the clock step that mark initial convergence.
    pub convergence_sign_changes: usize,
    pub setup_use_initial_clock_offset: bool,

    /// Target iperf bandwidth in Mbit/s.
    pub artificial_load_network: u32,
    pub artificial_load_network_dscp_priority: Option<String>,
    pub artificial_load_network_secondary_interface: bool,
    /// Target stress-ng CPU load in percent.
    pub artificial_load_cpu: u32,
    pub artificial_load_cpu_scheduler: Option<String>,
    pub artificial_load_cpu_restrict_cores: bool,
    pub artificial_load_aux: bool,
    pub artificial_load_aux_options: Vec<String>,

    pub fault_ssh_keepalive: bool,
    pub fault_software: bool,
    pub fault_hardware: bool,
    pub fault_interval: Option<Duration>,
    pub fault_duration: Option<Duration>,
    pub fault_location: Option<EndpointType>,
    pub fault_failover: bool,

    pub monitor_resource_consumption: bool,
}

impl Benchmark {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            version: 1,
            duration: DEFAULT_BENCHMARK_DURATION,
            num_machines: 2,
            ptp_config: PtpConfig::default(),
            ptp_keepalive: false,
            analyze_limit_permissible_clock_steps: Some(1),
            convergence_sign_changes: DEFAULT_CONVERGENCE_SIGN_CHANGES,
            setup_use_initial_clock_offset: true,
            artificial_load_network: 0,
            artificial_load_network_dscp_priority: None,
            artificial_load_network_secondary_interface: false,
            artificial_load_cpu: 0,
            artificial_load_cpu_scheduler: None,
            artificial_load_cpu_restrict_cores: false,
            artificial_load_aux: false,
            artificial_load_aux_options: Vec::new(),
            fault_ssh_keepalive: false,
            fault_software: false,
            fault_hardware: false,
            fault_interval: None,
            fault_duration: None,
            fault_location: None,
            fault_failover: false,
            monitor_resource_consumption: false,
        }
    }

    /// Seconds between two sync messages.
    pub fn sync_interval_seconds(&self) -> f64 {
        2f64.powi(self.ptp_config.log_sync_interval)
    }

    pub fn has_faults(&self) -> bool {
        self.fault_software || self.fault_hardware
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn summary_text(&self) -> String {
        format!(
            "Benchmark: {}\n  id: {}, {} machines, {} duration.\n{}",
            self.name,
            self.id,
            self.num_machines,
            crate::duration::format_duration(self.duration),
            self.description
        )
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals() {
        let standard = PtpConfig::default();
        assert!(!standard.has_non_standard_intervals());
        assert_eq!(standard.log_log_interval(), 0);

        let fast = PtpConfig {
            log_sync_interval: -3,
            log_delayreq_interval: -3,
            ..PtpConfig::default()
        };
        assert!(fast.has_non_standard_intervals());
        assert_eq!(fast.log_log_interval(), -3);
        assert_eq!(fast.field("log_sync_interval").as_deref(), Some("-3"));
        assert_eq!(fast.field("unknown"), None);
    }

    #[test]
    fn test_sync_interval_seconds() {
        let mut benchmark = Benchmark::new("b", "B");
        assert_eq!(benchmark.sync_interval_seconds(), 1.0);
        benchmark.ptp_config.log_sync_interval = -2;
        assert_eq!(benchmark.sync_interval_seconds(), 0.25);
        benchmark.ptp_config.log_sync_interval = 3;
        assert_eq!(benchmark.sync_interval_seconds(), 8.0);
    }
}
