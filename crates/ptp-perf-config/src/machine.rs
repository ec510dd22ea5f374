//! Machines and clusters as declared in the configuration file.

use ptp_perf_common::{ClientType, EndpointType, Error, Result};
use serde::{Deserialize, Serialize};

use crate::duration::option_offset_serde;

/// Hints for the load generators running on a machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// This machine hosts the iperf server of its cluster.
    #[serde(default)]
    pub iperf_server: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iperf_address: Option<String>,
    /// Address of the server on the secondary, non-PTP interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iperf_secondary_address: Option<String>,
    #[serde(default)]
    pub stress_ng_cpus: u32,
    /// Cores for `stress-ng --taskset` when the load is isolated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_ng_cpu_restrict_cores: Option<String>,
}

/// One host of the testbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    /// SSH destination. Defaults to the machine id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    #[serde(default)]
    pub ptp_interface: String,
    #[serde(default)]
    pub ptp_address: String,
    pub endpoint_type: EndpointType,
    #[serde(default)]
    pub ptp_software_timestamping: bool,
    #[serde(default = "default_use_phc2sys")]
    pub ptp_use_phc2sys: bool,
    /// BMCA priority 1, lower wins.
    #[serde(default = "default_ptp_priority_1")]
    pub ptp_priority_1: u8,
    /// Offset applied to the clock before the daemon starts.
    #[serde(
        default,
        with = "option_offset_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_clock_offset: Option<chrono::Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_settings: Option<PluginSettings>,
}

fn default_remote_root() -> String {
    "/home/rpi/ptp-perf".to_string()
}

fn default_use_phc2sys() -> bool {
    true
}

fn default_ptp_priority_1() -> u8 {
    128
}

impl Machine {
    /// Creates a machine with default settings for the given role.
    pub fn new(id: impl Into<String>, endpoint_type: EndpointType) -> Self {
        Self {
            id: id.into(),
            address: None,
            remote_root: default_remote_root(),
            ptp_interface: String::new(),
            ptp_address: String::new(),
            endpoint_type,
            ptp_software_timestamping: false,
            ptp_use_phc2sys: default_use_phc2sys(),
            ptp_priority_1: default_ptp_priority_1(),
            initial_clock_offset: None,
            plugin_settings: None,
        }
    }

    pub fn ssh_address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.id)
    }

    pub fn ptp_timestamp_type(&self) -> &'static str {
        if self.ptp_software_timestamping {
            "software"
        } else {
            "hardware"
        }
    }

    pub fn plugin_settings(&self) -> PluginSettings {
        self.plugin_settings.clone().unwrap_or_default()
    }

    /// The vendor role this machine runs as.
    ///
    /// A secondary slave takes over as failover master while a failover
    /// fault is active. Roles without a PTP daemon have no client type.
    pub fn effective_client_type(&self, failover_active: bool) -> Result<ClientType> {
        match self.endpoint_type {
            EndpointType::Master => Ok(ClientType::Master),
            EndpointType::FailoverMaster => Ok(ClientType::FailoverMaster),
            EndpointType::PrimarySlave | EndpointType::TertiarySlave => Ok(ClientType::Slave),
            EndpointType::SecondarySlave if failover_active => Ok(ClientType::FailoverMaster),
            EndpointType::SecondarySlave => Ok(ClientType::Slave),
            EndpointType::Orchestrator | EndpointType::Switch => Err(Error::invalid_state(
                self.id.as_str(),
                format!("{} does not run a PTP client", self.endpoint_type),
            )),
        }
    }
}

impl std::fmt::Display for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Cluster as written in the configuration file, referencing machines by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    pub name: String,
    pub machines: Vec<String>,
}

/// An ordered set of machines a benchmark runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub machines: Vec<Machine>,
}

impl Cluster {
    /// The same cluster restricted to its first `num_machines` machines.
    pub fn subset(&self, num_machines: usize) -> Cluster {
        Cluster {
            id: self.id.clone(),
            name: self.name.clone(),
            machines: self.machines.iter().take(num_machines).cloned().collect(),
        }
    }

    pub fn machine_by_id(&self, id: &str) -> Result<&Machine> {
        self.machines
            .iter()
            .find(|machine| machine.id == id)
            .ok_or_else(|| Error::config_not_found(format!("machine '{}' in cluster {}", id, self.id)))
    }

    /// The single machine declared with `endpoint_type`.
    pub fn machine_by_type(&self, endpoint_type: EndpointType) -> Result<&Machine> {
        let mut matching = self
            .machines
            .iter()
            .filter(|machine| machine.endpoint_type == endpoint_type);
        match (matching.next(), matching.next()) {
            (Some(machine), None) => Ok(machine),
            (None, _) => Err(Error::config_not_found(format!(
                "{} machine in cluster {}",
                endpoint_type, self.id
            ))),
            (Some(_), Some(_)) => Err(Error::validation(format!(
                "Cluster {} has more than one {} machine",
                self.id, endpoint_type
            ))),
        }
    }

    pub fn ptp_master(&self) -> Result<&Machine> {
        self.machine_by_type(EndpointType::Master)
    }

    /// The machine hosting the iperf server, if any.
    pub fn iperf_server(&self) -> Option<&Machine> {
        self.machines
            .iter()
            .find(|machine| machine.plugin_settings.as_ref().is_some_and(|p| p.iperf_server))
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        let mut master = Machine::new("rpi06", EndpointType::Master);
        master.plugin_settings = Some(PluginSettings {
            iperf_server: true,
            ..Default::default()
        });
        Cluster {
            id: "rpi-4".to_string(),
            name: "Raspberry Pi 4".to_string(),
            machines: vec![
                master,
                Machine::new("rpi08", EndpointType::PrimarySlave),
                Machine::new("rpi07", EndpointType::SecondarySlave),
            ],
        }
    }

    #[test]
    fn test_effective_client_type() {
        let secondary = Machine::new("rpi07", EndpointType::SecondarySlave);
        assert_eq!(secondary.effective_client_type(false).unwrap(), ClientType::Slave);
        assert_eq!(
            secondary.effective_client_type(true).unwrap(),
            ClientType::FailoverMaster
        );

        let primary = Machine::new("rpi08", EndpointType::PrimarySlave);
        assert_eq!(primary.effective_client_type(true).unwrap(), ClientType::Slave);

        let master = Machine::new("rpi06", EndpointType::Master);
        assert_eq!(master.effective_client_type(true).unwrap(), ClientType::Master);

        let switch = Machine::new("switch", EndpointType::Switch);
        assert!(switch.effective_client_type(false).is_err());
    }

    #[test]
    fn test_subset_keeps_order() {
        let subset = cluster().subset(2);
        let ids: Vec<_> = subset.machines.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["rpi06", "rpi08"]);
        assert_eq!(cluster().subset(10).machines.len(), 3);
    }

    #[test]
    fn test_lookup_by_type() {
        let cluster = cluster();
        assert_eq!(cluster.ptp_master().unwrap().id, "rpi06");
        assert_eq!(cluster.iperf_server().unwrap().id, "rpi06");
        assert!(cluster.machine_by_type(EndpointType::TertiarySlave).is_err());
    }
}
