use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ptp_perf_common::{EndpointType, Error};

use crate::duration::duration_serde;
use crate::machine::{Cluster, ClusterConfig, Machine};
use crate::paths::Paths;

pub mod validation;

pub const DEFAULT_CONFIG_PATH: &str = "deploy/ptp-perf.yaml";
pub const CONFIG_PATH_ENV: &str = "PTP_PERF_CONFIG";

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtpPerfConfig {
    /// SQLite database shared by the orchestrator and the workers.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_repository_root")]
    pub repository_root: PathBuf,
    /// Command run inside `remote_root` on each worker machine.
    #[serde(default = "default_remote_worker_command")]
    pub remote_worker_command: String,
    #[serde(default = "default_rsync_excludes")]
    pub rsync_excludes: Vec<String>,
    #[serde(default = "default_ssh_options")]
    pub ssh_options: Vec<String>,
    #[serde(default = "default_reboot_timeout", with = "duration_serde")]
    pub reboot_timeout: Duration,
    pub machines: Vec<Machine>,
    pub clusters: Vec<ClusterConfig>,
    #[serde(default)]
    pub power_strips: Vec<PowerStripConfig>,
}

/// A switchable power strip and the machines plugged into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerStripConfig {
    pub id: String,
    /// Shell command switching one socket. `{socket}` and `{state}` (`on`
    /// or `off`) are substituted; the command prints the resulting state.
    pub set_command: String,
    /// Machine id to socket number.
    pub sockets: BTreeMap<String, u32>,
}

impl PowerStripConfig {
    pub fn command_for(&self, socket: u32, state: bool) -> String {
        self.set_command
            .replace("{socket}", &socket.to_string())
            .replace("{state}", if state { "on" } else { "off" })
    }
}

impl PtpPerfConfig {
    /// Load configuration from the explicit path, `PTP_PERF_CONFIG`, or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        Self::load_from_file(path)
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: PtpPerfConfig = serde_yaml::from_str(content)
            .context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn paths(&self) -> Paths {
        Paths::new(self.repository_root.clone())
    }

    /// The database location, relative paths taken from the repository root.
    pub fn database_file(&self) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            self.repository_root.join(&self.database_path)
        }
    }

    pub fn machine(&self, id: &str) -> ptp_perf_common::Result<&Machine> {
        self.machines
            .iter()
            .find(|machine| machine.id == id)
            .ok_or_else(|| Error::config_not_found(format!("machine '{}'", id)))
    }

    /// Machines of a role that are not part of any cluster, like switches.
    pub fn machine_by_type(&self, endpoint_type: EndpointType) -> ptp_perf_common::Result<&Machine> {
        self.machines
            .iter()
            .find(|machine| machine.endpoint_type == endpoint_type)
            .ok_or_else(|| Error::config_not_found(format!("{} machine", endpoint_type)))
    }

    pub fn cluster(&self, id: &str) -> ptp_perf_common::Result<Cluster> {
        let declared = self
            .clusters
            .iter()
            .find(|cluster| cluster.id == id)
            .ok_or_else(|| Error::config_not_found(format!("cluster '{}'", id)))?;

        let machines = declared
            .machines
            .iter()
            .map(|machine_id| self.machine(machine_id).cloned())
            .collect::<ptp_perf_common::Result<Vec<_>>>()?;

        Ok(Cluster {
            id: declared.id.clone(),
            name: declared.name.clone(),
            machines,
        })
    }

    /// The cluster containing `machine_id`, first declared wins.
    pub fn cluster_of_machine(&self, machine_id: &str) -> ptp_perf_common::Result<Cluster> {
        let declared = self
            .clusters
            .iter()
            .find(|cluster| cluster.machines.iter().any(|id| id == machine_id))
            .ok_or_else(|| Error::config_not_found(format!("cluster containing '{}'", machine_id)))?;
        self.cluster(&declared.id)
    }

    /// The power strip and socket `machine_id` is plugged into.
    pub fn power_socket(&self, machine_id: &str) -> Option<(&PowerStripConfig, u32)> {
        self.power_strips.iter().find_map(|strip| {
            strip
                .sockets
                .get(machine_id)
                .map(|socket| (strip, *socket))
        })
    }
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("data/ptp-perf.sqlite3")
}

fn default_repository_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote_worker_command() -> String {
    "target/release/run_worker".to_string()
}

fn default_rsync_excludes() -> Vec<String> {
    [".git", "target", "data", "dataset", "local"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ssh_options() -> Vec<String> {
    [
        "ServerAliveInterval=2",
        "ServerAliveCountMax=5",
        "ConnectTimeout=5",
        "ConnectionAttempts=1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_reboot_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = r#"
database_path: data/test.sqlite3
machines:
  - id: rpi06
    address: 10.0.0.6
    endpoint_type: master
    ptp_interface: eth0
    ptp_priority_1: 1
    plugin_settings:
      iperf_server: true
      iperf_address: 10.0.0.6
  - id: rpi08
    endpoint_type: primary-slave
    ptp_interface: eth0
    ptp_software_timestamping: true
    initial_clock_offset: -1m
  - id: rpi07
    endpoint_type: secondary-slave
    ptp_interface: eth0
  - id: switch
    endpoint_type: switch
clusters:
  - id: rpi-4
    name: Raspberry Pi 4
    machines: [rpi06, rpi08, rpi07]
power_strips:
  - id: pdu
    set_command: "pdu-switch --socket {socket} --state {state}"
    sockets:
      switch: 1
      rpi06: 2
"#;

    #[test]
    fn test_load_from_string() {
        let config = PtpPerfConfig::load_from_string(SAMPLE).unwrap();

        assert_eq!(config.machines.len(), 4);
        assert_eq!(config.reboot_timeout, Duration::from_secs(300));
        assert_eq!(config.ssh_options.len(), 4);

        let slave = config.machine("rpi08").unwrap();
        assert_eq!(slave.endpoint_type, EndpointType::PrimarySlave);
        assert_eq!(slave.initial_clock_offset, Some(chrono::Duration::seconds(-60)));
        assert!(slave.ptp_use_phc2sys);
        assert_eq!(slave.ptp_priority_1, 128);

        let cluster = config.cluster("rpi-4").unwrap();
        assert_eq!(cluster.machines.len(), 3);
        assert_eq!(cluster.ptp_master().unwrap().id, "rpi06");
        assert_eq!(config.machine_by_type(EndpointType::Switch).unwrap().id, "switch");
    }

    #[test]
    fn test_power_socket_lookup() {
        let config = PtpPerfConfig::load_from_string(SAMPLE).unwrap();
        let (strip, socket) = config.power_socket("switch").unwrap();
        assert_eq!(socket, 1);
        assert_eq!(strip.command_for(socket, false), "pdu-switch --socket 1 --state off");
        assert!(config.power_socket("rpi08").is_none());
    }

    #[test]
    fn test_database_file_is_relative_to_root() {
        let mut config = PtpPerfConfig::load_from_string(SAMPLE).unwrap();
        config.repository_root = PathBuf::from("/srv/ptp-perf");
        assert_eq!(config.database_file(), PathBuf::from("/srv/ptp-perf/data/test.sqlite3"));
    }

    #[test]
    fn test_offset_of_wrong_kind_is_rejected() {
        let broken = SAMPLE.replace("initial_clock_offset: -1m", "initial_clock_offset: secondary-slave");
        let err = PtpPerfConfig::load_from_string(&broken).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse YAML configuration"));
    }

    #[test]
    fn test_unknown_endpoint_type_is_rejected() {
        let broken = SAMPLE.replace("endpoint_type: secondary-slave", "endpoint_type: backup");
        assert!(PtpPerfConfig::load_from_string(&broken).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = PtpPerfConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.clusters[0].id, "rpi-4");

        assert!(PtpPerfConfig::load_from_file("/nonexistent/ptp-perf.yaml").is_err());
    }
}
