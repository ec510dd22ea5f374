//! Artificial network and CPU load.

use std::time::Duration;

use ptp_perf_common::{Error, Result};
use ptp_perf_config::{Benchmark, Cluster, Machine};
use ptp_perf_invoke::Invocation;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default port of an iperf2 server.
pub const IPERF_PORT: u16 = 5001;

const CONNECT_ATTEMPTS: u32 = 8;
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(4);

/// Translates a DSCP class (`cs1`, `af41`, `ef` or a number) into the
/// IP TOS byte iperf expects.
pub fn dscp_to_tos(dscp: &str) -> Result<u8> {
    let name = dscp.trim().to_ascii_lowercase();
    let invalid = || Error::validation(format!("Unknown DSCP class '{}'", dscp));
    let code: u8 = if name == "ef" {
        46
    } else if let Some(class) = name.strip_prefix("cs") {
        class.parse::<u8>().ok().filter(|c| *c <= 7).ok_or_else(invalid)? * 8
    } else if let Some(class) = name.strip_prefix("af") {
        let digits: Vec<u8> = class.bytes().map(|b| b.wrapping_sub(b'0')).collect();
        match digits.as_slice() {
            [class @ 1..=4, drop @ 1..=3] => class * 8 + drop * 2,
            _ => return Err(invalid()),
        }
    } else {
        name.parse::<u8>().ok().filter(|c| *c < 64).ok_or_else(invalid)?
    };
    Ok(code << 2)
}

/// The iperf role of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IperfRole {
    Server,
    Client { server_address: String },
}

/// Floods the network with iperf traffic for the duration of a run.
///
/// The cluster member flagged as iperf server runs `iperf -s`, every other
/// worker connects to it as a client.
#[derive(Debug, Clone)]
pub struct NetworkPerformanceDegrader {
    role: IperfRole,
    bandwidth_mbit: u32,
    tos: Option<u8>,
}

impl NetworkPerformanceDegrader {
    pub fn new(benchmark: &Benchmark, machine: &Machine, cluster: &Cluster) -> Result<Self> {
        let server = cluster.iperf_server().ok_or_else(|| {
            Error::config_not_found(format!(
                "iperf server in cluster {}, exactly one machine must be flagged",
                cluster.id
            ))
        })?;

        let role = if server.id == machine.id {
            IperfRole::Server
        } else {
            let settings = server.plugin_settings();
            let address = if benchmark.artificial_load_network_secondary_interface {
                settings.iperf_secondary_address.ok_or_else(|| {
                    Error::config_not_found(format!("secondary iperf address of {}", server.id))
                })?
            } else {
                settings
                    .iperf_address
                    .unwrap_or_else(|| server.ssh_address().to_string())
            };
            IperfRole::Client {
                server_address: address,
            }
        };

        let tos = benchmark
            .artificial_load_network_dscp_priority
            .as_deref()
            .map(dscp_to_tos)
            .transpose()?;

        Ok(Self {
            role,
            bandwidth_mbit: benchmark.artificial_load_network,
            tos,
        })
    }

    pub fn role(&self) -> &IperfRole {
        &self.role
    }

    pub fn command(&self) -> Invocation {
        let base = Invocation::of_command(["iperf", "-i", "1"]);
        let invocation = match &self.role {
            IperfRole::Server => base.append_arg("-s"),
            IperfRole::Client { server_address } => base
                .append_args(["-c", server_address.as_str(), "-d", "-t", "0"])
                .append_arg(format!("--bandwidth={}M", self.bandwidth_mbit)),
        };
        let invocation = match self.tos {
            Some(tos) => invocation.append_args(["--tos".to_string(), format!("0x{:02x}", tos)]),
            None => invocation,
        };
        invocation.hide().set_verify_return_code(false)
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if let IperfRole::Client { server_address } = &self.role {
            tokio::select! {
                reachable = wait_for_port(server_address, IPERF_PORT) => reachable?,
                _ = cancel.cancelled() => return Ok(()),
            }
            info!("Launching iperf client against {}", server_address);
        } else {
            info!("Launching iperf server");
        }
        self.command().run_until(cancel).await
    }
}

/// Polls `address:port` until a TCP connection succeeds, backing off
/// between attempts.
pub async fn wait_for_port(address: &str, port: u16) -> Result<()> {
    let mut backoff = INITIAL_BACKOFF;
    let mut waited = Duration::ZERO;
    for attempt in 1..=CONNECT_ATTEMPTS {
        match TcpStream::connect((address, port)).await {
            Ok(_) => return Ok(()),
            Err(e) => debug!(attempt, error = %e, "{}:{} not reachable yet", address, port),
        }
        if attempt < CONNECT_ATTEMPTS {
            sleep(backoff).await;
            waited += backoff;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
    Err(Error::timeout(format!("connecting to {}:{}", address, port), waited))
}

/// Loads the CPU with stress-ng for the duration of a run.
#[derive(Debug, Clone)]
pub struct CpuPerformanceDegrader {
    cpus: u32,
    load_percent: u32,
    taskset: Option<String>,
    scheduler: Option<String>,
}

impl CpuPerformanceDegrader {
    pub fn new(benchmark: &Benchmark, machine: &Machine) -> Result<Self> {
        let settings = machine.plugin_settings();
        let taskset = if benchmark.artificial_load_cpu_restrict_cores {
            Some(settings.stress_ng_cpu_restrict_cores.ok_or_else(|| {
                Error::config_not_found(format!("stress-ng core restriction of {}", machine.id))
            })?)
        } else {
            None
        };
        Ok(Self {
            cpus: settings.stress_ng_cpus,
            load_percent: benchmark.artificial_load_cpu,
            taskset,
            scheduler: benchmark.artificial_load_cpu_scheduler.clone(),
        })
    }

    pub fn command(&self) -> Invocation {
        let mut invocation = Invocation::of_command(["stress-ng", "--metrics-brief"])
            .append_args(["--cpu".to_string(), self.cpus.to_string()])
            .append_args(["--cpu-load".to_string(), self.load_percent.to_string()]);
        if let Some(cores) = &self.taskset {
            invocation = invocation.append_args(["--taskset", cores.as_str()]);
        }
        if let Some(scheduler) = &self.scheduler {
            invocation = invocation.append_args(["--sched", scheduler.as_str()]);
        }
        invocation.hide().set_verify_return_code(false)
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("Launching stress-ng at {}% load", self.load_percent);
        self.command().run_until(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_perf_common::{EndpointType, ErrorKind};
    use ptp_perf_config::PluginSettings;

    fn cluster() -> Cluster {
        let mut server = Machine::new("rpi06", EndpointType::Master);
        server.plugin_settings = Some(PluginSettings {
            iperf_server: true,
            iperf_address: Some("192.168.1.106".to_string()),
            iperf_secondary_address: Some("10.0.0.106".to_string()),
            ..Default::default()
        });
        let mut client = Machine::new("rpi08", EndpointType::PrimarySlave);
        client.plugin_settings = Some(PluginSettings {
            stress_ng_cpus: 4,
            stress_ng_cpu_restrict_cores: Some("2,3".to_string()),
            ..Default::default()
        });
        Cluster {
            id: "rpi-4".to_string(),
            name: "Raspberry Pi 4".to_string(),
            machines: vec![server, client],
        }
    }

    #[test]
    fn test_dscp_to_tos() {
        assert_eq!(dscp_to_tos("cs1").unwrap(), 0x20);
        assert_eq!(dscp_to_tos("AF41").unwrap(), 0x88);
        assert_eq!(dscp_to_tos("ef").unwrap(), 0xb8);
        assert_eq!(dscp_to_tos("10").unwrap(), 0x28);
        assert_eq!(dscp_to_tos("af5").unwrap_err().kind(), ErrorKind::Validation);
        assert!(dscp_to_tos("cs9").is_err());
    }

    #[test]
    fn test_iperf_roles() {
        let cluster = cluster();
        let mut benchmark = Benchmark::new("load/net", "Network load");
        benchmark.artificial_load_network = 500;
        benchmark.artificial_load_network_dscp_priority = Some("cs1".to_string());

        let server = NetworkPerformanceDegrader::new(&benchmark, &cluster.machines[0], &cluster).unwrap();
        assert_eq!(server.command().command_line(), "iperf -i 1 -s --tos 0x20");

        let client = NetworkPerformanceDegrader::new(&benchmark, &cluster.machines[1], &cluster).unwrap();
        assert_eq!(
            client.command().command_line(),
            "iperf -i 1 -c 192.168.1.106 -d -t 0 --bandwidth=500M --tos 0x20"
        );

        benchmark.artificial_load_network_secondary_interface = true;
        let isolated = NetworkPerformanceDegrader::new(&benchmark, &cluster.machines[1], &cluster).unwrap();
        assert_eq!(
            isolated.role(),
            &IperfRole::Client {
                server_address: "10.0.0.106".to_string()
            }
        );
    }

    #[test]
    fn test_missing_iperf_server() {
        let mut cluster = cluster();
        cluster.machines[0].plugin_settings = None;
        let benchmark = Benchmark::new("load/net", "Network load");
        let err = NetworkPerformanceDegrader::new(&benchmark, &cluster.machines[1], &cluster).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigNotFound);
    }

    #[test]
    fn test_stress_ng_command() {
        let cluster = cluster();
        let mut benchmark = Benchmark::new("load/cpu", "CPU load");
        benchmark.artificial_load_cpu = 50;
        let plain = CpuPerformanceDegrader::new(&benchmark, &cluster.machines[1]).unwrap();
        assert_eq!(
            plain.command().command_line(),
            "stress-ng --metrics-brief --cpu 4 --cpu-load 50"
        );

        benchmark.artificial_load_cpu_restrict_cores = true;
        benchmark.artificial_load_cpu_scheduler = Some("idle".to_string());
        let isolated = CpuPerformanceDegrader::new(&benchmark, &cluster.machines[1]).unwrap();
        assert_eq!(
            isolated.command().command_line(),
            "stress-ng --metrics-brief --cpu 4 --cpu-load 50 --taskset 2,3 --sched idle"
        );

        let err = CpuPerformanceDegrader::new(&benchmark, &cluster.machines[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigNotFound);
    }

    #[tokio::test]
    async fn test_wait_for_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        wait_for_port("127.0.0.1", port).await.unwrap();
    }
}
