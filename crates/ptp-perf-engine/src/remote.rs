//! Commands run against the testbed machines over SSH.

use std::path::Path;
use std::time::Duration;

use ptp_perf_common::{EndpointId, Result};
use ptp_perf_config::{Cluster, Machine, PtpPerfConfig};
use ptp_perf_invoke::{shell_join, Invocation, TaskGroup};
use tokio::time::sleep;
use tracing::{info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const REBOOT_GRACE: Duration = Duration::from_secs(3);
const RECONNECT_ATTEMPTS: u32 = 20;
const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Builds the SSH and rsync invocations of the configured testbed.
#[derive(Debug, Clone)]
pub struct Remote {
    ssh_options: Vec<String>,
    rsync_excludes: Vec<String>,
    repository_root: std::path::PathBuf,
    worker_command: String,
    reboot_timeout: Duration,
}

impl Remote {
    pub fn new(config: &PtpPerfConfig) -> Self {
        Self {
            ssh_options: config.ssh_options.clone(),
            rsync_excludes: config.rsync_excludes.clone(),
            repository_root: config.repository_root.clone(),
            worker_command: config.remote_worker_command.clone(),
            reboot_timeout: config.reboot_timeout,
        }
    }

    /// `ssh <options> <address> <command>`
    pub fn ssh(&self, machine: &Machine, command: impl Into<String>) -> Invocation {
        Invocation::of_command(["ssh"])
            .append_args(self.ssh_options.iter().flat_map(|option| ["-o".to_string(), option.clone()]))
            .append_arg(machine.ssh_address())
            .append_arg(command)
    }

    /// The shell line starting the worker of `endpoint_id` inside the
    /// machine's checkout.
    pub fn worker_command_line(
        &self,
        machine: &Machine,
        endpoint_id: EndpointId,
        duration_override: Option<Duration>,
    ) -> String {
        let mut worker = vec![
            self.worker_command.clone(),
            "--endpoint-id".to_string(),
            endpoint_id.to_string(),
        ];
        if let Some(duration) = duration_override {
            worker.push("--duration-secs".to_string());
            worker.push(duration.as_secs().to_string());
        }
        format!(
            "cd {} && LOG_EXCEPTIONS=1 {}",
            shell_join(&[machine.remote_root.as_str()]),
            shell_join(&worker)
        )
    }

    pub fn worker(&self, machine: &Machine, endpoint_id: EndpointId, duration_override: Option<Duration>) -> Invocation {
        self.ssh(machine, self.worker_command_line(machine, endpoint_id, duration_override))
    }

    /// Uploads the repository into the machine's `remote_root`.
    pub fn rsync(&self, machine: &Machine) -> Invocation {
        let source = with_trailing_slash(&self.repository_root);
        let destination = format!("{}:{}/", machine.ssh_address(), machine.remote_root.trim_end_matches('/'));
        Invocation::of_command(["rsync", "-a", "--delete"])
            .append_args(self.rsync_excludes.iter().map(|exclude| format!("--exclude={}", exclude)))
            .append_arg("-e")
            .append_arg(shell_join(
                &std::iter::once("ssh".to_string())
                    .chain(self.ssh_options.iter().flat_map(|option| ["-o".to_string(), option.clone()]))
                    .collect::<Vec<_>>(),
            ))
            .append_arg(source)
            .append_arg(destination)
            .hide_unless_failure()
    }

    /// Synchronizes the repository to every machine of the cluster.
    pub async fn sync_repository(&self, cluster: &Cluster) -> Result<()> {
        info!("Synchronizing repository to {} machines...", cluster.machines.len());
        let mut group = TaskGroup::new("rsync");
        for machine in &cluster.machines {
            let rsync = self.rsync(machine);
            group.add(format!("rsync {}", machine.id), move |cancel| async move {
                rsync.run_until(cancel).await
            });
        }
        group.run(None, true).await;
        group.cancel_pending().await
    }

    /// Reboots one machine and waits until it accepts SSH connections.
    ///
    /// Returns whether the machine came back.
    pub async fn reboot(&self, machine: &Machine) -> bool {
        // The connection drops while the command runs, so its outcome says
        // nothing about the reboot.
        let shutdown = self
            .ssh(machine, "sudo shutdown -r now")
            .set_verify_return_code(false)
            .hide_unless_failure();
        if let Err(e) = shutdown.run_for(SHUTDOWN_TIMEOUT).await {
            warn!("Shutdown of {} did not return: {}", machine, e);
        }
        sleep(REBOOT_GRACE).await;

        let deadline = tokio::time::Instant::now() + self.reboot_timeout;
        let mut failures = 0;
        while failures < RECONNECT_ATTEMPTS && tokio::time::Instant::now() < deadline {
            let probe = self.ssh(machine, "echo \"$(date): Restart OK\"").hide();
            if probe.run_for(RECONNECT_TIMEOUT).await.is_ok() {
                info!("Machine {} restarted successfully.", machine);
                return true;
            }
            failures += 1;
            sleep(RECONNECT_INTERVAL).await;
        }
        warn!("Machine {} not restarted successfully ({} connection failures).", machine, failures);
        false
    }

    /// Reboots all machines concurrently. Machines that do not come back
    /// are only reported; their missing worker shows in the run.
    pub async fn restart_cluster(&self, cluster: &Cluster) {
        info!("Restarting cluster ({} nodes)...", cluster.machines.len());
        let mut group = TaskGroup::new("restart");
        for machine in cluster.machines.clone() {
            let remote = self.clone();
            group.add(format!("restart {}", machine.id), move |_| async move {
                remote.reboot(&machine).await;
                Ok(())
            });
        }
        group.run(None, true).await;
        if let Err(e) = group.cancel_pending().await {
            warn!("Cluster restart incomplete: {}", e);
        }
    }
}

fn with_trailing_slash(path: &Path) -> String {
    let path = path.display().to_string();
    if path.ends_with('/') {
        path
    } else {
        format!("{}/", path)
    }
}
