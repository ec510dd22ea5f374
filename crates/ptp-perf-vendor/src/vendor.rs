//! The vendor sum type and its shared contract.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use ptp_perf_common::{ClientType, EndpointId, Error, Result};
use ptp_perf_config::{render_template, Benchmark, Cluster, Machine, Paths};
use ptp_perf_invoke::{Invocation, InvocationHandle, TaskGroup};
use ptp_perf_store::{LogRecord, RunStore, Sample};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{chrony, linuxptp, ptpd, sptp, systemd_ntp};

/// The PTP implementations under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorKind {
    SystemdNtp,
    Ptpd,
    LinuxPtp,
    Sptp,
    Chrony,
}

/// A registered vendor. Several vendors may share one kind, e.g. SPTP with
/// hardware and with software timestamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: VendorKind,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Everything a vendor needs to know about the endpoint it runs on.
#[derive(Debug, Clone, Copy)]
pub struct VendorContext<'a> {
    pub benchmark: &'a Benchmark,
    pub machine: &'a Machine,
    pub cluster: &'a Cluster,
    pub paths: &'a Paths,
}

impl VendorContext<'_> {
    pub fn client_type(&self) -> Result<ClientType> {
        self.machine.effective_client_type(self.benchmark.fault_failover)
    }

    /// Applies the benchmark's keep-alive policy to a daemon invocation.
    pub(crate) fn supervise(&self, invocation: Invocation) -> Invocation {
        invocation.keep_alive(self.benchmark.ptp_keepalive)
    }
}

impl Vendor {
    /// The executable whose presence marks the vendor as installed.
    pub fn executable(&self) -> &'static str {
        match self.kind {
            VendorKind::SystemdNtp => "timedatectl",
            VendorKind::Ptpd => "ptpd",
            VendorKind::LinuxPtp => "ptp4l",
            VendorKind::Sptp => "sptp",
            VendorKind::Chrony => chrony::CHRONYD,
        }
    }

    pub fn installed(&self) -> bool {
        match self.kind {
            VendorKind::Sptp => sptp::installed(),
            VendorKind::Chrony => std::path::Path::new(chrony::CHRONYD).exists(),
            _ => ptp_perf_process::executable_in_path(self.executable()),
        }
    }

    /// Reports a missing executable as *not-installed*.
    pub fn ensure_installed(&self) -> Result<()> {
        if self.installed() {
            Ok(())
        } else {
            Err(Error::not_installed(self.id, self.executable()))
        }
    }

    pub fn supports_non_standard_intervals(&self) -> bool {
        matches!(self.kind, VendorKind::LinuxPtp | VendorKind::Sptp)
    }

    /// Log source whose records carry the vendor's measurements.
    pub fn log_source(&self) -> Option<&'static str> {
        match self.kind {
            VendorKind::SystemdNtp => None,
            VendorKind::Ptpd => Some(ptpd::LOG_SOURCE),
            VendorKind::LinuxPtp => Some(linuxptp::LOG_SOURCE),
            VendorKind::Sptp => Some(sptp::LOG_SOURCE),
            VendorKind::Chrony => Some(chrony::LOG_SOURCE),
        }
    }

    /// Template file for the endpoint's effective role, `None` for vendors
    /// without a configuration file.
    pub fn config_template_name(&self, client_type: ClientType) -> Result<Option<String>> {
        let name = match self.kind {
            VendorKind::SystemdNtp => return Ok(None),
            VendorKind::Ptpd | VendorKind::LinuxPtp => format!("{}_template.conf", self.kind_id()),
            VendorKind::Sptp => match client_type {
                ClientType::FailoverMaster => {
                    return Err(Error::invalid_state(self.id, "failover master is not supported"))
                }
                _ => format!("sptp_template_{}.conf", client_type.as_str()),
            },
            VendorKind::Chrony => format!("chrony_template_{}.conf", client_type.as_str()),
        };
        Ok(Some(name))
    }

    fn kind_id(&self) -> &'static str {
        match self.kind {
            VendorKind::SystemdNtp => "systemd-ntp",
            VendorKind::Ptpd => "ptpd",
            VendorKind::LinuxPtp => "linuxptp",
            VendorKind::Sptp => "sptp",
            VendorKind::Chrony => "chrony",
        }
    }

    /// Renders the role-specific template into the local config file.
    pub fn create_configuration_file(&self, context: &VendorContext<'_>) -> Result<Option<PathBuf>> {
        if !self.supports_non_standard_intervals()
            && context.benchmark.ptp_config.has_non_standard_intervals()
        {
            return Err(Error::config_not_found(format!(
                "{} configuration with non standard PTP intervals",
                self
            )));
        }
        let Some(template_name) = self.config_template_name(context.client_type()?)? else {
            return Ok(None);
        };

        let template_path = context.paths.config_template_dir().join(&template_name);
        let template = std::fs::read_to_string(&template_path).map_err(|e| {
            Error::from(e).context(format!("Failed to read template {}", template_path.display()))
        })?;
        let rendered = render_template(
            &template,
            &context.benchmark.ptp_config,
            context.machine,
            context.cluster,
        )?;

        let output = context.paths.vendor_config_file();
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output, rendered)?;
        debug!(vendor = self.id, template = %template_name, "Created configuration file {}", output.display());
        Ok(Some(output))
    }

    /// Builds the supervised processes of this vendor for one endpoint.
    pub fn prepare(&self, context: &VendorContext<'_>) -> Result<VendorProcesses> {
        let processes = match self.kind {
            VendorKind::SystemdNtp => Vec::new(),
            VendorKind::Ptpd => vec![VendorProcess::restartable(ptpd::daemon(context)?)],
            VendorKind::LinuxPtp => linuxptp::processes(context)?,
            VendorKind::Sptp => vec![VendorProcess::restartable(sptp::daemon(context)?)],
            VendorKind::Chrony => chrony::processes(context)?,
        };
        Ok(VendorProcesses {
            vendor: self.clone(),
            processes,
        })
    }

    /// Extracts clock-diff and path-delay samples from log records.
    pub fn extract_samples(&self, endpoint_id: EndpointId, records: &[LogRecord]) -> Result<Vec<Sample>> {
        match self.kind {
            VendorKind::SystemdNtp => Ok(Vec::new()),
            VendorKind::Ptpd => ptpd::extract_samples(endpoint_id, records),
            VendorKind::LinuxPtp => linuxptp::extract_samples(endpoint_id, records),
            VendorKind::Sptp => sptp::extract_samples(endpoint_id, records),
            VendorKind::Chrony => chrony::extract_samples(endpoint_id, records),
        }
    }

    /// Parses the endpoint's log records and stores the resulting samples.
    pub fn parse_log_data(&self, store: &RunStore, endpoint_id: EndpointId) -> Result<Vec<Sample>> {
        let Some(source) = self.log_source() else {
            return Ok(Vec::new());
        };
        let records = store.log_records(endpoint_id, Some(source))?;
        let samples = self.extract_samples(endpoint_id, &records)?;
        store.insert_samples(&samples)?;
        debug!(
            vendor = self.id,
            endpoint_id,
            records = records.len(),
            samples = samples.len(),
            "Parsed log data"
        );
        Ok(samples)
    }
}

/// One supervised process of a vendor.
#[derive(Debug, Clone)]
pub struct VendorProcess {
    pub invocation: Invocation,
    /// Delay before the process is started.
    pub start_delay: Duration,
    /// Whether a vendor restart restarts this process.
    pub restart_with_vendor: bool,
}

impl VendorProcess {
    pub fn restartable(invocation: Invocation) -> Self {
        Self {
            invocation,
            start_delay: Duration::ZERO,
            restart_with_vendor: true,
        }
    }

    pub fn auxiliary(invocation: Invocation, start_delay: Duration) -> Self {
        Self {
            invocation,
            start_delay,
            restart_with_vendor: false,
        }
    }
}

/// The processes of one vendor on one endpoint, ready to run.
#[derive(Debug, Clone)]
pub struct VendorProcesses {
    vendor: Vendor,
    processes: Vec<VendorProcess>,
}

impl VendorProcesses {
    pub fn vendor(&self) -> &Vendor {
        &self.vendor
    }

    pub fn processes(&self) -> &[VendorProcess] {
        &self.processes
    }

    pub fn handle(&self) -> VendorHandle {
        VendorHandle {
            vendor: self.vendor.id,
            handles: self
                .processes
                .iter()
                .filter(|process| process.restart_with_vendor)
                .map(|process| process.invocation.handle())
                .collect(),
        }
    }

    /// Runs all processes until the first one ends or `cancel` fires, then
    /// shuts the others down.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if self.vendor.kind == VendorKind::SystemdNtp {
            return systemd_ntp::run_service(cancel).await;
        }

        let mut group = TaskGroup::with_parent(self.vendor.id, &cancel);
        for process in self.processes {
            let label = process.invocation.command_short_name();
            group.add(label, move |cancel| async move {
                if !process.start_delay.is_zero() {
                    tokio::select! {
                        _ = sleep(process.start_delay) => {}
                        _ = cancel.cancelled() => return Ok(()),
                    }
                }
                process.invocation.run_until(cancel).await
            });
        }

        let outcome = group.run(None, false).await;
        info!(vendor = self.vendor.id, "Vendor processes ended: {:?}", outcome);
        group.cancel_pending().await
    }
}

/// Shared view on a running vendor, used for fault injection and for
/// reporting restarts.
#[derive(Debug, Clone)]
pub struct VendorHandle {
    vendor: &'static str,
    handles: Vec<InvocationHandle>,
}

impl VendorHandle {
    /// Groups handles of already built invocations, the first one being
    /// the vendor's main daemon.
    pub fn new(vendor: &'static str, handles: Vec<InvocationHandle>) -> Self {
        Self { vendor, handles }
    }

    pub fn running(&self) -> bool {
        self.handles.first().map_or(false, InvocationHandle::running)
    }

    pub fn restart(&self, kill: bool, restart_delay: Option<Duration>) -> Result<()> {
        if self.handles.is_empty() {
            return Err(Error::invalid_state(self.vendor, "vendor has no restartable process"));
        }
        for handle in &self.handles {
            handle.restart(kill, restart_delay)?;
        }
        Ok(())
    }

    pub fn restart_count(&self) -> u32 {
        self.handles.first().map_or(0, InvocationHandle::restart_count)
    }

    /// Id of the first process, the one resource consumption is measured on.
    pub fn pid(&self) -> Option<u32> {
        self.handles.first().and_then(InvocationHandle::pid)
    }
}
