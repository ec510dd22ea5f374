use std::time::Duration;

use ptp_perf_common::Result;
use ptp_perf_config::format_duration;
use ptp_perf_invoke::InvocationHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::device_control::DeviceController;
use crate::fault::{fault_message, FaultKind, FaultPhase, FAULT_LOG_SOURCE};

/// Cuts the power of the target machines at a fixed interval.
///
/// Each cycle powers the targets on, waits `interval`, powers them off and
/// waits `duration`. Whatever ends the generator, the targets are powered
/// on again before it returns.
pub struct HardwareFaultGenerator {
    controller: DeviceController,
    targets: Vec<String>,
    interval: Duration,
    duration: Duration,
    /// SSH sessions to keep alive while their machine is powered off.
    ssh_sessions: Vec<InvocationHandle>,
}

impl HardwareFaultGenerator {
    pub fn new(controller: DeviceController, targets: Vec<String>, interval: Duration, duration: Duration) -> Self {
        Self {
            controller,
            targets,
            interval,
            duration,
            ssh_sessions: Vec::new(),
        }
    }

    /// Restarts the given sessions when they drop out during a fault.
    ///
    /// Only sessions to the powered targets belong here: keep-alive also
    /// restarts a session that exits normally. Keep-alive is engaged right
    /// away and released when the generator returns.
    pub fn with_ssh_keepalive(mut self, sessions: Vec<InvocationHandle>) -> Self {
        for session in &sessions {
            session.set_keep_alive(true);
        }
        self.ssh_sessions = sessions;
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            source = FAULT_LOG_SOURCE,
            "Scheduling hardware faults every {} for {} on {}",
            format_duration(self.interval),
            format_duration(self.duration),
            self.targets.join(", ")
        );
        if !self.ssh_sessions.is_empty() {
            info!(source = FAULT_LOG_SOURCE, "SSH sessions of {} now on keep-alive", self.targets.join(", "));
        }

        let result = self.cycle(&cancel).await;

        let restored = self.controller.toggle_machines(&self.targets, true).await;
        if let Err(e) = &restored {
            error!(source = FAULT_LOG_SOURCE, error = %e, "Failed to power targets back on");
        }
        for session in &self.ssh_sessions {
            session.set_keep_alive(false);
        }
        result.and(restored)
    }

    async fn cycle(&self, cancel: &CancellationToken) -> Result<()> {
        let mut next_fault = Instant::now() + self.interval;
        loop {
            self.controller.toggle_machines(&self.targets, true).await?;
            tokio::select! {
                _ = sleep_until(next_fault) => {}
                _ = cancel.cancelled() => return Ok(()),
            }

            self.announce(FaultPhase::Imminent);
            self.controller.toggle_machines(&self.targets, false).await?;

            let resolved_at = next_fault + self.duration;
            let cancelled = tokio::select! {
                _ = sleep_until(resolved_at) => false,
                _ = cancel.cancelled() => true,
            };
            self.controller.toggle_machines(&self.targets, true).await?;
            self.announce(FaultPhase::Resolved);
            if cancelled {
                return Ok(());
            }
            next_fault = resolved_at + self.interval;
        }
    }

    fn announce(&self, phase: FaultPhase) {
        for target in &self.targets {
            info!(
                source = FAULT_LOG_SOURCE,
                "{}",
                fault_message(FaultKind::Hardware, phase, target)
            );
        }
    }
}
