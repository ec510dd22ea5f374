use std::time::Duration;

use ptp_perf_common::Result;
use ptp_perf_config::format_duration;
use ptp_perf_vendor::VendorHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::fault::{fault_message, FaultKind, FaultPhase, FAULT_LOG_SOURCE};

/// Crashes the local vendor process at a fixed interval.
///
/// The vendor is killed and kept down for `duration` before its supervisor
/// starts it again. Ticks are absolute, so the time spent inside a fault
/// does not shift the following ones.
pub struct SoftwareFaultGenerator {
    machine_id: String,
    interval: Duration,
    duration: Duration,
    vendor: VendorHandle,
}

impl SoftwareFaultGenerator {
    pub fn new(machine_id: impl Into<String>, interval: Duration, duration: Duration, vendor: VendorHandle) -> Self {
        Self {
            machine_id: machine_id.into(),
            interval,
            duration,
            vendor,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            source = FAULT_LOG_SOURCE,
            "Scheduling software faults every {} on {}",
            format_duration(self.interval),
            self.machine_id
        );

        let mut next_fault = Instant::now() + self.interval;
        loop {
            tokio::select! {
                _ = sleep_until(next_fault) => {}
                _ = cancel.cancelled() => return Ok(()),
            }

            if self.vendor.running() {
                self.inject(&cancel).await?;
            } else {
                warn!(source = FAULT_LOG_SOURCE, "Vendor not running on {}, skipping fault", self.machine_id);
            }
            next_fault += self.interval;
        }
    }

    async fn inject(&self, cancel: &CancellationToken) -> Result<()> {
        info!(
            source = FAULT_LOG_SOURCE,
            "{}",
            fault_message(FaultKind::Software, FaultPhase::Imminent, &self.machine_id)
        );
        self.vendor.restart(true, Some(self.duration))?;

        let resolved_at = Instant::now() + self.duration;
        tokio::select! {
            _ = sleep_until(resolved_at) => {}
            _ = cancel.cancelled() => {}
        }
        info!(
            source = FAULT_LOG_SOURCE,
            "{}",
            fault_message(FaultKind::Software, FaultPhase::Resolved, &self.machine_id)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_perf_invoke::Invocation;
    use ptp_perf_log_collection::{CircularBufferOutputWriter, LogCollectionService};
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn test_restarts_vendor_and_announces_faults() {
        let service = LogCollectionService::new();
        let buffer = CircularBufferOutputWriter::new(100);
        let _installed = service.install(buffer.clone());
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(service.layer()));

        let daemon = Invocation::of_command(["sleep", "30"]).hide();
        let vendor = VendorHandle::new("test", vec![daemon.handle()]);
        let cancel = CancellationToken::new();
        let running = tokio::spawn({
            let daemon = daemon.clone();
            let cancel = cancel.clone();
            async move { daemon.run_until(cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let generator = SoftwareFaultGenerator::new(
            "rpi08",
            Duration::from_millis(200),
            Duration::from_millis(50),
            vendor.clone(),
        );
        let faults = tokio::spawn(generator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(330)).await;
        cancel.cancel();
        faults.await.unwrap().unwrap();
        let _ = running.await.unwrap();

        assert_eq!(vendor.restart_count(), 1);
        let messages: Vec<String> = buffer
            .get_logs()
            .into_iter()
            .filter(|entry| entry.source == FAULT_LOG_SOURCE)
            .map(|entry| entry.message)
            .collect();
        assert_eq!(
            messages[1..],
            [
                "Scheduled software fault imminent on rpi08.".to_string(),
                "Scheduled software fault resolved on rpi08.".to_string(),
            ]
        );
    }
}
