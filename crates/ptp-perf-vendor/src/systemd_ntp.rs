//! The systemd NTP service, used to bring clocks into sync between runs.

use std::time::Duration;

use ptp_perf_common::{Error, Result};
use ptp_perf_invoke::Invocation;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

const SYNCHRONIZED_MARKER: &str = "System clock synchronized: yes";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn toggle_ntp_service(active: bool) -> Result<()> {
    info!(
        "{} SystemD NTP service...",
        if active { "Activating" } else { "Deactivating" }
    );
    Invocation::of_command(["timedatectl", "set-ntp", if active { "true" } else { "false" }])
        .as_privileged()
        .hide_unless_failure()
        .run()
        .await
}

pub async fn check_clock_synchronized() -> Result<bool> {
    let timedatectl = Invocation::of_command(["timedatectl"]).hide_unless_failure();
    timedatectl.run().await?;
    Ok(is_synchronized(&timedatectl.output()))
}

fn is_synchronized(status: &str) -> bool {
    status.contains(SYNCHRONIZED_MARKER)
}

/// Polls until the clock reports synchronization or `timeout` passes.
pub async fn wait_synchronized(timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if check_clock_synchronized().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::timeout("NTP clock synchronization", timeout));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Keeps the NTP service enabled until `cancel` fires.
pub(crate) async fn run_service(cancel: CancellationToken) -> Result<()> {
    toggle_ntp_service(true).await?;
    cancel.cancelled().await;
    toggle_ntp_service(false).await
}
