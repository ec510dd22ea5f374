//! Helpers shared by the PTP-Perf end-to-end scenarios.
//!
//! The scenarios live in `tests/`. The `fake-ptp-daemon` binary of this
//! crate stands in for a PTP daemon wherever a real child is supervised;
//! tests locate it through `env!("CARGO_BIN_EXE_fake-ptp-daemon")`.

use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Upper bound for [`wait_until`].
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until(description: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting until {}", description);
        sleep(Duration::from_millis(20)).await;
    }
}
