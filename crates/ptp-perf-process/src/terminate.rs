//! Process termination primitives.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use ptp_perf_common::{Error, Result};
use tracing::debug;

/// Sends SIGTERM to the process group led by `pgid`.
pub fn terminate_gracefully(pgid: u32) -> Result<()> {
    signal_group(pgid, Signal::SIGTERM)
}

/// Sends SIGKILL to the process group led by `pgid`.
pub fn force_kill(pgid: u32) -> Result<()> {
    signal_group(pgid, Signal::SIGKILL)
}

/// Delivers `signal` to every process of the group led by `pgid`, which
/// reaches daemons started through `sudo` or `sh -c` as well. A leader
/// that is not in a group of its own is signalled alone.
pub fn signal_group(pgid: u32, signal: Signal) -> Result<()> {
    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => send_signal(pgid, signal),
        Err(e) => {
            debug!(pgid, signal = %signal, error = %e, "Group not signalled, signalling leader only");
            send_signal(pgid, signal)
        }
    }
}

/// Delivers `signal` to `pid`.
///
/// A process that has already exited (`ESRCH`) is not an error: termination
/// of something that is gone is a no-op.
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pid, signal = %signal, "Process already exited");
            Ok(())
        }
        Err(e) => Err(Error::invalid_state(
            format!("pid {}", pid),
            format!("failed to deliver {}: {}", signal, e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    #[test]
    fn test_terminate_running_child() {
        let mut child = Command::new("sleep").arg("30").process_group(0).spawn().unwrap();

        terminate_gracefully(child.id()).unwrap();
        let status = child.wait().unwrap();

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(15));
    }

    #[test]
    fn test_signal_to_reaped_process_is_noop() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(force_kill(pid).is_ok());
    }

    #[test]
    fn test_kill_reaches_grandchildren() {
        // The shell waits for its own sleep, which holds stdout open.
        let child = Command::new("sh")
            .args(["-c", "sleep 30; true"])
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        force_kill(child.id()).unwrap();
        let output = child.wait_with_output().unwrap();

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(9));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_child_outside_own_group_is_signalled_alone() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        terminate_gracefully(child.id()).unwrap();
        let status = child.wait().unwrap();

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(15));
    }
}
