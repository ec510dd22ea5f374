//! Process existence checking.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use ptp_perf_common::{Error, Result};

/// Checks whether a process with the given PID exists.
///
/// Uses `kill(pid, 0)`, which delivers no signal. A process owned by another
/// user (`EPERM`) exists. This is the case for children started through
/// `sudo`.
///
/// ```rust,no_run
/// use ptp_perf_process::process_exists;
///
/// if process_exists(1234).unwrap() {
///     println!("Process 1234 is running");
/// }
/// ```
pub fn process_exists(pid: u32) -> Result<bool> {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(Errno::EPERM) => Ok(true),
        Err(e) => Err(Error::invalid_state(
            format!("pid {}", pid),
            format!("failed to check process: {}", e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        assert!(process_exists(std::process::id()).unwrap());
    }

    #[test]
    fn test_init_exists() {
        assert!(process_exists(1).unwrap());
    }

    #[test]
    fn test_reaped_child_does_not_exist() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!process_exists(pid).unwrap());
    }
}
