//! Process supervision.
//!
//! An [`Invocation`] describes one external command and drives it through
//! its whole life: spawn, concurrent draining of stdout and stderr, optional
//! restarts, termination with a bounded grace period and verification of
//! the exit code.
//!
//! ```no_run
//! use ptp_perf_invoke::Invocation;
//! use std::time::Duration;
//!
//! # async fn example() -> ptp_perf_common::Result<()> {
//! let ptp4l = Invocation::of_command(["ptp4l", "-i", "eth0", "-m"])
//!     .as_privileged()
//!     .keep_alive(true)
//!     .accept_return_code(-15);
//!
//! let handle = ptp4l.handle();
//! // Another activity may now call `handle.restart(true, None)`.
//! ptp4l.run_for(Duration::from_secs(60)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Supervisor loop
//!
//! 1. Spawn the child and mark it running.
//! 2. Log every output line as `| <line>` under the command's short name and
//!    append it to the captured output.
//! 3. Once both streams are closed and the child has been reaped, restart if
//!    the invocation is kept alive or a restart was requested through a
//!    handle, after sleeping the restart delay.
//! 4. Otherwise verify the return code against the accepted codes.
//!
//! Cancellation (through [`Invocation::run_until`] or a timeout of
//! [`Invocation::run_for`]) sends SIGTERM, waits the terminate timeout,
//! sends SIGKILL and waits once more before the return code is verified.

use std::collections::BTreeMap;
use std::env;
use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use parking_lot::Mutex;
use ptp_perf_common::{Error, Result};
use ptp_perf_process::{elevate, force_kill, signal_group, terminate_gracefully};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Delay between the exit of a kept-alive child and its replacement.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Grace period between SIGTERM and SIGKILL, and between SIGKILL and giving
/// up on the exit status.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running(u32),
    Restarting,
    Finished,
}

#[derive(Debug)]
struct SharedState {
    keep_alive: AtomicBool,
    restart_requested: AtomicBool,
    restart_delay: Mutex<Duration>,
    phase: Mutex<Phase>,
    return_code: Mutex<Option<i32>>,
    output: Mutex<String>,
    restart_count: AtomicU32,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            keep_alive: AtomicBool::new(false),
            restart_requested: AtomicBool::new(false),
            restart_delay: Mutex::new(DEFAULT_RESTART_DELAY),
            phase: Mutex::new(Phase::Idle),
            return_code: Mutex::new(None),
            output: Mutex::new(String::new()),
            restart_count: AtomicU32::new(0),
        }
    }
}

/// A supervised external command.
///
/// Clones share the runtime state (phase, return code, captured output), so
/// a clone can be moved into a task group activity while the original keeps
/// serving as a handle.
#[derive(Debug, Clone)]
pub struct Invocation {
    command: Vec<String>,
    shell: bool,
    environment: BTreeMap<String, String>,
    working_directory: Option<PathBuf>,
    privileged: bool,
    verify_return_code: bool,
    accepted_return_codes: Vec<i32>,
    log_invocation: bool,
    log_output: bool,
    capture_output: bool,
    dump_output_on_failure: bool,
    terminate_timeout: Duration,
    state: Arc<SharedState>,
}

impl Invocation {
    fn new(command: Vec<String>, shell: bool) -> Self {
        Self {
            command,
            shell,
            environment: BTreeMap::new(),
            working_directory: None,
            privileged: false,
            verify_return_code: true,
            accepted_return_codes: vec![0],
            log_invocation: true,
            log_output: true,
            capture_output: true,
            dump_output_on_failure: false,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            state: Arc::new(SharedState::default()),
        }
    }

    /// Executes `argv` directly.
    pub fn of_command<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(argv.into_iter().map(Into::into).collect(), false)
    }

    /// Executes `command` through `sh -c`.
    pub fn of_shell(command: impl Into<String>) -> Self {
        Self::new(vec![command.into()], true)
    }

    /// Runs the command as root, prefixing `sudo` when necessary.
    pub fn as_privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn set_working_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(directory.into());
        self
    }

    /// Sets an environment variable, replacing any previous value.
    pub fn set_environment_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Appends `value` to a `:`-separated variable such as `PATH`, starting
    /// from the inherited value when the invocation does not set it yet.
    pub fn extend_environment_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let current = self
            .environment
            .get(&name)
            .cloned()
            .or_else(|| env::var(&name).ok())
            .filter(|current| !current.is_empty());
        let extended = match current {
            Some(current) => format!("{}:{}", current, value),
            None => value,
        };
        self.environment.insert(name, extended);
        self
    }

    pub fn append_arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    pub fn append_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn append_arg_if(self, arg: impl Into<String>, condition: bool) -> Self {
        if condition {
            self.append_arg(arg)
        } else {
            self
        }
    }

    /// Suppresses the invocation line and the output lines.
    pub fn hide(mut self) -> Self {
        self.log_invocation = false;
        self.log_output = false;
        self.dump_output_on_failure = false;
        self
    }

    /// Like [`Invocation::hide`], but dumps the captured output when the
    /// return code is not accepted.
    pub fn hide_unless_failure(mut self) -> Self {
        self = self.hide();
        self.dump_output_on_failure = true;
        self
    }

    /// Adds a return code to the accepted list. Signal terminations are
    /// reported as the negated signal number, e.g. `-15` for SIGTERM.
    pub fn accept_return_code(mut self, code: i32) -> Self {
        if !self.accepted_return_codes.contains(&code) {
            self.accepted_return_codes.push(code);
        }
        self
    }

    pub fn set_verify_return_code(mut self, verify: bool) -> Self {
        self.verify_return_code = verify;
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn keep_alive(self, keep_alive: bool) -> Self {
        self.state.keep_alive.store(keep_alive, Ordering::SeqCst);
        self
    }

    pub fn restart_delay(self, delay: Duration) -> Self {
        *self.state.restart_delay.lock() = delay;
        self
    }

    pub fn terminate_timeout(mut self, terminate_timeout: Duration) -> Self {
        self.terminate_timeout = terminate_timeout;
        self
    }

    /// The executable name, used as the log source of this invocation.
    pub fn command_short_name(&self) -> String {
        let first = self.command.first().map(String::as_str).unwrap_or_default();
        let executable = if self.shell {
            first.split_whitespace().next().unwrap_or_default()
        } else {
            first
        };
        executable.rsplit('/').next().unwrap_or_default().to_string()
    }

    /// The command as it would be typed into a shell.
    pub fn command_line(&self) -> String {
        if self.shell {
            self.command.join(" ")
        } else {
            shell_join(&self.command)
        }
    }

    pub fn accepted_return_codes(&self) -> &[i32] {
        &self.accepted_return_codes
    }

    pub fn handle(&self) -> InvocationHandle {
        InvocationHandle {
            name: self.command_short_name(),
            state: Arc::clone(&self.state),
        }
    }

    pub fn return_code(&self) -> Option<i32> {
        *self.state.return_code.lock()
    }

    pub fn output(&self) -> String {
        self.state.output.lock().clone()
    }

    /// Runs until the supervisor loop ends on its own.
    pub async fn run(&self) -> Result<()> {
        self.run_until(CancellationToken::new()).await
    }

    /// Runs for at most `limit`. On expiry the child is terminated and the
    /// call fails with a timeout.
    pub async fn run_for(&self, limit: Duration) -> Result<()> {
        let cancel = CancellationToken::new();
        let run = self.run_until(cancel.clone());
        tokio::pin!(run);

        let finished = tokio::select! {
            result = &mut run => Some(result),
            _ = sleep(limit) => None,
        };
        match finished {
            Some(result) => result,
            None => {
                cancel.cancel();
                if let Err(e) = run.await {
                    debug!(source = %self.command_short_name(), error = %e, "Process failed while terminating after timeout");
                }
                Err(Error::timeout(format!("running {}", self.command_line()), limit))
            }
        }
    }

    /// Runs the supervisor loop until it ends or `cancel` is triggered.
    pub async fn run_until(&self, cancel: CancellationToken) -> Result<()> {
        let name = self.command_short_name();
        let mut restarting = false;

        while !cancel.is_cancelled() {
            let child = match self.spawn() {
                Ok(child) => child,
                Err(e) => {
                    self.set_phase(Phase::Finished);
                    return Err(e);
                }
            };
            let pid = child.id().unwrap_or(0);
            self.state.restart_requested.store(false, Ordering::SeqCst);
            self.set_phase(Phase::Running(pid));

            let exit = self.drain_and_wait(child);
            tokio::pin!(exit);
            let finished = tokio::select! {
                status = &mut exit => Some(status),
                _ = cancel.cancelled() => None,
            };
            let status = match finished {
                Some(status) => status,
                None => self.terminate(pid, &mut exit).await,
            };

            let return_code = status.and_then(return_code_of);
            *self.state.return_code.lock() = return_code;
            if self.log_invocation {
                match return_code {
                    Some(code) => info!(source = %name, "Process {} exited with return code {}.", name, code),
                    None => info!(source = %name, "Process {} exited without a return code.", name),
                }
            }

            let restart_requested = self.state.restart_requested.swap(false, Ordering::SeqCst);
            restarting = !cancel.is_cancelled()
                && (self.state.keep_alive.load(Ordering::SeqCst) || restart_requested);
            if !restarting {
                break;
            }

            self.set_phase(Phase::Restarting);
            self.state.restart_count.fetch_add(1, Ordering::SeqCst);
            let delay = *self.state.restart_delay.lock();
            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        self.set_phase(Phase::Finished);
        if restarting {
            return Ok(());
        }
        self.verify_return_code()
    }

    fn set_phase(&self, phase: Phase) {
        *self.state.phase.lock() = phase;
    }

    fn spawn(&self) -> Result<Child> {
        let mut argv = if self.shell {
            vec!["sh".to_string(), "-c".to_string(), self.command.join(" ")]
        } else {
            self.command.clone()
        };
        if argv.first().map_or(true, |program| program.is_empty()) {
            return Err(Error::spawn_failed(self.command_line(), "empty command"));
        }
        if self.privileged {
            argv = elevate(argv);
        }

        if self.log_invocation {
            let directory = self
                .working_directory
                .clone()
                .or_else(|| env::current_dir().ok())
                .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_default();
            info!(source = %self.command_short_name(), "{} > {}", directory, self.command_line());
        }

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .envs(&self.environment)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(directory) = &self.working_directory {
            command.current_dir(directory);
        }

        command
            .spawn()
            .map_err(|e| Error::spawn_failed(self.command_line(), e.to_string()))
    }

    async fn drain_and_wait(&self, mut child: Child) -> Option<ExitStatus> {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::join!(self.drain(stdout), self.drain(stderr));

        match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(source = %self.command_short_name(), error = %e, "Failed to wait for process");
                None
            }
        }
    }

    async fn drain<R: AsyncRead + Unpin>(&self, stream: Option<R>) {
        let Some(stream) = stream else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    self.record_line(line.strip_suffix('\n').unwrap_or(&line));
                }
                Err(e) => {
                    debug!(source = %self.command_short_name(), error = %e, "Output stream closed");
                    break;
                }
            }
        }
    }

    fn record_line(&self, line: &str) {
        if self.log_output {
            info!(source = %self.command_short_name(), "| {}", line);
        }
        if self.capture_output {
            let mut output = self.state.output.lock();
            output.push_str(line);
            output.push('\n');
        }
    }

    async fn terminate<F>(&self, pid: u32, exit: &mut F) -> Option<ExitStatus>
    where
        F: Future<Output = Option<ExitStatus>> + Unpin,
    {
        let name = self.command_short_name();
        if self.log_output || self.dump_output_on_failure {
            info!(source = %name, "Terminating {}...", name);
        }
        if let Err(e) = terminate_gracefully(pid) {
            warn!(source = %name, error = %e, "Failed to send SIGTERM");
        }
        if let Ok(status) = timeout(self.terminate_timeout, &mut *exit).await {
            return status;
        }

        info!(
            source = %name,
            "Killing {} (shutdown timeout {:?} exceeded)", name, self.terminate_timeout
        );
        if let Err(e) = force_kill(pid) {
            warn!(source = %name, error = %e, "Failed to send SIGKILL");
        }
        match timeout(self.terminate_timeout, &mut *exit).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    source = %name,
                    "Process exit code still not valid {:?} after process kill.", self.terminate_timeout
                );
                None
            }
        }
    }

    fn verify_return_code(&self) -> Result<()> {
        let return_code = self.return_code();
        if !self.verify_return_code
            || return_code.map_or(false, |code| self.accepted_return_codes.contains(&code))
        {
            return Ok(());
        }

        let name = self.command_short_name();
        if self.dump_output_on_failure {
            for line in self.output().lines() {
                info!(source = %name, "| {}", line);
            }
        }
        if self.log_output || self.dump_output_on_failure {
            error!(
                source = %name,
                "The process {} returned with unexpected return code {:?}", self.command_line(), return_code
            );
        }
        Err(Error::process_failed(
            self.command_line(),
            return_code,
            self.accepted_return_codes.clone(),
        ))
    }
}

/// Shared view on an [`Invocation`], used by other activities.
#[derive(Debug, Clone)]
pub struct InvocationHandle {
    name: String,
    state: Arc<SharedState>,
}

impl InvocationHandle {
    /// Requests a restart of the child.
    ///
    /// The running child's process group is sent SIGKILL (or SIGTERM when
    /// `kill` is false);
    /// the supervisor loop then waits `restart_delay` (or the configured
    /// delay) and spawns a new child. Fails with *invalid-state* before the
    /// first spawn or after the loop has ended.
    pub fn restart(&self, kill: bool, restart_delay: Option<Duration>) -> Result<()> {
        let phase = *self.state.phase.lock();
        match phase {
            Phase::Idle => Err(Error::invalid_state(
                self.name.as_str(),
                "tried to restart an invocation that has not been started",
            )),
            Phase::Finished => Err(Error::invalid_state(
                self.name.as_str(),
                "tried to restart an invocation that has already exited",
            )),
            Phase::Restarting => {
                self.request_restart(restart_delay);
                Ok(())
            }
            Phase::Running(pid) => {
                self.request_restart(restart_delay);
                let signal = if kill { Signal::SIGKILL } else { Signal::SIGTERM };
                info!(source = %self.name, "Killing {}", self.name);
                if let Err(e) = signal_group(pid, signal) {
                    debug!(source = %self.name, error = %e, "Restart signal not delivered");
                }
                Ok(())
            }
        }
    }

    fn request_restart(&self, restart_delay: Option<Duration>) {
        if let Some(delay) = restart_delay {
            *self.state.restart_delay.lock() = delay;
        }
        self.state.restart_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a child is alive or about to be respawned.
    pub fn running(&self) -> bool {
        matches!(*self.state.phase.lock(), Phase::Running(_) | Phase::Restarting)
    }

    pub fn pid(&self) -> Option<u32> {
        match *self.state.phase.lock() {
            Phase::Running(pid) => Some(pid),
            _ => None,
        }
    }

    pub fn return_code(&self) -> Option<i32> {
        *self.state.return_code.lock()
    }

    pub fn output(&self) -> String {
        self.state.output.lock().clone()
    }

    /// Number of times the child has been respawned.
    pub fn restart_count(&self) -> u32 {
        self.state.restart_count.load(Ordering::SeqCst)
    }

    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.state.keep_alive.store(keep_alive, Ordering::SeqCst);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn return_code_of(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|signal| -signal))
}

/// Joins arguments into a shell command line, quoting where needed.
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            let safe = !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
            if safe {
                arg.to_string()
            } else {
                format!("'{}'", arg.replace('\'', "'\"'\"'"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_perf_common::ErrorKind;
    use ptp_perf_log_collection::{CircularBufferOutputWriter, LogCollectionService};
    use tracing_subscriber::layer::SubscriberExt;

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_run_captures_output_and_return_code() {
        let invocation = Invocation::of_command(["sh", "-c", "echo hello; echo world >&2"]);
        invocation.run().await.unwrap();

        assert_eq!(invocation.return_code(), Some(0));
        let output = invocation.output();
        assert!(output.contains("hello\n"));
        assert!(output.contains("world\n"));
    }

    #[tokio::test]
    async fn test_output_lines_are_logged_under_short_name() {
        let service = LogCollectionService::new();
        let _default = tracing::subscriber::set_default(tracing_subscriber::registry().with(service.layer()));
        let buffer = CircularBufferOutputWriter::new(64);
        let _guard = service.install(buffer.clone());

        Invocation::of_shell("echo offset 42").run().await.unwrap();

        let logs = buffer.get_logs();
        assert!(logs.iter().any(|e| e.source == "echo" && e.message == "| offset 42"));
        assert!(logs.iter().any(|e| e.message.contains("> echo offset 42")));
        assert!(logs.iter().any(|e| e.message == "Process echo exited with return code 0."));
    }

    #[tokio::test]
    async fn test_unexpected_return_code_fails() {
        let err = Invocation::of_shell("exit 3").run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessFailed);

        Invocation::of_shell("exit 3").accept_return_code(3).run().await.unwrap();
        Invocation::of_shell("exit 3").set_verify_return_code(false).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = Invocation::of_command(["/nonexistent/ptp4l"]).run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SpawnFailed);
    }

    #[tokio::test]
    async fn test_keep_alive_restarts_after_clean_exit() {
        let invocation = Invocation::of_shell("echo tick")
            .keep_alive(true)
            .restart_delay(Duration::from_millis(20));
        let handle = invocation.handle();

        let result = invocation.run_for(Duration::from_millis(500)).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        assert!(handle.restart_count() >= 1);
        assert!(handle.output().matches("tick").count() >= 2);
    }

    #[tokio::test]
    async fn test_termination_escalates_to_sigkill() {
        let invocation = Invocation::of_shell("trap '' TERM; exec sleep 30")
            .terminate_timeout(Duration::from_millis(200));
        let handle = invocation.handle();

        let result = invocation.run_for(Duration::from_millis(300)).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(handle.return_code(), Some(-9));
        assert!(!handle.running());
    }

    #[tokio::test]
    async fn test_cancellation_accepts_sigterm_code() {
        let invocation = Invocation::of_command(["sleep", "30"]).accept_return_code(-15);
        let cancel = CancellationToken::new();
        let task = {
            let invocation = invocation.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { invocation.run_until(cancel).await })
        };

        let handle = invocation.handle();
        wait_for(|| handle.pid().is_some()).await;
        cancel.cancel();
        cancel.cancel();

        task.await.unwrap().unwrap();
        assert_eq!(handle.return_code(), Some(-15));
    }

    #[tokio::test]
    async fn test_restart_kills_and_respawns() {
        let invocation = Invocation::of_command(["sleep", "30"]).accept_return_code(-15);
        let handle = invocation.handle();
        let cancel = CancellationToken::new();
        let task = {
            let invocation = invocation.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { invocation.run_until(cancel).await })
        };

        wait_for(|| handle.pid().is_some()).await;
        let first_pid = handle.pid();
        handle.restart(true, Some(Duration::from_millis(10))).unwrap();
        wait_for(|| handle.restart_count() == 1 && handle.pid().is_some() && handle.pid() != first_pid).await;

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(handle.restart_count(), 1);
    }

    #[tokio::test]
    async fn test_restart_reaches_process_behind_shell() {
        // The shell forks its sleep, which keeps the output pipes open.
        let invocation = Invocation::of_shell("sleep 30; true").accept_return_code(-15);
        let handle = invocation.handle();
        let cancel = CancellationToken::new();
        let task = {
            let invocation = invocation.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { invocation.run_until(cancel).await })
        };

        wait_for(|| handle.pid().is_some()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.restart(true, Some(Duration::from_millis(10))).unwrap();
        tokio::time::timeout(Duration::from_secs(5), wait_for(|| handle.restart_count() == 1))
            .await
            .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_restart_outside_running_phase_is_invalid() {
        let invocation = Invocation::of_command(["true"]);
        let handle = invocation.handle();

        let before = handle.restart(true, None).unwrap_err();
        assert_eq!(before.kind(), ErrorKind::InvalidState);

        invocation.run().await.unwrap();
        let after = handle.restart(true, None).unwrap_err();
        assert_eq!(after.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_short_name_and_command_line() {
        let shell = Invocation::of_shell("stdbuf -eL -oL tail -f log");
        assert_eq!(shell.command_short_name(), "stdbuf");

        let command = Invocation::of_command(["sptp", "-iface", "eth0"]).append_arg("fe80::1 master");
        assert_eq!(command.command_short_name(), "sptp");
        assert_eq!(command.command_line(), "sptp -iface eth0 'fe80::1 master'");

        let absolute = Invocation::of_command(["/usr/sbin/chronyd", "-d"]);
        assert_eq!(absolute.command_short_name(), "chronyd");
    }

    #[test]
    fn test_extend_environment_variable() {
        let invocation = Invocation::of_command(["sptp"])
            .set_environment_variable("PATH", "/usr/bin")
            .extend_environment_variable("PATH", "/home/rpi/go/bin");
        assert_eq!(
            invocation.environment.get("PATH").map(String::as_str),
            Some("/usr/bin:/home/rpi/go/bin")
        );
    }
}
