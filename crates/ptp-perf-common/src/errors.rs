//! Error types shared by every PTP-Perf crate.
//!
//! Errors are plain values: each fallible operation returns a
//! [`Result<T>`] and callers propagate with `?`. The variants map one to one
//! onto the failure kinds the harness reasons about (a supervised process
//! failing, a corrupt profile, a task group with several failed activities),
//! plus a few ambient variants for I/O, database and serialization failures.
//!
//! ```
//! use ptp_perf_common::{Error, ErrorKind, Result};
//!
//! fn parse_profile() -> Result<()> {
//!     Err(Error::profile_corrupt("clock never converged"))
//! }
//!
//! let err = parse_profile().unwrap_err().context("Analysis of endpoint 3 failed");
//! assert_eq!(err.kind(), ErrorKind::ProfileCorrupt);
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for PTP-Perf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A child process could not be launched.
    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// A supervised process finished with an exit code that was not accepted.
    #[error("Process '{command}' failed with return code {return_code:?} (accepted: {accepted:?})")]
    ProcessFailed {
        command: String,
        return_code: Option<i32>,
        accepted: Vec<i32>,
    },

    /// An operation was requested in a state that does not allow it.
    #[error("Invalid state for {subject}: {reason}")]
    InvalidState { subject: String, reason: String },

    /// An operation did not finish in time.
    #[error("Timeout after {after:?}: {operation}")]
    Timeout { operation: String, after: Duration },

    /// A vendor executable is not available on this host.
    #[error("Vendor '{vendor}' is not installed (missing executable '{executable}')")]
    NotInstalled { vendor: String, executable: String },

    /// A benchmark, vendor, cluster, machine or template could not be resolved.
    #[error("Configuration not found: {what}")]
    ConfigNotFound { what: String },

    /// A power strip did not report the requested socket state.
    #[error("Actuation of {device} failed: requested {requested}, device reports {actual}")]
    ActuationFailed {
        device: String,
        requested: String,
        actual: String,
    },

    /// No data is available for the requested aggregate.
    #[error("No data: {what}")]
    NoData { what: String },

    /// A measurement profile is structurally unusable.
    #[error("Profile corrupt: {reason}")]
    ProfileCorrupt { reason: String },

    /// One or more activities of a task group failed.
    #[error("{} task(s) failed: {}", .causes.len(), format_causes(.causes))]
    GroupFailure { causes: Vec<(String, Error)> },

    /// Invalid input or configuration.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Run Store failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

/// Fieldless discriminant of [`Error`], convenient for matching through
/// context wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SpawnFailed,
    ProcessFailed,
    InvalidState,
    Timeout,
    NotInstalled,
    ConfigNotFound,
    ActuationFailed,
    NoData,
    ProfileCorrupt,
    GroupFailure,
    Validation,
    Database,
    Io,
    Json,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SpawnFailed => "spawn-failed",
            ErrorKind::ProcessFailed => "process-failed",
            ErrorKind::InvalidState => "invalid-state",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotInstalled => "not-installed",
            ErrorKind::ConfigNotFound => "config-not-found",
            ErrorKind::ActuationFailed => "actuation-failed",
            ErrorKind::NoData => "no-data",
            ErrorKind::ProfileCorrupt => "profile-corrupt",
            ErrorKind::GroupFailure => "group-failure",
            ErrorKind::Validation => "validation",
            ErrorKind::Database => "database",
            ErrorKind::Io => "io",
            ErrorKind::Json => "json",
        };
        write!(f, "{}", name)
    }
}

fn format_causes(causes: &[(String, Error)]) -> String {
    causes
        .iter()
        .map(|(label, error)| format!("[{}] {}", label, error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn spawn_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn process_failed(
        command: impl Into<String>,
        return_code: Option<i32>,
        accepted: Vec<i32>,
    ) -> Self {
        Self::ProcessFailed {
            command: command.into(),
            return_code,
            accepted,
        }
    }

    pub fn invalid_state(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn not_installed(vendor: impl Into<String>, executable: impl Into<String>) -> Self {
        Self::NotInstalled {
            vendor: vendor.into(),
            executable: executable.into(),
        }
    }

    pub fn config_not_found(what: impl Into<String>) -> Self {
        Self::ConfigNotFound { what: what.into() }
    }

    pub fn actuation_failed(
        device: impl Into<String>,
        requested: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ActuationFailed {
            device: device.into(),
            requested: requested.into(),
            actual: actual.into(),
        }
    }

    pub fn no_data(what: impl Into<String>) -> Self {
        Self::NoData { what: what.into() }
    }

    pub fn profile_corrupt(reason: impl Into<String>) -> Self {
        Self::ProfileCorrupt {
            reason: reason.into(),
        }
    }

    pub fn group_failure(causes: Vec<(String, Error)>) -> Self {
        Self::GroupFailure { causes }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Adds context to an error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Returns the kind of the innermost error, looking through context
    /// wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            Error::ProcessFailed { .. } => ErrorKind::ProcessFailed,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::NotInstalled { .. } => ErrorKind::NotInstalled,
            Error::ConfigNotFound { .. } => ErrorKind::ConfigNotFound,
            Error::ActuationFailed { .. } => ErrorKind::ActuationFailed,
            Error::NoData { .. } => ErrorKind::NoData,
            Error::ProfileCorrupt { .. } => ErrorKind::ProfileCorrupt,
            Error::GroupFailure { .. } => ErrorKind::GroupFailure,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Database(_) => ErrorKind::Database,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
            Error::WithContext { source, .. } => source.kind(),
        }
    }

    pub fn is_profile_corrupt(&self) -> bool {
        self.kind() == ErrorKind::ProfileCorrupt
    }
}

/// Convenience methods for Result types.
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_keeps_kind() {
        let err = Error::invalid_state("ptp4l", "restart after exit").context("Fault injection failed");

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(err.to_string().contains("Fault injection failed"));
        assert!(err.to_string().contains("restart after exit"));
    }

    #[test]
    fn test_group_failure_lists_all_causes() {
        let err = Error::group_failure(vec![
            ("vendor".to_string(), Error::process_failed("ptpd", Some(1), vec![0])),
            ("iperf".to_string(), Error::spawn_failed("iperf", "No such file")),
        ]);

        let message = err.to_string();
        assert!(message.starts_with("2 task(s) failed"));
        assert!(message.contains("[vendor]"));
        assert!(message.contains("[iperf]"));
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(Error::no_data("ptpd on rpi-4"));
        let err = result.context("Summary skipped").unwrap_err();

        assert!(matches!(err, Error::WithContext { .. }));
        assert_eq!(err.kind(), ErrorKind::NoData);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ProfileCorrupt.to_string(), "profile-corrupt");
        assert_eq!(ErrorKind::GroupFailure.to_string(), "group-failure");
    }
}
