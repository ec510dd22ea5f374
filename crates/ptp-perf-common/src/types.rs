//! Core domain types used throughout PTP-Perf.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Primary key of a Run row.
pub type RunId = i64;

/// Primary key of an Endpoint row.
pub type EndpointId = i64;

/// Role a machine plays within a measurement run.
///
/// The string form (`"primary-slave"`, ...) is used in configuration files
/// and in the Run Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointType {
    Master,
    FailoverMaster,
    PrimarySlave,
    SecondarySlave,
    TertiarySlave,
    Orchestrator,
    Switch,
}

impl EndpointType {
    pub const ALL: [EndpointType; 7] = [
        EndpointType::Master,
        EndpointType::FailoverMaster,
        EndpointType::PrimarySlave,
        EndpointType::SecondarySlave,
        EndpointType::TertiarySlave,
        EndpointType::Orchestrator,
        EndpointType::Switch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::Master => "master",
            EndpointType::FailoverMaster => "failover-master",
            EndpointType::PrimarySlave => "primary-slave",
            EndpointType::SecondarySlave => "secondary-slave",
            EndpointType::TertiarySlave => "tertiary-slave",
            EndpointType::Orchestrator => "orchestrator",
            EndpointType::Switch => "switch",
        }
    }

    /// Whether this role runs a PTP client that follows a master.
    pub fn is_slave(&self) -> bool {
        matches!(
            self,
            EndpointType::PrimarySlave | EndpointType::SecondarySlave | EndpointType::TertiarySlave
        )
    }

    /// Whether a worker process is launched for this role.
    pub fn runs_worker(&self) -> bool {
        !matches!(self, EndpointType::Orchestrator | EndpointType::Switch)
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::validation(format!("Unknown endpoint type '{}'", s)))
    }
}

/// Role-specific flavour of a vendor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Master,
    FailoverMaster,
    Slave,
}

impl ClientType {
    /// Suffix used to select role-specialized template files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Master => "master",
            ClientType::FailoverMaster => "failover_master",
            ClientType::Slave => "slave",
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, ClientType::Master | ClientType::FailoverMaster)
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a derived measurement sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    /// Signed offset from master, nanoseconds.
    ClockDiff,
    /// Mean path delay, nanoseconds.
    PathDelay,
    /// Fault marker, 1 when a fault starts and 0 when it is resolved.
    Fault,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::ClockDiff => "clock_diff",
            SampleType::PathDelay => "path_delay",
            SampleType::Fault => "fault",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clock_diff" => Ok(SampleType::ClockDiff),
            "path_delay" => Ok(SampleType::PathDelay),
            "fault" => Ok(SampleType::Fault),
            other => Err(Error::validation(format!("Unknown sample type '{}'", other))),
        }
    }
}
