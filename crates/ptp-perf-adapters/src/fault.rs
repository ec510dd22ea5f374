//! The log grammar shared by the fault generators and the analysis.
//!
//! Every injected fault is announced by two log lines under the source
//! [`FAULT_LOG_SOURCE`]:
//!
//! ```text
//! Scheduled software fault imminent on rpi08.
//! Scheduled software fault resolved on rpi08.
//! ```

use std::fmt;

use ptp_perf_common::{Error, Result};
use regex::Regex;

pub const FAULT_LOG_SOURCE: &str = "fault-generator";

const FAULT_PATTERN: &str = r"Scheduled (?P<kind>\w+) fault (?P<phase>imminent|resolved) on (?P<machine>[\w.-]+?)\.?$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Software,
    Hardware,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Software => "software",
            FaultKind::Hardware => "hardware",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    Imminent,
    Resolved,
}

impl FaultPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultPhase::Imminent => "imminent",
            FaultPhase::Resolved => "resolved",
        }
    }

    /// Value of the fault sample recorded for this phase.
    pub fn sample_value(&self) -> i64 {
        match self {
            FaultPhase::Imminent => 1,
            FaultPhase::Resolved => 0,
        }
    }
}

/// A fault announcement as parsed back from a log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEvent {
    pub kind: String,
    pub phase: FaultPhase,
    pub machine_id: String,
}

pub fn fault_message(kind: FaultKind, phase: FaultPhase, machine_id: &str) -> String {
    format!("Scheduled {} fault {} on {}.", kind, phase.as_str(), machine_id)
}

/// Parses fault announcements out of log messages.
pub struct FaultEventParser {
    pattern: Regex,
}

impl FaultEventParser {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(FAULT_PATTERN).map_err(|e| Error::validation(e.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn parse(&self, message: &str) -> Option<FaultEvent> {
        let captures = self.pattern.captures(message.trim_end())?;
        let phase = match &captures["phase"] {
            "imminent" => FaultPhase::Imminent,
            _ => FaultPhase::Resolved,
        };
        Some(FaultEvent {
            kind: captures["kind"].to_string(),
            phase,
            machine_id: captures["machine"].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_parse_back() {
        let parser = FaultEventParser::new().unwrap();
        let message = fault_message(FaultKind::Hardware, FaultPhase::Imminent, "switch2");
        assert_eq!(message, "Scheduled hardware fault imminent on switch2.");
        assert_eq!(
            parser.parse(&message),
            Some(FaultEvent {
                kind: "hardware".to_string(),
                phase: FaultPhase::Imminent,
                machine_id: "switch2".to_string(),
            })
        );

        let resolved = parser
            .parse("2024-01-10 09:10:00: Scheduled software fault resolved on rpi08")
            .unwrap();
        assert_eq!(resolved.phase, FaultPhase::Resolved);
        assert_eq!(resolved.machine_id, "rpi08");
        assert!(parser.parse("Scheduling software faults every 10m on rpi08").is_none());
    }
}
