//! # PTP-Perf Process
//!
//! Low-level process operations used by the supervisor.
//!
//! This crate provides Unix primitives for:
//! - Signal delivery to process groups (graceful termination and forced kill)
//! - Process existence verification
//! - Privilege checks for `sudo` wrapping
//! - Executable lookup in `PATH`

pub mod check;
pub mod lookup;
pub mod privilege;
pub mod terminate;

pub use check::*;
pub use lookup::*;
pub use privilege::*;
pub use terminate::*;
