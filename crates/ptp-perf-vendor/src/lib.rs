//! PTP implementations under test.
//!
//! Each [`Vendor`] knows how to render its configuration file, which
//! processes to supervise on an endpoint and how to turn the captured
//! daemon output into clock-diff and path-delay samples.

mod chrony;
mod linuxptp;
mod parse;
mod ptpd;
mod registry;
mod sptp;
pub mod systemd_ntp;
mod vendor;

pub use registry::VendorDb;
pub use vendor::{Vendor, VendorContext, VendorHandle, VendorKind, VendorProcess, VendorProcesses};
