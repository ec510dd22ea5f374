use ptp_perf_common::{Error, Result};

use crate::vendor::{Vendor, VendorKind};

const VENDORS: [Vendor; 6] = [
    Vendor {
        id: "systemd-ntp",
        name: "SystemD-NTP",
        kind: VendorKind::SystemdNtp,
    },
    Vendor {
        id: "ptpd",
        name: "PTPd",
        kind: VendorKind::Ptpd,
    },
    Vendor {
        id: "linuxptp",
        name: "LinuxPTP",
        kind: VendorKind::LinuxPtp,
    },
    Vendor {
        id: "sptp",
        name: "SPTP",
        kind: VendorKind::Sptp,
    },
    Vendor {
        id: "sptp-soft-ts",
        name: "SPTP (Software Timestamping)",
        kind: VendorKind::Sptp,
    },
    Vendor {
        id: "chrony",
        name: "Chrony",
        kind: VendorKind::Chrony,
    },
];

/// Vendors whose runs are analysed and summarised.
const ANALYZED: [&str; 4] = ["ptpd", "linuxptp", "sptp", "chrony"];

/// Registry of the known vendors.
pub struct VendorDb;

impl VendorDb {
    pub fn all() -> &'static [Vendor] {
        &VENDORS
    }

    pub fn get(id: &str) -> Result<&'static Vendor> {
        VENDORS
            .iter()
            .find(|vendor| vendor.id == id)
            .ok_or_else(|| Error::config_not_found(format!("vendor '{}'", id)))
    }

    pub fn analyzed() -> Vec<&'static Vendor> {
        VENDORS
            .iter()
            .filter(|vendor| ANALYZED.contains(&vendor.id))
            .collect()
    }

    pub fn ptpd() -> &'static Vendor {
        &VENDORS[1]
    }

    pub fn systemd_ntp() -> &'static Vendor {
        &VENDORS[0]
    }
}
