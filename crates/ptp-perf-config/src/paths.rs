//! Well-known locations below the repository root.

use std::path::{Path, PathBuf};

use ptp_perf_common::RunId;

/// Chrony writes its measurements here, the worker streams the file.
pub const CHRONY_MEASUREMENTS_LOG: &str = "/tmp/log/chrony/measurements.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch files of the local node, such as the rendered daemon config.
    pub fn local_dir(&self) -> PathBuf {
        self.root.join("local")
    }

    pub fn vendor_config_file(&self) -> PathBuf {
        self.local_dir().join("ptp-config.txt")
    }

    pub fn config_template_dir(&self) -> PathBuf {
        self.root.join("deploy").join("config")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn run_log_file(&self, run_id: RunId) -> PathBuf {
        self.data_dir().join("logs").join(format!("profile_{}.log", run_id))
    }

    pub fn analysis_log_file(&self) -> PathBuf {
        self.data_dir().join("profiles").join("analysis.log.md")
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join("dataset").join("profiles")
    }

    pub fn dataset_file(&self, benchmark_id: &str, vendor_id: &str, run_id: RunId) -> PathBuf {
        self.dataset_dir()
            .join(benchmark_id)
            .join(format!("{}_{}.json.gz", vendor_id, run_id))
    }

    /// Helper that shifts the system clock, built from the ppsi sources.
    pub fn jmptime(&self) -> PathBuf {
        self.root.join("lib").join("ppsi").join("tools").join("jmptime")
    }
}
