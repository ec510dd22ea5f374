//! # PTP-Perf Config
//!
//! Static declarations of the measurement setup.
//!
//! This crate provides:
//! - [`PtpPerfConfig`], the YAML file declaring machines, clusters and power strips
//! - [`Machine`] and [`Cluster`] with role resolution
//! - [`Benchmark`] and the compiled-in [`BenchmarkDb`]
//! - Rendering of vendor configuration templates
//! - Well-known file locations relative to the repository root

pub mod benchmark;
pub mod config;
pub mod duration;
pub mod machine;
pub mod paths;
pub mod registry;
pub mod template;

pub use benchmark::{Benchmark, DelayMechanism, PtpConfig};
pub use config::{PowerStripConfig, PtpPerfConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use duration::{format_duration, parse_duration, parse_signed_duration};
pub use machine::{Cluster, ClusterConfig, Machine, PluginSettings};
pub use paths::Paths;
pub use registry::BenchmarkDb;
pub use template::render_template;
