use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ptp_perf_config::{PtpPerfConfig, CONFIG_PATH_ENV};
use ptp_perf_engine::{OrchestrationOptions, Orchestrator};
use ptp_perf_log_collection::{initialize_logging, log_exceptions};
use ptp_perf_store::RunStore;

/// Runs one benchmark with one vendor on a cluster of the testbed
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Benchmark id, e.g. `base` or `fault/software/slave`
    #[arg(long)]
    benchmark: String,

    /// Vendor id, e.g. `ptpd`
    #[arg(long)]
    vendor: String,

    /// Cluster id from the configuration file
    #[arg(long)]
    cluster: String,

    /// Duration override in minutes
    #[arg(long, value_name = "MINUTES")]
    duration: Option<u64>,

    /// Skip reboots and the installation check, run for 1 minute by default
    #[arg(long)]
    test: bool,

    /// Analyze the run afterwards
    #[arg(long)]
    analyze: bool,

    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_collection = initialize_logging(args.debug);

    match run(args, log_collection).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if log_exceptions() {
                error!("Orchestration failed: {:?}", e);
            } else {
                error!("Orchestration failed: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, log_collection: ptp_perf_log_collection::LogCollectionService) -> Result<bool> {
    let config = PtpPerfConfig::load(args.config.as_deref())?;
    let store = RunStore::open(config.database_file())
        .with_context(|| format!("Failed to open run store {}", config.database_file().display()))?;

    let options = OrchestrationOptions {
        duration: args.duration.map(|minutes| Duration::from_secs(minutes * 60)),
        test_mode: args.test,
        analyze: args.analyze,
        ..OrchestrationOptions::new(args.benchmark, args.vendor, args.cluster)
    };

    let orchestrator = Orchestrator::new(config, store, log_collection);
    let run = orchestrator.run(&options).await?;
    info!("Run {} of {} finished, success: {}", run.id, run.key(), run.is_successful);
    Ok(run.is_successful)
}
