use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ptp_perf_config::{PtpPerfConfig, CONFIG_PATH_ENV};
use ptp_perf_engine::{Worker, WorkerOptions};
use ptp_perf_log_collection::{initialize_logging, log_exceptions};
use ptp_perf_store::RunStore;

/// Runs the benchmark of one endpoint, started by the orchestrator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Endpoint created by the orchestrator for this machine
    #[arg(long)]
    endpoint_id: i64,

    /// Benchmark duration override in seconds
    #[arg(long, value_name = "SECONDS")]
    duration_secs: Option<u64>,

    /// Skip the NTP synchronization and the initial clock offset
    #[arg(long)]
    no_time_sync: bool,

    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_collection = initialize_logging(args.debug);

    let config = PtpPerfConfig::load(args.config.as_deref())?;
    let store = RunStore::open(config.database_file())
        .with_context(|| format!("Failed to open run store {}", config.database_file().display()))?;

    let options = WorkerOptions {
        duration: args.duration_secs.map(Duration::from_secs),
        skip_time_sync: args.no_time_sync,
    };
    let worker = Worker::new(config, store, log_collection);
    if let Err(e) = worker.run(args.endpoint_id, &options).await {
        if log_exceptions() {
            error!("Benchmark of endpoint {} failed: {:?}", args.endpoint_id, e);
        } else {
            error!("Benchmark of endpoint {} failed: {}", args.endpoint_id, e);
        }
        return Err(e.into());
    }
    info!("Benchmark of endpoint {} completed", args.endpoint_id);
    Ok(())
}
