use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ptp_perf_analysis::{export_dataset, Analyzer, MarkdownOutputWriter, RunOutcome};
use ptp_perf_common::RunId;
use ptp_perf_config::{PtpPerfConfig, CONFIG_PATH_ENV};
use ptp_perf_log_collection::{initialize_logging, log_exceptions, LogCollectionService, LogLevel};
use ptp_perf_store::RunStore;

/// Analyzes finished benchmark runs and updates the benchmark summaries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Analyze already processed runs again
    #[arg(short, long)]
    force: bool,

    /// Analyze only this run, processed or not
    #[arg(long, value_name = "ID")]
    run_id: Option<RunId>,

    /// Export every processed run to the dataset directory afterwards
    #[arg(long)]
    export: bool,

    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log_collection = initialize_logging(args.debug);

    match run(args, log_collection) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if log_exceptions() {
                error!("Analysis failed: {:?}", e);
            } else {
                error!("Analysis failed: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args, log_collection: LogCollectionService) -> Result<bool> {
    let config = PtpPerfConfig::load(args.config.as_deref())?;
    let paths = config.paths();
    let store = RunStore::open(config.database_file())
        .with_context(|| format!("Failed to open run store {}", config.database_file().display()))?;

    let analysis_log = MarkdownOutputWriter::create(paths.analysis_log_file())?;
    let analysis_log = log_collection.install_with_level(analysis_log, LogLevel::Info);

    let analyzer = Analyzer::new(store.clone())
        .with_config(config)
        .with_log_collection(log_collection);

    let success = match args.run_id {
        Some(run_id) => match analyzer.analyze_run_id(run_id)? {
            RunOutcome::Processed => {
                info!("Run {} processed", run_id);
                true
            }
            RunOutcome::Corrupted => {
                warn!("Run {} is corrupted", run_id);
                true
            }
            RunOutcome::Failed(reason) => {
                error!("Run {} could not be analyzed: {}", run_id, reason);
                false
            }
        },
        None => {
            let report = analyzer.analyze(args.force)?;
            info!(
                "Processed {} runs ({} corrupted, {} failed), updated {} summaries",
                report.processed, report.corrupted, report.failed, report.summaries
            );
            report.failed == 0
        }
    };

    if args.export {
        let written = export_dataset(&store, &paths)?;
        info!("Exported {} runs to {}", written.len(), paths.dataset_dir().display());
    }

    analysis_log.uninstall()?;
    Ok(success)
}
