use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ptp_perf_config::{PtpPerfConfig, CONFIG_PATH_ENV};
use ptp_perf_log_collection::{initialize_logging, log_exceptions};
use ptp_perf_scheduler::{render_available, render_info, QueueBenchmarks, ScheduleQueue, Scheduler};
use ptp_perf_store::{NewScheduleTask, RunStore};

/// Queue and execute benchmark runs one after another
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", env = CONFIG_PATH_ENV, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute queued tasks until interrupted
    Run,
    /// Queue a shell command
    Queue {
        #[arg(long)]
        name: String,
        #[arg(long)]
        command: String,
        /// Estimated time in minutes
        #[arg(long, value_name = "MINUTES")]
        time: u64,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// Queue the runs missing to reach a target run count
    QueueBenchmarks {
        /// Regular expression over benchmark ids, anchored at the start
        #[arg(long)]
        benchmark_regex: String,
        /// Vendor ids, all analyzed vendors by default
        #[arg(long = "vendor")]
        vendors: Vec<String>,
        /// Cluster ids, all configured clusters by default
        #[arg(long = "cluster")]
        clusters: Vec<String>,
        #[arg(long, default_value_t = 1)]
        target_count: usize,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Duration override in minutes
        #[arg(long, value_name = "MINUTES")]
        duration: Option<u64>,
        #[arg(long)]
        test: bool,
        #[arg(long)]
        analyze: bool,
        /// Hold the queue after the queued benchmarks
        #[arg(long)]
        add_pause: bool,
    },
    /// Print the pending tasks and their expected completion
    Info,
    /// Print the registered benchmarks and vendors
    Available,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_collection = initialize_logging(args.debug);

    if let Err(e) = execute(args).await {
        if log_exceptions() {
            error!("Scheduler failed: {:?}", e);
        } else {
            error!("Scheduler failed: {:#}", e);
        }
        return Err(e);
    }
    Ok(())
}

async fn execute(args: Args) -> Result<()> {
    let open = || -> Result<(PtpPerfConfig, RunStore)> {
        let config = PtpPerfConfig::load(args.config.as_deref())?;
        let store = RunStore::open(config.database_file())
            .with_context(|| format!("Failed to open run store {}", config.database_file().display()))?;
        Ok((config, store))
    };

    match args.command {
        Command::Available => {
            print!("{}", render_available());
        }
        Command::Info => {
            let (_, store) = open()?;
            print!("{}", render_info(&store.pending_tasks()?, Utc::now()));
        }
        Command::Run => {
            let (_, store) = open()?;
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.cancel();
            });
            Scheduler::new(store).run(cancel).await?;
        }
        Command::Queue {
            name,
            command,
            time,
            priority,
        } => {
            let (_, store) = open()?;
            let task = NewScheduleTask::new(name, command, Duration::from_secs(time * 60)).with_priority(priority);
            ScheduleQueue::new(&store).queue_task(&task)?;
        }
        Command::QueueBenchmarks {
            benchmark_regex,
            vendors,
            clusters,
            target_count,
            priority,
            duration,
            test,
            analyze,
            add_pause,
        } => {
            let (config, store) = open()?;
            let clusters = if clusters.is_empty() {
                config.clusters.iter().map(|cluster| cluster.id.clone()).collect()
            } else {
                clusters
            };
            let request = QueueBenchmarks {
                vendors,
                target_count,
                priority,
                duration: duration.map(|minutes| Duration::from_secs(minutes * 60)),
                test_mode: test,
                analyze,
                add_pause,
                ..QueueBenchmarks::new(benchmark_regex, clusters)
            };
            let queued = ScheduleQueue::new(&store).queue_benchmarks(&request)?;
            info!("Queued {} tasks", queued.len());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigterm), Ok(mut sigint)) = (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) else {
        error!("Failed to install signal handlers");
        return std::future::pending().await;
    };
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
        _ = sigint.recv() => info!("Received SIGINT signal"),
    }
}
