//! Stands in for `ptp4l` in supervisor tests.
//!
//! Prints one `master offset` line per interval until it is terminated or
//! `--exit-after-ms` elapses.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, sleep, Instant};

#[derive(Parser, Debug)]
#[command(about = "Prints ptp4l-style offset lines")]
struct Args {
    /// Time between two offset lines
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,

    /// Exit on its own after this long
    #[arg(long)]
    exit_after_ms: Option<u64>,

    /// Exit code when exiting on its own
    #[arg(long, default_value_t = 0)]
    exit_code: u8,

    /// Keep running on SIGTERM
    #[arg(long)]
    ignore_sigterm: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            eprintln!("failed to install SIGTERM handler: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let started = Instant::now();
    let exit_after = async {
        match args.exit_after_ms {
            Some(ms) => sleep(Duration::from_millis(ms)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(exit_after);

    let mut ticks = interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sequence: i64 = 0;
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let offset = if sequence % 2 == 0 { 40 - sequence } else { sequence - 40 };
                println!(
                    "ptp4l[{:.3}]: master offset {:>10} s2 freq {:>+7} path delay {:>9}",
                    started.elapsed().as_secs_f64(),
                    offset,
                    3000 + sequence,
                    5000
                );
                sequence += 1;
            }
            _ = sigterm.recv() => {
                if args.ignore_sigterm {
                    println!("ignoring SIGTERM");
                } else {
                    println!("terminated");
                    return ExitCode::SUCCESS;
                }
            }
            _ = &mut exit_after => {
                return ExitCode::from(args.exit_code);
            }
        }
    }
}
