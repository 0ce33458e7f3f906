//! # Greybike
//!
//! E-bike telemetry collector.
//!
//! Reads the Cycle Analyst, GNSS receiver and host metrics, keeps the most
//! recent readings, logs motor telemetry to rotating files and streams the
//! freshest readings to subscribers. Also aggregates recorded logs.
//!
//! # Usage
//!
//! Collect telemetry:
//! ```bash
//! greybike --config config/default.toml run
//! ```
//!
//! Summarize a ride:
//! ```bash
//! greybike aggregate logs/2024-07-21T02:04:30.147284.log 1721509472 1721522829
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use greybike::app::{register_jobs, AppState, Sources};
use greybike::config::Config;
use greybike::scheduler::Scheduler;
use greybike::telemetry::{aggregate, list_log_files};

/// Default configuration file location
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Parser, Debug)]
#[command(name = "greybike")]
#[command(about = "E-bike telemetry collector and ride log aggregator", long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults are used if it does not exist
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Collect telemetry until interrupted (default)
    Run {
        /// Use simulated sources instead of hardware
        #[arg(long)]
        simulate: bool,
    },

    /// Aggregate a log file over a time window
    Aggregate {
        /// Log file path
        file: PathBuf,

        /// Window start, seconds since the Unix epoch
        start: f64,

        /// Window end, seconds since the Unix epoch
        end: f64,
    },

    /// List log files in the configured log directory
    Logs,
}

/// Main entry point
///
/// All scheduled jobs run on a single-threaded runtime, so no two jobs ever
/// execute at the same time.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run { simulate: false }) {
        Commands::Run { simulate } => {
            config.sources.simulate |= simulate;
            run(config).await
        }
        Commands::Aggregate { file, start, end } => {
            init_console_logging();
            let summary = aggregate(&file, start, end)
                .with_context(|| format!("Failed to aggregate {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Logs => {
            for name in list_log_files(&config.log.log_dir)? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
    } else {
        eprintln!("{} not found, using default configuration", path.display());
        Ok(Config::default())
    }
}

/// Console output only, for one-shot commands
fn init_console_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Console output plus a daily application log file
fn init_logging(app_log_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(app_log_dir, "greybike.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    guard
}

async fn run(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.log.log_dir)
        .with_context(|| format!("Failed to create {}", config.log.log_dir))?;
    std::fs::create_dir_all(&config.log.app_log_dir)
        .with_context(|| format!("Failed to create {}", config.log.app_log_dir))?;
    let _log_guard = init_logging(&config.log.app_log_dir);

    info!("Greybike v{} starting...", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(AppState::new(&config)?);
    let sources = Sources::from_config(&config);

    let mut scheduler = Scheduler::new();
    register_jobs(&mut scheduler, state.clone(), &config, sources);
    info!("Running {} jobs, press Ctrl+C to exit", scheduler.len());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }

            _ = hangup() => {
                match state.rotate_log() {
                    Ok(name) => info!("Rotated log on SIGHUP, now writing {}", name),
                    Err(e) => warn!("Log rotation failed: {}", e),
                }
            }
        }
    }

    scheduler.cancel_all().await;
    info!("Log files written: {}", state.known_log_files().join(", "));
    Ok(())
}

/// Resolves on SIGHUP, used to request a log rotation
#[cfg(unix)]
async fn hangup() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::hangup()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGHUP: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn hangup() {
    std::future::pending::<()>().await;
}
