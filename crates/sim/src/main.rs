//! Headless harness for the guard behavior engine.
//!
//! Plays scripted scenarios through the rollout pipeline and inspects the
//! persisted daily aggregates.

mod commands;
mod dirs;
mod map;
mod scenario;
mod simulation;

use anyhow::Result;
use clap::Parser;
use commands::{Report, Run};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Guard behavior simulation tools
#[derive(Parser)]
#[command(name = "guard-sim")]
#[command(about = "Headless runs and rollout reports for guard AI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Run a scenario and record its rollout session
    Run(Run),

    /// Show persisted daily rollout aggregates
    Report(Report),
}

fn main() -> Result<()> {
    // Load .env file if it exists (GUARD_AI_* switches, RUST_LOG)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = setup_logging()?;

    match cli.command {
        Command::Run(cmd) => cmd.execute(),
        Command::Report(cmd) => cmd.execute(),
    }
}

/// Logs to stderr and to a per-run file under the platform cache directory.
fn setup_logging() -> Result<WorkerGuard> {
    let run_id = chrono::Local::now().format("run_%Y%m%d_%H%M%S").to_string();
    let log_dir = dirs::log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, format!("{run_id}.log"));
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::debug!("Log file: {}/{run_id}.log", log_dir.display());
    Ok(guard)
}
