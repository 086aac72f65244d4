//! ATMOS: Periodic weather observation collector.
//!
//! Entry point. Parses the CLI, loads configuration, initialises
//! structured logging, and either runs the pipeline once or enters the
//! interval loop with graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use atmos::config::{self, AppConfig};
use atmos::pipeline::{self, RunReport};

const BANNER: &str = r#"
    _  _____ __  __  ___  ____
   / \|_   _|  \/  |/ _ \/ ___|
  / _ \ | | | |\/| | | | \___ \
 / ___ \| | | |  | | |_| |___) |
/_/   \_\_| |_|  |_|\___/|____/

  Atmospheric Telemetry & Observation Storage
  v0.1.0 - Open-Meteo collector
"#;

#[derive(Debug, Parser)]
#[command(name = "atmos", about = "Periodic weather observation collector", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the pipeline on a recurring schedule instead of once.
    #[arg(long)]
    schedule: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let config_path = config::resolve_config_path(cli.config);
    let cfg = AppConfig::load(&config_path)?;

    // Keep the guard alive for the life of the process so buffered
    // log lines are flushed on exit.
    let _log_guard = init_logging(&cfg.paths.log_dir)?;

    println!("{BANNER}");
    info!(
        config = %config_path.display(),
        cities = cfg.cities.len(),
        schedule = cli.schedule,
        "ATMOS starting up"
    );

    if cli.schedule {
        run_scheduled(&cfg).await
    } else {
        let report = pipeline::run_pipeline(&cfg).await?;
        log_run_report(&report);
        Ok(())
    }
}

/// Run the pipeline immediately, then on every interval tick, until a
/// shutdown signal arrives. A failed run is logged and the loop
/// continues; only Ctrl+C ends it.
async fn run_scheduled(cfg: &AppConfig) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.schedule.interval_minutes * 60));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_minutes = cfg.schedule.interval_minutes,
        "Scheduler started. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match pipeline::run_pipeline(cfg).await {
                    Ok(report) => log_run_report(&report),
                    Err(e) => error!(error = %e, "Run failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("ATMOS shut down cleanly.");
    Ok(())
}

/// Log a human-readable run summary.
fn log_run_report(report: &RunReport) {
    let csv = report
        .csv_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    info!(
        cities = report.cities_configured,
        fetched = report.cities_fetched,
        rows = report.rows_normalized,
        inserted = report.rows_inserted,
        csv = %csv,
        "Run finished"
    );
}

/// Initialise the `tracing` subscriber: console output plus a daily
/// rolling file under `log_dir`, filtered via `RUST_LOG` with an
/// `atmos=info` fallback. `ATMOS_LOG_JSON` switches the console to
/// JSON lines.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "atmos.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("atmos=info"));

    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

    if std::env::var("ATMOS_LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(guard)
}
