//! Pipeline orchestration.
//!
//! Sequences one extract -> transform -> load run and enforces the
//! run-level termination policy: a missing city list is fatal, while an
//! empty extract or transform ends the run early and cleanly, before
//! anything is persisted.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::extract::open_meteo::OpenMeteoApi;
use crate::extract::{self, CurrentWeatherApi};
use crate::{load, transform};

/// Summary of a single pipeline run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub cities_configured: usize,
    pub cities_fetched: usize,
    pub rows_normalized: usize,
    pub rows_inserted: u64,
    pub csv_path: Option<PathBuf>,
}

/// Execute one full pipeline run against the real Open-Meteo API.
pub async fn run_pipeline(cfg: &AppConfig) -> Result<RunReport> {
    let api = OpenMeteoApi::new(&cfg.api).context("Failed to initialise Open-Meteo client")?;
    run_with_api(&api, cfg).await
}

/// Execute one full pipeline run against any weather API.
///
/// Split out from [`run_pipeline`] so tests can substitute a
/// deterministic implementation.
pub async fn run_with_api<A>(api: &A, cfg: &AppConfig) -> Result<RunReport>
where
    A: CurrentWeatherApi + ?Sized,
{
    if cfg.cities.is_empty() {
        bail!("No cities configured, aborting run");
    }

    let mut report = RunReport {
        cities_configured: cfg.cities.len(),
        ..RunReport::default()
    };

    info!(cities = report.cities_configured, "Pipeline run started");

    let records = extract::extract_all(api, &cfg.cities, &cfg.api).await;
    report.cities_fetched = records.len();
    if records.is_empty() {
        warn!("No data extracted, pipeline ending early");
        return Ok(report);
    }

    let rows = transform::normalize(&records);
    report.rows_normalized = rows.len();
    if rows.is_empty() {
        warn!("Transform produced no rows, skipping load");
        return Ok(report);
    }

    report.csv_path = load::write_csv(&rows, &cfg.paths.data_dir)?;
    report.rows_inserted = load::append_sqlite(&rows, &cfg.paths.database).await?;

    info!(
        cities = report.cities_configured,
        fetched = report.cities_fetched,
        rows = report.rows_normalized,
        inserted = report.rows_inserted,
        csv = ?report.csv_path,
        "Pipeline run complete"
    );

    Ok(report)
}
