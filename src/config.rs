//! Configuration loading from TOML.
//!
//! Reads the config file and deserializes into strongly-typed structs.
//! Every section is optional and falls back to the same defaults the
//! pipeline has always shipped with; only the city list has no default,
//! since an empty list makes a run pointless.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::CityTarget;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "ATMOS_CONFIG";

/// Fallback config path relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cities: Vec<CityTarget>,
}

/// Weather API request settings. Immutable for the duration of a run.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Total attempts per city, including the first.
    pub max_retries: u32,
    /// Exponential base for the delay between attempts.
    pub backoff_factor: f64,
    /// Whether to request the `current_weather` block from the API.
    pub current_weather: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_seconds: 10,
            max_retries: 3,
            backoff_factor: 2.0,
            current_weather: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minutes between pipeline runs in `--schedule` mode.
    pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig { interval_minutes: 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for per-run CSV files.
    pub data_dir: PathBuf,
    /// SQLite database file.
    pub database: PathBuf,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("data/weather.db"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the retry loop and fetcher cannot work with.
    fn validate(&self) -> Result<()> {
        if self.api.max_retries < 1 {
            bail!("api.max_retries must be at least 1");
        }
        if self.api.backoff_factor < 1.0 {
            bail!("api.backoff_factor must be at least 1");
        }
        if self.schedule.interval_minutes < 1 {
            bail!("schedule.interval_minutes must be at least 1");
        }
        for city in &self.cities {
            if !(-90.0..=90.0).contains(&city.latitude) {
                bail!("city '{}' has invalid latitude {}", city.name, city.latitude);
            }
            if !(-180.0..=180.0).contains(&city.longitude) {
                bail!("city '{}' has invalid longitude {}", city.name, city.longitude);
            }
        }
        Ok(())
    }
}

/// Resolve the config file path: explicit flag first, then the
/// `ATMOS_CONFIG` environment variable, then `config.toml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
