//! Open-Meteo API client.
//!
//! Performs exactly one request per call; failure classification here
//! drives the retry policy in the extract loop.
//!
//! API: `https://api.open-meteo.com/v1/forecast`
//! Auth: None required.
//! Rate limit: Generous (free tier).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{CurrentWeatherApi, FetchError};
use crate::config::ApiConfig;
use crate::types::CityTarget;

const USER_AGENT: &str = concat!("atmos/", env!("CARGO_PKG_VERSION"));

pub struct OpenMeteoApi {
    http: Client,
    base_url: String,
    current_weather: bool,
}

impl OpenMeteoApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build Open-Meteo HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            current_weather: cfg.current_weather,
        })
    }

    /// Map a transport error onto the retryable/unrecoverable taxonomy.
    ///
    /// Timeouts and connection failures are transient. Anything else at
    /// the transport level (request construction, redirect policy, DNS
    /// resolution reported as a builder error) is permanent for this
    /// run and not worth another attempt.
    fn classify(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Unrecoverable(err.to_string())
        }
    }
}

#[async_trait]
impl CurrentWeatherApi for OpenMeteoApi {
    async fn request_current(&self, city: &CityTarget) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("latitude", city.latitude.to_string()),
                ("longitude", city.longitude.to_string()),
                ("current_weather", self.current_weather.to_string()),
            ])
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // A 200 with an unparseable body is not transient; only a
        // timeout while reading it is.
        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Unrecoverable(format!("malformed response body: {e}"))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
