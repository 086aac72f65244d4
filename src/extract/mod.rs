//! Extract stage.
//!
//! Defines the `CurrentWeatherApi` trait (one network attempt) and the
//! retry/aggregation logic on top of it: bounded retries with
//! exponential back-off per city, and partial-failure tolerance across
//! the city list. One bad city never aborts the run.

pub mod open_meteo;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::ApiConfig;
use crate::types::{CityTarget, ExtractedRecord};

// ---------------------------------------------------------------------------
// Fetch abstraction
// ---------------------------------------------------------------------------

/// A single attempt to retrieve one city's current weather.
///
/// Implementors perform exactly one request per call; the retry policy
/// lives in [`fetch_weather`], not here. Tests substitute deterministic
/// in-memory implementations.
#[async_trait]
pub trait CurrentWeatherApi: Send + Sync {
    async fn request_current(&self, city: &CityTarget) -> Result<Value, FetchError>;
}

/// Failure classes for one fetch attempt.
///
/// Timeouts, connection drops and bad HTTP statuses are transient and
/// consume the retry budget. `Unrecoverable` fails the city on the spot
/// with no further attempts; the transient/permanent split is part of
/// the fetcher's contract, not an implementation detail.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("unrecoverable request error: {0}")]
    Unrecoverable(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Unrecoverable(_))
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Delay before the attempt after `attempt`, exponential in the attempt
/// index (1-based).
fn backoff_delay(backoff_factor: f64, attempt: u32) -> Duration {
    Duration::from_secs_f64(backoff_factor.powi(attempt as i32))
}

/// Fetch current weather for a single city, retrying transient failures.
///
/// Makes up to `cfg.max_retries` total attempts, sleeping
/// `backoff_factor^attempt` seconds between them (no sleep after the
/// last). An unrecoverable error gives up immediately. Returns `None`
/// for every failure mode; the caller treats absence as "skip this
/// city", never as a reason to abort the run.
pub async fn fetch_weather<A>(api: &A, city: &CityTarget, cfg: &ApiConfig) -> Option<Value>
where
    A: CurrentWeatherApi + ?Sized,
{
    for attempt in 1..=cfg.max_retries {
        info!(
            city = %city.name,
            attempt,
            max_retries = cfg.max_retries,
            "Requesting current weather"
        );

        match api.request_current(city).await {
            Ok(payload) => {
                info!(city = %city.name, "Fetched current weather");
                return Some(payload);
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    city = %city.name,
                    attempt,
                    max_retries = cfg.max_retries,
                    error = %e,
                    "Fetch attempt failed"
                );
            }
            Err(e) => {
                error!(city = %city.name, error = %e, "Unrecoverable request error");
                return None;
            }
        }

        if attempt < cfg.max_retries {
            let delay = backoff_delay(cfg.backoff_factor, attempt);
            info!(
                city = %city.name,
                delay_secs = delay.as_secs_f64(),
                "Retrying after back-off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    error!(
        city = %city.name,
        attempts = cfg.max_retries,
        "All attempts failed, skipping city"
    );
    None
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Fetch weather for every configured city, in input order.
///
/// Cities whose fetch fails are dropped from the output; the relative
/// order of successes is preserved. Deterministic given a deterministic
/// API implementation.
pub async fn extract_all<A>(api: &A, cities: &[CityTarget], cfg: &ApiConfig) -> Vec<ExtractedRecord>
where
    A: CurrentWeatherApi + ?Sized,
{
    let mut records = Vec::with_capacity(cities.len());

    for city in cities {
        if let Some(raw) = fetch_weather(api, city, cfg).await {
            records.push(ExtractedRecord {
                city: city.name.clone(),
                raw,
            });
        }
    }

    info!(
        succeeded = records.len(),
        total = cities.len(),
        "Extraction complete"
    );
    records
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Deterministic API stub: runs a fixed behaviour per call and
    /// counts every attempt made against it.
    struct StubApi<F>
    where
        F: Fn(&CityTarget) -> Result<Value, FetchError> + Send + Sync,
    {
        behaviour: F,
        attempts: AtomicU32,
    }

    impl<F> StubApi<F>
    where
        F: Fn(&CityTarget) -> Result<Value, FetchError> + Send + Sync,
    {
        fn new(behaviour: F) -> Self {
            StubApi {
                behaviour,
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F> CurrentWeatherApi for StubApi<F>
    where
        F: Fn(&CityTarget) -> Result<Value, FetchError> + Send + Sync,
    {
        async fn request_current(&self, city: &CityTarget) -> Result<Value, FetchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            (self.behaviour)(city)
        }
    }

    fn test_config(max_retries: u32) -> ApiConfig {
        ApiConfig {
            max_retries,
            backoff_factor: 2.0,
            ..ApiConfig::default()
        }
    }

    // -- Back-off --------------------------------------------------------

    #[test]
    fn test_backoff_delay_is_exponential() {
        assert_eq!(backoff_delay(2.0, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2.0, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(2.0, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(3.0, 2), Duration::from_secs(9));
    }

    #[test]
    fn test_backoff_delay_supports_fractional_factor() {
        let d = backoff_delay(1.5, 2);
        assert!((d.as_secs_f64() - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Connect("refused".into()).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Unrecoverable("bad request".into()).is_retryable());
    }

    // -- fetch_weather ---------------------------------------------------

    #[tokio::test]
    async fn test_success_returns_immediately() {
        let api = StubApi::new(|_: &CityTarget| Ok(json!({"current_weather": {}})));
        let result = fetch_weather(&api, &CityTarget::sample("Paris"), &test_config(3)).await;
        assert!(result.is_some());
        assert_eq!(api.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_timeout_consumes_all_attempts() {
        let api = StubApi::new(|_: &CityTarget| Err(FetchError::Timeout));
        let result = fetch_weather(&api, &CityTarget::sample("Paris"), &test_config(5)).await;
        assert!(result.is_none());
        assert_eq!(api.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_consumes_all_attempts() {
        let api = StubApi::new(|_: &CityTarget| Err(FetchError::Status(500)));
        let result = fetch_weather(&api, &CityTarget::sample("Paris"), &test_config(3)).await;
        assert!(result.is_none());
        assert_eq!(api.attempts(), 3);
    }

    #[tokio::test]
    async fn test_unrecoverable_error_makes_exactly_one_attempt() {
        let api =
            StubApi::new(|_: &CityTarget| Err(FetchError::Unrecoverable("malformed request".into())));
        let result = fetch_weather(&api, &CityTarget::sample("Paris"), &test_config(5)).await;
        assert!(result.is_none());
        assert_eq!(api.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let api = StubApi::new({
            let calls = AtomicU32::new(0);
            move |_: &CityTarget| {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Connect("refused".into()))
                } else {
                    Ok(json!({"ok": true}))
                }
            }
        });
        let result = fetch_weather(&api, &CityTarget::sample("Paris"), &test_config(4)).await;
        assert!(result.is_some());
        assert_eq!(api.attempts(), 3);
    }

    // -- extract_all -----------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_successes_in_order() {
        let api = StubApi::new(|city: &CityTarget| {
            if city.name == "Atlantis" {
                Err(FetchError::Timeout)
            } else {
                Ok(json!({"city": city.name.as_str()}))
            }
        });
        let cities = vec![
            CityTarget::sample("London"),
            CityTarget::sample("Atlantis"),
            CityTarget::sample("Paris"),
        ];

        let records = extract_all(&api, &cities, &test_config(2)).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].city, "London");
        assert_eq!(records[1].city, "Paris");
    }

    #[tokio::test]
    async fn test_empty_city_list_yields_empty_output() {
        let api = StubApi::new(|_: &CityTarget| Ok(json!({})));
        let records = extract_all(&api, &[], &test_config(3)).await;
        assert!(records.is_empty());
        assert_eq!(api.attempts(), 0);
    }
}
