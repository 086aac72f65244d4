//! Shared types for the ATMOS pipeline.
//!
//! These types form the data model handed between the extract, transform
//! and load stages. They are designed to be stable so that the stage
//! modules can depend on them without circular references.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// City target
// ---------------------------------------------------------------------------

/// A city to collect observations for, as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CityTarget {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl CityTarget {
    /// Helper to build a test city with plausible coordinates.
    #[cfg(test)]
    pub fn sample(name: &str) -> Self {
        CityTarget {
            name: name.to_string(),
            latitude: 48.8566,
            longitude: 2.3522,
        }
    }
}

// ---------------------------------------------------------------------------
// Extracted record
// ---------------------------------------------------------------------------

/// One successful fetch: the raw, untyped API payload tagged with the
/// name of the city it came from. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct ExtractedRecord {
    pub city: String,
    pub raw: Value,
}

// ---------------------------------------------------------------------------
// Weather observation
// ---------------------------------------------------------------------------

/// A normalized observation row with the fixed output schema.
///
/// Every field except `city` and `retrieval_timestamp` is optional:
/// missing or uncoercible source fields become `None` rather than
/// failing the row. `retrieval_timestamp` is the normalization
/// wall-clock time in ISO-8601 UTC, not the timestamp reported by the
/// API. Created once per successfully parsed record, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeatherObservation {
    pub city: String,
    pub timestamp: Option<String>,
    pub temperature_c: Option<f64>,
    pub windspeed_kmh: Option<f64>,
    pub winddirection_deg: Option<f64>,
    pub weathercode: Option<i64>,
    pub is_day: Option<i64>,
    pub retrieval_timestamp: String,
}

impl WeatherObservation {
    /// Column order shared by the CSV file and the SQLite table.
    pub const COLUMNS: [&'static str; 8] = [
        "city",
        "timestamp",
        "temperature_c",
        "windspeed_kmh",
        "winddirection_deg",
        "weathercode",
        "is_day",
        "retrieval_timestamp",
    ];

    /// Helper to build a fully-populated test observation.
    #[cfg(test)]
    pub fn sample(city: &str) -> Self {
        WeatherObservation {
            city: city.to_string(),
            timestamp: Some("2026-02-18T22:00".to_string()),
            temperature_c: Some(7.2),
            windspeed_kmh: Some(12.5),
            winddirection_deg: Some(210.0),
            weathercode: Some(3),
            is_day: Some(0),
            retrieval_timestamp: "2026-02-18T22:05:00Z".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_target_deserializes_from_toml() {
        let city: CityTarget = toml::from_str(
            r#"
            name = "London"
            latitude = 51.5074
            longitude = -0.1278
            "#,
        )
        .unwrap();
        assert_eq!(city.name, "London");
        assert!((city.latitude - 51.5074).abs() < 1e-9);
        assert!((city.longitude - -0.1278).abs() < 1e-9);
    }

    #[test]
    fn test_observation_columns_match_struct_fields() {
        let row = WeatherObservation::sample("Paris");
        let value = serde_json::to_value(&row).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys.len(), WeatherObservation::COLUMNS.len());
        for col in WeatherObservation::COLUMNS {
            assert!(keys.contains(&col), "missing column {col}");
        }
    }
}
