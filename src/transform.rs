//! Transform stage.
//!
//! Flattens raw API payloads into typed [`WeatherObservation`] rows.
//! Defensive by construction: upstream responses are not
//! schema-validated before this point, so every field is read through
//! an optional accessor. Only total absence (or wrong shape) of the
//! `current_weather` block skips a record; a missing sub-field merely
//! nulls its column.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::types::{ExtractedRecord, WeatherObservation};

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Coerce a JSON value to f64: numbers directly, numeric strings by
/// parsing, everything else to `None`.
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to i64. Integral floats are accepted,
/// fractional ones are not a valid code/flag and become `None`.
fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_string(value: Option<&Value>) -> Option<String> {
    value?.as_str().map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Parse a single extracted record into an observation row.
///
/// Returns `None` (and logs why) when the payload has no usable
/// `current_weather` block. Never panics and never propagates errors.
fn parse_single(record: &ExtractedRecord) -> Option<WeatherObservation> {
    let current = match record.raw.get("current_weather") {
        Some(block) => block,
        None => {
            warn!(city = %record.city, "No 'current_weather' block, skipping record");
            return None;
        }
    };

    if !current.is_object() {
        error!(
            city = %record.city,
            "'current_weather' block is not an object, skipping record"
        );
        return None;
    }

    Some(WeatherObservation {
        city: record.city.clone(),
        timestamp: coerce_string(current.get("time")),
        temperature_c: coerce_f64(current.get("temperature")),
        windspeed_kmh: coerce_f64(current.get("windspeed")),
        winddirection_deg: coerce_f64(current.get("winddirection")),
        weathercode: coerce_i64(current.get("weathercode")),
        is_day: coerce_i64(current.get("is_day")),
        retrieval_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

/// Normalize extracted records into observation rows.
///
/// Output order matches input order minus skipped records. An empty
/// input, or an input where every record is skipped, yields an empty
/// vector; the schema is the struct itself, so its shape never depends
/// on the data.
pub fn normalize(records: &[ExtractedRecord]) -> Vec<WeatherObservation> {
    let rows: Vec<WeatherObservation> = records.iter().filter_map(parse_single).collect();

    if rows.is_empty() {
        warn!(input = records.len(), "Transform produced no rows");
    } else {
        info!(
            rows = rows.len(),
            skipped = records.len() - rows.len(),
            "Transform complete"
        );
    }
    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
