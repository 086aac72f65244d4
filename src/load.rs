//! Load stage.
//!
//! Persists normalized observations to a timestamped CSV file and an
//! append-only SQLite table. Both sinks are no-ops on empty input, so a
//! run that produced nothing leaves no partial artifacts behind.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::WeatherObservation;

/// DDL for the persistent observation table.
const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS weather_current (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    city                TEXT    NOT NULL,
    timestamp           TEXT,
    temperature_c       REAL,
    windspeed_kmh       REAL,
    winddirection_deg   REAL,
    weathercode         INTEGER,
    is_day              INTEGER,
    retrieval_timestamp TEXT    NOT NULL
)
"#;

const INSERT_SQL: &str = "INSERT INTO weather_current \
    (city, timestamp, temperature_c, windspeed_kmh, winddirection_deg, \
     weathercode, is_day, retrieval_timestamp) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write the rows to a timestamped CSV file under `data_dir`.
///
/// Returns the path of the written file, or `Ok(None)` when there are
/// no rows (no file is created).
pub fn write_csv(rows: &[WeatherObservation], data_dir: &Path) -> Result<Option<PathBuf>> {
    if rows.is_empty() {
        warn!("No rows to write, CSV skipped");
        return Ok(None);
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = data_dir.join(format!("weather_data_{stamp}.csv"));

    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .context("Failed to serialize observation row")?;
    }
    writer.flush().context("Failed to flush CSV writer")?;

    info!(path = %path.display(), rows = rows.len(), "CSV saved");
    Ok(Some(path))
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Append the rows to the `weather_current` table, creating the
/// database file and table on first use.
///
/// The whole batch is inserted in one transaction; either every row
/// lands or none does. Returns the number of rows inserted (0 for an
/// empty input, without touching the database).
pub async fn append_sqlite(rows: &[WeatherObservation], db_path: &Path) -> Result<u64> {
    if rows.is_empty() {
        warn!("No rows to insert, SQLite skipped");
        return Ok(0);
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    sqlx::query(CREATE_TABLE_SQL)
        .execute(&pool)
        .await
        .context("Failed to create weather_current table")?;

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for row in rows {
        sqlx::query(INSERT_SQL)
            .bind(&row.city)
            .bind(&row.timestamp)
            .bind(row.temperature_c)
            .bind(row.windspeed_kmh)
            .bind(row.winddirection_deg)
            .bind(row.weathercode)
            .bind(row.is_day)
            .bind(&row.retrieval_timestamp)
            .execute(&mut *tx)
            .await
            .context("Failed to insert observation row")?;
    }
    tx.commit().await.context("Failed to commit observation batch")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weather_current")
        .fetch_one(&pool)
        .await
        .context("Failed to count observation rows")?;
    pool.close().await;

    let inserted = rows.len() as u64;
    info!(inserted, total, "SQLite append complete");
    Ok(inserted)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("atmos_test_{}", uuid::Uuid::new_v4()));
        p
    }

    fn sparse_row(city: &str) -> WeatherObservation {
        WeatherObservation {
            city: city.to_string(),
            timestamp: None,
            temperature_c: None,
            windspeed_kmh: Some(4.0),
            winddirection_deg: None,
            weathercode: None,
            is_day: Some(1),
            retrieval_timestamp: "2026-02-18T23:00:00Z".to_string(),
        }
    }

    // -- CSV -------------------------------------------------------------

    #[test]
    fn test_empty_rows_write_no_csv() {
        let dir = temp_dir();
        let path = write_csv(&[], &dir).unwrap();
        assert!(path.is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn test_csv_round_trip_preserves_values_and_nulls() {
        let dir = temp_dir();
        let rows = vec![WeatherObservation::sample("Paris"), sparse_row("Oslo")];

        let path = write_csv(&rows, &dir).unwrap().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(headers, WeatherObservation::COLUMNS);

        let read: Vec<WeatherObservation> = reader
            .deserialize()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(read, rows);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_csv_filename_is_timestamped() {
        let dir = temp_dir();
        let path = write_csv(&[WeatherObservation::sample("Paris")], &dir)
            .unwrap()
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("weather_data_"));
        assert!(name.ends_with(".csv"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    // -- SQLite ----------------------------------------------------------

    #[tokio::test]
    async fn test_empty_rows_insert_nothing() {
        let dir = temp_dir();
        let db = dir.join("weather.db");
        let inserted = append_sqlite(&[], &db).await.unwrap();
        assert_eq!(inserted, 0);
        assert!(!db.exists());
    }

    #[tokio::test]
    async fn test_sqlite_round_trip_preserves_values_and_nulls() {
        let dir = temp_dir();
        let db = dir.join("weather.db");
        let rows = vec![WeatherObservation::sample("Paris"), sparse_row("Oslo")];

        let inserted = append_sqlite(&rows, &db).await.unwrap();
        assert_eq!(inserted, 2);

        let pool = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&db))
            .await
            .unwrap();
        let read: Vec<WeatherObservation> = sqlx::query_as(
            "SELECT city, timestamp, temperature_c, windspeed_kmh, winddirection_deg, \
             weathercode, is_day, retrieval_timestamp FROM weather_current ORDER BY id",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        pool.close().await;

        assert_eq!(read, rows);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_appends_across_runs() {
        let dir = temp_dir();
        let db = dir.join("weather.db");

        append_sqlite(&[WeatherObservation::sample("Paris")], &db)
            .await
            .unwrap();
        append_sqlite(&[WeatherObservation::sample("London")], &db)
            .await
            .unwrap();

        let pool = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&db))
            .await
            .unwrap();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weather_current")
            .fetch_one(&pool)
            .await
            .unwrap();
        pool.close().await;

        assert_eq!(total, 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
