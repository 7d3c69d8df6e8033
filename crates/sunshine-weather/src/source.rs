//! Producer-side lookup of today's weather record.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{SourceError, WeatherRecord};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Normalize a timestamp to UTC midnight, in epoch milliseconds.
///
/// Records are keyed by this value.
pub fn normalize_date(at: DateTime<Utc>) -> i64 {
    let millis = at.timestamp_millis();
    millis - millis.rem_euclid(DAY_MILLIS)
}

/// Query interface over the local weather database.
pub trait WeatherRecordSource: Send + Sync {
    /// The record for a normalized date, or `None` if there is no row.
    fn record_for_date(&self, normalized_date: i64) -> Result<Option<WeatherRecord>, SourceError>;
}

/// SQLite-backed weather records.
pub struct SqliteWeatherSource {
    conn: Mutex<Connection>,
}

impl SqliteWeatherSource {
    /// Open (or create) the weather database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let conn = Connection::open(path)?;
        let source = Self {
            conn: Mutex::new(conn),
        };
        source.init_schema()?;
        Ok(source)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, SourceError> {
        let conn = Connection::open_in_memory()?;
        let source = Self {
            conn: Mutex::new(conn),
        };
        source.init_schema()?;
        Ok(source)
    }

    fn init_schema(&self) -> Result<(), SourceError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather (
                date INTEGER PRIMARY KEY,
                weather_id INTEGER NOT NULL,
                max_temp REAL NOT NULL,
                min_temp REAL NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace the record for a normalized date.
    pub fn upsert(&self, normalized_date: i64, record: &WeatherRecord) -> Result<(), SourceError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO weather (date, weather_id, max_temp, min_temp) VALUES (?1, ?2, ?3, ?4)",
            params![normalized_date, record.weather_id, record.max_temp, record.min_temp],
        )?;
        Ok(())
    }
}

impl WeatherRecordSource for SqliteWeatherSource {
    fn record_for_date(&self, normalized_date: i64) -> Result<Option<WeatherRecord>, SourceError> {
        let record = self
            .conn
            .lock()
            .query_row(
                "SELECT weather_id, max_temp, min_temp FROM weather WHERE date = ?1",
                params![normalized_date],
                |row| {
                    Ok(WeatherRecord {
                        weather_id: row.get(0)?,
                        max_temp: row.get(1)?,
                        min_temp: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

/// Records held in memory, keyed by normalized date.
#[derive(Debug, Default)]
pub struct InMemorySource {
    records: Mutex<BTreeMap<i64, WeatherRecord>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, normalized_date: i64, record: WeatherRecord) {
        self.records.lock().insert(normalized_date, record);
    }
}

impl WeatherRecordSource for InMemorySource {
    fn record_for_date(&self, normalized_date: i64) -> Result<Option<WeatherRecord>, SourceError> {
        Ok(self.records.lock().get(&normalized_date).copied())
    }
}
