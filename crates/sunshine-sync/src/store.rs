//! Consumer-side snapshot store.
//!
//! A single-row-per-key preferences table holding the last received
//! snapshot. The three keys are always written in one transaction and read
//! in one statement, so readers never see a mix of two snapshots.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use sunshine_weather::WeatherSnapshot;

use crate::error::StoreError;

pub const KEY_HIGH_TEMP: &str = "mHighTemp";
pub const KEY_LOW_TEMP: &str = "mLowTemp";
pub const KEY_BITMAP: &str = "bitmap";

/// Raw stored values with defaults applied for unset keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredValues {
    pub high_temp: i32,
    pub low_temp: i32,
    pub icon: Option<Vec<u8>>,
}

/// SQLite-backed snapshot storage.
pub struct SqliteSnapshotStore {
    conn: Connection,
}

impl SqliteSnapshotStore {
    /// Open the store at the given path, creating the schema if needed.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Upsert all three fields in one transaction.
    pub fn write(&mut self, snapshot: &WeatherSnapshot) -> Result<(), StoreError> {
        let icon = STANDARD.encode(snapshot.icon_bytes());

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            stmt.execute(params![KEY_HIGH_TEMP, snapshot.high_temp()])?;
            stmt.execute(params![KEY_LOW_TEMP, snapshot.low_temp()])?;
            stmt.execute(params![KEY_BITMAP, icon])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Current values, `0, 0, None` for keys never written.
    pub fn read_values(&self) -> Result<StoredValues, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM preferences WHERE key IN (?1, ?2, ?3)")?;
        let rows = stmt
            .query_map(params![KEY_HIGH_TEMP, KEY_LOW_TEMP, KEY_BITMAP], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Value>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = StoredValues::default();
        for (key, value) in rows {
            match key.as_str() {
                KEY_HIGH_TEMP => values.high_temp = int_value(KEY_HIGH_TEMP, value)?,
                KEY_LOW_TEMP => values.low_temp = int_value(KEY_LOW_TEMP, value)?,
                KEY_BITMAP => values.icon = Some(icon_value(value)?),
                _ => {}
            }
        }
        Ok(values)
    }

    /// The last written snapshot, or `None` if nothing was ever written.
    pub fn read(&self) -> Result<Option<WeatherSnapshot>, StoreError> {
        let values = self.read_values()?;
        Ok(values
            .icon
            .map(|icon| WeatherSnapshot::new(values.high_temp, values.low_temp, icon)))
    }

    /// Remove all stored values.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM preferences", [])?;
        Ok(())
    }
}

fn int_value(key: &'static str, value: Value) -> Result<i32, StoreError> {
    match value {
        Value::Integer(i) => i32::try_from(i).map_err(|e| StoreError::Corrupt {
            key,
            message: e.to_string(),
        }),
        other => Err(StoreError::Corrupt {
            key,
            message: format!("expected integer, found {:?}", other.data_type()),
        }),
    }
}

fn icon_value(value: Value) -> Result<Vec<u8>, StoreError> {
    match value {
        Value::Text(encoded) => STANDARD.decode(encoded).map_err(|e| StoreError::Corrupt {
            key: KEY_BITMAP,
            message: e.to_string(),
        }),
        other => Err(StoreError::Corrupt {
            key: KEY_BITMAP,
            message: format!("expected text, found {:?}", other.data_type()),
        }),
    }
}

/// Shared handle to the snapshot store, injected into the consumer and the
/// renderer.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<Mutex<SqliteSnapshotStore>>,
}

impl SnapshotStore {
    pub fn new(store: SqliteSnapshotStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::new(SqliteSnapshotStore::new(path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(SqliteSnapshotStore::in_memory()?))
    }

    pub fn write(&self, snapshot: &WeatherSnapshot) -> Result<(), StoreError> {
        self.inner.lock().write(snapshot)
    }

    pub fn read(&self) -> Result<Option<WeatherSnapshot>, StoreError> {
        self.inner.lock().read()
    }

    pub fn read_values(&self) -> Result<StoredValues, StoreError> {
        self.inner.lock().read_values()
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.inner.lock().clear()
    }

    /// Write from async code without blocking the runtime.
    pub async fn write_async(&self, snapshot: WeatherSnapshot) -> Result<(), StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.lock().write(&snapshot))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Read from async code without blocking the runtime.
    pub async fn read_async(&self) -> Result<Option<WeatherSnapshot>, StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.lock().read())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(high: i32, low: i32, icon: &[u8]) -> WeatherSnapshot {
        WeatherSnapshot::new(high, low, icon.to_vec())
    }

    #[test]
    fn test_empty_store_reads_absent_with_defaults() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        assert!(store.read().unwrap().is_none());
        assert_eq!(store.read_values().unwrap(), StoredValues::default());
    }

    #[test]
    fn test_write_then_read() {
        let mut store = SqliteSnapshotStore::in_memory().unwrap();
        store.write(&snapshot(75, 58, b"png")).unwrap();

        let read = store.read().unwrap().unwrap();
        assert_eq!(read.high_temp(), 75);
        assert_eq!(read.low_temp(), 58);
        assert_eq!(read.icon_bytes(), b"png");
    }

    #[test]
    fn test_write_is_idempotent() {
        let mut store = SqliteSnapshotStore::in_memory().unwrap();
        let s = snapshot(20, 10, b"icon");
        store.write(&s).unwrap();
        let once = store.read_values().unwrap();
        store.write(&s).unwrap();
        assert_eq!(store.read_values().unwrap(), once);

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM preferences", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = SqliteSnapshotStore::in_memory().unwrap();
        store.write(&snapshot(1, 0, b"a")).unwrap();
        store.write(&snapshot(9, 8, b"b")).unwrap();
        assert_eq!(store.read().unwrap(), Some(snapshot(9, 8, b"b")));
    }

    #[test]
    fn test_temperatures_without_icon_read_as_absent() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)",
                params![KEY_HIGH_TEMP, 30],
            )
            .unwrap();

        assert!(store.read().unwrap().is_none());
        assert_eq!(store.read_values().unwrap().high_temp, 30);
    }

    #[test]
    fn test_corrupt_bitmap_is_reported() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)",
                params![KEY_BITMAP, "@@@"],
            )
            .unwrap();
        assert!(matches!(
            store.read(),
            Err(StoreError::Corrupt { key: KEY_BITMAP, .. })
        ));
    }

    #[test]
    fn test_clear() {
        let mut store = SqliteSnapshotStore::in_memory().unwrap();
        store.write(&snapshot(1, 0, b"a")).unwrap();
        store.clear().unwrap();
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.db");
        SnapshotStore::open(&path)
            .unwrap()
            .write(&snapshot(12, 3, b"x"))
            .unwrap();

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.read().unwrap(), Some(snapshot(12, 3, b"x")));
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_fields() {
        let store = SnapshotStore::in_memory().unwrap();
        let a = snapshot(10, 1, b"icon-a");
        let b = snapshot(90, 70, b"icon-b");
        store.write(&a).unwrap();

        let writer = {
            let store = store.clone();
            let (a, b) = (a.clone(), b.clone());
            std::thread::spawn(move || {
                for i in 0..200 {
                    let next = if i % 2 == 0 { &b } else { &a };
                    store.write(next).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let read = store.read().unwrap().unwrap();
            assert!(read == a || read == b, "mixed snapshot: {:?}", read);
        }
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let store = SnapshotStore::in_memory().unwrap();
        store.write_async(snapshot(5, 4, b"z")).await.unwrap();
        assert_eq!(store.read_async().await.unwrap(), Some(snapshot(5, 4, b"z")));
    }
}
