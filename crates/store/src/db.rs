use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use duckdb::Connection;
use sensorline_core::error::{Result, SensorlineError, StoreError};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::model::series::SeriesSpec;
use sensorline_core::query::StoreStatus;

use crate::backend::SeriesBackend;
use crate::schema::SCHEMA_SQL;

#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl DuckDbBackend {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SensorlineError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::other(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| StoreError::other(format!("failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::other(format!("failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::other(format!("failed to open in-memory db: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::other(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: ":memory:".to_string(),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub(crate) fn conn(&self) -> std::result::Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::other("store connection mutex poisoned"))
    }
}

impl SeriesBackend for DuckDbBackend {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn create(&self, spec: &SeriesSpec) -> std::result::Result<(), StoreError> {
        self.create_series(spec)
    }

    fn append(
        &self,
        key: &SeriesKey,
        timestamp_ms: i64,
        value: f64,
    ) -> std::result::Result<(), StoreError> {
        self.upsert_sample(key, timestamp_ms, value)
    }

    fn range(
        &self,
        key: &SeriesKey,
        from_ms: i64,
        to_ms: i64,
    ) -> std::result::Result<Vec<Sample>, StoreError> {
        self.range_samples(key, from_ms, to_ms)
    }

    fn prune_expired(&self, now_ms: i64) -> std::result::Result<usize, StoreError> {
        self.prune_before_retention(now_ms)
    }

    fn status(&self) -> std::result::Result<StoreStatus, StoreError> {
        self.store_status()
    }
}

pub(crate) fn db_err(context: &'static str) -> impl Fn(duckdb::Error) -> StoreError {
    move |e| StoreError::other(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_initializes() {
        let store = DuckDbBackend::open_in_memory().unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.backend, "duckdb");
        assert_eq!(status.series_count, 0);
        assert_eq!(status.sample_count, 0);
        assert_eq!(status.oldest_ms, None);
    }

    #[test]
    fn file_store_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!(
            "sensorline-db-test-{}",
            std::process::id()
        ));
        let path = dir.join("nested/sensorline.duckdb");
        let store = DuckDbBackend::open(&path).unwrap();
        assert_eq!(store.db_path(), path.display().to_string());
        drop(store);
        let _ = fs::remove_dir_all(dir);
    }
}
