use chrono::Utc;
use duckdb::{Connection, params};
use sensorline_core::error::StoreError;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::series::SeriesSpec;

use crate::DuckDbBackend;
use crate::db::db_err;

impl DuckDbBackend {
    pub(crate) fn create_series(&self, spec: &SeriesSpec) -> Result<(), StoreError> {
        let conn = self.conn()?;
        if retention_of(&conn, &spec.key)?.is_some() {
            return Err(StoreError::already_exists(spec.key.as_str()));
        }

        conn.execute(
            "INSERT INTO series (series_key, retention_ms, labels_json, created_ms)
             VALUES (?, ?, ?, ?)",
            params![
                spec.key.as_str(),
                spec.retention_ms(),
                spec.labels.to_json(),
                Utc::now().timestamp_millis(),
            ],
        )
        .map_err(db_err("insert series failed"))?;
        Ok(())
    }

    pub(crate) fn upsert_sample(
        &self,
        key: &SeriesKey,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let Some(retention_ms) = retention_of(&conn, key)? else {
            return Err(StoreError::not_found(key.as_str()));
        };

        let tx = conn
            .transaction()
            .map_err(db_err("begin tx failed"))?;
        tx.execute(
            "INSERT OR REPLACE INTO samples (series_key, ts_ms, value) VALUES (?, ?, ?)",
            params![key.as_str(), timestamp_ms, value],
        )
        .map_err(db_err("insert sample failed"))?;

        tx.execute(
            "DELETE FROM samples
             WHERE series_key = ?
               AND ts_ms < (SELECT MAX(ts_ms) FROM samples WHERE series_key = ?) - ?",
            params![key.as_str(), key.as_str(), retention_ms],
        )
        .map_err(db_err("trim expired samples failed"))?;

        tx.commit().map_err(db_err("commit sample failed"))
    }
}

pub(crate) fn retention_of(conn: &Connection, key: &SeriesKey) -> Result<Option<i64>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT retention_ms FROM series WHERE series_key = ?")
        .map_err(db_err("prepare series lookup failed"))?;
    let mut rows = stmt
        .query_map(params![key.as_str()], |row| row.get::<_, i64>(0))
        .map_err(db_err("series lookup failed"))?;
    rows.next()
        .transpose()
        .map_err(db_err("map series row failed"))
}
