use duckdb::{Connection, params};
use sensorline_core::error::StoreError;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::query::StoreStatus;

use crate::DuckDbBackend;
use crate::db::db_err;
use crate::write::retention_of;

impl DuckDbBackend {
    pub(crate) fn range_samples(
        &self,
        key: &SeriesKey,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        let conn = self.conn()?;
        if retention_of(&conn, key)?.is_none() {
            return Err(StoreError::not_found(key.as_str()));
        }

        let mut stmt = conn
            .prepare(
                "SELECT ts_ms, value FROM samples
                 WHERE series_key = ? AND ts_ms >= ? AND ts_ms <= ?
                 ORDER BY ts_ms ASC",
            )
            .map_err(db_err("prepare range failed"))?;
        let rows = stmt
            .query_map(params![key.as_str(), from_ms, to_ms], |row| {
                Ok(Sample::new(row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(db_err("query range failed"))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err("map range row failed"))?);
        }
        Ok(out)
    }

    pub(crate) fn store_status(&self) -> Result<StoreStatus, StoreError> {
        let conn = self.conn()?;

        let series_count = scalar_usize(&conn, "SELECT COUNT(*) FROM series")?;
        let sample_count = scalar_usize(&conn, "SELECT COUNT(*) FROM samples")?;
        let oldest_ms = scalar_opt_i64(&conn, "SELECT MIN(ts_ms) FROM samples")?;
        let newest_ms = scalar_opt_i64(&conn, "SELECT MAX(ts_ms) FROM samples")?;

        Ok(StoreStatus {
            backend: "duckdb".to_string(),
            series_count,
            sample_count,
            oldest_ms,
            newest_ms,
        })
    }
}

pub(crate) fn list_retentions(conn: &Connection) -> Result<Vec<(String, i64)>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT series_key, retention_ms FROM series ORDER BY series_key")
        .map_err(db_err("prepare series list failed"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(db_err("list series failed"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(db_err("map series row failed"))?);
    }
    Ok(out)
}

fn scalar_usize(conn: &Connection, sql: &str) -> Result<usize, StoreError> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|v| v as usize)
        .map_err(db_err("count query failed"))
}

fn scalar_opt_i64(conn: &Connection, sql: &str) -> Result<Option<i64>, StoreError> {
    conn.query_row(sql, [], |row| row.get::<_, Option<i64>>(0))
        .map_err(db_err("scalar query failed"))
}
