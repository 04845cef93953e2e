use duckdb::params;
use sensorline_core::error::StoreError;
use tracing::debug;

use crate::DuckDbBackend;
use crate::db::db_err;
use crate::query::list_retentions;

impl DuckDbBackend {
    pub(crate) fn prune_before_retention(&self, now_ms: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let mut removed = 0;
        for (key, retention_ms) in list_retentions(&conn)? {
            let cutoff = now_ms.saturating_sub(retention_ms);
            removed += conn
                .execute(
                    "DELETE FROM samples WHERE series_key = ? AND ts_ms < ?",
                    params![key, cutoff],
                )
                .map_err(db_err("retention delete failed"))?;
        }
        if removed > 0 {
            debug!(removed, "pruned expired samples");
        }
        Ok(removed)
    }
}
