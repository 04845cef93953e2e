use sensorline_core::error::{Result, SensorlineError};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::series::SeriesRange;
use sensorline_core::query::{SeriesRequest, SeriesResponse};

use crate::series::SeriesStore;

#[derive(Clone)]
pub struct RangeQueryService {
    store: SeriesStore,
    default_entity: String,
}

impl RangeQueryService {
    pub fn new(store: SeriesStore, default_entity: impl Into<String>) -> Self {
        Self {
            store,
            default_entity: default_entity.into(),
        }
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn resolve_key(&self, key: Option<&str>) -> Result<SeriesKey> {
        match key.map(str::trim) {
            Some(k) if !k.is_empty() => SeriesKey::parse(k),
            _ => SeriesKey::parse(&self.default_entity),
        }
    }

    pub fn query(&self, req: &SeriesRequest) -> Result<SeriesResponse> {
        let key = self.resolve_key(req.key.as_deref())?;
        let range = self.query_ms(
            &key,
            req.from.timestamp_millis(),
            req.to.timestamp_millis(),
        )?;
        Ok(SeriesResponse {
            key: range.series_key,
            from: req.from,
            to: req.to,
            points: range.points,
        })
    }

    pub fn query_ms(&self, key: &SeriesKey, from_ms: i64, to_ms: i64) -> Result<SeriesRange> {
        if from_ms > to_ms {
            return Err(SensorlineError::InvalidRange { from_ms, to_ms });
        }
        self.store.query(key, from_ms, to_ms)
    }
}
