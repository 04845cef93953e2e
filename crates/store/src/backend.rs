use sensorline_core::error::StoreError;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::model::series::SeriesSpec;
use sensorline_core::query::StoreStatus;

pub trait SeriesBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, spec: &SeriesSpec) -> Result<(), StoreError>;

    fn append(&self, key: &SeriesKey, timestamp_ms: i64, value: f64) -> Result<(), StoreError>;

    fn range(&self, key: &SeriesKey, from_ms: i64, to_ms: i64)
    -> Result<Vec<Sample>, StoreError>;

    fn prune_expired(&self, now_ms: i64) -> Result<usize, StoreError>;

    fn status(&self) -> Result<StoreStatus, StoreError>;
}
