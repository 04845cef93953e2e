use std::sync::Arc;
use std::time::Duration;

use sensorline_core::config::Config;
use sensorline_core::error::{Result, StoreError};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::series::{SeriesLabels, SeriesRange, SeriesSpec};
use sensorline_core::query::StoreStatus;
use tracing::{debug, info};

use crate::backend::SeriesBackend;

#[derive(Clone)]
pub struct SeriesStore {
    backend: Arc<dyn SeriesBackend>,
    retention: Duration,
    metric_label: String,
}

impl SeriesStore {
    pub fn new(backend: Arc<dyn SeriesBackend>, retention: Duration) -> Self {
        Self {
            backend,
            retention,
            metric_label: "value".to_string(),
        }
    }

    pub fn from_config(backend: Arc<dyn SeriesBackend>, cfg: &Config) -> Self {
        Self::new(backend, cfg.retention).with_metric_label(cfg.metric_label.clone())
    }

    pub fn with_metric_label(mut self, metric_label: impl Into<String>) -> Self {
        self.metric_label = metric_label.into();
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn spec_for(&self, key: &SeriesKey) -> SeriesSpec {
        SeriesSpec {
            key: key.clone(),
            retention: self.retention,
            labels: SeriesLabels::standard(key, &self.metric_label),
        }
    }

    pub fn append(&self, key: &SeriesKey, timestamp_ms: i64, value: f64) -> Result<()> {
        match self.backend.append(key, timestamp_ms, value) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        self.provision(key)?;
        self.backend
            .append(key, timestamp_ms, value)
            .map_err(Into::into)
    }

    pub fn query(&self, key: &SeriesKey, from_ms: i64, to_ms: i64) -> Result<SeriesRange> {
        match self.backend.range(key, from_ms, to_ms) {
            Ok(points) => Ok(SeriesRange {
                series_key: key.clone(),
                from_ms,
                to_ms,
                points,
            }),
            Err(e) if e.is_not_found() => Ok(SeriesRange::empty(key.clone(), from_ms, to_ms)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn prune_expired(&self, now_ms: i64) -> Result<usize> {
        self.backend.prune_expired(now_ms).map_err(Into::into)
    }

    pub fn status(&self) -> Result<StoreStatus> {
        self.backend.status().map_err(Into::into)
    }

    fn provision(&self, key: &SeriesKey) -> std::result::Result<(), StoreError> {
        let spec = self.spec_for(key);
        match self.backend.create(&spec) {
            Ok(()) => {
                info!(
                    series = %key,
                    retention_ms = spec.retention_ms(),
                    "created series"
                );
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(series = %key, "series created by a concurrent writer");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use sensorline_core::model::sample::Sample;

    use super::*;
    use crate::{DuckDbBackend, MemoryBackend};

    fn stores() -> Vec<SeriesStore> {
        vec![
            SeriesStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(86_400)),
            SeriesStore::new(
                Arc::new(DuckDbBackend::open_in_memory().unwrap()),
                Duration::from_secs(86_400),
            ),
        ]
    }

    fn key(name: &str) -> SeriesKey {
        SeriesKey::parse(name).unwrap()
    }

    #[test]
    fn append_provisions_unseen_series() {
        for store in stores() {
            let k = key("Singapore");
            store.append(&k, 1_000, 27.0).unwrap();

            let range = store.query(&k, 0, 2_000).unwrap();
            assert_eq!(range.points, vec![Sample::new(1_000, 27.0)], "{}", store.backend_name());
            assert_eq!(store.status().unwrap().series_count, 1);
        }
    }

    #[test]
    fn last_write_wins_on_same_timestamp() {
        for store in stores() {
            let k = key("oslo");
            store.append(&k, 5_000, 1.0).unwrap();
            store.append(&k, 5_000, 2.0).unwrap();

            let range = store.query(&k, 0, 10_000).unwrap();
            assert_eq!(range.points, vec![Sample::new(5_000, 2.0)]);
        }
    }

    #[test]
    fn query_filters_inclusive_range_ascending() {
        for store in stores() {
            let k = key("oslo");
            for (ts, v) in [(40, 4.0), (10, 1.0), (30, 3.0), (20, 2.0), (50, 5.0)] {
                store.append(&k, ts, v).unwrap();
            }

            let range = store.query(&k, 20, 40).unwrap();
            assert_eq!(
                range.points,
                vec![Sample::new(20, 2.0), Sample::new(30, 3.0), Sample::new(40, 4.0)]
            );
            assert_eq!(range.from_ms, 20);
            assert_eq!(range.to_ms, 40);
        }
    }

    #[test]
    fn query_unseen_series_is_empty() {
        for store in stores() {
            let range = store.query(&key("nowhere"), 0, i64::MAX).unwrap();
            assert!(range.points.is_empty());
            assert_eq!(range.series_key.as_str(), "nowhere");
        }
    }

    #[test]
    fn case_variants_address_one_series() {
        for store in stores() {
            store.append(&key("Singapore"), 1, 1.0).unwrap();
            store.append(&key("SINGAPORE"), 2, 2.0).unwrap();
            assert_eq!(store.query(&key("singapore"), 0, 10).unwrap().points.len(), 2);
        }
    }

    #[test]
    fn concurrent_first_appends_both_succeed() {
        for store in stores() {
            let k = key("race");
            let handles = (0..8)
                .map(|i| {
                    let store = store.clone();
                    let k = k.clone();
                    thread::spawn(move || store.append(&k, i * 10, i as f64))
                })
                .collect::<Vec<_>>();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }

            let range = store.query(&k, 0, 1_000).unwrap();
            assert_eq!(range.points.len(), 8);
            assert_eq!(store.status().unwrap().series_count, 1);
        }
    }

    #[test]
    fn spec_uses_standard_labels() {
        let store = SeriesStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60))
            .with_metric_label("temperature");
        let spec = store.spec_for(&key("Oslo"));
        assert_eq!(spec.labels.get("entity"), Some("oslo"));
        assert_eq!(spec.labels.get("metric"), Some("temperature"));
        assert_eq!(spec.retention_ms(), 60_000);
    }
}
