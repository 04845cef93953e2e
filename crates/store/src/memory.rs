use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use sensorline_core::error::StoreError;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::model::series::SeriesSpec;
use sensorline_core::query::StoreStatus;

use crate::backend::SeriesBackend;

struct MemorySeries {
    retention_ms: i64,
    points: BTreeMap<i64, f64>,
}

impl MemorySeries {
    fn trim_to_retention(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        let kept = self.points.split_off(&cutoff);
        let removed = self.points.len();
        self.points = kept;
        removed
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    series: Arc<Mutex<HashMap<SeriesKey, MemorySeries>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SeriesKey, MemorySeries>>, StoreError> {
        self.series
            .lock()
            .map_err(|_| StoreError::other("memory store mutex poisoned"))
    }
}

impl SeriesBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create(&self, spec: &SeriesSpec) -> Result<(), StoreError> {
        let mut series = self.lock()?;
        if series.contains_key(&spec.key) {
            return Err(StoreError::already_exists(spec.key.as_str()));
        }
        series.insert(
            spec.key.clone(),
            MemorySeries {
                retention_ms: spec.retention_ms(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn append(&self, key: &SeriesKey, timestamp_ms: i64, value: f64) -> Result<(), StoreError> {
        let mut series = self.lock()?;
        let entry = series
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(key.as_str()))?;
        entry.points.insert(timestamp_ms, value);
        let newest = entry
            .points
            .last_key_value()
            .map_or(timestamp_ms, |(&ts, _)| ts);
        entry.trim_to_retention(newest);
        Ok(())
    }

    fn range(&self, key: &SeriesKey, from_ms: i64, to_ms: i64) -> Result<Vec<Sample>, StoreError> {
        let series = self.lock()?;
        let entry = series
            .get(key)
            .ok_or_else(|| StoreError::not_found(key.as_str()))?;
        if from_ms > to_ms {
            return Ok(Vec::new());
        }
        Ok(entry
            .points
            .range(from_ms..=to_ms)
            .map(|(&ts, &value)| Sample::new(ts, value))
            .collect())
    }

    fn prune_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let mut series = self.lock()?;
        Ok(series
            .values_mut()
            .map(|entry| entry.trim_to_retention(now_ms))
            .sum())
    }

    fn status(&self) -> Result<StoreStatus, StoreError> {
        let series = self.lock()?;
        let sample_count = series.values().map(|s| s.points.len()).sum();
        let oldest_ms = series
            .values()
            .filter_map(|s| s.points.first_key_value().map(|(&ts, _)| ts))
            .min();
        let newest_ms = series
            .values()
            .filter_map(|s| s.points.last_key_value().map(|(&ts, _)| ts))
            .max();
        Ok(StoreStatus {
            backend: self.name().to_string(),
            series_count: series.len(),
            sample_count,
            oldest_ms,
            newest_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sensorline_core::model::series::SeriesLabels;

    use super::*;

    fn create(backend: &MemoryBackend, name: &str, retention: Duration) -> SeriesKey {
        let key = SeriesKey::parse(name).unwrap();
        backend
            .create(&SeriesSpec {
                labels: SeriesLabels::standard(&key, "value"),
                key: key.clone(),
                retention,
            })
            .unwrap();
        key
    }

    #[test]
    fn missing_series_reports_not_found() {
        let backend = MemoryBackend::new();
        let key = SeriesKey::parse("oslo").unwrap();
        assert!(backend.append(&key, 1, 1.0).unwrap_err().is_not_found());
        assert!(backend.range(&key, 0, 1).unwrap_err().is_not_found());
    }

    #[test]
    fn replace_on_duplicate_timestamp() {
        let backend = MemoryBackend::new();
        let key = create(&backend, "oslo", Duration::from_secs(60));
        backend.append(&key, 10, 1.0).unwrap();
        backend.append(&key, 10, 3.0).unwrap();
        assert_eq!(backend.range(&key, 0, 20).unwrap(), vec![Sample::new(10, 3.0)]);
    }

    #[test]
    fn prune_counts_removed_points() {
        let backend = MemoryBackend::new();
        let key = create(&backend, "oslo", Duration::from_secs(1));
        backend.append(&key, 0, 1.0).unwrap();
        backend.append(&key, 500, 2.0).unwrap();
        assert_eq!(backend.prune_expired(1_200).unwrap(), 1);
        assert_eq!(backend.range(&key, 0, 2_000).unwrap(), vec![Sample::new(500, 2.0)]);
        assert_eq!(backend.status().unwrap().series_count, 1);
    }
}
