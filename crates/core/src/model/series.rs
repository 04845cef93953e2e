use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::key::SeriesKey;
use crate::model::sample::Sample;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesLabels(Vec<(String, String)>);

impl SeriesLabels {
    pub fn standard(key: &SeriesKey, metric: &str) -> Self {
        Self(vec![
            ("entity".to_string(), key.as_str().to_string()),
            ("metric".to_string(), metric.to_string()),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_json(&self) -> String {
        let map = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub key: SeriesKey,
    pub retention: Duration,
    pub labels: SeriesLabels,
}

impl SeriesSpec {
    pub fn retention_ms(&self) -> i64 {
        i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRange {
    pub series_key: SeriesKey,
    pub from_ms: i64,
    pub to_ms: i64,
    pub points: Vec<Sample>,
}

impl SeriesRange {
    pub fn empty(series_key: SeriesKey, from_ms: i64, to_ms: i64) -> Self {
        Self {
            series_key,
            from_ms,
            to_ms,
            points: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_labels_carry_entity_and_metric() {
        let key = SeriesKey::parse("Singapore").unwrap();
        let labels = SeriesLabels::standard(&key, "value");
        assert_eq!(labels.get("entity"), Some("singapore"));
        assert_eq!(labels.get("metric"), Some("value"));
        assert_eq!(labels.to_json(), r#"{"entity":"singapore","metric":"value"}"#);
    }
}
