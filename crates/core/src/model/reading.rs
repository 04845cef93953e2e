use serde::{Deserialize, Serialize};

use crate::key::SeriesKey;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub value: f64,
    pub observed_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentReading {
    pub key: SeriesKey,
    pub value: f64,
    pub timestamp_ms: i64,
}
