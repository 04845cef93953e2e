use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::SeriesKey;
use crate::model::sample::Sample;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub key: Option<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub key: SeriesKey,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub points: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub backend: String,
    pub series_count: usize,
    pub sample_count: usize,
    pub oldest_ms: Option<i64>,
    pub newest_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
