pub mod backend;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_ingest::Clock;
use sensorline_store::{MemoryBackend, SeriesStore};

pub use backend::{Fault, FaultyBackend, Op};
pub use source::{ScriptedSource, Step};

pub const DAY: Duration = Duration::from_secs(86_400);

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

pub fn base_ms() -> i64 {
    base_time().timestamp_millis()
}

pub fn key(raw: &str) -> SeriesKey {
    SeriesKey::parse(raw).unwrap()
}

pub fn sample_day() -> Vec<Sample> {
    (0..24)
        .map(|hour| Sample::new(base_ms() + hour * 3_600_000, 25.0 + (hour % 6) as f64))
        .collect()
}

pub fn memory_store() -> SeriesStore {
    SeriesStore::new(Arc::new(MemoryBackend::new()), DAY)
}

pub fn tokio_clock() -> Clock {
    let start = tokio::time::Instant::now();
    let base = base_ms();
    Arc::new(move || base + start.elapsed().as_millis() as i64)
}

