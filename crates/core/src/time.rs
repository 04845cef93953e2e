use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, SensorlineError};

pub fn resolve_instant(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    let ago = parse_duration_str(input).map_err(|_| {
        SensorlineError::Parse(format!("expected RFC3339 time or duration ago, got `{input}`"))
    })?;
    chrono::Duration::from_std(ago)
        .ok()
        .and_then(|ago| now.checked_sub_signed(ago))
        .ok_or_else(|| SensorlineError::Parse(format!("`{input}` ago is out of range")))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| SensorlineError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

pub fn from_ms(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| SensorlineError::Parse(format!("timestamp out of range: {ms}")))
}
