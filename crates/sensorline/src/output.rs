use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use sensorline_core::model::reading::CurrentReading;
use sensorline_core::model::sample::Sample;
use sensorline_core::query::{SeriesResponse, StoreStatus};
use sensorline_core::time::from_ms;
use sensorline_live::WindowView;

pub fn print_series_human(v: &SeriesResponse) {
    println!(
        "SERIES {} {} .. {} points={}",
        v.key,
        v.from.to_rfc3339_opts(SecondsFormat::Secs, true),
        v.to.to_rfc3339_opts(SecondsFormat::Secs, true),
        v.points.len()
    );
    for point in &v.points {
        println!("{} {}", fmt_ts(point.timestamp_ms), point.value);
    }
    if let Some(stats) = Stats::of(&v.points) {
        println!("-- {stats} --");
    }
}

pub fn print_current_human(v: &CurrentReading) {
    println!("{} {} {}", fmt_ts(v.timestamp_ms), v.key.cyan(), v.value);
}

pub fn print_status_human(v: &StoreStatus) {
    println!("backend={}", v.backend);
    println!("series={} samples={}", v.series_count, v.sample_count);
    if let Some(oldest) = v.oldest_ms {
        println!("oldest={}", fmt_ts(oldest));
    }
    if let Some(newest) = v.newest_ms {
        println!("newest={}", fmt_ts(newest));
    }
}

pub fn print_view_human(v: &WindowView) {
    let range = humanize_ms(v.range_ms);
    let head = format!("{} last {range}", v.key);
    match v.latest() {
        None => println!("{} {}", head.cyan(), "awaiting data".bright_black()),
        Some(latest) => {
            let stats = Stats::of(&v.points).map(|s| s.to_string()).unwrap_or_default();
            println!(
                "{} {} @ {} | {stats}",
                head.cyan(),
                latest.value.green(),
                fmt_ts(latest.timestamp_ms)
            );
        }
    }
    if let Some(err) = &v.error {
        println!("{} {err}", "history:".red());
    }
}

fn fmt_ts(ms: i64) -> String {
    match from_ms(ms) {
        Ok(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(_) => ms.to_string(),
    }
}

fn humanize_ms(ms: i64) -> String {
    const UNITS: [(i64, &str); 4] = [
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
    ];
    for (size, suffix) in UNITS {
        if ms >= size && ms % size == 0 {
            return format!("{}{suffix}", ms / size);
        }
    }
    format!("{ms}ms")
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Stats {
    count: usize,
    min: f64,
    max: f64,
    mean: f64,
}

impl Stats {
    fn of(points: &[Sample]) -> Option<Self> {
        let first = points.first()?;
        let (min, max, sum) = points.iter().fold(
            (first.value, first.value, 0.0),
            |(min, max, sum), p| (min.min(p.value), max.max(p.value), sum + p.value),
        );
        Some(Self {
            count: points.len(),
            min,
            max,
            mean: sum / points.len() as f64,
        })
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} min={} max={} mean={:.2}",
            self.count, self.min, self.max, self.mean
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_points() {
        let points = [Sample::new(1, 25.0), Sample::new(2, 30.0), Sample::new(3, 26.0)];
        let stats = Stats::of(&points).unwrap();
        assert_eq!(stats.min, 25.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.to_string(), "n=3 min=25 max=30 mean=27.00");
        assert!(Stats::of(&[]).is_none());
    }

    #[test]
    fn ranges_render_in_their_largest_unit() {
        assert_eq!(humanize_ms(3_600_000), "1h");
        assert_eq!(humanize_ms(6 * 3_600_000), "6h");
        assert_eq!(humanize_ms(86_400_000), "1d");
        assert_eq!(humanize_ms(90_000), "90s");
        assert_eq!(humanize_ms(1_500), "1500ms");
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(fmt_ts(0), "1970-01-01T00:00:00.000Z");
    }
}
