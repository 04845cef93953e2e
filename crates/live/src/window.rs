use std::collections::VecDeque;
use std::time::Duration;

use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::time::duration_ms;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct LiveMergeWindow {
    key: SeriesKey,
    range_ms: i64,
    capacity: usize,
    buffer: VecDeque<Sample>,
}

impl LiveMergeWindow {
    pub fn new(key: SeriesKey, range: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            key,
            range_ms: duration_ms(range),
            capacity,
            buffer: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn range_ms(&self) -> i64 {
        self.range_ms
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> impl Iterator<Item = &Sample> {
        self.buffer.iter()
    }

    pub fn select_range(&mut self, range: Duration) {
        self.range_ms = duration_ms(range);
    }

    pub fn reset(&mut self, key: SeriesKey) {
        debug!(from = %self.key, to = %key, dropped = self.buffer.len(), "window reset");
        self.key = key;
        self.buffer.clear();
    }

    pub fn seed(&mut self, snapshot: impl IntoIterator<Item = Sample>) -> usize {
        let mut incoming: Vec<Sample> = snapshot.into_iter().collect();
        incoming.sort_by_key(|s| s.timestamp_ms);

        let mut merged = VecDeque::with_capacity(self.buffer.len() + incoming.len());
        let mut existing = std::mem::take(&mut self.buffer).into_iter().peekable();
        let mut taken = 0;

        for sample in incoming {
            while let Some(current) = existing.next_if(|s| s.timestamp_ms < sample.timestamp_ms) {
                merged.push_back(current);
            }
            if existing
                .peek()
                .is_some_and(|s| s.timestamp_ms == sample.timestamp_ms)
            {
                continue;
            }
            match merged.back_mut() {
                // Duplicate inside the snapshot itself: the later entry wins.
                Some(last) if last.timestamp_ms == sample.timestamp_ms => *last = sample,
                _ => {
                    merged.push_back(sample);
                    taken += 1;
                }
            }
        }
        merged.extend(existing);

        self.buffer = merged;
        self.evict_overflow();
        taken
    }

    pub fn push_live(&mut self, sample: Sample) {
        match self.buffer.back_mut() {
            Some(last) if last.timestamp_ms < sample.timestamp_ms => self.buffer.push_back(sample),
            Some(last) if last.timestamp_ms == sample.timestamp_ms => *last = sample,
            Some(_) => {
                debug!(
                    series = %self.key,
                    ts = sample.timestamp_ms,
                    "live sample out of order"
                );
                match self
                    .buffer
                    .binary_search_by_key(&sample.timestamp_ms, |s| s.timestamp_ms)
                {
                    Ok(idx) => self.buffer[idx] = sample,
                    Err(idx) => self.buffer.insert(idx, sample),
                }
            }
            None => self.buffer.push_back(sample),
        }
        self.evict_overflow();
    }

    pub fn displayed(&self, now_ms: i64) -> Vec<Sample> {
        let cutoff = now_ms.saturating_sub(self.range_ms);
        let start = self.buffer.partition_point(|s| s.timestamp_ms < cutoff);
        self.buffer.range(start..).copied().collect()
    }

    fn evict_overflow(&mut self) {
        let overflow = self.buffer.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.buffer.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(range_ms: u64, capacity: usize) -> LiveMergeWindow {
        LiveMergeWindow::new(
            SeriesKey::parse("singapore").unwrap(),
            Duration::from_millis(range_ms),
            capacity,
        )
    }

    fn timestamps(w: &LiveMergeWindow) -> Vec<i64> {
        w.buffer().map(|s| s.timestamp_ms).collect()
    }

    #[test]
    fn displayed_filters_by_range() {
        let mut w = window(60, DEFAULT_CAPACITY);
        w.seed([Sample::new(0, 1.0), Sample::new(50, 2.0), Sample::new(100, 3.0)]);

        assert_eq!(
            w.displayed(100),
            vec![Sample::new(50, 2.0), Sample::new(100, 3.0)]
        );
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut w = window(u64::MAX / 2, DEFAULT_CAPACITY);
        for ts in 0..=10_000 {
            w.push_live(Sample::new(ts, ts as f64));
        }
        assert_eq!(w.len(), 10_000);
        assert_eq!(w.buffer().next(), Some(&Sample::new(1, 1.0)));
        assert_eq!(w.buffer().last(), Some(&Sample::new(10_000, 10_000.0)));
    }

    #[test]
    fn seed_keeps_live_sample_on_conflict() {
        let mut w = window(1_000, DEFAULT_CAPACITY);
        w.push_live(Sample::new(200, 99.0));

        let taken = w.seed([Sample::new(100, 1.0), Sample::new(200, 2.0), Sample::new(300, 3.0)]);

        assert_eq!(taken, 2);
        assert_eq!(
            w.buffer().copied().collect::<Vec<_>>(),
            vec![Sample::new(100, 1.0), Sample::new(200, 99.0), Sample::new(300, 3.0)]
        );
    }

    #[test]
    fn reseeding_does_not_duplicate() {
        let mut w = window(1_000, DEFAULT_CAPACITY);
        let snapshot = [Sample::new(10, 1.0), Sample::new(20, 2.0)];
        w.seed(snapshot);
        assert_eq!(w.seed(snapshot), 0);
        assert_eq!(timestamps(&w), vec![10, 20]);
    }

    #[test]
    fn seed_sorts_unordered_snapshot() {
        let mut w = window(1_000, DEFAULT_CAPACITY);
        w.seed([Sample::new(30, 3.0), Sample::new(10, 1.0), Sample::new(20, 2.0)]);
        assert_eq!(timestamps(&w), vec![10, 20, 30]);
    }

    #[test]
    fn seed_over_capacity_keeps_newest() {
        let mut w = window(1_000, 3);
        w.seed((0..5).map(|ts| Sample::new(ts, 0.0)));
        assert_eq!(timestamps(&w), vec![2, 3, 4]);
    }

    #[test]
    fn out_of_order_live_sample_is_placed_in_order() {
        let mut w = window(1_000, DEFAULT_CAPACITY);
        w.push_live(Sample::new(100, 1.0));
        w.push_live(Sample::new(300, 3.0));
        w.push_live(Sample::new(200, 2.0));
        w.push_live(Sample::new(300, 4.0));
        assert_eq!(
            w.buffer().copied().collect::<Vec<_>>(),
            vec![Sample::new(100, 1.0), Sample::new(200, 2.0), Sample::new(300, 4.0)]
        );
    }

    #[test]
    fn empty_buffer_yields_empty_view() {
        let mut w = window(1_000, DEFAULT_CAPACITY);
        assert_eq!(w.seed(std::iter::empty()), 0);
        assert!(w.displayed(5_000).is_empty());
    }

    #[test]
    fn reset_discards_buffer() {
        let mut w = window(1_000, DEFAULT_CAPACITY);
        w.push_live(Sample::new(1, 1.0));
        w.reset(SeriesKey::parse("Oslo").unwrap());
        assert!(w.is_empty());
        assert_eq!(w.key().as_str(), "oslo");
    }

    #[test]
    fn widening_range_shows_more_without_mutation() {
        let mut w = window(10, DEFAULT_CAPACITY);
        w.seed([Sample::new(0, 1.0), Sample::new(95, 2.0)]);
        assert_eq!(w.displayed(100).len(), 1);
        w.select_range(Duration::from_millis(200));
        assert_eq!(w.displayed(100).len(), 2);
        assert_eq!(w.len(), 2);
    }
}
