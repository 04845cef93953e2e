use futures::future::BoxFuture;
use rand::Rng;
use sensorline_core::error::Result;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::reading::Reading;
use sensorline_core::time::now_ms;

pub trait SampleSource: Send + Sync {
    fn read_current(&self, key: &SeriesKey) -> BoxFuture<'static, Result<Reading>>;
}

#[derive(Debug, Clone)]
pub struct RandomSource {
    base: f64,
    spread: u32,
}

impl RandomSource {
    pub fn new(base: f64, spread: u32) -> Self {
        Self { base, spread }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new(25.0, 5)
    }
}

impl SampleSource for RandomSource {
    fn read_current(&self, _key: &SeriesKey) -> BoxFuture<'static, Result<Reading>> {
        let offset = rand::thread_rng().gen_range(0..=self.spread);
        let reading = Reading {
            value: self.base + f64::from(offset),
            observed_at_ms: now_ms(),
        };
        Box::pin(async move { Ok(reading) })
    }
}
