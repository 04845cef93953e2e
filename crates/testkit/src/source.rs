use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use sensorline_core::error::{Result, SensorlineError};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::reading::Reading;
use sensorline_ingest::SampleSource;

#[derive(Debug, Clone)]
pub enum Step {
    Value(f64),
    Delayed(Duration, f64),
    Fail(String),
    Hang,
}

pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    fallback: f64,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: 25.0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::new([]).with_fallback(value)
    }

    pub fn with_fallback(mut self, value: f64) -> Self {
        self.fallback = value;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SampleSource for ScriptedSource {
    fn read_current(&self, _key: &SeriesKey) -> BoxFuture<'static, Result<Reading>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Value(self.fallback));
        let reading = |value| Reading {
            value,
            observed_at_ms: 0,
        };
        match step {
            Step::Value(value) => Box::pin(async move { Ok(reading(value)) }),
            Step::Delayed(delay, value) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(reading(value))
            }),
            Step::Fail(message) => {
                Box::pin(async move { Err::<Reading, _>(SensorlineError::Source(message)) })
            }
            Step::Hang => Box::pin(futures::future::pending::<Result<Reading>>()),
        }
    }
}
