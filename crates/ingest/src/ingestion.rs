use std::sync::Arc;
use std::time::Duration;

use sensorline_core::config::Config;
use sensorline_core::error::{Result, SensorlineError};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::reading::Reading;
use sensorline_core::model::sample::Sample;
use sensorline_core::time::now_ms;
use sensorline_store::SeriesStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::live::LiveHub;
use crate::source::SampleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionConfig {
    pub interval: Duration,
    pub read_timeout: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            read_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&Config> for IngestionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            interval: cfg.tick_interval,
            read_timeout: cfg.read_timeout,
        }
    }
}

pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Clone)]
pub struct IngestionLoop {
    store: SeriesStore,
    source: Arc<dyn SampleSource>,
    hub: LiveHub,
    config: IngestionConfig,
    clock: Clock,
}

impl IngestionLoop {
    pub fn new(
        store: SeriesStore,
        source: Arc<dyn SampleSource>,
        hub: LiveHub,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            source,
            hub,
            config,
            clock: Arc::new(now_ms),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn hub(&self) -> &LiveHub {
        &self.hub
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn config(&self) -> IngestionConfig {
        self.config
    }

    pub fn spawn(&self, key: SeriesKey) -> IngestionHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.clone().run(key.clone(), stop_rx));
        IngestionHandle {
            key,
            stop_tx,
            task: Some(task),
        }
    }

    pub async fn sample_now(&self, key: &SeriesKey) -> Result<Sample> {
        let reading = self.read(key).await?;
        self.commit(key, reading)
    }

    async fn read(&self, key: &SeriesKey) -> Result<Reading> {
        match tokio::time::timeout(self.config.read_timeout, self.source.read_current(key)).await {
            Ok(reading) => reading,
            Err(_) => Err(SensorlineError::Timeout(format!(
                "read of {key} exceeded {}ms",
                self.config.read_timeout.as_millis()
            ))),
        }
    }

    fn commit(&self, key: &SeriesKey, reading: Reading) -> Result<Sample> {
        let sample = Sample::new((self.clock)(), reading.value);
        self.store.append(key, sample.timestamp_ms, sample.value)?;
        let delivered = self.hub.publish(key, sample);
        debug!(
            series = %key,
            ts = sample.timestamp_ms,
            value = sample.value,
            delivered,
            "sample ingested"
        );
        Ok(sample)
    }

    async fn run(self, key: SeriesKey, mut stop_rx: watch::Receiver<bool>) {
        info!(
            series = %key,
            interval_ms = self.config.interval.as_millis() as u64,
            "ingestion loop started"
        );
        loop {
            let read = self.read(&key).await;
            if *stop_rx.borrow() {
                debug!(series = %key, "discarding read that finished after stop");
                break;
            }
            match read {
                Ok(reading) => {
                    if let Err(e) = self.commit(&key, reading) {
                        warn!(series = %key, error = %e, "failed to store sample");
                    }
                }
                Err(e) => warn!(series = %key, error = %e, "skipping ingestion tick"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = stop_rx.changed() => break,
            }
        }
        info!(series = %key, "ingestion loop stopped");
    }
}

pub struct IngestionHandle {
    key: SeriesKey,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl IngestionHandle {
    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn stop(mut self) {
        self.stop_tx.send_replace(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(series = %self.key, error = %e, "ingestion task ended abnormally");
        }
    }
}

impl Drop for IngestionHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}
