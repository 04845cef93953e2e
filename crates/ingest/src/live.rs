use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::BoxStream;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct LiveHub {
    topics: Arc<Mutex<HashMap<SeriesKey, broadcast::Sender<Sample>>>>,
    capacity: usize,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<SeriesKey, broadcast::Sender<Sample>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, key: &SeriesKey) -> LiveSubscription {
        let rx = self
            .topics()
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        debug!(series = %key, "live subscriber attached");
        LiveSubscription {
            key: key.clone(),
            rx,
        }
    }

    pub fn publish(&self, key: &SeriesKey, sample: Sample) -> usize {
        let mut topics = self.topics();
        let Some(tx) = topics.get(key) else {
            return 0;
        };
        match tx.send(sample) {
            Ok(n) => n,
            Err(_) => {
                topics.remove(key);
                0
            }
        }
    }

    pub fn subscriber_count(&self, key: &SeriesKey) -> usize {
        self.topics()
            .get(key)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }
}

pub struct LiveSubscription {
    key: SeriesKey,
    rx: broadcast::Receiver<Sample>,
}

impl LiveSubscription {
    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<Sample> {
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Some(sample),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(series = %self.key, skipped, "live subscriber lagged, dropped oldest samples");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Sample> {
        let key = self.key;
        Box::pin(BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(sample) => Some(sample),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(series = %key, skipped, "live stream lagged, dropped oldest samples");
                None
            }
        }))
    }

    pub fn unsubscribe(self) {
        debug!(series = %self.key, "live subscriber detached");
    }
}
