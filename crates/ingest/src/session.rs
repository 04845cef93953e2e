use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use tracing::info;
use uuid::Uuid;

use crate::ingestion::{IngestionHandle, IngestionLoop};
use crate::live::LiveSubscription;

pub struct LiveSession {
    id: Uuid,
    ingestion: IngestionLoop,
    handle: Option<IngestionHandle>,
    subscription: Option<LiveSubscription>,
}

impl LiveSession {
    pub fn open(ingestion: &IngestionLoop, key: SeriesKey) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            ingestion: ingestion.clone(),
            handle: None,
            subscription: None,
        };
        session.attach(key);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> Option<&SeriesKey> {
        self.handle.as_ref().map(IngestionHandle::key)
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn switch_key(&mut self, key: SeriesKey) {
        if self.key() == Some(&key) {
            return;
        }
        self.detach().await;
        self.attach(key);
    }

    pub async fn recv(&mut self) -> Option<Sample> {
        match self.subscription.as_mut() {
            Some(sub) => sub.recv().await,
            None => None,
        }
    }

    pub async fn close(mut self) {
        self.detach().await;
        info!(session = %self.id, "live session closed");
    }

    fn attach(&mut self, key: SeriesKey) {
        // Subscribe before the first tick so it is not missed.
        self.subscription = Some(self.ingestion.hub().subscribe(&key));
        info!(session = %self.id, series = %key, "live session attached");
        self.handle = Some(self.ingestion.spawn(key));
    }

    async fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().await;
        }
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }
}
