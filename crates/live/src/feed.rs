use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use sensorline_core::error::Result;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_ingest::{IngestionLoop, LiveHub, LiveSession};
use sensorline_store::RangeQueryService;

pub trait HistorySource: Send + Sync {
    fn fetch(
        &self,
        key: &SeriesKey,
        from_ms: i64,
        to_ms: i64,
    ) -> BoxFuture<'static, Result<Vec<Sample>>>;
}

pub trait LiveFeed: Send + Sync {
    fn open_stream(&self, key: &SeriesKey) -> BoxStream<'static, Sample>;
}

impl HistorySource for RangeQueryService {
    fn fetch(
        &self,
        key: &SeriesKey,
        from_ms: i64,
        to_ms: i64,
    ) -> BoxFuture<'static, Result<Vec<Sample>>> {
        let result = self.query_ms(key, from_ms, to_ms).map(|range| range.points);
        Box::pin(async move { result })
    }
}

impl LiveFeed for LiveHub {
    fn open_stream(&self, key: &SeriesKey) -> BoxStream<'static, Sample> {
        self.subscribe(key).into_stream()
    }
}

impl LiveFeed for IngestionLoop {
    fn open_stream(&self, key: &SeriesKey) -> BoxStream<'static, Sample> {
        let session = LiveSession::open(self, key.clone());
        futures::stream::unfold(session, |mut session| async move {
            let sample = session.recv().await?;
            Some((sample, session))
        })
        .boxed()
    }
}
