use anyhow::Context;
use chrono::SecondsFormat;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use sensorline_core::error::{Result as CoreResult, SensorlineError};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::reading::CurrentReading;
use sensorline_core::model::sample::Sample;
use sensorline_core::query::{ErrorBody, SeriesResponse, StoreStatus};
use sensorline_core::time::from_ms;
use sensorline_live::{HistorySource, LiveFeed};
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(addr: &str) -> Self {
        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{addr}")
        };
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub async fn series(
        &self,
        key: Option<&str>,
        from: &str,
        to: &str,
    ) -> anyhow::Result<SeriesResponse> {
        let mut query = vec![("from", from), ("to", to)];
        if let Some(key) = key {
            query.push(("key", key));
        }
        self.get_json("/v1/series", &query).await
    }

    pub async fn current(&self, key: Option<&str>) -> anyhow::Result<CurrentReading> {
        let query: Vec<(&str, &str)> = key.map(|k| ("key", k)).into_iter().collect();
        self.get_json("/v1/current", &query).await
    }

    pub async fn status(&self) -> anyhow::Result<StoreStatus> {
        self.get_json("/v1/status", &[]).await
    }

    pub async fn open_live(&self, key: &str) -> anyhow::Result<reqwest::Response> {
        let response = self
            .http
            .get(format!("{}/v1/live", self.base))
            .query(&[("key", key)])
            .send()
            .await
            .context("open live stream")?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .query(query)
            .send()
            .await
            .with_context(|| format!("request {path} from {}", self.base))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("decode {path} response"))
    }
}

async fn check_status(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => "no error body".to_string(),
    };
    anyhow::bail!("server returned {status}: {message}")
}

fn rfc3339(ms: i64) -> CoreResult<String> {
    Ok(from_ms(ms)?.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl HistorySource for ApiClient {
    fn fetch(
        &self,
        key: &SeriesKey,
        from_ms: i64,
        to_ms: i64,
    ) -> BoxFuture<'static, CoreResult<Vec<Sample>>> {
        let client = self.clone();
        let key = key.clone();
        Box::pin(async move {
            let from = rfc3339(from_ms)?;
            let to = rfc3339(to_ms)?;
            client
                .series(Some(key.as_str()), &from, &to)
                .await
                .map(|resp| resp.points)
                .map_err(|e| SensorlineError::Io(format!("{e:#}")))
        })
    }
}

impl LiveFeed for ApiClient {
    fn open_stream(&self, key: &SeriesKey) -> BoxStream<'static, Sample> {
        let client = self.clone();
        let key = key.clone();
        async_stream::stream! {
            let mut response = match client.open_live(key.as_str()).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        series = %key,
                        error = %format!("{err:#}"),
                        "live stream unavailable"
                    );
                    return;
                }
            };
            let mut frames = SseFrames::default();
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        for sample in frames.push(&chunk) {
                            yield sample;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(series = %key, error = %err, "live stream interrupted");
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}

#[derive(Debug, Default)]
struct SseFrames {
    buffer: String,
}

impl SseFrames {
    fn push(&mut self, chunk: &[u8]) -> Vec<Sample> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut samples = Vec::new();
        while let Some(frame_end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..frame_end + 2).collect();
            for line in frame.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                match serde_json::from_str::<Sample>(data.trim_start()) {
                    Ok(sample) => samples.push(sample),
                    Err(err) => tracing::debug!(error = %err, "skipping undecodable live frame"),
                }
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_a_scheme() {
        assert_eq!(ApiClient::new("127.0.0.1:3001").base, "http://127.0.0.1:3001");
        assert_eq!(ApiClient::new("https://sensors.local/").base, "https://sensors.local");
    }

    #[test]
    fn frames_split_across_chunks_are_joined() {
        let mut frames = SseFrames::default();
        assert!(frames.push(b"data: {\"timestampMs\":1,").is_empty());
        let samples = frames.push(
            b"\"value\":2.0}\n\n:keep-alive\n\ndata:{\"timestampMs\":3,\"value\":4.0}\n\n",
        );
        assert_eq!(samples, vec![Sample::new(1, 2.0), Sample::new(3, 4.0)]);
        assert!(frames.buffer.is_empty());
    }

    #[test]
    fn garbage_frames_are_skipped() {
        let mut frames = SseFrames::default();
        assert!(frames.push(b"data: not json\n\n").is_empty());
    }

    #[test]
    fn history_bounds_are_rfc3339() {
        assert_eq!(rfc3339(0).unwrap(), "1970-01-01T00:00:00.000Z");
    }
}
