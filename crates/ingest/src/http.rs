use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::Stream;
use sensorline_core::error::{Result, SensorlineError, StoreErrorKind};
use sensorline_core::model::reading::CurrentReading;
use sensorline_core::query::{ErrorBody, SeriesRequest, SeriesResponse, StoreStatus};
use sensorline_core::time::resolve_instant;
use sensorline_store::RangeQueryService;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::ingestion::IngestionLoop;
use crate::session::LiveSession;

#[derive(Clone)]
pub struct HttpState {
    pub queries: RangeQueryService,
    pub ingestion: IngestionLoop,
}

pub fn router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/v1/series", get(get_series))
        .route("/v1/current", get(get_current))
        .route("/v1/live", get(get_live))
        .route("/v1/status", get(get_status))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn serve(state: HttpState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SensorlineError::Io(format!("bind http listener {addr}: {e}")))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| SensorlineError::Io(format!("http server failed: {e}")))
}

pub struct ApiError(SensorlineError);

impl From<SensorlineError> for ApiError {
    fn from(err: SensorlineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            SensorlineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SensorlineError::Store(e) if e.kind == StoreErrorKind::Transient => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
    pub key: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeyParams {
    pub key: Option<String>,
}

async fn get_series(
    State(state): State<HttpState>,
    Query(params): Query<SeriesParams>,
) -> std::result::Result<Json<SeriesResponse>, ApiError> {
    let now = chrono::Utc::now();
    let from = required_time(params.from.as_deref(), "from", now)?;
    let to = required_time(params.to.as_deref(), "to", now)?;
    let resp = state.queries.query(&SeriesRequest {
        key: params.key,
        from,
        to,
    })?;
    tracing::debug!(series = %resp.key, points = resp.points.len(), "series query served");
    Ok(Json(resp))
}

async fn get_current(
    State(state): State<HttpState>,
    Query(params): Query<KeyParams>,
) -> std::result::Result<Json<CurrentReading>, ApiError> {
    let key = state.queries.resolve_key(params.key.as_deref())?;
    let sample = state.ingestion.sample_now(&key).await?;
    Ok(Json(CurrentReading {
        key,
        value: sample.value,
        timestamp_ms: sample.timestamp_ms,
    }))
}

async fn get_live(
    State(state): State<HttpState>,
    Query(params): Query<KeyParams>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    let key = state.queries.resolve_key(params.key.as_deref())?;
    let mut session = LiveSession::open(&state.ingestion, key);
    let stream = async_stream::stream! {
        while let Some(sample) = session.recv().await {
            match Event::default().json_data(sample) {
                Ok(event) => yield Ok(event),
                Err(e) => tracing::warn!(error = %e, "failed to encode live sample"),
            }
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn get_status(
    State(state): State<HttpState>,
) -> std::result::Result<Json<StoreStatus>, ApiError> {
    Ok(Json(state.queries.store().status()?))
}

fn required_time(
    value: Option<&str>,
    name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<chrono::DateTime<chrono::Utc>> {
    let Some(raw) = value else {
        return Err(SensorlineError::InvalidArgument(format!(
            "missing query parameter `{name}`"
        )));
    };
    resolve_instant(raw, now)
}
