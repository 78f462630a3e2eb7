//! HTTP surface: `POST /feedback`, `GET /health`

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use contracts::RawFeedback;

use crate::endpoint::FeedbackEndpoint;
use crate::error::EndpointError;

/// Number of tolerated sink failures on a successful response
pub const WARNINGS_HEADER: HeaderName = HeaderName::from_static("x-feedback-warnings");

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub endpoint: Arc<FeedbackEndpoint>,
}

impl AppState {
    pub fn new(endpoint: Arc<FeedbackEndpoint>) -> Self {
        Self { endpoint }
    }
}

/// Build application router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/feedback", post(submit_feedback))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// POST /feedback
///
/// Form-encoded body. Answers `ok` as text/plain, or a 400/401 with the reason.
async fn submit_feedback(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return EndpointError::unknown(&rejection).into_response(),
    };
    let raw = RawFeedback::from_pairs(url::form_urlencoded::parse(&body));
    let client = connect_info.map(|ConnectInfo(addr)| addr);

    // A panic inside the handler still produces a response
    let endpoint = Arc::clone(&state.endpoint);
    let outcome = tokio::spawn(async move { endpoint.handle(raw, client).await }).await;

    match outcome {
        Ok(Ok(accepted)) => {
            let mut response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "ok",
            )
                .into_response();
            if !accepted.warnings.is_empty() {
                response
                    .headers_mut()
                    .insert(WARNINGS_HEADER, HeaderValue::from(accepted.warnings.len()));
            }
            response
        }
        Ok(Err(e)) => e.into_response(),
        Err(join_error) => {
            error!(error = %join_error, "Feedback handler crashed");
            observability::record_feedback_rejected("unknown");
            EndpointError::unknown(&join_error).into_response()
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub sinks: Vec<SinkHealth>,
}

#[derive(Debug, Serialize)]
pub struct SinkHealth {
    pub name: String,
    pub running: bool,
    pub writes: u64,
    pub failures: u64,
    /// Failed writes since the last stored record
    pub consecutive_failures: u64,
    /// Unix millis of the last stored record
    pub last_stored_at: Option<i64>,
}

/// GET /health
///
/// `degraded` when any sink worker has stopped or its latest write failed.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let fanout = state.endpoint.fanout();
    let stopped = fanout.stopped_sinks();
    let mut healthy = stopped.is_empty();
    let sinks: Vec<SinkHealth> = fanout
        .metrics()
        .into_iter()
        .map(|(name, snapshot)| {
            healthy &= !snapshot.is_failing();
            SinkHealth {
                running: !stopped.contains(&name.as_str()),
                name,
                writes: snapshot.stored,
                failures: snapshot.failed,
                consecutive_failures: snapshot.consecutive_failures,
                last_stored_at: snapshot.last_stored_at,
            }
        })
        .collect();

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sinks,
    })
}
