//! HTTP boundary: submit, poll and health routes.
//!
//! Every request gets an `x-request-id` (propagated when the client sent one,
//! otherwise a fresh ULID). The same value becomes the job's correlation id and
//! is echoed in the response header.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use errand_core::ErrandError;
use errand_core::app::{App, JobDispatcher, JobStatusService};
use errand_core::domain::{CorrelationId, JobStatus, SubmitOutcome};
use errand_core::ports::IdGenerator;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Instrument;

pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct HttpState {
    dispatcher: Arc<JobDispatcher>,
    status: Arc<JobStatusService>,
}

impl HttpState {
    pub fn new(app: &App) -> Self {
        Self {
            dispatcher: app.dispatcher().clone(),
            status: app.status().clone(),
        }
    }
}

/// Build the router with request-id and request logging middleware.
pub fn router(app: &App, ids: Arc<dyn IdGenerator>) -> Router {
    Router::new()
        .route("/reports", post(submit_report))
        .route("/jobs/{key}", get(poll_job))
        .route("/healthz", get(healthz))
        .with_state(HttpState::new(app))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    X_REQUEST_ID,
                    UlidRequestId { ids },
                ))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(middleware::from_fn(log_requests)),
        )
}

/// Generates request ids through the app's `IdGenerator`.
#[derive(Clone)]
struct UlidRequestId {
    ids: Arc<dyn IdGenerator>,
}

impl MakeRequestId for UlidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(self.ids.correlation_id().as_str())
            .ok()
            .map(RequestId::new)
    }
}

async fn log_requests(req: Request, next: Next) -> Response {
    let request_id = header_str(req.headers(), &X_REQUEST_ID)
        .unwrap_or("-")
        .to_owned();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let started = Instant::now();
    let response = next.run(req).instrument(span.clone()).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms,
            "request completed"
        );
    });
    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Empty body and `null` both mean `{}`.
fn parse_payload(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    match serde_json::from_slice(body).map_err(ApiError::InvalidJson)? {
        Value::Null => Ok(json!({})),
        payload => Ok(payload),
    }
}

async fn submit_report(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = header_str(&headers, &IDEMPOTENCY_KEY).unwrap_or_default();
    if key.is_empty() {
        return Err(ApiError::MissingKey);
    }
    let payload = parse_payload(&body)?;
    let correlation_id = header_str(&headers, &X_REQUEST_ID).map(CorrelationId::new);

    let response = match state.dispatcher.submit(key, payload, correlation_id).await? {
        SubmitOutcome::Cached(result) => (StatusCode::OK, Json(result)).into_response(),
        SubmitOutcome::Inflight { poll } => (
            StatusCode::ACCEPTED,
            Json(json!({"status": "inflight", "poll": poll})),
        )
            .into_response(),
        SubmitOutcome::Accepted { poll, .. } => (
            StatusCode::ACCEPTED,
            Json(json!({"status": "accepted", "poll": poll})),
        )
            .into_response(),
    };
    Ok(response)
}

async fn poll_job(
    State(state): State<HttpState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let response = match state.status.poll(&key).await? {
        JobStatus::Done(result) => (StatusCode::OK, Json(result)).into_response(),
        JobStatus::Failed(record) => (StatusCode::OK, Json(record)).into_response(),
        JobStatus::Inflight { .. } => {
            (StatusCode::ACCEPTED, Json(json!({"status": "inflight"}))).into_response()
        }
        JobStatus::Unknown => {
            (StatusCode::NOT_FOUND, Json(json!({"status": "unknown"}))).into_response()
        }
    };
    Ok(response)
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Idempotency-Key header required")]
    MissingKey,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error(transparent)]
    Errand(#[from] ErrandError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingKey | ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::Errand(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Errand(e) if e.is_infrastructure() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Errand(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({"detail": self.to_string()}))).into_response()
    }
}
