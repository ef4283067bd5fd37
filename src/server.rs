use crate::app::{DocumentSink, IngestCoordinator};
use crate::constants::{DOCUMENTS_ENDPOINT, DOCUMENT_CREATED, MIN_RETRY_AFTER_SECS};
use crate::domain::DocumentRequest;
use crate::error::{IngestError, StorageError};
use crate::observability::render_metrics;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IngestCoordinator<dyn DocumentSink>>,
    /// Cancelled on shutdown; releases every request still parked at the gate.
    pub shutdown: CancellationToken,
    /// Longest a request may stay parked before giving up.
    pub max_wait: Option<Duration>,
}

/// Maps ingestion failures onto HTTP responses with a JSON body.
pub struct ApiError {
    error: IngestError,
    retry_after: Option<Duration>,
}

impl ApiError {
    /// Time until the gate opens its next window; sent as `Retry-After` on a
    /// timed-out wait.
    pub fn retry_after(mut self, window_remaining: Duration) -> Self {
        self.retry_after = Some(window_remaining);
        self
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Whole seconds, rounded up, never below [`MIN_RETRY_AFTER_SECS`].
pub fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(MIN_RETRY_AFTER_SECS)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            IngestError::Storage(StorageError::Duplicate(_)) => StatusCode::CONFLICT,
            IngestError::Cancelled | IngestError::TimedOut(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.error.to_string() }));

        match self.error {
            IngestError::TimedOut(_) => {
                let secs = retry_after_secs(self.retry_after.unwrap_or_default());
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

/// Health check endpoint, including the gate's current window
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let gate = state.coordinator.gate().snapshot();
    Json(json!({
        "status": "healthy",
        "service": "doc-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "gate": {
            "limit": gate.limit,
            "window_ms": gate.window.as_millis() as u64,
            "admitted_in_window": gate.count,
            "waiting": gate.waiting,
            "windows_started": gate.windows_started,
            "window_remaining_ms": gate.window_remaining.as_millis() as u64,
        }
    }))
}

async fn metrics() -> Response {
    match render_metrics() {
        Some(body) => body.into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Result<&'static str, ApiError> {
    let document = request.into_document(Utc::now());

    let cancel = state.shutdown.clone();
    let max_wait = state.max_wait;
    let interrupt = async move {
        match max_wait {
            Some(limit) => tokio::select! {
                _ = cancel.cancelled() => IngestError::Cancelled,
                _ = tokio::time::sleep(limit) => IngestError::TimedOut(limit),
            },
            None => {
                cancel.cancelled().await;
                IngestError::Cancelled
            }
        }
    };

    state
        .coordinator
        .submit_until(document, interrupt)
        .await
        .map_err(|e| {
            let remaining = state.coordinator.gate().snapshot().window_remaining;
            ApiError::from(e).retry_after(remaining)
        })?;
    Ok(DOCUMENT_CREATED)
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(DOCUMENTS_ENDPOINT, post(create_document))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled.
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server running on http://{}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Documents:    POST http://{}{}", addr, DOCUMENTS_ENDPOINT);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
