//! Shadow DOM streaming page.
//!
//! The shell declares a shadow root with one named slot per item. Items
//! arrive in random order, each as a light-DOM element targeting its slot,
//! so the browser shows them in index order as they stream in.
//!
//! Routes:
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Stream the page |
//! | GET | `/metrics` | Session counters as JSON |
//!
//! Deployment note: a reverse proxy in front of this route must not buffer
//! responses. The handler sends `x-accel-buffering: no` for nginx; other
//! proxies need the equivalent setting.

mod page;
mod query;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{body::Body, Json, Router};
use edge_sdk::prelude::*;
use futures::TryStreamExt;

pub use page::{page_template, TEMPLATE_NAME};
pub use query::StreamQuery;

/// Workload name used in logs and metrics.
pub const WORKLOAD: &str = "shadow-dom-streaming";

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Shared state for the page handlers.
#[derive(Clone)]
pub struct AppState {
    /// Stream settings used when a request does not override them.
    pub defaults: StreamConfig,
    /// Default execution model.
    pub execution: ExecutionModel,
    /// Upper bound on `n` accepted from a query string.
    pub max_items: usize,
    /// Page title, interpolated with escaping.
    pub title: String,
    /// Process-wide session counters.
    pub counters: Arc<StreamCounters>,
    /// How each session's structured log entries are rendered.
    pub log_format: LogFormat,
    /// Minimum level for session log entries.
    pub log_level: LogLevel,
}

impl AppState {
    /// Create state with the given defaults.
    pub fn new(defaults: StreamConfig) -> Self {
        Self {
            defaults,
            execution: ExecutionModel::Cooperative,
            max_items: 1000,
            title: "Shadow DOM streaming".to_string(),
            counters: Arc::new(StreamCounters::new()),
            log_format: LogFormat::Json,
            log_level: LogLevel::Info,
        }
    }

    /// Set the default execution model.
    pub fn with_execution(mut self, execution: ExecutionModel) -> Self {
        self.execution = execution;
        self
    }

    /// Set the query-string bound on `n`.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Set the page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set session log format and level.
    pub fn with_logging(mut self, format: LogFormat, level: LogLevel) -> Self {
        self.log_format = format;
        self.log_level = level;
        self
    }

    /// Build a session for the page with the given resolved settings.
    pub fn session(
        &self,
        config: StreamConfig,
        execution: ExecutionModel,
        request_id: RequestId,
    ) -> Result<StreamSession, StreamError> {
        let template = Arc::new(page_template(config.items));
        StreamSession::builder(template, config)
            .execution(execution)
            .request_id(request_id)
            .workload(WORKLOAD)
            .route("/")
            .observer(self.counters.clone())
            .text("title", self.title.clone())
            .log_format(self.log_format)
            .log_level(self.log_level)
            .build()
    }
}

/// Build the workload router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(stream_page))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// GET /
async fn stream_page(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = headers
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(RequestId::from_string)
        .unwrap_or_else(RequestId::generate);

    let (config, execution) =
        match query.resolve(&state.defaults, state.execution, state.max_items) {
            Ok(resolved) => resolved,
            Err(e) => return error_response(&e, StatusCode::BAD_REQUEST),
        };

    let body = match state
        .session(config, execution, request_id.clone())
        .and_then(StreamSession::into_body)
    {
        Ok((_, body)) => body,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "failed to start session");
            return error_response(&e, StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    // Headers are committed here; nothing after the first chunk can change
    // the status.
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(ACCEL_BUFFERING, HeaderValue::from_static("no"));
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response_headers.insert(REQUEST_ID, value);
    }

    let body = Body::from_stream(body.map_ok(Chunk::into_bytes));
    (response_headers, body).into_response()
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.counters.snapshot())
}

fn error_response(err: &StreamError, status: StatusCode) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        err.to_string(),
    )
        .into_response()
}
