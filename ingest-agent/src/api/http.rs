//! HTTP surface consumed by the dashboard.
//!
//! Endpoints (mounted at `/` and again under `/api`):
//!
//! - `GET /readings?limit=N`: most recent readings first
//! - `GET /last`            : latest reading, or `null` when empty
//! - `GET /health`          : bus link state and cache occupancy

use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::watch};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::api::query::{DecodeError, Latest, QueryService};
use crate::comms::LinkState;
use crate::db::StorageError;

/// Comma-separated ids of rows left out of a `/readings` response.
pub const SKIPPED_HEADER: HeaderName = HeaderName::from_static("x-skipped-readings");

#[derive(Clone)]
pub struct ApiState {
    query:         QueryService,
    default_limit: i64,
    link:          watch::Receiver<LinkState>,
}

impl ApiState {
    pub fn new(query: QueryService, default_limit: i64, link: watch::Receiver<LinkState>) -> Self {
        Self { query, default_limit, link }
    }
}

pub fn router(state: ApiState) -> Router {
    let routes = Router::new()
        .route("/readings", get(handle_readings))
        .route("/last", get(handle_last))
        .route("/health", get(handle_health));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` fires; in-flight requests are allowed to finish.
pub async fn serve(listener: TcpListener, state: ApiState, shutdown: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Query API listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

enum ApiError {
    BadRequest(String),
    Undecodable(DecodeError),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Undecodable(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "payload decode error", "id": e.id, "detail": e.source.to_string() }),
            ),
            ApiError::Storage(e) => {
                log::error!("Query failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": format!("storage failure: {e}") }))
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ReadingsParams {
    limit: Option<String>,
}

async fn handle_readings(
    State(state): State<ApiState>,
    Query(params): Query<ReadingsParams>,
) -> Result<Response, ApiError> {
    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => state.default_limit,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest(format!("invalid limit '{raw}'")))?,
    };

    let recent = state.query.get_recent(limit).await?;
    let skipped = recent.skipped_ids();
    log::debug!("GET /readings limit={} -> {} row(s), {} skipped", limit, recent.readings.len(), skipped.len());

    let mut resp = Json(recent.readings).into_response();
    if !skipped.is_empty() {
        let ids = skipped.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        if let Ok(value) = HeaderValue::from_str(&ids) {
            resp.headers_mut().insert(SKIPPED_HEADER, value);
        }
    }
    Ok(resp)
}

async fn handle_last(State(state): State<ApiState>) -> Result<Response, ApiError> {
    match state.query.get_latest().await? {
        Latest::Empty => Ok(Json(Value::Null).into_response()),
        Latest::Reading(view) => Ok(Json(view).into_response()),
        Latest::Undecodable(e) => Err(ApiError::Undecodable(e)),
    }
}

async fn handle_health(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let summary = state.query.summary().await?;
    let link = *state.link.borrow();
    Ok(Json(json!({
        "status":    "ok",
        "bus":       link.as_str(),
        "count":     summary.count,
        "capacity":  summary.capacity,
        "oldest_ts": summary.oldest_ts,
        "newest_ts": summary.newest_ts,
    }))
    .into_response())
}
