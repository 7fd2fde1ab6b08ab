//! HTTP surface
//!
//! # Endpoints
//!
//! - POST /api/generate - Run one invocation. The owner id comes from
//!   `?id=` (with optional `&web_ids=3,4`), a JSON body
//!   `{ "id": 12, "web_ids": [3] }`, or a raw numeric body
//! - GET /api/quota/:owner_id - Quota report for a profile subject
//! - GET /api/status - Version and tuning

use crate::config::{QuotaConfig, Tuning};
use crate::db::Database;
use crate::handlers::load_quota;
use crate::orchestrator::{GenerateRequest, GenerationReport, Orchestrator};
use crate::quota::QuotaReport;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::errors::{PipelineError, PipelineErrorExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    orchestrator: Arc<Orchestrator>,
    quota: QuotaConfig,
}

impl AppState {
    pub fn new(db: Arc<Database>, orchestrator: Arc<Orchestrator>, quota: QuotaConfig) -> Self {
        Self {
            db,
            orchestrator,
            quota,
        }
    }
}

/// `PipelineError` rendered as `{ error, reason, hint }`
pub struct ApiError(pub PipelineError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::SubjectNotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_input_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Rejected request: {}", self.0);
        }
        let body = json!({
            "error": self.0.to_string(),
            "reason": self.0.reason_code(),
            "hint": self.0.user_hint(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdQuery {
    id: Option<String>,
    /// Comma-separated unit ids
    web_ids: Option<String>,
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidInput(message.into())
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_id_list(items: &[Value]) -> Result<Vec<i64>, PipelineError> {
    items
        .iter()
        .map(parse_id)
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| invalid("web_ids must be a list of integers"))
}

fn parse_csv_ids(csv: &str) -> Result<Vec<i64>, PipelineError> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| invalid(format!("web_ids contains a non-integer: '{}'", s)))
        })
        .collect()
}

/// Build a request from the query string and body.
///
/// Query parameters take precedence; the body may be a JSON object
/// `{ id, web_ids }` or a bare integer.
fn parse_generate_request(query: &IdQuery, body: &str) -> Result<GenerateRequest, PipelineError> {
    let mut owner_id = match query.id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            Some(raw.parse::<i64>().map_err(|_| invalid("id must be an integer"))?)
        }
        _ => None,
    };
    let mut unit_ids = match query.web_ids.as_deref() {
        Some(csv) => Some(parse_csv_ids(csv)?),
        None => None,
    };

    let body = body.trim();
    if !body.is_empty() {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                if owner_id.is_none() {
                    if let Some(raw) = map.get("id") {
                        owner_id =
                            Some(parse_id(raw).ok_or_else(|| invalid("id must be an integer"))?);
                    }
                }
                if unit_ids.is_none() {
                    match map.get("web_ids") {
                        None | Some(Value::Null) => {}
                        Some(Value::Array(items)) => unit_ids = Some(parse_id_list(items)?),
                        Some(_) => return Err(invalid("web_ids must be a list of integers")),
                    }
                }
            }
            Ok(value) if owner_id.is_none() => owner_id = parse_id(&value),
            _ => {}
        }
    }

    let owner_id = owner_id.ok_or_else(|| {
        invalid("missing or invalid id; provide JSON { id }, ?id= or a raw numeric body")
    })?;
    let mut request = GenerateRequest::new(owner_id);
    if let Some(ids) = unit_ids.filter(|ids| !ids.is_empty()) {
        request = request.with_units(ids);
    }
    Ok(request)
}

async fn generate_handler(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
    body: String,
) -> Result<Json<GenerationReport>, ApiError> {
    let request = parse_generate_request(&query, &body)?;
    let report = state.orchestrator.generate(&request).await?;
    Ok(Json(report))
}

async fn quota_handler(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<QuotaReport>, ApiError> {
    let owner_id: i64 = owner_id
        .trim()
        .parse()
        .map_err(|_| invalid("owner id must be an integer"))?;
    let report = load_quota(&state.db, owner_id, &state.quota).await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    commit: &'static str,
    tuning: Tuning,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_HASH"),
        tuning: state.orchestrator.tuning(),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/api/quota/:owner_id", get(quota_handler))
        .route("/api/status", get(status_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
