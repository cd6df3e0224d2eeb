use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info))
}

// ──────────────────────────────────────────────
// GET /health
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
        (status = 503, description = "Auth storage unreachable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status) = match state.auth.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(err) => {
            tracing::error!(error = ?err, "health check: auth store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

// ──────────────────────────────────────────────
// GET /info
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub model: String,
    /// Configured backend type per service
    #[schema(value_type = Object)]
    pub services: BTreeMap<String, String>,
    pub tool_count: usize,
    pub docs_url: String,
}

#[utoipa::path(
    get,
    path = "/info",
    responses(
        (status = 200, description = "Agent identity and configured backends", body = InfoResponse)
    ),
    tag = "system"
)]
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let services = state
        .services
        .summary()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Json(InfoResponse {
        name: state.settings.agent_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: state.settings.agent_description.clone(),
        model: state.settings.agent_model.clone(),
        services,
        tool_count: state.tools.count(),
        docs_url: "/swagger-ui".to_string(),
    })
}
