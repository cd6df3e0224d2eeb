use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::routing::{any, get};
use axum::{Json, Router};

use crate::error::AppError;
use crate::state::AppState;
use crate::tools::registry::SpecSource;
use crate::tools::{ToolRequest, ToolSummary};

/// Upper bound on proxied request bodies.
const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tool-specs/{name}", get(tool_spec))
        .route("/tools/{name}", any(dispatch_root))
        .route("/tools/{name}/{*path}", any(dispatch_path))
}

// ──────────────────────────────────────────────
// GET /tools
// ──────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/tools",
    responses(
        (status = 200, description = "Registered tools, including disabled ones", body = [ToolSummary])
    ),
    tag = "tools"
)]
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolSummary>> {
    Json(state.tools.list())
}

// ──────────────────────────────────────────────
// GET /tool-specs/{name}
// ──────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/tool-specs/{name}",
    responses(
        (status = 200, description = "The tool's OpenAPI document"),
        (status = 404, description = "Unknown tool or no document", body = relay_core::error::ApiError),
        (status = 502, description = "Upstream document unavailable", body = relay_core::error::ApiError)
    ),
    tag = "tools"
)]
pub async fn tool_spec(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ttl = Duration::from_secs(state.settings.spec_cache_ttl_secs);
    let spec = match state.tools.spec_source(&name)? {
        SpecSource::Configured(source) => state.spec_cache.load(&source, ttl).await?,
        SpecSource::Upstream(handler) => handler.fetch_openapi_spec().await?,
    };
    Ok(Json(spec))
}

// ──────────────────────────────────────────────
// ANY /tools/{name}[/{*path}]
// ──────────────────────────────────────────────
// The dispatch surface is dynamic (one wildcard per registered tool), so
// it is not enumerated in the OpenAPI document.

pub async fn dispatch_root(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    dispatch(state, name, String::new(), req).await
}

pub async fn dispatch_path(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    req: Request,
) -> Result<Response, AppError> {
    dispatch(state, name, path, req).await
}

async fn dispatch(
    state: AppState,
    name: String,
    path: String,
    req: Request,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| AppError::Validation {
            message: format!("could not read request body: {e}"),
            field: None,
            received: None,
            docs_hint: Some(format!(
                "Request bodies are limited to {} bytes.",
                MAX_PROXY_BODY
            )),
        })?;

    let tool_req = ToolRequest {
        method: parts.method,
        path,
        raw_query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body: bytes,
    };
    state.tools.dispatch(&name, tool_req).await
}
