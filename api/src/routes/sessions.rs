use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::services::{Session, SessionEvent};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/apps/{app_name}/users/{user_id}/sessions",
            post(create_session).get(list_sessions),
        )
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/events",
            post(append_event),
        )
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/archive",
            post(archive_session),
        )
}

/// Sessions and artifacts are user-scoped: the path's user_id must be the
/// caller's own id.
pub fn require_owner(auth: &AuthenticatedUser, user_id: Uuid) -> Result<(), AppError> {
    if auth.user_id() != user_id {
        return Err(AppError::Forbidden {
            message: "You can only access your own resources".to_string(),
            docs_hint: Some("Use your own user id in the path.".to_string()),
        });
    }
    Ok(())
}

fn session_not_found(session_id: Uuid) -> AppError {
    AppError::NotFound {
        message: format!("Session '{session_id}' does not exist in this scope"),
        docs_hint: Some("List sessions via GET /apps/{app_name}/users/{user_id}/sessions".to_string()),
    }
}

// ──────────────────────────────────────────────
// POST /apps/{app_name}/users/{user_id}/sessions
// ──────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/apps/{app_name}/users/{user_id}/sessions",
    responses(
        (status = 201, description = "Session created", body = Session),
        (status = 403, description = "Not the caller's user id", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    require_owner(&auth, user_id)?;
    let session = state.sessions.create(&app_name, user_id).await?;
    tracing::info!(session_id = %session.id, app = %app_name, "session created");
    Ok((StatusCode::CREATED, Json(session)))
}

// ──────────────────────────────────────────────
// GET /apps/{app_name}/users/{user_id}/sessions
// ──────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/apps/{app_name}/users/{user_id}/sessions",
    responses(
        (status = 200, description = "Sessions in creation order", body = [Session])
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<Session>>, AppError> {
    require_owner(&auth, user_id)?;
    Ok(Json(state.sessions.list(&app_name, user_id).await?))
}

// ──────────────────────────────────────────────
// GET /apps/{app_name}/users/{user_id}/sessions/{session_id}
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionWithEvents {
    #[serde(flatten)]
    pub session: Session,
    pub events: Vec<SessionEvent>,
}

#[utoipa::path(
    get,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}",
    responses(
        (status = 200, description = "Session with its events", body = SessionWithEvents),
        (status = 404, description = "No such session in this scope", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id)): Path<(String, Uuid, Uuid)>,
) -> Result<Json<SessionWithEvents>, AppError> {
    require_owner(&auth, user_id)?;
    let session = state
        .sessions
        .get(&app_name, user_id, session_id)
        .await?
        .ok_or_else(|| session_not_found(session_id))?;
    let events = state.sessions.list_events(&app_name, user_id, session_id).await?;
    Ok(Json(SessionWithEvents { session, events }))
}

// ──────────────────────────────────────────────
// DELETE /apps/{app_name}/users/{user_id}/sessions/{session_id}
// ──────────────────────────────────────────────

#[utoipa::path(
    delete,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}",
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "No such session in this scope", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id)): Path<(String, Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_owner(&auth, user_id)?;
    if !state.sessions.delete(&app_name, user_id, session_id).await? {
        return Err(session_not_found(session_id));
    }
    tracing::info!(session_id = %session_id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ──────────────────────────────────────────────
// POST /apps/{app_name}/users/{user_id}/sessions/{session_id}/events
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AppendEventRequest {
    /// Who produced the event ("user", "agent", a tool name, ...)
    pub author: String,
    /// Arbitrary event payload
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
}

#[utoipa::path(
    post,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}/events",
    request_body = AppendEventRequest,
    responses(
        (status = 201, description = "Event appended", body = SessionEvent),
        (status = 404, description = "No such session in this scope", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn append_event(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<AppendEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_owner(&auth, user_id)?;
    if req.author.trim().is_empty() {
        return Err(AppError::Validation {
            message: "author must not be empty".to_string(),
            field: Some("author".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    let event = state
        .sessions
        .append_event(&app_name, user_id, session_id, &req.author, req.content)
        .await?
        .ok_or_else(|| session_not_found(session_id))?;
    Ok((StatusCode::CREATED, Json(event)))
}

// ──────────────────────────────────────────────
// POST /apps/{app_name}/users/{user_id}/sessions/{session_id}/archive
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ArchiveResponse {
    pub session_id: Uuid,
    /// Number of events turned into memory records
    pub records_ingested: usize,
}

/// Copy the session's events into the memory service so they become
/// searchable. The session itself stays untouched.
#[utoipa::path(
    post,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}/archive",
    responses(
        (status = 200, description = "Session archived to memory", body = ArchiveResponse),
        (status = 404, description = "No such session in this scope", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn archive_session(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id)): Path<(String, Uuid, Uuid)>,
) -> Result<Json<ArchiveResponse>, AppError> {
    require_owner(&auth, user_id)?;
    let session = state
        .sessions
        .get(&app_name, user_id, session_id)
        .await?
        .ok_or_else(|| session_not_found(session_id))?;
    let events = state.sessions.list_events(&app_name, user_id, session_id).await?;
    let records_ingested = state.memory.ingest(&session, &events);
    Ok(Json(ArchiveResponse {
        session_id,
        records_ingested,
    }))
}
