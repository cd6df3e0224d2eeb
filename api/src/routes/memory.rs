use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::routes::sessions::require_owner;
use crate::services::MemoryHit;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/apps/{app_name}/users/{user_id}/memory/search",
        get(search_memory),
    )
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SearchParams {
    /// Substring to look for in archived session text
    pub q: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<MemoryHit>,
}

#[utoipa::path(
    get,
    path = "/apps/{app_name}/users/{user_id}/memory/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching memory records", body = SearchResponse),
        (status = 403, description = "Not the caller's user id", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "memory"
)]
pub async fn search_memory(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id)): Path<(String, Uuid)>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    require_owner(&auth, user_id)?;
    let hits = state.memory.search(&app_name, user_id, &params.q);
    Ok(Json(SearchResponse {
        query: params.q,
        hits,
    }))
}
