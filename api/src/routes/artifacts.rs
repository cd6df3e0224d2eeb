use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::routes::sessions::require_owner;
use crate::services::ArtifactScope;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts",
            get(list_artifacts),
        )
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/{filename}",
            post(upload_artifact)
                .get(download_artifact)
                .delete(delete_artifact),
        )
}

/// Where an artifact lives. Session artifacts belong to one conversation;
/// user artifacts are shared across all of a user's sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    #[default]
    Session,
    User,
}

const USER_PREFIX: &str = "user:";

/// Resolve the storage scope and key for a filename in a namespace.
/// User-namespace artifacts live under the nil session id so every session
/// of the user sees the same files, and carry a `user:` key prefix.
fn scope_and_key(
    app_name: &str,
    user_id: Uuid,
    session_id: Uuid,
    namespace: Namespace,
    filename: &str,
) -> (ArtifactScope, String) {
    match namespace {
        Namespace::Session => (
            ArtifactScope {
                app_name: app_name.to_string(),
                user_id,
                session_id,
            },
            filename.to_string(),
        ),
        Namespace::User => (
            ArtifactScope {
                app_name: app_name.to_string(),
                user_id,
                session_id: Uuid::nil(),
            },
            format!("{USER_PREFIX}{filename}"),
        ),
    }
}

/// Path segments that become storage keys or directory names must be plain
/// names. Applies to the filename and to `app_name` (which the local folder
/// backend turns into a directory).
fn validate_component(value: &str, field: &'static str) -> Result<(), AppError> {
    let bad = value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..");
    if bad {
        return Err(AppError::Validation {
            message: format!("{field} must be a plain name without path separators"),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(value.to_string())),
            docs_hint: None,
        });
    }
    Ok(())
}

fn artifact_not_found(filename: &str) -> AppError {
    AppError::NotFound {
        message: format!("Artifact '{filename}' does not exist in this scope"),
        docs_hint: Some(
            "List artifacts via GET /apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts"
                .to_string(),
        ),
    }
}

// ──────────────────────────────────────────────
// POST .../artifacts/{filename}
// ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct UploadParams {
    /// "session" (default) or "user"
    #[serde(default)]
    pub namespace: Namespace,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub filename: String,
    pub namespace: Namespace,
    pub version: u32,
    pub mime_type: String,
    pub size: usize,
}

/// Upload raw file bytes as a new artifact version. The MIME type is taken
/// from the Content-Type header, falling back to a guess from the file
/// extension.
#[utoipa::path(
    post,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/{filename}",
    params(UploadParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Artifact version stored", body = UploadResponse),
        (status = 400, description = "Empty body or bad filename", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
pub async fn upload_artifact(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id, filename)): Path<(String, Uuid, Uuid, String)>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    require_owner(&auth, user_id)?;
    validate_component(&app_name, "app_name")?;
    validate_component(&filename, "filename")?;
    if body.is_empty() {
        return Err(AppError::Validation {
            message: "artifact body must not be empty".to_string(),
            field: None,
            received: None,
            docs_hint: Some("Send the file contents as the raw request body.".to_string()),
        });
    }

    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && *v != "application/octet-stream")
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string()
        });

    let (scope, key) = scope_and_key(&app_name, user_id, session_id, params.namespace, &filename);
    let size = body.len();
    let version = state
        .artifacts
        .save(&scope, &key, &mime_type, body.to_vec())
        .await?;

    tracing::info!(artifact = %key, version, size, "artifact stored");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            filename,
            namespace: params.namespace,
            version,
            mime_type,
            size,
        }),
    ))
}

// ──────────────────────────────────────────────
// GET .../artifacts
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ArtifactSummary {
    /// Display name without the namespace prefix
    pub filename: String,
    /// Stored key (user-namespace artifacts carry a `user:` prefix)
    pub artifact_name: String,
    pub namespace: Namespace,
    pub mime_type: String,
    /// Size in bytes of the latest version
    pub size: usize,
    pub version_count: usize,
    pub latest_version: u32,
    /// Versions, newest first
    pub versions: Vec<u32>,
}

#[utoipa::path(
    get,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts",
    responses(
        (status = 200, description = "Session and user artifacts visible here", body = [ArtifactSummary])
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
pub async fn list_artifacts(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id)): Path<(String, Uuid, Uuid)>,
) -> Result<Json<Vec<ArtifactSummary>>, AppError> {
    require_owner(&auth, user_id)?;
    validate_component(&app_name, "app_name")?;

    let mut summaries = Vec::new();
    for namespace in [Namespace::Session, Namespace::User] {
        let (scope, _) = scope_and_key(&app_name, user_id, session_id, namespace, "");
        for key in state.artifacts.list_keys(&scope).await? {
            // A key's prefix must agree with the namespace it was listed from
            let filename = match namespace {
                Namespace::User => match key.strip_prefix(USER_PREFIX) {
                    Some(rest) => rest.to_string(),
                    None => continue,
                },
                Namespace::Session => {
                    if key.starts_with(USER_PREFIX) {
                        continue;
                    }
                    key.clone()
                }
            };
            let mut versions = state.artifacts.list_versions(&scope, &key).await?;
            let Some(artifact) = state.artifacts.load(&scope, &key, None).await? else {
                continue;
            };
            versions.sort_unstable_by(|a, b| b.cmp(a));
            let latest_version = versions.first().copied().unwrap_or(0);
            summaries.push(ArtifactSummary {
                filename,
                artifact_name: key,
                namespace,
                mime_type: artifact.mime_type,
                size: artifact.data.len(),
                version_count: versions.len(),
                latest_version,
                versions,
            });
        }
    }
    Ok(Json(summaries))
}

// ──────────────────────────────────────────────
// GET .../artifacts/{filename}
// ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct DownloadParams {
    /// "session" (default) or "user"
    #[serde(default)]
    pub namespace: Namespace,
    /// Specific version to fetch; latest when omitted
    #[serde(default)]
    pub version: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/{filename}",
    params(DownloadParams),
    responses(
        (status = 200, description = "Artifact bytes as an attachment"),
        (status = 404, description = "No such artifact or version", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
pub async fn download_artifact(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id, filename)): Path<(String, Uuid, Uuid, String)>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, AppError> {
    require_owner(&auth, user_id)?;
    validate_component(&app_name, "app_name")?;
    validate_component(&filename, "filename")?;

    let (scope, key) = scope_and_key(&app_name, user_id, session_id, params.namespace, &filename);
    let artifact = state
        .artifacts
        .load(&scope, &key, params.version)
        .await?
        .ok_or_else(|| artifact_not_found(&filename))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, artifact.mime_type.as_str())
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(axum::body::Body::from(artifact.data))
        .map_err(|e| AppError::Internal(format!("failed to build download response: {e}")))?;
    Ok(response.into_response())
}

// ──────────────────────────────────────────────
// DELETE .../artifacts/{filename}
// ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct DeleteParams {
    /// "session" (default) or "user"
    #[serde(default)]
    pub namespace: Namespace,
}

#[utoipa::path(
    delete,
    path = "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/{filename}",
    params(DeleteParams),
    responses(
        (status = 204, description = "All versions deleted"),
        (status = 404, description = "No such artifact", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
pub async fn delete_artifact(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path((app_name, user_id, session_id, filename)): Path<(String, Uuid, Uuid, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, AppError> {
    require_owner(&auth, user_id)?;
    validate_component(&app_name, "app_name")?;
    validate_component(&filename, "filename")?;

    let (scope, key) = scope_and_key(&app_name, user_id, session_id, params.namespace, &filename);
    if !state.artifacts.delete(&scope, &key).await? {
        return Err(artifact_not_found(&filename));
    }
    tracing::info!(artifact = %key, "artifact deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_components_with_separators_are_rejected() {
        assert!(validate_component("report.pdf", "filename").is_ok());
        assert!(validate_component("notes v2.md", "filename").is_ok());
        assert!(validate_component("", "filename").is_err());
        assert!(validate_component("../etc/passwd", "filename").is_err());
        assert!(validate_component("a/b.txt", "filename").is_err());
        assert!(validate_component("a\\b.txt", "filename").is_err());

        assert!(validate_component("demo", "app_name").is_ok());
        assert!(validate_component("..", "app_name").is_err());
        assert!(validate_component("../escaped", "app_name").is_err());
    }

    #[test]
    fn user_namespace_shares_one_scope_across_sessions() {
        let user = Uuid::now_v7();
        let (scope_a, key_a) =
            scope_and_key("demo", user, Uuid::now_v7(), Namespace::User, "notes.md");
        let (scope_b, key_b) =
            scope_and_key("demo", user, Uuid::now_v7(), Namespace::User, "notes.md");
        assert_eq!(scope_a, scope_b);
        assert_eq!(key_a, "user:notes.md");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn session_namespace_is_session_bound() {
        let user = Uuid::now_v7();
        let session = Uuid::now_v7();
        let (scope, key) = scope_and_key("demo", user, session, Namespace::Session, "out.csv");
        assert_eq!(scope.session_id, session);
        assert_eq!(key, "out.csv");
    }
}
