use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::User;

pub fn register_router() -> Router<AppState> {
    Router::new().route("/auth/register", post(register))
}

pub fn login_router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn session_router() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

// ──────────────────────────────────────────────
// Shared payloads
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            username: user.username,
            created_at: user.created_at,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    /// Always "bearer"
    pub token_type: String,
    pub user: UserResponse,
}

impl AuthResponse {
    fn new(access_token: String, user: User) -> Self {
        AuthResponse {
            access_token,
            token_type: "bearer".to_string(),
            user: user.into(),
        }
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation {
            message: "email must be a valid address".to_string(),
            field: Some("email".to_string()),
            received: Some(serde_json::Value::String(email.to_string())),
            docs_hint: None,
        });
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), AppError> {
    if username.len() < 3 || username.len() > 50 {
        return Err(AppError::Validation {
            message: "username must be between 3 and 50 characters".to_string(),
            field: Some("username".to_string()),
            received: Some(serde_json::Value::String(username.to_string())),
            docs_hint: None,
        });
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 6 || password.len() > 100 {
        return Err(AppError::Validation {
            message: "password must be between 6 and 100 characters".to_string(),
            field: Some("password".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(())
}

// ──────────────────────────────────────────────
// POST /auth/register
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered and logged in", body = AuthResponse),
        (status = 400, description = "Validation error", body = relay_core::error::ApiError),
        (status = 409, description = "Email or username already taken", body = relay_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_email(&req.email)?;
    validate_username(&req.username)?;
    validate_password(&req.password)?;

    let user = state
        .auth
        .register(&req.email, &req.username, &req.password)
        .await?;
    let token = state.auth.issue_token(user.id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse::new(token, user))))
}

// ──────────────────────────────────────────────
// POST /auth/login
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// Email address or username
    pub identifier: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = relay_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .auth
        .authenticate(&req.identifier, &req.password)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid credentials".to_string(),
            docs_hint: Some(
                "Use your email address or username together with your password.".to_string(),
            ),
        })?;

    let token = state.auth.issue_token(user.id)?;
    Ok(Json(AuthResponse::new(token, user)))
}

// ──────────────────────────────────────────────
// GET /auth/me
// ──────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(auth: AuthenticatedUser) -> Json<UserResponse> {
    Json(auth.user.into())
}

// ──────────────────────────────────────────────
// POST /auth/logout
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

/// Tokens are stateless, so logout is client-side: the endpoint exists so
/// clients have a uniform place to end a session.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse),
        (status = 401, description = "Missing or invalid token", body = relay_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(auth: AuthenticatedUser) -> Json<LogoutResponse> {
    tracing::info!(user_id = %auth.user_id(), "user logged out");
    Json(LogoutResponse {
        message: "Logged out. Discard the access token on the client.".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_requires_an_at_sign() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn username_length_bounds_are_enforced() {
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice").is_ok());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn password_length_bounds_are_enforced() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("hunter2hunter2").is_ok());
        assert!(validate_password(&"x".repeat(101)).is_err());
    }
}
