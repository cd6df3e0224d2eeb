use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use uuid::Uuid;

use relay_core::auth as credentials;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::{AuthStore, User};

/// Orchestrates registration, login, and token verification over the
/// configured [`AuthStore`] backend.
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    jwt_secret: String,
    token_ttl_days: i64,
}

impl AuthService {
    pub fn new(store: Arc<dyn AuthStore>, jwt_secret: String, token_ttl_days: i64) -> Self {
        Self {
            store,
            jwt_secret,
            token_ttl_days,
        }
    }

    /// Run backend setup (tables, directories). Called once at startup.
    pub async fn init(&self) -> Result<(), AppError> {
        self.store.init().await.map_err(AppError::from)
    }

    /// Probe the backing store. Used by the health endpoint.
    pub async fn ping(&self) -> Result<(), AppError> {
        self.store.ping().await.map_err(AppError::from)
    }

    /// Create a new user. Email and username must both be unused.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AppError> {
        if self.store.find_by_identifier(email).await?.is_some() {
            return Err(AppError::Conflict {
                message: format!("Email '{email}' is already registered"),
                field: Some("email".to_string()),
                docs_hint: Some("Use a different email address or log in instead.".to_string()),
            });
        }
        if self.store.find_by_identifier(username).await?.is_some() {
            return Err(AppError::Conflict {
                message: format!("Username '{username}' is already taken"),
                field: Some("username".to_string()),
                docs_hint: Some("Choose a different username.".to_string()),
            });
        }

        let password_hash = credentials::hash_password(password).map_err(AppError::Internal)?;
        let user = self
            .store
            .create_user(User {
                id: Uuid::now_v7(),
                email: email.to_string(),
                username: username.to_string(),
                password_hash,
                created_at: Utc::now(),
                is_active: true,
            })
            .await?;

        tracing::info!(username = %user.username, email = %user.email, "new user registered");
        Ok(user)
    }

    /// Check credentials against the store. Returns `None` for both
    /// unknown users and wrong passwords so callers can't tell them apart.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        let Some(user) = self.store.find_by_identifier(identifier).await? else {
            tracing::warn!(identifier = %identifier, "authentication failed: user not found");
            return Ok(None);
        };
        let password_ok =
            credentials::verify_password(password, &user.password_hash).unwrap_or(false);
        if !password_ok {
            tracing::warn!(identifier = %identifier, "authentication failed: invalid password");
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AppError> {
        credentials::issue_token(user_id, &self.jwt_secret, self.token_ttl_days)
            .map_err(AppError::Internal)
    }

    pub fn verify_token(&self, token: &str) -> Option<Uuid> {
        credentials::verify_token(token, &self.jwt_secret)
    }

    pub async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.store.find_by_id(id).await.map_err(AppError::from)
    }
}

/// Authenticated user extracted from the `Authorization: Bearer <token>`
/// header. The JWT is verified against the server secret, then the user is
/// loaded from the auth store and must still be active.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized {
            message: "Missing Authorization header".to_string(),
            docs_hint: Some(
                "Include 'Authorization: Bearer <token>'. Obtain a token via \
                 POST /auth/register or POST /auth/login."
                    .to_string(),
            ),
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must use Bearer scheme".to_string(),
            docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
        })
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let user_id = state
            .auth
            .verify_token(token)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Invalid or expired token".to_string(),
                docs_hint: Some("Log in again to obtain a fresh token.".to_string()),
            })?;

        let user = state
            .auth
            .user_by_id(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| AppError::Unauthorized {
                message: "User not found or inactive".to_string(),
                docs_hint: None,
            })?;

        Ok(AuthenticatedUser { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAuthStore;

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryAuthStore::new()), "test-secret".to_string(), 7)
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let auth = service();
        let user = auth
            .register("a@example.com", "alice", "hunter2hunter2")
            .await
            .unwrap();

        let by_email = auth
            .authenticate("a@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));

        let by_username = auth.authenticate("alice", "hunter2hunter2").await.unwrap();
        assert!(by_username.is_some());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_identical() {
        let auth = service();
        auth.register("a@example.com", "alice", "hunter2hunter2")
            .await
            .unwrap();

        assert!(auth.authenticate("alice", "wrong").await.unwrap().is_none());
        assert!(auth.authenticate("mallory", "wrong").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_on_field() {
        let auth = service();
        auth.register("a@example.com", "alice", "hunter2hunter2")
            .await
            .unwrap();

        let err = auth
            .register("a@example.com", "alice2", "hunter2hunter2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { field: Some(ref f), .. } if f == "email"));

        let err = auth
            .register("b@example.com", "alice", "hunter2hunter2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { field: Some(ref f), .. } if f == "username"));
    }

    #[tokio::test]
    async fn ping_reports_store_failures() {
        use crate::store::StoreError;

        struct BrokenStore;

        #[async_trait::async_trait]
        impl AuthStore for BrokenStore {
            async fn init(&self) -> Result<(), StoreError> {
                Ok(())
            }
            async fn ping(&self) -> Result<(), StoreError> {
                Err(StoreError::Database(sqlx::Error::PoolClosed))
            }
            async fn find_by_identifier(&self, _: &str) -> Result<Option<User>, StoreError> {
                Ok(None)
            }
            async fn find_by_id(&self, _: Uuid) -> Result<Option<User>, StoreError> {
                Ok(None)
            }
            async fn create_user(&self, user: User) -> Result<User, StoreError> {
                Ok(user)
            }
        }

        let healthy = service();
        healthy.ping().await.unwrap();

        let broken = AuthService::new(Arc::new(BrokenStore), "test-secret".to_string(), 7);
        assert!(broken.ping().await.is_err());
    }

    #[tokio::test]
    async fn issued_tokens_verify_back_to_the_user() {
        let auth = service();
        let user = auth
            .register("a@example.com", "alice", "hunter2hunter2")
            .await
            .unwrap();
        let token = auth.issue_token(user.id).unwrap();
        assert_eq!(auth.verify_token(&token), Some(user.id));
        assert_eq!(auth.verify_token("garbage"), None);
    }
}
