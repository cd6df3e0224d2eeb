//! Pluggable user storage for the auth subsystem.
//!
//! Three interchangeable backends sit behind [`AuthStore`]: Postgres,
//! SQLite, and an in-process map. Selection happens once at startup from
//! the parsed [`AuthStorageConfig`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use relay_core::config::AuthStorageConfig;

use crate::error::AppError;

pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use memory::MemoryAuthStore;
pub use postgres::PgAuthStore;
pub use sqlite::SqliteAuthStore;

/// A registered user. `password_hash` never leaves the auth layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{field} already in use")]
    Duplicate { field: &'static str },
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Io(e) => AppError::Internal(format!("storage io error: {e}")),
            StoreError::Duplicate { field } => AppError::Conflict {
                message: format!("{field} already in use"),
                field: Some(field.to_string()),
                docs_hint: Some(format!("Choose a different {field}.")),
            },
        }
    }
}

/// Storage backend for registered users.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// One-time setup: create tables, directories, indexes.
    async fn init(&self) -> Result<(), StoreError>;

    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Look a user up by email or username.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: User) -> Result<User, StoreError>;
}

/// Build the configured auth store. Does not run `init` — the caller does
/// that once the store is selected, so a failed migration is visible at
/// startup.
pub async fn select_store(config: &AuthStorageConfig) -> Result<Arc<dyn AuthStore>, StoreError> {
    match config {
        AuthStorageConfig::Auto => {
            // `Auto` is resolved into a concrete choice by config parsing;
            // reaching this arm means the caller skipped that step.
            tracing::warn!("auth storage 'auto' was not resolved, defaulting to SQLite");
            let store = SqliteAuthStore::connect(relay_core::config::DEFAULT_AUTH_DB_URL).await?;
            Ok(Arc::new(store))
        }
        AuthStorageConfig::Database { url } => {
            if url.starts_with("postgres:") || url.starts_with("postgresql:") {
                tracing::info!(url = %url, "auth storage: Postgres");
                Ok(Arc::new(PgAuthStore::connect(url).await?))
            } else {
                tracing::info!(url = %url, "auth storage: SQLite");
                Ok(Arc::new(SqliteAuthStore::connect(url).await?))
            }
        }
        AuthStorageConfig::InMemory => {
            tracing::warn!("auth storage: in-memory (users are lost on restart)");
            Ok(Arc::new(MemoryAuthStore::new()))
        }
    }
}
