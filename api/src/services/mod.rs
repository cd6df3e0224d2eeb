//! Backend services behind the configuration layer.
//!
//! [`ServiceFactory`] switches on the tagged service configs and produces
//! the session, memory, and artifact implementations. The traits here are
//! Relay's own minimal surfaces — deliberately small, just enough for the
//! scaffold's routes.

use std::sync::Arc;

use relay_core::config::{ArtifactConfig, MemoryConfig, SessionConfig};

use crate::error::AppError;

pub mod artifact;
pub mod memory;
pub mod session;

pub use artifact::{Artifact, ArtifactScope, ArtifactStore, LocalFolderArtifactStore, MemoryArtifactStore};
pub use memory::{MemoryHit, MemoryService};
pub use session::{MemorySessionStore, Session, SessionEvent, SessionStore, SqliteSessionStore};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unsupported(String),
    #[error("invalid {field}: path separators and '..' are not allowed")]
    InvalidScope { field: &'static str },
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::Database(e),
            ServiceError::Io(e) => AppError::Internal(format!("storage io error: {e}")),
            ServiceError::Unsupported(msg) => AppError::Internal(msg),
            ServiceError::InvalidScope { field } => AppError::Validation {
                message: format!("invalid {field}: path separators and '..' are not allowed"),
                field: Some(field.to_string()),
                received: None,
                docs_hint: None,
            },
        }
    }
}

/// Creates service instances from their parsed configurations.
pub struct ServiceFactory;

impl ServiceFactory {
    pub async fn create_session_store(
        config: &SessionConfig,
    ) -> Result<Arc<dyn SessionStore>, ServiceError> {
        match config {
            SessionConfig::InMemory => {
                tracing::info!("creating in-memory session store");
                Ok(Arc::new(MemorySessionStore::new()))
            }
            SessionConfig::Database { url } => {
                if url.starts_with("postgres") {
                    return Err(ServiceError::Unsupported(
                        "Postgres session storage is not implemented in this scaffold; \
                         use a sqlite: URL for RELAY_SESSION_DATABASE_URL"
                            .to_string(),
                    ));
                }
                tracing::info!(url = %url, "creating SQLite session store");
                let store = SqliteSessionStore::connect(url).await?;
                store.init().await?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn create_memory_service(config: &MemoryConfig) -> Arc<MemoryService> {
        match config {
            MemoryConfig::InMemory => {
                tracing::info!("creating in-memory memory service");
                Arc::new(MemoryService::new())
            }
        }
    }

    pub async fn create_artifact_store(
        config: &ArtifactConfig,
    ) -> Result<Arc<dyn ArtifactStore>, ServiceError> {
        match config {
            ArtifactConfig::InMemory => {
                tracing::info!("creating in-memory artifact store");
                Ok(Arc::new(MemoryArtifactStore::new()))
            }
            ArtifactConfig::Local { base_path } => {
                tracing::info!(base_path = %base_path, "creating local folder artifact store");
                let store = LocalFolderArtifactStore::new(base_path).await?;
                Ok(Arc::new(store))
            }
        }
    }
}
