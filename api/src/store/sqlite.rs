use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use uuid::Uuid;

use super::{AuthStore, StoreError, User};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (\
     id TEXT PRIMARY KEY, \
     email TEXT NOT NULL UNIQUE, \
     username TEXT NOT NULL UNIQUE, \
     password_hash TEXT NOT NULL, \
     created_at TEXT NOT NULL, \
     is_active INTEGER NOT NULL DEFAULT 1)";

pub struct SqliteAuthStore {
    pool: SqlitePool,
}

impl SqliteAuthStore {
    /// Connect to a SQLite database, creating the file (and its parent
    /// directory) on first use.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        ensure_parent_dir(url)?;
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

/// SQLite URLs point at a file; make sure its directory exists so the
/// driver can create the database. `:memory:` needs nothing.
fn ensure_parent_dir(url: &str) -> Result<(), StoreError> {
    if url.contains(":memory:") {
        return Ok(());
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[async_trait]
impl AuthStore for SqliteAuthStore {
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        tracing::info!("auth tables ensured (SQLite)");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, username, password_hash, created_at, is_active \
             FROM users WHERE email = $1 OR username = $1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, username, password_hash, created_at, is_active \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, created_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_user() -> User {
        User {
            id: Uuid::now_v7(),
            email: "test@example.com".to_string(),
            username: "tester".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            created_at: Utc::now(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn in_memory_sqlite_roundtrip() {
        let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();

        let user = store.create_user(sample_user()).await.unwrap();

        let by_email = store
            .find_by_identifier("test@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);

        let by_username = store.find_by_identifier("tester").await.unwrap().unwrap();
        assert_eq!(by_username.id, user.id);

        let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "test@example.com");
        assert!(by_id.is_active);

        assert!(
            store
                .find_by_identifier("nobody@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn ping_succeeds_on_a_live_pool() {
        let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_email_is_a_database_error() {
        let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();

        store.create_user(sample_user()).await.unwrap();
        let mut second = sample_user();
        second.username = "someone_else".to_string();
        assert!(store.create_user(second).await.is_err());
    }

    #[test]
    fn parent_dir_extraction_handles_url_forms() {
        assert!(ensure_parent_dir("sqlite::memory:").is_ok());
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/nested/auth.db", dir.path().display());
        ensure_parent_dir(&url).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
