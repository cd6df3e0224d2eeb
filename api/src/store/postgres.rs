use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{AuthStore, StoreError, User};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (\
     id UUID PRIMARY KEY, \
     email TEXT NOT NULL UNIQUE, \
     username TEXT NOT NULL UNIQUE, \
     password_hash TEXT NOT NULL, \
     created_at TIMESTAMPTZ NOT NULL, \
     is_active BOOLEAN NOT NULL DEFAULT TRUE)";

pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        tracing::info!("auth tables ensured (Postgres)");
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
