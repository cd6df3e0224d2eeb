use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ServiceError;

/// A conversation session scoped to an app and a user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single event appended to a session (message, tool call, ...).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub author: String,
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Session persistence. All operations are scoped by app and user — a
/// session is never visible outside the pair it was created for.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, app_name: &str, user_id: Uuid) -> Result<Session, ServiceError>;

    async fn get(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, ServiceError>;

    async fn list(&self, app_name: &str, user_id: Uuid) -> Result<Vec<Session>, ServiceError>;

    /// Returns true when a session was actually removed.
    async fn delete(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError>;

    /// Append an event. Returns `None` when the session does not exist.
    async fn append_event(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
        author: &str,
        content: serde_json::Value,
    ) -> Result<Option<SessionEvent>, ServiceError>;

    async fn list_events(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<SessionEvent>, ServiceError>;
}

// ──────────────────────────────────────────────
// In-memory backend
// ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<HashMap<Uuid, (Session, Vec<SessionEvent>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_scope(session: &Session, app_name: &str, user_id: Uuid) -> bool {
    session.app_name == app_name && session.user_id == user_id
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, app_name: &str, user_id: Uuid) -> Result<Session, ServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::now_v7(),
            app_name: app_name.to_string(),
            user_id,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .insert(session.id, (session.clone(), Vec::new()));
        Ok(session)
    }

    async fn get(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self
            .inner
            .read()
            .get(&session_id)
            .map(|(session, _)| session.clone())
            .filter(|session| in_scope(session, app_name, user_id)))
    }

    async fn list(&self, app_name: &str, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let mut sessions: Vec<Session> = self
            .inner
            .read()
            .values()
            .map(|(session, _)| session.clone())
            .filter(|session| in_scope(session, app_name, user_id))
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn delete(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let mut inner = self.inner.write();
        let matches = inner
            .get(&session_id)
            .is_some_and(|(session, _)| in_scope(session, app_name, user_id));
        if matches {
            inner.remove(&session_id);
        }
        Ok(matches)
    }

    async fn append_event(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
        author: &str,
        content: serde_json::Value,
    ) -> Result<Option<SessionEvent>, ServiceError> {
        let mut inner = self.inner.write();
        let Some((session, events)) = inner.get_mut(&session_id) else {
            return Ok(None);
        };
        if !in_scope(session, app_name, user_id) {
            return Ok(None);
        }
        let event = SessionEvent {
            id: Uuid::now_v7(),
            session_id,
            author: author.to_string(),
            content,
            created_at: Utc::now(),
        };
        session.updated_at = event.created_at;
        events.push(event.clone());
        Ok(Some(event))
    }

    async fn list_events(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<SessionEvent>, ServiceError> {
        Ok(self
            .inner
            .read()
            .get(&session_id)
            .filter(|(session, _)| in_scope(session, app_name, user_id))
            .map(|(_, events)| events.clone())
            .unwrap_or_default())
    }
}

// ──────────────────────────────────────────────
// SQLite backend
// ──────────────────────────────────────────────

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    app_name: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    session_id: Uuid,
    author: String,
    content: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            app_name: row.app_name,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<EventRow> for SessionEvent {
    fn from(row: EventRow) -> Self {
        SessionEvent {
            id: row.id,
            session_id: row.session_id,
            author: row.author,
            content: row.content.0,
            created_at: row.created_at,
        }
    }
}

impl SqliteSessionStore {
    pub async fn connect(url: &str) -> Result<Self, ServiceError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(ServiceError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<(), ServiceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (\
             id TEXT PRIMARY KEY, \
             app_name TEXT NOT NULL, \
             user_id TEXT NOT NULL, \
             created_at TEXT NOT NULL, \
             updated_at TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_events (\
             id TEXT PRIMARY KEY, \
             session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE, \
             author TEXT NOT NULL, \
             content TEXT NOT NULL, \
             created_at TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        tracing::info!("session tables ensured (SQLite)");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, app_name: &str, user_id: Uuid) -> Result<Session, ServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::now_v7(),
            app_name: app_name.to_string(),
            user_id,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO sessions (id, app_name, user_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(&session.app_name)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(session)
    }

    async fn get(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, ServiceError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, app_name, user_id, created_at, updated_at FROM sessions \
             WHERE id = $1 AND app_name = $2 AND user_id = $3",
        )
        .bind(session_id)
        .bind(app_name)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn list(&self, app_name: &str, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, app_name, user_id, created_at, updated_at FROM sessions \
             WHERE app_name = $1 AND user_id = $2 ORDER BY created_at",
        )
        .bind(app_name)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn delete(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError> {
        // Scope check first: events may only cascade once the session row
        // was actually removed for this app/user pair.
        let result = sqlx::query(
            "DELETE FROM sessions WHERE id = $1 AND app_name = $2 AND user_id = $3",
        )
        .bind(session_id)
        .bind(app_name)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query("DELETE FROM session_events WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn append_event(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
        author: &str,
        content: serde_json::Value,
    ) -> Result<Option<SessionEvent>, ServiceError> {
        if self.get(app_name, user_id, session_id).await?.is_none() {
            return Ok(None);
        }
        let event = SessionEvent {
            id: Uuid::now_v7(),
            session_id,
            author: author.to_string(),
            content,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO session_events (id, session_id, author, content, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id)
        .bind(event.session_id)
        .bind(&event.author)
        .bind(Json(event.content.clone()))
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        sqlx::query("UPDATE sessions SET updated_at = $1 WHERE id = $2")
            .bind(event.created_at)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(Some(event))
    }

    async fn list_events(
        &self,
        app_name: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<SessionEvent>, ServiceError> {
        if self.get(app_name, user_id, session_id).await?.is_none() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, session_id, author, content, created_at FROM session_events \
             WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn roundtrip(store: &dyn SessionStore) {
        let user = Uuid::now_v7();
        let session = store.create("demo", user).await.unwrap();

        // Visible only within its own scope
        assert!(store.get("demo", user, session.id).await.unwrap().is_some());
        assert!(
            store
                .get("other_app", user, session.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get("demo", Uuid::now_v7(), session.id)
                .await
                .unwrap()
                .is_none()
        );

        let event = store
            .append_event("demo", user, session.id, "user", json!({"text": "hello"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.author, "user");

        let events = store.list_events("demo", user, session.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, json!({"text": "hello"}));

        assert_eq!(store.list("demo", user).await.unwrap().len(), 1);
        assert!(store.delete("demo", user, session.id).await.unwrap());
        assert!(!store.delete("demo", user, session.id).await.unwrap());
        assert!(store.get("demo", user, session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        roundtrip(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_store_roundtrip() {
        let store = SqliteSessionStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();
        roundtrip(&store).await;
    }

    #[tokio::test]
    async fn out_of_scope_delete_leaves_events_intact() {
        let store = SqliteSessionStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();

        let owner = Uuid::now_v7();
        let session = store.create("demo", owner).await.unwrap();
        store
            .append_event("demo", owner, session.id, "user", json!({"text": "keep me"}))
            .await
            .unwrap()
            .unwrap();

        // Wrong user and wrong app must not remove anything
        assert!(!store.delete("demo", Uuid::now_v7(), session.id).await.unwrap());
        assert!(!store.delete("other_app", owner, session.id).await.unwrap());

        let events = store.list_events("demo", owner, session.id).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn append_to_missing_session_returns_none() {
        let store = MemorySessionStore::new();
        let result = store
            .append_event("demo", Uuid::now_v7(), Uuid::now_v7(), "user", json!("hi"))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
