use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::session::{Session, SessionEvent};

/// A search hit from archived session memory.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemoryHit {
    pub session_id: Uuid,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    app_name: String,
    user_id: Uuid,
    session_id: Uuid,
    author: String,
    text: String,
    created_at: DateTime<Utc>,
}

/// In-process recall over archived sessions. Ingest turns session events
/// into flat text records; search is naive case-insensitive substring
/// matching scoped by app and user.
#[derive(Default)]
pub struct MemoryService {
    records: RwLock<Vec<MemoryRecord>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive a session's events. Returns the number of records ingested.
    pub fn ingest(&self, session: &Session, events: &[SessionEvent]) -> usize {
        let mut records = self.records.write();
        let mut count = 0;
        for event in events {
            let Some(text) = event_text(event) else {
                continue;
            };
            records.push(MemoryRecord {
                app_name: session.app_name.clone(),
                user_id: session.user_id,
                session_id: session.id,
                author: event.author.clone(),
                text,
                created_at: event.created_at,
            });
            count += 1;
        }
        tracing::info!(
            session_id = %session.id,
            records = count,
            "session archived to memory"
        );
        count
    }

    pub fn search(&self, app_name: &str, user_id: Uuid, query: &str) -> Vec<MemoryHit> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.records
            .read()
            .iter()
            .filter(|record| {
                record.app_name == app_name
                    && record.user_id == user_id
                    && record.text.to_lowercase().contains(&needle)
            })
            .map(|record| MemoryHit {
                session_id: record.session_id,
                author: record.author.clone(),
                text: record.text.clone(),
                created_at: record.created_at,
            })
            .collect()
    }
}

/// Flatten an event's content into searchable text. String contents are
/// taken verbatim; objects fall back to their `text` field, then to the
/// full JSON.
fn event_text(event: &SessionEvent) -> Option<String> {
    match &event.content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => match map.get("text") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => serde_json::to_string(&event.content).ok(),
        },
        serde_json::Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(user_id: Uuid) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::now_v7(),
            app_name: "demo".to_string(),
            user_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn event(session_id: Uuid, content: serde_json::Value) -> SessionEvent {
        SessionEvent {
            id: Uuid::now_v7(),
            session_id,
            author: "user".to_string(),
            content,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn search_is_scoped_and_case_insensitive() {
        let memory = MemoryService::new();
        let user = Uuid::now_v7();
        let s = session(user);
        let ingested = memory.ingest(
            &s,
            &[
                event(s.id, json!({"text": "The quarterly REPORT is ready"})),
                event(s.id, json!("unrelated message")),
            ],
        );
        assert_eq!(ingested, 2);

        let hits = memory.search("demo", user, "report");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, s.id);

        // Other users and apps see nothing
        assert!(memory.search("demo", Uuid::now_v7(), "report").is_empty());
        assert!(memory.search("other", user, "report").is_empty());
    }

    #[test]
    fn null_content_is_skipped_and_empty_query_matches_nothing() {
        let memory = MemoryService::new();
        let user = Uuid::now_v7();
        let s = session(user);
        assert_eq!(memory.ingest(&s, &[event(s.id, json!(null))]), 0);
        assert!(memory.search("demo", user, "").is_empty());
    }
}
