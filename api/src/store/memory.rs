use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{AuthStore, StoreError, User};

/// Non-persistent user store. Useful for tests and throwaway deployments;
/// everything is lost on restart.
#[derive(Default)]
pub struct MemoryAuthStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users_by_id: HashMap<Uuid, User>,
    id_by_email: HashMap<String, Uuid>,
    id_by_username: HashMap<String, Uuid>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read();
        let id = inner
            .id_by_email
            .get(identifier)
            .or_else(|| inner.id_by_username.get(identifier));
        Ok(id.and_then(|id| inner.users_by_id.get(id).cloned()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().users_by_id.get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut inner = self.inner.write();
        if inner.id_by_email.contains_key(&user.email) {
            return Err(StoreError::Duplicate { field: "email" });
        }
        if inner.id_by_username.contains_key(&user.username) {
            return Err(StoreError::Duplicate { field: "username" });
        }
        inner.id_by_email.insert(user.email.clone(), user.id);
        inner.id_by_username.insert(user.username.clone(), user.id);
        inner.users_by_id.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(email: &str, username: &str) -> User {
        User {
            id: Uuid::now_v7(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn lookup_by_email_and_username() {
        let store = MemoryAuthStore::new();
        let created = store.create_user(user("a@example.com", "alice")).await.unwrap();

        let by_email = store
            .find_by_identifier("a@example.com")
            .await
            .unwrap()
            .unwrap();
        let by_name = store.find_by_identifier("alice").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_name.id, created.id);
        assert!(store.find_by_identifier("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicates_are_rejected_per_field() {
        let store = MemoryAuthStore::new();
        store.create_user(user("a@example.com", "alice")).await.unwrap();

        let err = store
            .create_user(user("a@example.com", "alice2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));

        let err = store
            .create_user(user("b@example.com", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "username" }));
    }
}
