use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, User};

/// In-process store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
    lookups: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read queries served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.users.read().await.iter().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.id == id).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.email == email).await)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.username == username).await)
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.username == username || u.email == email).await)
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        if new.username.is_empty() || new.email.is_empty() {
            return Err(StoreError::Invalid("username and email are required".into()));
        }
        if new.password_hash.is_none() && new.federated_id.is_none() {
            return Err(StoreError::Invalid("a credential is required".into()));
        }

        let mut users = self.users.write().await;
        for u in users.iter() {
            if u.username == new.username {
                return Err(StoreError::Conflict("users_username_key".into()));
            }
            if u.email == new.email {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
            if new.federated_id.is_some() && u.federated_id == new.federated_id {
                return Err(StoreError::Conflict("users_federated_id_key".into()));
            }
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            federated_id: new.federated_id,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: Some("$argon2id$stub".into()),
            federated_id: None,
        }
    }

    fn federated(username: &str, email: &str, subject: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: None,
            federated_id: Some(subject.into()),
        }
    }

    #[tokio::test]
    async fn enforces_unique_username_and_email() {
        let store = MemoryUserStore::new();
        store.create(local("alice", "alice@example.com")).await.expect("first insert");

        let err = store.create(local("alice", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c == "users_username_key"));

        let err = store.create(local("bob", "alice@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c == "users_email_key"));
    }

    #[tokio::test]
    async fn federated_id_uniqueness_is_sparse() {
        let store = MemoryUserStore::new();
        store.create(local("a", "a@example.com")).await.expect("local a");
        store.create(local("b", "b@example.com")).await.expect("local b");
        store.create(federated("c", "c@example.com", "g-1")).await.expect("federated c");

        let err = store.create(federated("d", "d@example.com", "g-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c == "users_federated_id_key"));
    }

    #[tokio::test]
    async fn rejects_records_without_required_fields() {
        let store = MemoryUserStore::new();
        let err = store.create(local("", "x@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let mut no_credential = local("x", "x@example.com");
        no_credential.password_hash = None;
        let err = store.create(no_credential).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn lookups_are_counted() {
        let store = MemoryUserStore::new();
        let created = store.create(local("alice", "alice@example.com")).await.unwrap();
        assert_eq!(store.lookups(), 0);

        let by_id = store.find_by_id(created.id).await.unwrap().expect("by id");
        assert_eq!(by_id.username, "alice");
        assert!(store.find_by_username("Alice").await.unwrap().is_none());
        assert!(store
            .find_by_username_or_email("nobody", "alice@example.com")
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.lookups(), 3);
    }
}
