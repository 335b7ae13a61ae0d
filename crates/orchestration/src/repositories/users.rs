//! User repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;

/// A platform user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub role: String,
    pub is_active: bool,
}

/// Trait for user account storage.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persists a new user; the id is assigned by the caller.
    async fn add(&self, user: User) -> Result<(), OrchestrationError>;

    /// Loads a user by id.
    async fn get(&self, id: &EntityId) -> Result<Option<User>, OrchestrationError>;

    /// Loads a user by email address.
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, OrchestrationError>;

    /// Replaces a stored user.
    async fn update(&self, user: User) -> Result<(), OrchestrationError>;

    /// Removes a user. Returns false if no user existed.
    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<EntityId, User>,
    fail_on_add: bool,
}

/// In-memory user repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserRepository {
    /// Creates a new in-memory user repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail on the next add call.
    pub fn set_fail_on_add(&self, fail: bool) {
        self.state.write().unwrap().fail_on_add = fail;
    }

    /// Returns the number of stored users.
    pub fn user_count(&self) -> usize {
        self.state.read().unwrap().users.len()
    }

    /// Returns the number of users with `is_active` set.
    pub fn active_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .users
            .values()
            .filter(|u| u.is_active)
            .count()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn add(&self, user: User) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_add {
            return Err(OrchestrationError::UserStore(
                "user insert rejected".to_string(),
            ));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(OrchestrationError::UserStore(format!(
                "email already registered: {}",
                user.email
            )));
        }

        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get(&self, id: &EntityId) -> Result<Option<User>, OrchestrationError> {
        Ok(self.state.read().unwrap().users.get(id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, OrchestrationError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, user: User) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();
        if !state.users.contains_key(&user.id) {
            return Err(OrchestrationError::UserStore(format!(
                "user not found: {}",
                user.id
            )));
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError> {
        Ok(self.state.write().unwrap().users.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> User {
        User {
            id: EntityId::from(id),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            phone_number: "555-0100".to_string(),
            role: "client".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn add_and_get_user() {
        let repo = InMemoryUserRepository::new();
        repo.add(user("u-1", "a@example.com")).await.unwrap();

        let fetched = repo.get(&EntityId::from("u-1")).await.unwrap().unwrap();
        assert_eq!(fetched.email, "a@example.com");
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.add(user("u-1", "a@example.com")).await.unwrap();

        let result = repo.add(user("u-2", "a@example.com")).await;
        assert!(result.is_err());
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn fail_on_add_toggle() {
        let repo = InMemoryUserRepository::new();
        repo.set_fail_on_add(true);

        let result = repo.add(user("u-1", "a@example.com")).await;
        assert!(result.is_err());
        assert_eq!(repo.user_count(), 0);
    }

    #[tokio::test]
    async fn update_deactivates_user() {
        let repo = InMemoryUserRepository::new();
        repo.add(user("u-1", "a@example.com")).await.unwrap();

        let mut u = repo.get(&EntityId::from("u-1")).await.unwrap().unwrap();
        u.is_active = false;
        repo.update(u).await.unwrap();

        assert_eq!(repo.user_count(), 1);
        assert_eq!(repo.active_count(), 0);
    }

    #[tokio::test]
    async fn get_by_email() {
        let repo = InMemoryUserRepository::new();
        repo.add(user("u-1", "a@example.com")).await.unwrap();

        let found = repo.get_by_email("a@example.com").await.unwrap();
        assert!(found.is_some());
        assert!(repo.get_by_email("b@example.com").await.unwrap().is_none());
    }
}
