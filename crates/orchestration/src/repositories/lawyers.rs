//! Lawyer profile repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;

/// A lawyer's public profile and weekly availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawyerProfile {
    pub id: EntityId,
    pub user_id: EntityId,
    pub bio: String,
    pub specialties: String,
    pub license_number: String,
    pub experience_years: u32,
    pub description: String,
    pub rating: f64,
    pub price_per_hour: i64,
    pub image_url: String,
    /// Comma-separated day names, e.g. `"Mon,Tue,Wed"`.
    pub day_of_week: String,
    /// Comma-separated time ranges, e.g. `"09:00-12:00,14:00-17:00"`.
    pub work_time: String,
}

/// Trait for lawyer profile storage.
#[async_trait]
pub trait LawyerProfileRepository: Send + Sync {
    /// Persists a new profile; the id is assigned by the caller.
    async fn add(&self, profile: LawyerProfile) -> Result<(), OrchestrationError>;

    /// Loads a profile by id.
    async fn get(&self, id: &EntityId) -> Result<Option<LawyerProfile>, OrchestrationError>;

    /// Replaces a stored profile.
    async fn update(&self, profile: LawyerProfile) -> Result<(), OrchestrationError>;

    /// Removes a profile. Returns false if no profile existed.
    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError>;
}

#[derive(Debug, Default)]
struct InMemoryLawyerProfileState {
    profiles: HashMap<EntityId, LawyerProfile>,
    fail_on_add: bool,
    fail_on_update: bool,
}

/// In-memory lawyer profile repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLawyerProfileRepository {
    state: Arc<RwLock<InMemoryLawyerProfileState>>,
}

impl InMemoryLawyerProfileRepository {
    /// Creates a new in-memory lawyer profile repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail on the next add call.
    pub fn set_fail_on_add(&self, fail: bool) {
        self.state.write().unwrap().fail_on_add = fail;
    }

    /// Configures the repository to fail on the next update call.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update = fail;
    }

    /// Returns the number of stored profiles.
    pub fn profile_count(&self) -> usize {
        self.state.read().unwrap().profiles.len()
    }
}

#[async_trait]
impl LawyerProfileRepository for InMemoryLawyerProfileRepository {
    async fn add(&self, profile: LawyerProfile) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_add {
            return Err(OrchestrationError::LawyerStore(
                "profile insert rejected".to_string(),
            ));
        }

        state.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn get(&self, id: &EntityId) -> Result<Option<LawyerProfile>, OrchestrationError> {
        Ok(self.state.read().unwrap().profiles.get(id).cloned())
    }

    async fn update(&self, profile: LawyerProfile) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_update {
            return Err(OrchestrationError::LawyerStore(
                "profile update rejected".to_string(),
            ));
        }
        if !state.profiles.contains_key(&profile.id) {
            return Err(OrchestrationError::LawyerStore(format!(
                "profile not found: {}",
                profile.id
            )));
        }

        state.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError> {
        Ok(self.state.write().unwrap().profiles.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> LawyerProfile {
        LawyerProfile {
            id: EntityId::from(id),
            user_id: EntityId::from("u-1"),
            bio: "Family law attorney".to_string(),
            specialties: "Family Law".to_string(),
            license_number: "LIC-1234".to_string(),
            experience_years: 8,
            description: "Divorce and custody cases".to_string(),
            rating: 4.5,
            price_per_hour: 250_000,
            image_url: String::new(),
            day_of_week: "Mon,Tue".to_string(),
            work_time: "09:00-11:00".to_string(),
        }
    }

    #[tokio::test]
    async fn add_get_delete_roundtrip() {
        let repo = InMemoryLawyerProfileRepository::new();
        repo.add(profile("l-1")).await.unwrap();

        let fetched = repo.get(&EntityId::from("l-1")).await.unwrap().unwrap();
        assert_eq!(fetched.specialties, "Family Law");

        assert!(repo.delete(&EntityId::from("l-1")).await.unwrap());
        assert_eq!(repo.profile_count(), 0);
    }

    #[tokio::test]
    async fn fail_toggles() {
        let repo = InMemoryLawyerProfileRepository::new();
        repo.set_fail_on_add(true);
        assert!(repo.add(profile("l-1")).await.is_err());

        repo.set_fail_on_add(false);
        repo.add(profile("l-1")).await.unwrap();

        repo.set_fail_on_update(true);
        assert!(repo.update(profile("l-1")).await.is_err());
    }

    #[tokio::test]
    async fn update_missing_profile_fails() {
        let repo = InMemoryLawyerProfileRepository::new();
        assert!(repo.update(profile("l-missing")).await.is_err());
    }
}
