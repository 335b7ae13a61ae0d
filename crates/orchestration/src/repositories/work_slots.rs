//! Work slot repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;

/// One bookable hour on a lawyer's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSlot {
    pub id: EntityId,
    pub lawyer_id: EntityId,
    pub day_of_week: String,
    /// Hour interval, e.g. `"09:00-10:00"`.
    pub slot: String,
    pub is_active: bool,
}

/// Trait for work slot storage.
#[async_trait]
pub trait WorkSlotRepository: Send + Sync {
    /// Persists a new slot; the id is assigned by the caller.
    async fn add(&self, slot: WorkSlot) -> Result<(), OrchestrationError>;

    /// Loads a slot by id.
    async fn get(&self, id: &EntityId) -> Result<Option<WorkSlot>, OrchestrationError>;

    /// Returns all slots for a lawyer.
    async fn list_for_lawyer(
        &self,
        lawyer_id: &EntityId,
    ) -> Result<Vec<WorkSlot>, OrchestrationError>;

    /// Flips a slot's `is_active` flag.
    async fn set_active(&self, id: &EntityId, active: bool) -> Result<(), OrchestrationError>;

    /// Removes a slot. Returns false if no slot existed.
    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError>;
}

#[derive(Debug, Default)]
struct InMemoryWorkSlotState {
    slots: HashMap<EntityId, WorkSlot>,
    fail_on_add: bool,
    fail_on_set_active: bool,
    fail_after_adds: Option<usize>,
    add_count: usize,
    fail_after_deletes: Option<usize>,
    delete_count: usize,
}

/// In-memory work slot repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkSlotRepository {
    state: Arc<RwLock<InMemoryWorkSlotState>>,
}

impl InMemoryWorkSlotRepository {
    /// Creates a new in-memory work slot repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail on every add call.
    pub fn set_fail_on_add(&self, fail: bool) {
        self.state.write().unwrap().fail_on_add = fail;
    }

    /// Configures the repository to accept `n` adds and fail afterwards.
    /// Used to break a saga partway through slot creation.
    pub fn set_fail_after_adds(&self, n: usize) {
        let mut state = self.state.write().unwrap();
        state.fail_after_adds = Some(n);
        state.add_count = 0;
    }

    /// Configures the repository to accept `n` deletes and fail afterwards.
    /// Used to break a saga partway through slot removal.
    pub fn set_fail_after_deletes(&self, n: usize) {
        let mut state = self.state.write().unwrap();
        state.fail_after_deletes = Some(n);
        state.delete_count = 0;
    }

    /// Configures the repository to fail on set_active calls.
    pub fn set_fail_on_set_active(&self, fail: bool) {
        self.state.write().unwrap().fail_on_set_active = fail;
    }

    /// Returns the number of stored slots.
    pub fn slot_count(&self) -> usize {
        self.state.read().unwrap().slots.len()
    }

    /// Returns the number of slots with `is_active` set.
    pub fn active_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .slots
            .values()
            .filter(|s| s.is_active)
            .count()
    }
}

#[async_trait]
impl WorkSlotRepository for InMemoryWorkSlotRepository {
    async fn add(&self, slot: WorkSlot) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_add {
            return Err(OrchestrationError::WorkSlotStore(
                "work slot insert rejected".to_string(),
            ));
        }
        if let Some(limit) = state.fail_after_adds {
            if state.add_count >= limit {
                return Err(OrchestrationError::WorkSlotStore(
                    "work slot insert rejected".to_string(),
                ));
            }
        }

        state.add_count += 1;
        state.slots.insert(slot.id.clone(), slot);
        Ok(())
    }

    async fn get(&self, id: &EntityId) -> Result<Option<WorkSlot>, OrchestrationError> {
        Ok(self.state.read().unwrap().slots.get(id).cloned())
    }

    async fn list_for_lawyer(
        &self,
        lawyer_id: &EntityId,
    ) -> Result<Vec<WorkSlot>, OrchestrationError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .slots
            .values()
            .filter(|s| &s.lawyer_id == lawyer_id)
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: &EntityId, active: bool) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_set_active {
            return Err(OrchestrationError::WorkSlotStore(
                "work slot activation rejected".to_string(),
            ));
        }

        match state.slots.get_mut(id) {
            Some(slot) => {
                slot.is_active = active;
                Ok(())
            }
            None => Err(OrchestrationError::WorkSlotStore(format!(
                "work slot not found: {id}"
            ))),
        }
    }

    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if let Some(limit) = state.fail_after_deletes {
            if state.delete_count >= limit {
                return Err(OrchestrationError::WorkSlotStore(
                    "work slot delete rejected".to_string(),
                ));
            }
        }

        state.delete_count += 1;
        Ok(state.slots.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: &str, lawyer: &str, day: &str) -> WorkSlot {
        WorkSlot {
            id: EntityId::from(id),
            lawyer_id: EntityId::from(lawyer),
            day_of_week: day.to_string(),
            slot: "09:00-10:00".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn add_and_list_for_lawyer() {
        let repo = InMemoryWorkSlotRepository::new();
        repo.add(slot("s-1", "l-1", "Mon")).await.unwrap();
        repo.add(slot("s-2", "l-1", "Tue")).await.unwrap();
        repo.add(slot("s-3", "l-2", "Mon")).await.unwrap();

        let for_l1 = repo.list_for_lawyer(&EntityId::from("l-1")).await.unwrap();
        assert_eq!(for_l1.len(), 2);
    }

    #[tokio::test]
    async fn fail_after_adds_breaks_midway() {
        let repo = InMemoryWorkSlotRepository::new();
        repo.set_fail_after_adds(2);

        repo.add(slot("s-1", "l-1", "Mon")).await.unwrap();
        repo.add(slot("s-2", "l-1", "Tue")).await.unwrap();
        assert!(repo.add(slot("s-3", "l-1", "Wed")).await.is_err());
        assert_eq!(repo.slot_count(), 2);
    }

    #[tokio::test]
    async fn fail_after_deletes_breaks_midway() {
        let repo = InMemoryWorkSlotRepository::new();
        repo.add(slot("s-1", "l-1", "Mon")).await.unwrap();
        repo.add(slot("s-2", "l-1", "Tue")).await.unwrap();
        repo.set_fail_after_deletes(1);

        assert!(repo.delete(&EntityId::from("s-1")).await.unwrap());
        assert!(repo.delete(&EntityId::from("s-2")).await.is_err());
        assert_eq!(repo.slot_count(), 1);
    }

    #[tokio::test]
    async fn set_active_flips_flag() {
        let repo = InMemoryWorkSlotRepository::new();
        repo.add(slot("s-1", "l-1", "Mon")).await.unwrap();

        repo.set_active(&EntityId::from("s-1"), false).await.unwrap();
        assert_eq!(repo.active_count(), 0);

        repo.set_active(&EntityId::from("s-1"), true).await.unwrap();
        assert_eq!(repo.active_count(), 1);
    }

    #[tokio::test]
    async fn set_active_missing_slot_fails() {
        let repo = InMemoryWorkSlotRepository::new();
        assert!(repo.set_active(&EntityId::from("nope"), false).await.is_err());
    }
}
