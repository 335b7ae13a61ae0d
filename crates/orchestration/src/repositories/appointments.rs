//! Appointment repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;

/// A booked consultation between a user and a lawyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: EntityId,
    pub user_id: EntityId,
    pub lawyer_id: EntityId,
    pub work_slot_id: EntityId,
    pub scheduled_at: DateTime<Utc>,
    pub specialty: String,
    pub services: String,
    pub note: String,
}

/// Trait for appointment storage.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Persists a new appointment; the id is assigned by the caller.
    async fn add(&self, appointment: Appointment) -> Result<(), OrchestrationError>;

    /// Loads an appointment by id.
    async fn get(&self, id: &EntityId) -> Result<Option<Appointment>, OrchestrationError>;

    /// Removes an appointment. Returns false if none existed.
    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError>;
}

#[derive(Debug, Default)]
struct InMemoryAppointmentState {
    appointments: HashMap<EntityId, Appointment>,
    fail_on_add: bool,
}

/// In-memory appointment repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAppointmentRepository {
    state: Arc<RwLock<InMemoryAppointmentState>>,
}

impl InMemoryAppointmentRepository {
    /// Creates a new in-memory appointment repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail on the next add call.
    pub fn set_fail_on_add(&self, fail: bool) {
        self.state.write().unwrap().fail_on_add = fail;
    }

    /// Returns the number of stored appointments.
    pub fn appointment_count(&self) -> usize {
        self.state.read().unwrap().appointments.len()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn add(&self, appointment: Appointment) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_add {
            return Err(OrchestrationError::AppointmentStore(
                "appointment insert rejected".to_string(),
            ));
        }

        state
            .appointments
            .insert(appointment.id.clone(), appointment);
        Ok(())
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Appointment>, OrchestrationError> {
        Ok(self.state.read().unwrap().appointments.get(id).cloned())
    }

    async fn delete(&self, id: &EntityId) -> Result<bool, OrchestrationError> {
        Ok(self
            .state
            .write()
            .unwrap()
            .appointments
            .remove(id)
            .is_some())
    }
}
