//! The durable saga record model.

use chrono::{DateTime, Utc};
use common::{EntityId, SagaId};
use serde::{Deserialize, Serialize};

/// The durable unit of truth for one saga execution.
///
/// `state` holds the name of a domain-specific state ("Started",
/// "ProfileCreated", ...). The store only interprets the two terminal
/// names, [`SagaRecord::COMPLETED`] and [`SagaRecord::FAILED`]; everything
/// else is owned by the orchestrator that produced the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaRecord {
    /// Identifies this saga execution, not the business entity.
    pub id: SagaId,
    /// Which orchestrator produced the record ("UserRegistration", ...).
    pub saga_type: String,
    /// The business entity this saga concerns.
    pub entity_id: EntityId,
    /// Current state name.
    pub state: String,
    /// Snapshot of the input payload and intermediate results, sufficient
    /// to audit or resume the saga without re-deriving context.
    pub data: serde_json::Value,
    /// Set only when the saga is failing or has failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl SagaRecord {
    /// Terminal success state name.
    pub const COMPLETED: &'static str = "Completed";
    /// Terminal failure state name.
    pub const FAILED: &'static str = "Failed";
    /// Initial state name shared by all orchestrators.
    pub const STARTED: &'static str = "Started";
    /// State name while compensating actions run.
    pub const COMPENSATING: &'static str = "Compensating";

    /// Creates a new record in the `Started` state.
    ///
    /// Timestamps are stamped here and refreshed by the store on
    /// `create`/`update`.
    pub fn started(
        saga_type: impl Into<String>,
        entity_id: EntityId,
        data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SagaId::new(),
            saga_type: saga_type.into(),
            entity_id,
            state: Self::STARTED.to_string(),
            data,
            error_message: None,
            created_at: now,
            last_updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Returns true if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state == Self::COMPLETED || self.state == Self::FAILED
    }

    /// Returns true if the record is still in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Moves the record to a new intermediate state.
    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = state.into();
    }

    /// Marks the record terminally completed, stamping `completed_at`.
    ///
    /// Idempotent: calling this on an already-completed record keeps the
    /// original `completed_at`.
    pub fn mark_completed(&mut self) {
        if self.state != Self::COMPLETED {
            self.state = Self::COMPLETED.to_string();
            self.completed_at = Some(Utc::now());
        }
    }

    /// Marks the record terminally failed with the triggering error.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = Self::FAILED.to_string();
        self.error_message = Some(reason.into());
        self.failed_at = Some(Utc::now());
    }

    /// Marks the record as compensating after a step failure.
    pub fn mark_compensating(&mut self, reason: impl Into<String>) {
        self.state = Self::COMPENSATING.to_string();
        self.error_message = Some(reason.into());
    }
}
