//! Orchestration error types.

use saga_store::SagaStoreError;
use thiserror::Error;

/// Errors that can occur during saga orchestration.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Input payload is malformed or references an entity that does not
    /// exist. Surfaced before any step mutates state.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No saga record exists for the requested entity.
    #[error("Saga not found: {0}")]
    NotFound(String),

    /// A forward step failed after the saga started; the saga has been
    /// compensated and persisted as `Failed` before this error is returned.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// User store error.
    #[error("User store error: {0}")]
    UserStore(String),

    /// Lawyer profile store error.
    #[error("Lawyer store error: {0}")]
    LawyerStore(String),

    /// Work slot store error.
    #[error("Work slot store error: {0}")]
    WorkSlotStore(String),

    /// Appointment store error.
    #[error("Appointment store error: {0}")]
    AppointmentStore(String),

    /// Notification delivery error.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Saga record store error (including start conflicts).
    #[error(transparent)]
    Store(#[from] SagaStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for orchestration results.
pub type Result<T> = std::result::Result<T, OrchestrationError>;
