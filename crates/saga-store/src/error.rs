use common::{EntityId, SagaId};
use thiserror::Error;

/// Errors that can occur when interacting with the saga record store.
#[derive(Debug, Error)]
pub enum SagaStoreError {
    /// An active (non-terminal) record already exists for this
    /// `(saga_type, entity_id)` pair.
    #[error("Active saga of type '{saga_type}' already exists for entity {entity_id}")]
    Conflict {
        saga_type: String,
        entity_id: EntityId,
    },

    /// The record was not found in the store.
    #[error("Saga record not found: {0}")]
    NotFound(SagaId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, SagaStoreError>;
