//! Gateway error types.

use saga_store::SagaStoreError;
use thiserror::Error;

/// Errors that can occur while orchestrating cross-service sagas.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Input payload is malformed. Surfaced before any step runs.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A forward step failed after the saga started; the saga has been
    /// compensated and persisted as `Failed` before this error is returned.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A downstream service rejected a call or could not be reached.
    #[error("Service '{service}' call failed: {reason}")]
    RemoteService { service: String, reason: String },

    /// Saga record store error (including start conflicts).
    #[error(transparent)]
    Store(#[from] SagaStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Wraps a reqwest failure as a remote service error.
    pub fn remote(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::RemoteService {
            service: service.into(),
            reason: err.to_string(),
        }
    }
}

/// Convenience type alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;
