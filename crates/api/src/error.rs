//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway::GatewayError;
use orchestration::OrchestrationError;
use saga_store::SagaStoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// An active saga already exists for the entity.
    Conflict(String),
    /// Internal server error, including failed saga executions. The
    /// persisted saga record carries the step-level detail.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<SagaStoreError> for ApiError {
    fn from(err: SagaStoreError) -> Self {
        match &err {
            SagaStoreError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            SagaStoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::Validation(_) => ApiError::BadRequest(err.to_string()),
            OrchestrationError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrchestrationError::Store(store_err) => store_err.into(),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(_) => ApiError::BadRequest(err.to_string()),
            GatewayError::Store(store_err) => store_err.into(),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
