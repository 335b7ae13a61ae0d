//! Read-only saga query endpoints.
//!
//! These handlers never mutate a record; they are the operational window
//! into what the orchestrators persisted.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{EntityId, SagaId};
use gateway::{AppointmentsClient, CrossServiceSaga, LawyersClient, UsersClient};
use orchestration::{AppointmentSaga, LawyerSaga, UserRegistrationSaga};
use saga_store::{SagaRecord, SagaStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStore, U, L, A> {
    pub store: Arc<S>,
    pub registration: UserRegistrationSaga<S>,
    pub lawyers: LawyerSaga<S>,
    pub appointments: AppointmentSaga<S>,
    pub cross_service: CrossServiceSaga<S, U, L, A>,
}

/// A saga record as returned by the API.
#[derive(Serialize)]
pub struct SagaResponse {
    pub id: String,
    pub saga_type: String,
    pub entity_id: String,
    pub state: String,
    pub data: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: String,
    pub last_updated_at: String,
    pub completed_at: Option<String>,
    pub failed_at: Option<String>,
}

impl From<SagaRecord> for SagaResponse {
    fn from(record: SagaRecord) -> Self {
        Self {
            id: record.id.to_string(),
            saga_type: record.saga_type,
            entity_id: record.entity_id.to_string(),
            state: record.state,
            data: record.data,
            error_message: record.error_message,
            created_at: record.created_at.to_rfc3339(),
            last_updated_at: record.last_updated_at.to_rfc3339(),
            completed_at: record.completed_at.map(|t| t.to_rfc3339()),
            failed_at: record.failed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub saga_type: Option<String>,
}

/// GET /sagas/:id — load one saga record by execution id.
#[tracing::instrument(skip(state))]
pub async fn get<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let saga_id = parse_saga_id(&id)?;
    let record = state
        .store
        .get(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))?;
    Ok(Json(record.into()))
}

/// GET /sagas/entity/:saga_type/:entity_id — latest record for an entity.
#[tracing::instrument(skip(state))]
pub async fn get_by_entity<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Path((saga_type, entity_id)): Path<(String, String)>,
) -> Result<Json<SagaResponse>, ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let entity = EntityId::from(entity_id.clone());
    let record = state
        .store
        .get_by_entity(&saga_type, &entity)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No {saga_type} saga found for entity {entity_id}"))
        })?;
    Ok(Json(record.into()))
}

/// GET /sagas — all records, optionally filtered by `?saga_type=`.
#[tracing::instrument(skip(state))]
pub async fn list<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SagaResponse>>, ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let records = match params.saga_type.as_deref() {
        Some(saga_type) => state.store.list_by_type(saga_type).await?,
        None => state.store.list_all().await?,
    };
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// GET /sagas/failed — the operational triage queue.
#[tracing::instrument(skip(state))]
pub async fn failed<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
) -> Result<Json<Vec<SagaResponse>>, ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let records = state.store.list_failed().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// GET /sagas/incomplete — records stuck short of a terminal state.
#[tracing::instrument(skip(state))]
pub async fn incomplete<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
) -> Result<Json<Vec<SagaResponse>>, ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let records = state.store.list_incomplete().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

fn parse_saga_id(id: &str) -> Result<SagaId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid saga id: {e}")))?;
    Ok(SagaId::from_uuid(uuid))
}
