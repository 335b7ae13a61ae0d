//! Saga trigger endpoints.
//!
//! Each handler runs a saga to its terminal state and returns the
//! persisted record. A step failure surfaces as 500; the record on the
//! triage queue carries the step and compensation detail.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::EntityId;
use gateway::{
    AppointmentsClient, GatewayAppointmentRequest, GatewayRegistrationRequest, LawyersClient,
    UsersClient,
};
use orchestration::{AppointmentRequest, LawyerProfilePayload, RegistrationRequest};
use saga_store::SagaStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::sagas::{AppState, SagaResponse};

fn default_role() -> String {
    "client".to_string()
}

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Deserialize)]
pub struct LawyerRequest {
    pub user_id: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub specialties: String,
    #[serde(default)]
    pub license_number: String,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub description: String,
    pub price_per_hour: i64,
    #[serde(default)]
    pub image_url: String,
    pub day_of_week: String,
    pub work_time: String,
}

impl LawyerRequest {
    fn into_payload(self) -> LawyerProfilePayload {
        LawyerProfilePayload {
            user_id: EntityId::from(self.user_id),
            bio: self.bio,
            specialties: self.specialties,
            license_number: self.license_number,
            experience_years: self.experience_years,
            description: self.description,
            price_per_hour: self.price_per_hour,
            image_url: self.image_url,
            day_of_week: self.day_of_week,
            work_time: self.work_time,
        }
    }
}

#[derive(Deserialize)]
pub struct BookAppointmentRequest {
    pub user_id: String,
    pub lawyer_id: String,
    pub work_slot_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub services: String,
    #[serde(default)]
    pub note: String,
    pub user_email: String,
}

/// POST /users/register — run the user registration saga.
#[tracing::instrument(skip(state, req))]
pub async fn register_user<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<SagaResponse>), ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let record = state
        .registration
        .execute(RegistrationRequest {
            email: req.email,
            full_name: req.full_name,
            phone_number: req.phone_number,
            role: req.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// POST /lawyers — run the lawyer profile creation saga.
#[tracing::instrument(skip(state, req))]
pub async fn create_lawyer<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Json(req): Json<LawyerRequest>,
) -> Result<(StatusCode, Json<SagaResponse>), ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let record = state.lawyers.create(req.into_payload()).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// PUT /lawyers/:id — run the lawyer profile update saga.
#[tracing::instrument(skip(state, req))]
pub async fn update_lawyer<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Path(id): Path<String>,
    Json(req): Json<LawyerRequest>,
) -> Result<Json<SagaResponse>, ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let record = state
        .lawyers
        .update(EntityId::from(id), req.into_payload())
        .await?;
    Ok(Json(record.into()))
}

/// POST /appointments — run the appointment creation saga.
#[tracing::instrument(skip(state, req))]
pub async fn create_appointment<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Json(req): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<SagaResponse>), ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let record = state
        .appointments
        .execute(AppointmentRequest {
            user_id: EntityId::from(req.user_id),
            lawyer_id: EntityId::from(req.lawyer_id),
            work_slot_id: EntityId::from(req.work_slot_id),
            scheduled_at: req.scheduled_at,
            specialty: req.specialty,
            services: req.services,
            note: req.note,
            user_email: req.user_email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// POST /gateway/registrations — run the cross-service registration saga.
#[tracing::instrument(skip(state, req))]
pub async fn gateway_register<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Json(req): Json<GatewayRegistrationRequest>,
) -> Result<(StatusCode, Json<SagaResponse>), ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let record = state.cross_service.register(req).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// POST /gateway/appointments — run the cross-service booking saga.
#[tracing::instrument(skip(state, req))]
pub async fn gateway_book<S, U, L, A>(
    State(state): State<Arc<AppState<S, U, L, A>>>,
    Json(req): Json<GatewayAppointmentRequest>,
) -> Result<(StatusCode, Json<SagaResponse>), ApiError>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let record = state.cross_service.book_appointment(req).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}
