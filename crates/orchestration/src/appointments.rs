//! Appointment creation saga.
//!
//! Steps: create the appointment, deactivate the booked work slot, then
//! send a confirmation email. The email is best effort. Compensation
//! reactivates the slot and deletes the appointment.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::EntityId;
use metrics::{counter, histogram};
use saga_store::{SagaRecord, SagaStore};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};
use crate::repositories::{
    Appointment, AppointmentRepository, EmailService, WorkSlotRepository,
};
use crate::snapshot::CompensationOutcome;

/// Saga type name under which appointment records are stored.
pub const SAGA_TYPE: &str = "AppointmentCreation";

const STEP_CREATE_APPOINTMENT: &str = "create_appointment";
const STEP_DEACTIVATE_SLOT: &str = "deactivate_work_slot";
const STEP_SEND_EMAIL: &str = "send_confirmation_email";
/// Reported when a state transition cannot be persisted; the preceding
/// domain step itself succeeded.
const STEP_PERSIST: &str = "persist_state";

/// States an appointment saga moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentSagaState {
    Started,
    WorkSlotDeactivated,
    EmailSent,
    Completed,
    Failed,
    Compensating,
}

impl AppointmentSagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => SagaRecord::STARTED,
            Self::WorkSlotDeactivated => "WorkSlotDeactivated",
            Self::EmailSent => "EmailSent",
            Self::Completed => SagaRecord::COMPLETED,
            Self::Failed => SagaRecord::FAILED,
            Self::Compensating => SagaRecord::COMPENSATING,
        }
    }
}

impl std::fmt::Display for AppointmentSagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input payload for booking an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub user_id: EntityId,
    pub lawyer_id: EntityId,
    pub work_slot_id: EntityId,
    pub scheduled_at: DateTime<Utc>,
    pub specialty: String,
    pub services: String,
    #[serde(default)]
    pub note: String,
    /// Recipient for the confirmation email.
    pub user_email: String,
}

/// Snapshot persisted in the saga record's `data` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppointmentSagaData {
    request: AppointmentRequest,
    appointment_id: EntityId,
    completed_steps: Vec<String>,
    email_sent: bool,
    compensation: Vec<CompensationOutcome>,
}

/// Orchestrates appointment bookings against a saga record store.
pub struct AppointmentSaga<S> {
    store: Arc<S>,
    appointments: Arc<dyn AppointmentRepository>,
    slots: Arc<dyn WorkSlotRepository>,
    email: Arc<dyn EmailService>,
}

impl<S: SagaStore> AppointmentSaga<S> {
    pub fn new(
        store: Arc<S>,
        appointments: Arc<dyn AppointmentRepository>,
        slots: Arc<dyn WorkSlotRepository>,
        email: Arc<dyn EmailService>,
    ) -> Self {
        Self {
            store,
            appointments,
            slots,
            email,
        }
    }

    /// Runs the booking saga to a terminal state, returning the terminal
    /// record. The record is keyed by the freshly minted appointment id.
    ///
    /// Rejects the booking up front when the work slot is missing or
    /// already taken; nothing is written in that case.
    #[tracing::instrument(
        skip(self, request),
        fields(saga_type = SAGA_TYPE, user_id = %request.user_id, work_slot_id = %request.work_slot_id)
    )]
    pub async fn execute(&self, request: AppointmentRequest) -> Result<SagaRecord> {
        let slot = self
            .slots
            .get(&request.work_slot_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::Validation(format!(
                    "work slot not found: {}",
                    request.work_slot_id
                ))
            })?;
        if !slot.is_active {
            return Err(OrchestrationError::Validation(format!(
                "work slot is not available: {}",
                request.work_slot_id
            )));
        }
        if request.user_email.trim().is_empty() || !request.user_email.contains('@') {
            return Err(OrchestrationError::Validation(format!(
                "invalid email: '{}'",
                request.user_email
            )));
        }

        counter!("saga_executions_total", "saga_type" => SAGA_TYPE).increment(1);
        let started_at = Instant::now();

        let mut data = AppointmentSagaData {
            appointment_id: EntityId::generate(),
            request,
            completed_steps: Vec::new(),
            email_sent: false,
            compensation: Vec::new(),
        };

        let record = SagaRecord::started(
            SAGA_TYPE,
            data.appointment_id.clone(),
            serde_json::to_value(&data)?,
        );
        let mut record = self.store.create(record).await?;

        tracing::info!(saga_id = %record.id, appointment_id = %data.appointment_id, "appointment saga started");

        let appointment = Appointment {
            id: data.appointment_id.clone(),
            user_id: data.request.user_id.clone(),
            lawyer_id: data.request.lawyer_id.clone(),
            work_slot_id: data.request.work_slot_id.clone(),
            scheduled_at: data.request.scheduled_at,
            specialty: data.request.specialty.clone(),
            services: data.request.services.clone(),
            note: data.request.note.clone(),
        };
        if let Err(err) = self.appointments.add(appointment).await {
            return Err(self
                .fail(record, data, STEP_CREATE_APPOINTMENT, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_CREATE_APPOINTMENT.to_string());

        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        if let Err(err) = self.slots.set_active(&data.request.work_slot_id, false).await {
            return Err(self
                .fail(record, data, STEP_DEACTIVATE_SLOT, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_DEACTIVATE_SLOT.to_string());

        record.set_state(AppointmentSagaState::WorkSlotDeactivated.as_str());
        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        // Best effort: a lost confirmation email does not void the booking.
        match self
            .email
            .send(
                &data.request.user_email,
                "Appointment confirmed",
                &format!(
                    "Your appointment on {} is confirmed.",
                    data.request.scheduled_at.format("%Y-%m-%d %H:%M")
                ),
            )
            .await
        {
            Ok(()) => {
                data.email_sent = true;
                data.completed_steps.push(STEP_SEND_EMAIL.to_string());
                record.set_state(AppointmentSagaState::EmailSent.as_str());
            }
            Err(err) => {
                tracing::warn!(saga_id = %record.id, error = %err, "confirmation email failed, continuing");
            }
        }

        record.mark_completed();
        let record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, "complete", err.to_string()).await);
            }
        };

        counter!("saga_completed", "saga_type" => SAGA_TYPE).increment(1);
        histogram!("saga_duration_seconds", "saga_type" => SAGA_TYPE)
            .record(started_at.elapsed().as_secs_f64());
        tracing::info!(saga_id = %record.id, "appointment saga completed");

        Ok(record)
    }

    /// Latest saga record for an appointment id, if any.
    pub async fn get_state(&self, appointment_id: &EntityId) -> Result<Option<SagaRecord>> {
        Ok(self.store.get_by_entity(SAGA_TYPE, appointment_id).await?)
    }

    /// Marks the saga for the appointment completed. Idempotent:
    /// completing an already completed record keeps the original
    /// `completed_at`.
    pub async fn complete(&self, appointment_id: &EntityId) -> Result<SagaRecord> {
        let mut record = self.require(appointment_id).await?;
        record.mark_completed();
        Ok(self.store.update(record).await?)
    }

    /// Operator-driven rollback: undoes whatever the record's snapshot
    /// says this saga did and drives the record to `Failed`.
    pub async fn compensate(&self, appointment_id: &EntityId, reason: &str) -> Result<SagaRecord> {
        let record = self.require(appointment_id).await?;
        let data: AppointmentSagaData = serde_json::from_value(record.data.clone())?;
        Ok(self.run_compensation(record, data, reason).await)
    }

    /// Manual state correction. The terminal names go through the regular
    /// terminal transitions so their timestamps are stamped.
    pub async fn update_state(
        &self,
        appointment_id: &EntityId,
        new_state: &str,
        error_message: Option<&str>,
    ) -> Result<SagaRecord> {
        let mut record = self.require(appointment_id).await?;
        match new_state {
            SagaRecord::COMPLETED => record.mark_completed(),
            SagaRecord::FAILED => record.mark_failed(error_message.unwrap_or("manually failed")),
            _ => {
                record.set_state(new_state);
                if let Some(message) = error_message {
                    record.error_message = Some(message.to_string());
                }
            }
        }
        Ok(self.store.update(record).await?)
    }

    async fn require(&self, appointment_id: &EntityId) -> Result<SagaRecord> {
        self.get_state(appointment_id).await?.ok_or_else(|| {
            OrchestrationError::NotFound(format!("no saga for appointment {appointment_id}"))
        })
    }

    async fn persist(
        &self,
        mut record: SagaRecord,
        data: &AppointmentSagaData,
    ) -> std::result::Result<SagaRecord, (SagaRecord, OrchestrationError)> {
        match serde_json::to_value(data) {
            Ok(value) => record.data = value,
            Err(err) => return Err((record, err.into())),
        }
        match self.store.update(record.clone()).await {
            Ok(updated) => Ok(updated),
            Err(err) => Err((record, err.into())),
        }
    }

    /// Compensates, persists the terminal `Failed` record, and returns
    /// the error to surface to the caller.
    async fn fail(
        &self,
        record: SagaRecord,
        data: AppointmentSagaData,
        step: &str,
        reason: String,
    ) -> OrchestrationError {
        tracing::error!(saga_id = %record.id, step, %reason, "appointment saga failed, compensating");
        self.run_compensation(record, data, &reason).await;
        OrchestrationError::StepFailed {
            step: step.to_string(),
            reason,
        }
    }

    /// Compensates completed steps in reverse order and persists the
    /// terminal `Failed` record with every compensation outcome.
    async fn run_compensation(
        &self,
        mut record: SagaRecord,
        mut data: AppointmentSagaData,
        reason: &str,
    ) -> SagaRecord {
        record.mark_compensating(reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        if let Err(err) = self.store.update(record.clone()).await {
            tracing::warn!(saga_id = %record.id, error = %err, "failed to persist compensating state");
        }

        for completed in data.completed_steps.clone().iter().rev() {
            let outcome = match completed.as_str() {
                STEP_DEACTIVATE_SLOT => self.reactivate_slot(&data.request.work_slot_id).await,
                STEP_CREATE_APPOINTMENT => self.remove_appointment(&data.appointment_id).await,
                // The confirmation email has no compensating action.
                _ => continue,
            };
            if let Some(ref err) = outcome.error {
                tracing::warn!(saga_id = %record.id, step = %outcome.step, error = %err, "compensation failed");
            }
            data.compensation.push(outcome);
        }

        record.mark_failed(reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        match self.store.update(record.clone()).await {
            Ok(updated) => record = updated,
            Err(err) => tracing::warn!(error = %err, "failed to persist failed state"),
        }

        counter!("saga_failed", "saga_type" => SAGA_TYPE).increment(1);
        record
    }

    async fn reactivate_slot(&self, slot_id: &EntityId) -> CompensationOutcome {
        match self.slots.set_active(slot_id, true).await {
            Ok(()) => CompensationOutcome::ok(STEP_DEACTIVATE_SLOT),
            Err(err) => CompensationOutcome::failed(STEP_DEACTIVATE_SLOT, err.to_string()),
        }
    }

    async fn remove_appointment(&self, appointment_id: &EntityId) -> CompensationOutcome {
        match self.appointments.delete(appointment_id).await {
            Ok(_) => CompensationOutcome::ok(STEP_CREATE_APPOINTMENT),
            Err(err) => CompensationOutcome::failed(STEP_CREATE_APPOINTMENT, err.to_string()),
        }
    }
}
