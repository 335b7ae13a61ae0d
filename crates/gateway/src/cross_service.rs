//! Cross-service sagas coordinated by the gateway.
//!
//! Registration creates the account in the users service and, for the
//! lawyer role, a starter profile in the lawyers service. Booking checks
//! that the user and lawyer exist before writing the appointment to the
//! appointments service. A failed later step undoes the earlier remote
//! writes before the saga is persisted as `Failed`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::EntityId;
use metrics::{counter, histogram};
use orchestration::CompensationOutcome;
use saga_store::{SagaRecord, SagaStore};
use serde::{Deserialize, Serialize};

use crate::clients::{
    AppointmentsClient, LawyersClient, NewAppointment, NewLawyerProfile, NewUser, UsersClient,
};
use crate::error::{GatewayError, Result};

/// Saga type name for gateway lawyer onboarding records.
pub const REGISTRATION_SAGA_TYPE: &str = "CrossServiceRegistration";
/// Saga type name for gateway booking records.
pub const APPOINTMENT_SAGA_TYPE: &str = "CrossServiceAppointment";

const STEP_CREATE_USER: &str = "create_user";
const STEP_CREATE_PROFILE: &str = "create_lawyer_profile";
const STEP_VALIDATE_USER: &str = "validate_user";
const STEP_VALIDATE_LAWYER: &str = "validate_lawyer";
const STEP_CREATE_APPOINTMENT: &str = "create_appointment";
/// Reported when a state transition cannot be persisted; the preceding
/// remote step itself succeeded.
const STEP_PERSIST: &str = "persist_state";

const STATE_USER_CREATED: &str = "UserCreated";
const STATE_PROFILE_CREATED: &str = "LawyerProfileCreated";
const STATE_USER_VALIDATED: &str = "UserValidated";
const STATE_LAWYER_VALIDATED: &str = "LawyerValidated";
const STATE_APPOINTMENT_CREATED: &str = "AppointmentCreated";

const LAWYER_ROLE: &str = "lawyer";

// Starter profile written during onboarding; the lawyer fills in the real
// details afterwards through the lawyers service.
const DEFAULT_LAWYER_BIO: &str = "New lawyer profile";
const DEFAULT_SPECIALTY: &str = "General Practice";
const DEFAULT_LICENSE: &str = "TBD";
const DEFAULT_PRICE_PER_HOUR: i64 = 500_000;
const DEFAULT_DAYS: &str = "Mon,Tue,Wed,Thu,Fri";
const DEFAULT_WORK_TIME: &str = "09:00-17:00";

fn default_role() -> String {
    "client".to_string()
}

/// Input payload for registering an account through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRegistrationRequest {
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    #[serde(default = "default_role")]
    pub role: String,
}

/// Input payload for booking an appointment through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAppointmentRequest {
    pub user_id: EntityId,
    pub lawyer_id: EntityId,
    pub work_slot_id: EntityId,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub services: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistrationSagaData {
    request: GatewayRegistrationRequest,
    user_id: Option<EntityId>,
    lawyer_id: Option<EntityId>,
    completed_steps: Vec<String>,
    compensation: Vec<CompensationOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookingSagaData {
    request: GatewayAppointmentRequest,
    appointment_id: Option<EntityId>,
    completed_steps: Vec<String>,
    compensation: Vec<CompensationOutcome>,
}

/// Orchestrates sagas that span the downstream services.
pub struct CrossServiceSaga<S, U, L, A> {
    store: Arc<S>,
    users: Arc<U>,
    lawyers: Arc<L>,
    appointments: Arc<A>,
}

impl<S, U, L, A> CrossServiceSaga<S, U, L, A>
where
    S: SagaStore,
    U: UsersClient,
    L: LawyersClient,
    A: AppointmentsClient,
{
    pub fn new(store: Arc<S>, users: Arc<U>, lawyers: Arc<L>, appointments: Arc<A>) -> Self {
        Self {
            store,
            users,
            lawyers,
            appointments,
        }
    }

    /// Registers an account in the users service. When the requested role
    /// is lawyer, a starter profile follows in the lawyers service. Keyed
    /// by email, so a second registration for the same address conflicts
    /// while one is in flight.
    #[tracing::instrument(skip(self, request), fields(saga_type = REGISTRATION_SAGA_TYPE, email = %request.email, role = %request.role))]
    pub async fn register(&self, request: GatewayRegistrationRequest) -> Result<SagaRecord> {
        if request.email.trim().is_empty() || !request.email.contains('@') {
            return Err(GatewayError::Validation(format!(
                "invalid email: '{}'",
                request.email
            )));
        }

        counter!("saga_executions_total", "saga_type" => REGISTRATION_SAGA_TYPE).increment(1);
        let started_at = Instant::now();

        let mut data = RegistrationSagaData {
            request,
            user_id: None,
            lawyer_id: None,
            completed_steps: Vec::new(),
            compensation: Vec::new(),
        };

        let entity_id = EntityId::from(data.request.email.clone());
        let record = SagaRecord::started(
            REGISTRATION_SAGA_TYPE,
            entity_id,
            serde_json::to_value(&data)?,
        );
        let mut record = self.store.create(record).await?;

        tracing::info!(saga_id = %record.id, "registration saga started");

        let new_user = NewUser {
            email: data.request.email.clone(),
            full_name: data.request.full_name.clone(),
            phone_number: data.request.phone_number.clone(),
            role: data.request.role.clone(),
        };
        let created = match self
            .users
            .create_user(&new_user, &idempotency_key(&record, STEP_CREATE_USER))
            .await
        {
            Ok(user) => user,
            Err(err) => {
                return Err(self
                    .fail_registration(record, data, STEP_CREATE_USER, err.to_string())
                    .await);
            }
        };
        data.user_id = Some(created.id.clone());
        data.completed_steps.push(STEP_CREATE_USER.to_string());

        record.set_state(STATE_USER_CREATED);
        record = match self.persist(record, serde_json::to_value(&data)).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self
                    .fail_registration(r, data, STEP_PERSIST, err.to_string())
                    .await);
            }
        };

        if data.request.role.eq_ignore_ascii_case(LAWYER_ROLE) {
            let profile = NewLawyerProfile {
                user_id: created.id,
                bio: DEFAULT_LAWYER_BIO.to_string(),
                specialties: DEFAULT_SPECIALTY.to_string(),
                license_number: DEFAULT_LICENSE.to_string(),
                experience_years: 0,
                description: String::new(),
                price_per_hour: DEFAULT_PRICE_PER_HOUR,
                image_url: String::new(),
                day_of_week: DEFAULT_DAYS.to_string(),
                work_time: DEFAULT_WORK_TIME.to_string(),
            };
            let created_profile = match self
                .lawyers
                .create_profile(&profile, &idempotency_key(&record, STEP_CREATE_PROFILE))
                .await
            {
                Ok(profile) => profile,
                Err(err) => {
                    return Err(self
                        .fail_registration(record, data, STEP_CREATE_PROFILE, err.to_string())
                        .await);
                }
            };
            data.lawyer_id = Some(created_profile.id);
            data.completed_steps.push(STEP_CREATE_PROFILE.to_string());

            record.set_state(STATE_PROFILE_CREATED);
            record = match self.persist(record, serde_json::to_value(&data)).await {
                Ok(r) => r,
                Err((r, err)) => {
                    return Err(self
                        .fail_registration(r, data, STEP_PERSIST, err.to_string())
                        .await);
                }
            };
        }

        record.mark_completed();
        let record = match self.persist(record, serde_json::to_value(&data)).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self
                    .fail_registration(r, data, "complete", err.to_string())
                    .await);
            }
        };

        counter!("saga_completed", "saga_type" => REGISTRATION_SAGA_TYPE).increment(1);
        histogram!("saga_duration_seconds", "saga_type" => REGISTRATION_SAGA_TYPE)
            .record(started_at.elapsed().as_secs_f64());
        tracing::info!(saga_id = %record.id, "registration saga completed");

        Ok(record)
    }

    /// Books an appointment: checks that the user and the lawyer exist,
    /// then writes the appointment to the appointments service. The
    /// validation reads need no compensation; a create failure after both
    /// checks leaves nothing to undo. Keyed by the user/lawyer/time
    /// triple, so the same booking cannot run twice concurrently.
    #[tracing::instrument(
        skip(self, request),
        fields(saga_type = APPOINTMENT_SAGA_TYPE, user_id = %request.user_id, lawyer_id = %request.lawyer_id)
    )]
    pub async fn book_appointment(&self, request: GatewayAppointmentRequest) -> Result<SagaRecord> {
        for (field, value) in [
            ("user_id", request.user_id.as_str()),
            ("lawyer_id", request.lawyer_id.as_str()),
            ("work_slot_id", request.work_slot_id.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::Validation(format!("{field} is required")));
            }
        }

        counter!("saga_executions_total", "saga_type" => APPOINTMENT_SAGA_TYPE).increment(1);
        let started_at = Instant::now();

        let entity_id = EntityId::from(format!(
            "{}/{}/{}",
            request.user_id,
            request.lawyer_id,
            request.scheduled_at.to_rfc3339()
        ));

        let mut data = BookingSagaData {
            request,
            appointment_id: None,
            completed_steps: Vec::new(),
            compensation: Vec::new(),
        };

        let record = SagaRecord::started(
            APPOINTMENT_SAGA_TYPE,
            entity_id,
            serde_json::to_value(&data)?,
        );
        let mut record = self.store.create(record).await?;

        tracing::info!(saga_id = %record.id, "booking saga started");

        match self.users.get_user(&data.request.user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let reason = format!("user {} not found", data.request.user_id);
                return Err(self
                    .fail_booking(record, data, STEP_VALIDATE_USER, reason)
                    .await);
            }
            Err(err) => {
                return Err(self
                    .fail_booking(record, data, STEP_VALIDATE_USER, err.to_string())
                    .await);
            }
        }
        data.completed_steps.push(STEP_VALIDATE_USER.to_string());

        record.set_state(STATE_USER_VALIDATED);
        record = match self.persist(record, serde_json::to_value(&data)).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self
                    .fail_booking(r, data, STEP_PERSIST, err.to_string())
                    .await);
            }
        };

        match self.lawyers.get_lawyer(&data.request.lawyer_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let reason = format!("lawyer {} not found", data.request.lawyer_id);
                return Err(self
                    .fail_booking(record, data, STEP_VALIDATE_LAWYER, reason)
                    .await);
            }
            Err(err) => {
                return Err(self
                    .fail_booking(record, data, STEP_VALIDATE_LAWYER, err.to_string())
                    .await);
            }
        }
        data.completed_steps.push(STEP_VALIDATE_LAWYER.to_string());

        record.set_state(STATE_LAWYER_VALIDATED);
        record = match self.persist(record, serde_json::to_value(&data)).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self
                    .fail_booking(r, data, STEP_PERSIST, err.to_string())
                    .await);
            }
        };

        let new_appointment = NewAppointment {
            user_id: data.request.user_id.clone(),
            lawyer_id: data.request.lawyer_id.clone(),
            work_slot_id: data.request.work_slot_id.clone(),
            scheduled_at: data.request.scheduled_at,
            specialty: data.request.specialty.clone(),
            services: data.request.services.clone(),
            note: data.request.note.clone(),
        };
        let created = match self
            .appointments
            .create_appointment(
                &new_appointment,
                &idempotency_key(&record, STEP_CREATE_APPOINTMENT),
            )
            .await
        {
            Ok(appointment) => appointment,
            Err(err) => {
                return Err(self
                    .fail_booking(record, data, STEP_CREATE_APPOINTMENT, err.to_string())
                    .await);
            }
        };
        data.appointment_id = Some(created.id);
        data.completed_steps.push(STEP_CREATE_APPOINTMENT.to_string());

        record.set_state(STATE_APPOINTMENT_CREATED);
        record = match self.persist(record, serde_json::to_value(&data)).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self
                    .fail_booking(r, data, STEP_PERSIST, err.to_string())
                    .await);
            }
        };

        record.mark_completed();
        let record = match self.persist(record, serde_json::to_value(&data)).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail_booking(r, data, "complete", err.to_string()).await);
            }
        };

        counter!("saga_completed", "saga_type" => APPOINTMENT_SAGA_TYPE).increment(1);
        histogram!("saga_duration_seconds", "saga_type" => APPOINTMENT_SAGA_TYPE)
            .record(started_at.elapsed().as_secs_f64());
        tracing::info!(saga_id = %record.id, "booking saga completed");

        Ok(record)
    }

    async fn persist(
        &self,
        mut record: SagaRecord,
        data: serde_json::Result<serde_json::Value>,
    ) -> std::result::Result<SagaRecord, (SagaRecord, GatewayError)> {
        match data {
            Ok(value) => record.data = value,
            Err(err) => return Err((record, err.into())),
        }
        match self.store.update(record.clone()).await {
            Ok(updated) => Ok(updated),
            Err(err) => Err((record, err.into())),
        }
    }

    async fn fail_registration(
        &self,
        mut record: SagaRecord,
        mut data: RegistrationSagaData,
        step: &str,
        reason: String,
    ) -> GatewayError {
        tracing::error!(saga_id = %record.id, step, %reason, "registration saga failed, compensating");

        record.mark_compensating(&reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        if let Err(err) = self.store.update(record.clone()).await {
            tracing::warn!(saga_id = %record.id, error = %err, "failed to persist compensating state");
        }

        for completed in data.completed_steps.clone().iter().rev() {
            let outcome = match completed.as_str() {
                STEP_CREATE_PROFILE => {
                    self.undo_create_profile(&record, data.lawyer_id.as_ref())
                        .await
                }
                STEP_CREATE_USER => self.undo_create_user(&record, data.user_id.as_ref()).await,
                _ => continue,
            };
            if let Some(ref err) = outcome.error {
                tracing::warn!(saga_id = %record.id, step = %outcome.step, error = %err, "compensation failed");
            }
            data.compensation.push(outcome);
        }

        record.mark_failed(&reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        if let Err(err) = self.store.update(record).await {
            tracing::warn!(error = %err, "failed to persist failed state");
        }

        counter!("saga_failed", "saga_type" => REGISTRATION_SAGA_TYPE).increment(1);
        GatewayError::StepFailed {
            step: step.to_string(),
            reason,
        }
    }

    async fn fail_booking(
        &self,
        mut record: SagaRecord,
        mut data: BookingSagaData,
        step: &str,
        reason: String,
    ) -> GatewayError {
        tracing::error!(saga_id = %record.id, step, %reason, "booking saga failed, compensating");

        record.mark_compensating(&reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        if let Err(err) = self.store.update(record.clone()).await {
            tracing::warn!(saga_id = %record.id, error = %err, "failed to persist compensating state");
        }

        // Validation reads mutate nothing; only the appointment write can
        // need undoing, and only when a later persist failed.
        for completed in data.completed_steps.clone().iter().rev() {
            let outcome = match completed.as_str() {
                STEP_CREATE_APPOINTMENT => {
                    self.undo_create_appointment(&record, data.appointment_id.as_ref())
                        .await
                }
                _ => continue,
            };
            if let Some(ref err) = outcome.error {
                tracing::warn!(saga_id = %record.id, step = %outcome.step, error = %err, "compensation failed");
            }
            data.compensation.push(outcome);
        }

        record.mark_failed(&reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        if let Err(err) = self.store.update(record).await {
            tracing::warn!(error = %err, "failed to persist failed state");
        }

        counter!("saga_failed", "saga_type" => APPOINTMENT_SAGA_TYPE).increment(1);
        GatewayError::StepFailed {
            step: step.to_string(),
            reason,
        }
    }

    async fn undo_create_user(
        &self,
        record: &SagaRecord,
        user_id: Option<&EntityId>,
    ) -> CompensationOutcome {
        let Some(user_id) = user_id else {
            return CompensationOutcome::ok(STEP_CREATE_USER);
        };
        let key = compensation_key(record, STEP_CREATE_USER);
        match self.users.delete_user(user_id, &key).await {
            Ok(()) => CompensationOutcome::ok(STEP_CREATE_USER),
            Err(err) => CompensationOutcome::failed(STEP_CREATE_USER, err.to_string()),
        }
    }

    async fn undo_create_profile(
        &self,
        record: &SagaRecord,
        lawyer_id: Option<&EntityId>,
    ) -> CompensationOutcome {
        let Some(lawyer_id) = lawyer_id else {
            return CompensationOutcome::ok(STEP_CREATE_PROFILE);
        };
        let key = compensation_key(record, STEP_CREATE_PROFILE);
        match self.lawyers.delete_profile(lawyer_id, &key).await {
            Ok(()) => CompensationOutcome::ok(STEP_CREATE_PROFILE),
            Err(err) => CompensationOutcome::failed(STEP_CREATE_PROFILE, err.to_string()),
        }
    }

    async fn undo_create_appointment(
        &self,
        record: &SagaRecord,
        appointment_id: Option<&EntityId>,
    ) -> CompensationOutcome {
        let Some(appointment_id) = appointment_id else {
            return CompensationOutcome::ok(STEP_CREATE_APPOINTMENT);
        };
        let key = compensation_key(record, STEP_CREATE_APPOINTMENT);
        match self.appointments.delete_appointment(appointment_id, &key).await {
            Ok(()) => CompensationOutcome::ok(STEP_CREATE_APPOINTMENT),
            Err(err) => CompensationOutcome::failed(STEP_CREATE_APPOINTMENT, err.to_string()),
        }
    }
}

/// One key per saga and step. A retried step repeats the key, so the
/// downstream service can recognize the duplicate.
fn idempotency_key(record: &SagaRecord, step: &str) -> String {
    format!("{}:{}", record.id, step)
}

/// Compensating calls get their own key namespace so an undo is never
/// deduped against the forward call it is undoing.
fn compensation_key(record: &SagaRecord, step: &str) -> String {
    format!("{}:undo:{}", record.id, step)
}
