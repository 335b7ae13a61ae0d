//! Lawyer profile creation and update sagas.
//!
//! Creation writes the profile, then expands the weekly availability into
//! one work slot per day per hour interval. Update snapshots the current
//! profile and slots first, replaces both, and restores the snapshot if a
//! later step fails.

use std::sync::Arc;
use std::time::Instant;

use common::EntityId;
use metrics::{counter, histogram};
use saga_store::{SagaRecord, SagaStore};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};
use crate::repositories::{LawyerProfile, LawyerProfileRepository, WorkSlot, WorkSlotRepository};
use crate::schedule;
use crate::snapshot::CompensationOutcome;

/// Saga type name for profile creation records.
pub const CREATION_SAGA_TYPE: &str = "LawyerCreation";
/// Saga type name for profile update records.
pub const UPDATE_SAGA_TYPE: &str = "LawyerUpdate";

const STEP_CREATE_PROFILE: &str = "create_profile";
const STEP_CREATE_SLOTS: &str = "create_work_slots";
const STEP_UPDATE_PROFILE: &str = "update_profile";
const STEP_REPLACE_SLOTS: &str = "replace_work_slots";
/// Reported when a state transition cannot be persisted; the preceding
/// domain step itself succeeded.
const STEP_PERSIST: &str = "persist_state";

/// States a lawyer saga moves through. Creation and update share the
/// state names; the saga type on the record tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LawyerSagaState {
    Started,
    ProfileCreated,
    WorkSlotsCreated,
    Completed,
    Failed,
    Compensating,
}

impl LawyerSagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => SagaRecord::STARTED,
            Self::ProfileCreated => "ProfileCreated",
            Self::WorkSlotsCreated => "WorkSlotsCreated",
            Self::Completed => SagaRecord::COMPLETED,
            Self::Failed => SagaRecord::FAILED,
            Self::Compensating => SagaRecord::COMPENSATING,
        }
    }
}

impl std::fmt::Display for LawyerSagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input payload for creating or updating a lawyer profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawyerProfilePayload {
    pub user_id: EntityId,
    pub bio: String,
    pub specialties: String,
    pub license_number: String,
    pub experience_years: u32,
    pub description: String,
    pub price_per_hour: i64,
    pub image_url: String,
    /// Comma-separated day names, e.g. `"Mon,Tue,Wed"`.
    pub day_of_week: String,
    /// Comma-separated time ranges, e.g. `"09:00-12:00"`.
    pub work_time: String,
}

/// Snapshot persisted in the saga record's `data` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LawyerSagaData {
    payload: LawyerProfilePayload,
    lawyer_id: EntityId,
    /// Slots created by this saga, in creation order. Filled as each add
    /// succeeds so a mid-step failure still knows what to undo.
    work_slot_ids: Vec<EntityId>,
    /// Update only: the profile as it was before this saga touched it.
    previous_profile: Option<LawyerProfile>,
    /// Update only: the slots as they were before this saga touched them.
    previous_slots: Vec<WorkSlot>,
    /// Update only: ids from `previous_slots` that have actually been
    /// deleted. Filled per slot, so a failure partway through the delete
    /// loop still knows which ones to put back.
    removed_slot_ids: Vec<EntityId>,
    completed_steps: Vec<String>,
    compensation: Vec<CompensationOutcome>,
}

impl LawyerSagaData {
    fn new(payload: LawyerProfilePayload, lawyer_id: EntityId) -> Self {
        Self {
            payload,
            lawyer_id,
            work_slot_ids: Vec::new(),
            previous_profile: None,
            previous_slots: Vec::new(),
            removed_slot_ids: Vec::new(),
            completed_steps: Vec::new(),
            compensation: Vec::new(),
        }
    }
}

/// Orchestrates lawyer profile creation and update against a saga record
/// store.
pub struct LawyerSaga<S> {
    store: Arc<S>,
    profiles: Arc<dyn LawyerProfileRepository>,
    slots: Arc<dyn WorkSlotRepository>,
}

impl<S: SagaStore> LawyerSaga<S> {
    pub fn new(
        store: Arc<S>,
        profiles: Arc<dyn LawyerProfileRepository>,
        slots: Arc<dyn WorkSlotRepository>,
    ) -> Self {
        Self {
            store,
            profiles,
            slots,
        }
    }

    /// Runs the profile creation saga to a terminal state, returning the
    /// terminal record. The record is keyed by the freshly minted lawyer
    /// id; the id is readable from the record's `entity_id`.
    #[tracing::instrument(skip(self, payload), fields(saga_type = CREATION_SAGA_TYPE, user_id = %payload.user_id))]
    pub async fn create(&self, payload: LawyerProfilePayload) -> Result<SagaRecord> {
        validate(&payload)?;

        counter!("saga_executions_total", "saga_type" => CREATION_SAGA_TYPE).increment(1);
        let started_at = Instant::now();

        let mut data = LawyerSagaData::new(payload, EntityId::generate());
        let record = SagaRecord::started(
            CREATION_SAGA_TYPE,
            data.lawyer_id.clone(),
            serde_json::to_value(&data)?,
        );
        let mut record = self.store.create(record).await?;

        tracing::info!(saga_id = %record.id, lawyer_id = %data.lawyer_id, "lawyer creation saga started");

        let profile = build_profile(&data.lawyer_id, &data.payload, data.payload.user_id.clone(), 0.0);
        if let Err(err) = self.profiles.add(profile).await {
            return Err(self
                .fail(record, data, STEP_CREATE_PROFILE, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_CREATE_PROFILE.to_string());

        record.set_state(LawyerSagaState::ProfileCreated.as_str());
        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        if let Err(err) = self.create_slots(&mut data).await {
            return Err(self
                .fail(record, data, STEP_CREATE_SLOTS, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_CREATE_SLOTS.to_string());

        record.set_state(LawyerSagaState::WorkSlotsCreated.as_str());
        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        record.mark_completed();
        let record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, "complete", err.to_string()).await);
            }
        };

        counter!("saga_completed", "saga_type" => CREATION_SAGA_TYPE).increment(1);
        histogram!("saga_duration_seconds", "saga_type" => CREATION_SAGA_TYPE)
            .record(started_at.elapsed().as_secs_f64());
        tracing::info!(saga_id = %record.id, slots = data.work_slot_ids.len(), "lawyer creation saga completed");

        Ok(record)
    }

    /// Runs the profile update saga to a terminal state.
    ///
    /// The existing profile and slots are snapshotted into the saga data
    /// before anything is touched; on failure the snapshot is restored.
    #[tracing::instrument(skip(self, payload), fields(saga_type = UPDATE_SAGA_TYPE, lawyer_id = %lawyer_id))]
    pub async fn update(
        &self,
        lawyer_id: EntityId,
        payload: LawyerProfilePayload,
    ) -> Result<SagaRecord> {
        validate(&payload)?;

        let existing = self
            .profiles
            .get(&lawyer_id)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("lawyer not found: {lawyer_id}")))?;
        let previous_slots = self.slots.list_for_lawyer(&lawyer_id).await?;

        counter!("saga_executions_total", "saga_type" => UPDATE_SAGA_TYPE).increment(1);
        let started_at = Instant::now();

        let mut data = LawyerSagaData::new(payload, lawyer_id.clone());
        data.previous_profile = Some(existing.clone());
        data.previous_slots = previous_slots;

        let record = SagaRecord::started(
            UPDATE_SAGA_TYPE,
            lawyer_id.clone(),
            serde_json::to_value(&data)?,
        );
        let mut record = self.store.create(record).await?;

        tracing::info!(saga_id = %record.id, "lawyer update saga started");

        // The profile keeps its owner and rating; only the editable fields
        // come from the payload.
        let updated = build_profile(&lawyer_id, &data.payload, existing.user_id.clone(), existing.rating);
        if let Err(err) = self.profiles.update(updated).await {
            return Err(self
                .fail(record, data, STEP_UPDATE_PROFILE, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_UPDATE_PROFILE.to_string());

        record.set_state(LawyerSagaState::ProfileCreated.as_str());
        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        for slot in data.previous_slots.clone() {
            if let Err(err) = self.slots.delete(&slot.id).await {
                return Err(self
                    .fail(record, data, STEP_REPLACE_SLOTS, err.to_string())
                    .await);
            }
            data.removed_slot_ids.push(slot.id);
        }

        if let Err(err) = self.create_slots(&mut data).await {
            return Err(self
                .fail(record, data, STEP_REPLACE_SLOTS, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_REPLACE_SLOTS.to_string());

        record.set_state(LawyerSagaState::WorkSlotsCreated.as_str());
        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        record.mark_completed();
        let record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, "complete", err.to_string()).await);
            }
        };

        counter!("saga_completed", "saga_type" => UPDATE_SAGA_TYPE).increment(1);
        histogram!("saga_duration_seconds", "saga_type" => UPDATE_SAGA_TYPE)
            .record(started_at.elapsed().as_secs_f64());
        tracing::info!(saga_id = %record.id, "lawyer update saga completed");

        Ok(record)
    }

    /// Latest saga record for a lawyer, across creation and update runs.
    pub async fn get_state(&self, lawyer_id: &EntityId) -> Result<Option<SagaRecord>> {
        let creation = self
            .store
            .get_by_entity(CREATION_SAGA_TYPE, lawyer_id)
            .await?;
        let update = self.store.get_by_entity(UPDATE_SAGA_TYPE, lawyer_id).await?;
        Ok(match (creation, update) {
            (Some(c), Some(u)) => Some(if u.last_updated_at >= c.last_updated_at {
                u
            } else {
                c
            }),
            (c, u) => c.or(u),
        })
    }

    /// Marks the latest saga for the lawyer completed. Idempotent:
    /// completing an already completed record keeps the original
    /// `completed_at`.
    pub async fn complete(&self, lawyer_id: &EntityId) -> Result<SagaRecord> {
        let mut record = self.require(lawyer_id).await?;
        record.mark_completed();
        Ok(self.store.update(record).await?)
    }

    /// Operator-driven rollback: undoes whatever the record's snapshot
    /// says this saga did and drives the record to `Failed`.
    pub async fn compensate(&self, lawyer_id: &EntityId, reason: &str) -> Result<SagaRecord> {
        let record = self.require(lawyer_id).await?;
        let data: LawyerSagaData = serde_json::from_value(record.data.clone())?;
        Ok(self.run_compensation(record, data, reason).await)
    }

    /// Manual state correction. The terminal names go through the regular
    /// terminal transitions so their timestamps are stamped.
    pub async fn update_state(
        &self,
        lawyer_id: &EntityId,
        new_state: &str,
        error_message: Option<&str>,
    ) -> Result<SagaRecord> {
        let mut record = self.require(lawyer_id).await?;
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

    async fn require(&self, lawyer_id: &EntityId) -> Result<SagaRecord> {
        self.get_state(lawyer_id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound(format!("no saga for lawyer {lawyer_id}")))
    }

    /// Expands the payload's availability and creates one slot per
    /// assignment, recording each created id before moving on.
    async fn create_slots(&self, data: &mut LawyerSagaData) -> Result<()> {
        for assignment in schedule::expand(&data.payload.day_of_week, &data.payload.work_time) {
            let slot = WorkSlot {
                id: EntityId::generate(),
                lawyer_id: data.lawyer_id.clone(),
                day_of_week: assignment.day,
                slot: assignment.slot,
                is_active: true,
            };
            let id = slot.id.clone();
            self.slots.add(slot).await?;
            data.work_slot_ids.push(id);
        }
        Ok(())
    }

    async fn persist(
        &self,
        mut record: SagaRecord,
        data: &LawyerSagaData,
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
        data: LawyerSagaData,
        step: &str,
        reason: String,
    ) -> OrchestrationError {
        tracing::error!(saga_id = %record.id, step, %reason, "lawyer saga failed, compensating");
        self.run_compensation(record, data, &reason).await;
        OrchestrationError::StepFailed {
            step: step.to_string(),
            reason,
        }
    }

    /// Compensates in reverse order of effect and persists the terminal
    /// `Failed` record with every compensation outcome.
    async fn run_compensation(
        &self,
        mut record: SagaRecord,
        mut data: LawyerSagaData,
        reason: &str,
    ) -> SagaRecord {
        let saga_type = record.saga_type.clone();

        record.mark_compensating(reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        if let Err(err) = self.store.update(record.clone()).await {
            tracing::warn!(saga_id = %record.id, error = %err, "failed to persist compensating state");
        }

        let is_update = data.previous_profile.is_some();

        // Slots created by this saga go first, including ones from a step
        // that never finished.
        if !data.work_slot_ids.is_empty() {
            let label = if is_update {
                STEP_REPLACE_SLOTS
            } else {
                STEP_CREATE_SLOTS
            };
            let outcome = self.remove_created_slots(&mut data, label).await;
            data.compensation.push(outcome);
        }

        if !data.removed_slot_ids.is_empty() {
            let outcome = self.restore_previous_slots(&data).await;
            data.compensation.push(outcome);
        }

        let profile_step = if is_update {
            STEP_UPDATE_PROFILE
        } else {
            STEP_CREATE_PROFILE
        };
        if data.completed_steps.iter().any(|s| s == profile_step) {
            let outcome = if is_update {
                self.restore_profile(&data).await
            } else {
                self.remove_profile(&data).await
            };
            data.compensation.push(outcome);
        }

        for outcome in &data.compensation {
            if let Some(ref err) = outcome.error {
                tracing::warn!(saga_id = %record.id, step = %outcome.step, error = %err, "compensation failed");
            }
        }

        record.mark_failed(reason);
        if let Ok(value) = serde_json::to_value(&data) {
            record.data = value;
        }
        match self.store.update(record.clone()).await {
            Ok(updated) => record = updated,
            Err(err) => tracing::warn!(error = %err, "failed to persist failed state"),
        }

        counter!("saga_failed", "saga_type" => saga_type).increment(1);
        record
    }

    async fn remove_created_slots(
        &self,
        data: &mut LawyerSagaData,
        label: &str,
    ) -> CompensationOutcome {
        let mut errors = Vec::new();
        for id in std::mem::take(&mut data.work_slot_ids) {
            if let Err(err) = self.slots.delete(&id).await {
                errors.push(format!("{id}: {err}"));
            }
        }
        if errors.is_empty() {
            CompensationOutcome::ok(label)
        } else {
            CompensationOutcome::failed(label, errors.join("; "))
        }
    }

    /// Re-adds the previous slots that were deleted before the failure.
    /// Slots the delete loop never reached are still in place.
    async fn restore_previous_slots(&self, data: &LawyerSagaData) -> CompensationOutcome {
        let mut errors = Vec::new();
        for slot in &data.previous_slots {
            if !data.removed_slot_ids.contains(&slot.id) {
                continue;
            }
            if let Err(err) = self.slots.add(slot.clone()).await {
                errors.push(format!("{}: {err}", slot.id));
            }
        }
        if errors.is_empty() {
            CompensationOutcome::ok("restore_work_slots")
        } else {
            CompensationOutcome::failed("restore_work_slots", errors.join("; "))
        }
    }

    async fn restore_profile(&self, data: &LawyerSagaData) -> CompensationOutcome {
        let Some(previous) = data.previous_profile.clone() else {
            return CompensationOutcome::ok(STEP_UPDATE_PROFILE);
        };
        match self.profiles.update(previous).await {
            Ok(()) => CompensationOutcome::ok(STEP_UPDATE_PROFILE),
            Err(err) => CompensationOutcome::failed(STEP_UPDATE_PROFILE, err.to_string()),
        }
    }

    async fn remove_profile(&self, data: &LawyerSagaData) -> CompensationOutcome {
        match self.profiles.delete(&data.lawyer_id).await {
            Ok(_) => CompensationOutcome::ok(STEP_CREATE_PROFILE),
            Err(err) => CompensationOutcome::failed(STEP_CREATE_PROFILE, err.to_string()),
        }
    }
}

fn build_profile(
    lawyer_id: &EntityId,
    payload: &LawyerProfilePayload,
    user_id: EntityId,
    rating: f64,
) -> LawyerProfile {
    LawyerProfile {
        id: lawyer_id.clone(),
        user_id,
        bio: payload.bio.clone(),
        specialties: payload.specialties.clone(),
        license_number: payload.license_number.clone(),
        experience_years: payload.experience_years,
        description: payload.description.clone(),
        rating,
        price_per_hour: payload.price_per_hour,
        image_url: payload.image_url.clone(),
        day_of_week: payload.day_of_week.clone(),
        work_time: payload.work_time.clone(),
    }
}

fn validate(payload: &LawyerProfilePayload) -> Result<()> {
    if payload.user_id.as_str().trim().is_empty() {
        return Err(OrchestrationError::Validation(
            "user id is required".to_string(),
        ));
    }
    if payload.price_per_hour < 0 {
        return Err(OrchestrationError::Validation(
            "price per hour must not be negative".to_string(),
        ));
    }
    Ok(())
}
