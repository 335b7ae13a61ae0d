//! User registration saga.
//!
//! Steps: create the user account, then send a welcome email. The email is
//! best effort; a delivery failure is recorded in the snapshot but never
//! rolls back the account. Compensation (soft-deactivating the account)
//! only runs when a failure lands after the account exists.

use std::sync::Arc;
use std::time::Instant;

use common::EntityId;
use metrics::{counter, histogram};
use saga_store::{SagaRecord, SagaStore};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};
use crate::repositories::{EmailService, User, UserRepository};
use crate::snapshot::CompensationOutcome;

/// Saga type name under which registration records are stored.
pub const SAGA_TYPE: &str = "UserRegistration";

const STEP_CREATE_USER: &str = "create_user";
const STEP_SEND_EMAIL: &str = "send_welcome_email";
/// Reported when a state transition cannot be persisted; the preceding
/// domain step itself succeeded.
const STEP_PERSIST: &str = "persist_state";

/// States a registration saga moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSagaState {
    Started,
    UserCreated,
    EmailSent,
    Completed,
    Failed,
    Compensating,
}

impl UserSagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => SagaRecord::STARTED,
            Self::UserCreated => "UserCreated",
            Self::EmailSent => "EmailSent",
            Self::Completed => SagaRecord::COMPLETED,
            Self::Failed => SagaRecord::FAILED,
            Self::Compensating => SagaRecord::COMPENSATING,
        }
    }
}

impl std::fmt::Display for UserSagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input payload for a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub role: String,
}

/// Snapshot persisted in the saga record's `data` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSagaData {
    request: RegistrationRequest,
    user_id: EntityId,
    completed_steps: Vec<String>,
    email_sent: bool,
    compensation: Vec<CompensationOutcome>,
}

/// Orchestrates user registrations against a saga record store.
pub struct UserRegistrationSaga<S> {
    store: Arc<S>,
    users: Arc<dyn UserRepository>,
    email: Arc<dyn EmailService>,
}

impl<S: SagaStore> UserRegistrationSaga<S> {
    pub fn new(store: Arc<S>, users: Arc<dyn UserRepository>, email: Arc<dyn EmailService>) -> Self {
        Self {
            store,
            users,
            email,
        }
    }

    /// Runs the registration saga to a terminal state.
    ///
    /// The saga record is keyed by email, so a second registration for the
    /// same address is rejected with a conflict while the first is in
    /// flight. Returns the terminal record on success; on a step failure
    /// the record is compensated and persisted as `Failed` before the
    /// error is returned.
    #[tracing::instrument(skip(self, request), fields(saga_type = SAGA_TYPE, email = %request.email))]
    pub async fn execute(&self, request: RegistrationRequest) -> Result<SagaRecord> {
        validate(&request)?;

        counter!("saga_executions_total", "saga_type" => SAGA_TYPE).increment(1);
        let started_at = Instant::now();

        let mut data = UserSagaData {
            user_id: EntityId::generate(),
            request,
            completed_steps: Vec::new(),
            email_sent: false,
            compensation: Vec::new(),
        };

        let entity_id = EntityId::from(data.request.email.clone());
        let record = SagaRecord::started(SAGA_TYPE, entity_id, serde_json::to_value(&data)?);
        let mut record = self.store.create(record).await?;

        tracing::info!(saga_id = %record.id, user_id = %data.user_id, "registration saga started");

        let user = User {
            id: data.user_id.clone(),
            email: data.request.email.clone(),
            full_name: data.request.full_name.clone(),
            phone_number: data.request.phone_number.clone(),
            role: data.request.role.clone(),
            is_active: true,
        };
        if let Err(err) = self.users.add(user).await {
            return Err(self
                .fail(record, data, STEP_CREATE_USER, err.to_string())
                .await);
        }
        data.completed_steps.push(STEP_CREATE_USER.to_string());

        record.set_state(UserSagaState::UserCreated.as_str());
        record = match self.persist(record, &data).await {
            Ok(r) => r,
            Err((r, err)) => {
                return Err(self.fail(r, data, STEP_PERSIST, err.to_string()).await);
            }
        };

        // Best effort: a lost welcome email is not worth losing the account.
        match self
            .email
            .send(
                &data.request.email,
                "Welcome",
                &format!("Hi {}, your account is ready.", data.request.full_name),
            )
            .await
        {
            Ok(()) => {
                data.email_sent = true;
                data.completed_steps.push(STEP_SEND_EMAIL.to_string());
                record.set_state(UserSagaState::EmailSent.as_str());
            }
            Err(err) => {
                tracing::warn!(saga_id = %record.id, error = %err, "welcome email failed, continuing");
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
        tracing::info!(saga_id = %record.id, "registration saga completed");

        Ok(record)
    }

    /// Latest saga record for an email address, if any.
    pub async fn get_state(&self, email: &str) -> Result<Option<SagaRecord>> {
        let entity_id = EntityId::from(email);
        Ok(self.store.get_by_entity(SAGA_TYPE, &entity_id).await?)
    }

    /// Marks the latest saga for the email completed. Idempotent:
    /// completing an already completed record keeps the original
    /// `completed_at`.
    pub async fn complete(&self, email: &str) -> Result<SagaRecord> {
        let mut record = self.require(email).await?;
        record.mark_completed();
        Ok(self.store.update(record).await?)
    }

    /// Operator-driven rollback: undoes whatever the record's snapshot
    /// says this saga did and drives the record to `Failed`.
    pub async fn compensate(&self, email: &str, reason: &str) -> Result<SagaRecord> {
        let record = self.require(email).await?;
        let data: UserSagaData = serde_json::from_value(record.data.clone())?;
        Ok(self.run_compensation(record, data, reason).await)
    }

    /// Manual state correction. The terminal names go through the regular
    /// terminal transitions so their timestamps are stamped.
    pub async fn update_state(
        &self,
        email: &str,
        new_state: &str,
        error_message: Option<&str>,
    ) -> Result<SagaRecord> {
        let mut record = self.require(email).await?;
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

    async fn require(&self, email: &str) -> Result<SagaRecord> {
        self.get_state(email)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound(format!("no saga for {email}")))
    }

    async fn persist(
        &self,
        mut record: SagaRecord,
        data: &UserSagaData,
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

    /// Compensates, persists the terminal `Failed` record, and returns the
    /// error to surface to the caller.
    async fn fail(
        &self,
        record: SagaRecord,
        data: UserSagaData,
        step: &str,
        reason: String,
    ) -> OrchestrationError {
        tracing::error!(saga_id = %record.id, step, %reason, "registration saga failed, compensating");
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
        mut data: UserSagaData,
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
                STEP_CREATE_USER => self.deactivate_user(&data.user_id).await,
                // The welcome email has no compensating action.
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

    /// Soft-deactivates the created account instead of deleting it, so the
    /// email stays reserved and the row stays auditable.
    async fn deactivate_user(&self, user_id: &EntityId) -> CompensationOutcome {
        let user = match self.users.get(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return CompensationOutcome::ok(STEP_CREATE_USER),
            Err(err) => return CompensationOutcome::failed(STEP_CREATE_USER, err.to_string()),
        };

        let mut user = user;
        user.is_active = false;
        match self.users.update(user).await {
            Ok(()) => CompensationOutcome::ok(STEP_CREATE_USER),
            Err(err) => CompensationOutcome::failed(STEP_CREATE_USER, err.to_string()),
        }
    }
}

fn validate(request: &RegistrationRequest) -> Result<()> {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(OrchestrationError::Validation(format!(
            "invalid email: '{}'",
            request.email
        )));
    }
    if request.full_name.trim().is_empty() {
        return Err(OrchestrationError::Validation(
            "full name is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryEmailService, InMemoryUserRepository};
    use saga_store::InMemorySagaStore;

    fn saga() -> (
        UserRegistrationSaga<InMemorySagaStore>,
        Arc<InMemoryUserRepository>,
        Arc<InMemoryEmailService>,
        Arc<InMemorySagaStore>,
    ) {
        let store = Arc::new(InMemorySagaStore::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let email = Arc::new(InMemoryEmailService::new());
        let saga = UserRegistrationSaga::new(store.clone(), users.clone(), email.clone());
        (saga, users, email, store)
    }

    fn request(email: &str) -> RegistrationRequest {
        RegistrationRequest {
            email: email.to_string(),
            full_name: "Jordan Doe".to_string(),
            phone_number: "555-0100".to_string(),
            role: "client".to_string(),
        }
    }

    #[tokio::test]
    async fn happy_path_completes_and_sends_one_email() {
        let (saga, users, email, _) = saga();

        let record = saga.execute(request("a@example.com")).await.unwrap();
        assert_eq!(record.state, SagaRecord::COMPLETED);
        assert!(record.completed_at.is_some());
        assert_eq!(users.user_count(), 1);
        assert_eq!(email.sent_count(), 1);
    }

    #[tokio::test]
    async fn email_failure_still_completes() {
        let (saga, users, email, _) = saga();
        email.set_fail_on_send(true);

        let record = saga.execute(request("a@example.com")).await.unwrap();
        assert_eq!(record.state, SagaRecord::COMPLETED);
        assert_eq!(users.user_count(), 1);
        assert_eq!(email.sent_count(), 0);
        assert_eq!(record.data["email_sent"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn user_store_failure_fails_the_saga() {
        let (saga, users, email, store) = saga();
        users.set_fail_on_add(true);

        let err = saga.execute(request("a@example.com")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::StepFailed { .. }));
        assert_eq!(email.sent_count(), 0);

        let record = store
            .get_by_entity(SAGA_TYPE, &EntityId::from("a@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.state, SagaRecord::FAILED);
        assert!(record.failed_at.is_some());
        assert!(record.error_message.is_some());
    }

    #[tokio::test]
    async fn invalid_email_rejected_before_any_record() {
        let (saga, _, _, store) = saga();

        let err = saga.execute(request("not-an-email")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_registration_for_same_email_conflicts() {
        let (saga, _, _, store) = saga();

        // Simulate an in-flight saga for the same email.
        let active = SagaRecord::started(
            SAGA_TYPE,
            EntityId::from("a@example.com"),
            serde_json::json!({}),
        );
        store.create(active).await.unwrap();

        let err = saga.execute(request("a@example.com")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Store(saga_store::SagaStoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn get_state_returns_latest_record() {
        let (saga, _, _, _) = saga();
        saga.execute(request("a@example.com")).await.unwrap();

        let record = saga.get_state("a@example.com").await.unwrap().unwrap();
        assert_eq!(record.state, SagaRecord::COMPLETED);
        assert!(saga.get_state("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let (saga, _, _, store) = saga();

        let stuck = SagaRecord::started(
            SAGA_TYPE,
            EntityId::from("a@example.com"),
            serde_json::json!({}),
        );
        store.create(stuck).await.unwrap();

        let first = saga.complete("a@example.com").await.unwrap();
        assert_eq!(first.state, SagaRecord::COMPLETED);
        assert!(first.completed_at.is_some());

        let second = saga.complete("a@example.com").await.unwrap();
        assert_eq!(second.completed_at, first.completed_at);

        let err = saga.complete("missing@example.com").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn operator_compensation_deactivates_the_account() {
        let (saga, users, _, store) = saga();

        // A run that stalled after the account write, as left behind by a
        // crash: the snapshot records the step, the record never advanced.
        users
            .add(User {
                id: EntityId::from("u-1"),
                email: "a@example.com".to_string(),
                full_name: "Jordan Doe".to_string(),
                phone_number: "555-0100".to_string(),
                role: "client".to_string(),
                is_active: true,
            })
            .await
            .unwrap();
        let data = serde_json::json!({
            "request": {
                "email": "a@example.com",
                "full_name": "Jordan Doe",
                "phone_number": "555-0100",
                "role": "client"
            },
            "user_id": "u-1",
            "completed_steps": ["create_user"],
            "email_sent": false,
            "compensation": []
        });
        let stuck = SagaRecord::started(SAGA_TYPE, EntityId::from("a@example.com"), data);
        store.create(stuck).await.unwrap();

        let record = saga
            .compensate("a@example.com", "operator rollback")
            .await
            .unwrap();
        assert_eq!(record.state, SagaRecord::FAILED);
        assert_eq!(record.error_message.as_deref(), Some("operator rollback"));
        assert_eq!(users.active_count(), 0);
        assert_eq!(users.user_count(), 1);

        let outcomes = record.data["compensation"].as_array().unwrap();
        assert_eq!(outcomes[0]["step"], serde_json::json!("create_user"));
        assert_eq!(outcomes[0]["succeeded"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn update_state_corrects_a_record_manually() {
        let (saga, _, _, store) = saga();

        let stuck = SagaRecord::started(
            SAGA_TYPE,
            EntityId::from("a@example.com"),
            serde_json::json!({}),
        );
        store.create(stuck).await.unwrap();

        let record = saga
            .update_state("a@example.com", "UserCreated", None)
            .await
            .unwrap();
        assert_eq!(record.state, "UserCreated");

        let record = saga
            .update_state("a@example.com", SagaRecord::FAILED, Some("abandoned"))
            .await
            .unwrap();
        assert_eq!(record.state, SagaRecord::FAILED);
        assert!(record.failed_at.is_some());
        assert_eq!(record.error_message.as_deref(), Some("abandoned"));
    }
}
