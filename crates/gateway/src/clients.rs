//! Typed clients for the downstream services.
//!
//! Every mutating call takes an idempotency key; the HTTP clients forward
//! it as the `Idempotency-Key` header so a downstream service can dedupe a
//! retried request. The in-memory clients honor the key the same way and
//! back the gateway tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Header under which idempotency keys travel to downstream services.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Payload for creating a user in the users service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub role: String,
}

/// A user as returned by the users service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: EntityId,
    pub email: String,
}

/// Payload for creating a lawyer profile in the lawyers service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLawyerProfile {
    pub user_id: EntityId,
    pub bio: String,
    pub specialties: String,
    pub license_number: String,
    pub experience_years: u32,
    pub description: String,
    pub price_per_hour: i64,
    pub image_url: String,
    pub day_of_week: String,
    pub work_time: String,
}

/// A lawyer profile as returned by the lawyers service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLawyerProfile {
    pub id: EntityId,
}

/// Payload for creating an appointment in the appointments service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub user_id: EntityId,
    pub lawyer_id: EntityId,
    pub work_slot_id: EntityId,
    pub scheduled_at: DateTime<Utc>,
    pub specialty: String,
    pub services: String,
    #[serde(default)]
    pub note: String,
}

/// An appointment as returned by the appointments service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAppointment {
    pub id: EntityId,
}

/// Client for the users service.
#[async_trait]
pub trait UsersClient: Send + Sync {
    async fn create_user(&self, user: &NewUser, idempotency_key: &str) -> Result<RemoteUser>;
    async fn delete_user(&self, id: &EntityId, idempotency_key: &str) -> Result<()>;
    /// Read-only existence check. `None` when the service reports 404.
    async fn get_user(&self, id: &EntityId) -> Result<Option<RemoteUser>>;
}

/// Client for the lawyers service, which owns profiles.
#[async_trait]
pub trait LawyersClient: Send + Sync {
    async fn create_profile(
        &self,
        profile: &NewLawyerProfile,
        idempotency_key: &str,
    ) -> Result<RemoteLawyerProfile>;
    async fn delete_profile(&self, id: &EntityId, idempotency_key: &str) -> Result<()>;
    /// Read-only existence check. `None` when the service reports 404.
    async fn get_lawyer(&self, id: &EntityId) -> Result<Option<RemoteLawyerProfile>>;
}

/// Client for the appointments service.
#[async_trait]
pub trait AppointmentsClient: Send + Sync {
    async fn create_appointment(
        &self,
        appointment: &NewAppointment,
        idempotency_key: &str,
    ) -> Result<RemoteAppointment>;
    async fn delete_appointment(&self, id: &EntityId, idempotency_key: &str) -> Result<()>;
}

async fn check(service: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::RemoteService {
        service: service.to_string(),
        reason: format!("{status}: {body}"),
    })
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// HTTP client for the users service.
#[derive(Debug, Clone)]
pub struct HttpUsersClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpUsersClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl UsersClient for HttpUsersClient {
    async fn create_user(&self, user: &NewUser, idempotency_key: &str) -> Result<RemoteUser> {
        let response = self
            .http
            .post(join(&self.base_url, "users"))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(user)
            .send()
            .await
            .map_err(|e| GatewayError::remote("users", e))?;
        check("users", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::remote("users", e))
    }

    async fn delete_user(&self, id: &EntityId, idempotency_key: &str) -> Result<()> {
        let response = self
            .http
            .delete(join(&self.base_url, &format!("users/{id}")))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .send()
            .await
            .map_err(|e| GatewayError::remote("users", e))?;
        check("users", response).await?;
        Ok(())
    }

    async fn get_user(&self, id: &EntityId) -> Result<Option<RemoteUser>> {
        let response = self
            .http
            .get(join(&self.base_url, &format!("users/{id}")))
            .send()
            .await
            .map_err(|e| GatewayError::remote("users", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check("users", response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| GatewayError::remote("users", e))
    }
}

/// HTTP client for the lawyers service.
#[derive(Debug, Clone)]
pub struct HttpLawyersClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLawyersClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl LawyersClient for HttpLawyersClient {
    async fn create_profile(
        &self,
        profile: &NewLawyerProfile,
        idempotency_key: &str,
    ) -> Result<RemoteLawyerProfile> {
        let response = self
            .http
            .post(join(&self.base_url, "lawyers"))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(profile)
            .send()
            .await
            .map_err(|e| GatewayError::remote("lawyers", e))?;
        check("lawyers", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::remote("lawyers", e))
    }

    async fn delete_profile(&self, id: &EntityId, idempotency_key: &str) -> Result<()> {
        let response = self
            .http
            .delete(join(&self.base_url, &format!("lawyers/{id}")))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .send()
            .await
            .map_err(|e| GatewayError::remote("lawyers", e))?;
        check("lawyers", response).await?;
        Ok(())
    }

    async fn get_lawyer(&self, id: &EntityId) -> Result<Option<RemoteLawyerProfile>> {
        let response = self
            .http
            .get(join(&self.base_url, &format!("lawyers/{id}")))
            .send()
            .await
            .map_err(|e| GatewayError::remote("lawyers", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check("lawyers", response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| GatewayError::remote("lawyers", e))
    }
}

/// HTTP client for the appointments service.
#[derive(Debug, Clone)]
pub struct HttpAppointmentsClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAppointmentsClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl AppointmentsClient for HttpAppointmentsClient {
    async fn create_appointment(
        &self,
        appointment: &NewAppointment,
        idempotency_key: &str,
    ) -> Result<RemoteAppointment> {
        let response = self
            .http
            .post(join(&self.base_url, "appointments"))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(appointment)
            .send()
            .await
            .map_err(|e| GatewayError::remote("appointments", e))?;
        check("appointments", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::remote("appointments", e))
    }

    async fn delete_appointment(&self, id: &EntityId, idempotency_key: &str) -> Result<()> {
        let response = self
            .http
            .delete(join(&self.base_url, &format!("appointments/{id}")))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .send()
            .await
            .map_err(|e| GatewayError::remote("appointments", e))?;
        check("appointments", response).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryUsersState {
    users: HashMap<EntityId, NewUser>,
    by_key: HashMap<String, EntityId>,
    deleted: Vec<EntityId>,
    fail_on_create: bool,
}

/// In-memory users client for testing. Dedupes on the idempotency key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsersClient {
    state: Arc<RwLock<InMemoryUsersState>>,
}

impl InMemoryUsersClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    pub fn user_count(&self) -> usize {
        self.state.read().unwrap().users.len()
    }

    /// Ids the gateway asked this client to delete, in call order.
    pub fn deleted_users(&self) -> Vec<EntityId> {
        self.state.read().unwrap().deleted.clone()
    }

    /// Places a user under a fixed id, as if created out of band.
    pub fn seed_user(&self, id: EntityId, user: NewUser) {
        self.state.write().unwrap().users.insert(id, user);
    }
}

#[async_trait]
impl UsersClient for InMemoryUsersClient {
    async fn create_user(&self, user: &NewUser, idempotency_key: &str) -> Result<RemoteUser> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) = state.by_key.get(idempotency_key) {
            return Ok(RemoteUser {
                id: existing.clone(),
                email: user.email.clone(),
            });
        }
        if state.fail_on_create {
            return Err(GatewayError::RemoteService {
                service: "users".to_string(),
                reason: "user creation rejected".to_string(),
            });
        }

        let id = EntityId::generate();
        state.users.insert(id.clone(), user.clone());
        state.by_key.insert(idempotency_key.to_string(), id.clone());
        Ok(RemoteUser {
            id,
            email: user.email.clone(),
        })
    }

    async fn delete_user(&self, id: &EntityId, _idempotency_key: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.users.remove(id);
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn get_user(&self, id: &EntityId) -> Result<Option<RemoteUser>> {
        let state = self.state.read().unwrap();
        Ok(state.users.get(id).map(|user| RemoteUser {
            id: id.clone(),
            email: user.email.clone(),
        }))
    }
}

#[derive(Debug, Default)]
struct InMemoryLawyersState {
    profiles: HashMap<EntityId, NewLawyerProfile>,
    by_key: HashMap<String, EntityId>,
    deleted: Vec<EntityId>,
    fail_on_create_profile: bool,
}

/// In-memory lawyers client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLawyersClient {
    state: Arc<RwLock<InMemoryLawyersState>>,
}

impl InMemoryLawyersClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create_profile(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_profile = fail;
    }

    pub fn profile_count(&self) -> usize {
        self.state.read().unwrap().profiles.len()
    }

    pub fn deleted_profiles(&self) -> Vec<EntityId> {
        self.state.read().unwrap().deleted.clone()
    }

    /// Returns a stored profile by id.
    pub fn profile(&self, id: &EntityId) -> Option<NewLawyerProfile> {
        self.state.read().unwrap().profiles.get(id).cloned()
    }

    /// Places a profile under a fixed id, as if created out of band.
    pub fn seed_profile(&self, id: EntityId, profile: NewLawyerProfile) {
        self.state.write().unwrap().profiles.insert(id, profile);
    }
}

#[async_trait]
impl LawyersClient for InMemoryLawyersClient {
    async fn create_profile(
        &self,
        profile: &NewLawyerProfile,
        idempotency_key: &str,
    ) -> Result<RemoteLawyerProfile> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) = state.by_key.get(idempotency_key) {
            return Ok(RemoteLawyerProfile {
                id: existing.clone(),
            });
        }
        if state.fail_on_create_profile {
            return Err(GatewayError::RemoteService {
                service: "lawyers".to_string(),
                reason: "profile creation rejected".to_string(),
            });
        }

        let id = EntityId::generate();
        state.profiles.insert(id.clone(), profile.clone());
        state.by_key.insert(idempotency_key.to_string(), id.clone());
        Ok(RemoteLawyerProfile { id })
    }

    async fn delete_profile(&self, id: &EntityId, _idempotency_key: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.profiles.remove(id);
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn get_lawyer(&self, id: &EntityId) -> Result<Option<RemoteLawyerProfile>> {
        let state = self.state.read().unwrap();
        Ok(state
            .profiles
            .contains_key(id)
            .then(|| RemoteLawyerProfile { id: id.clone() }))
    }
}

#[derive(Debug, Default)]
struct InMemoryAppointmentsState {
    appointments: HashMap<EntityId, NewAppointment>,
    by_key: HashMap<String, EntityId>,
    deleted: Vec<EntityId>,
    fail_on_create: bool,
}

/// In-memory appointments client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAppointmentsClient {
    state: Arc<RwLock<InMemoryAppointmentsState>>,
}

impl InMemoryAppointmentsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    pub fn appointment_count(&self) -> usize {
        self.state.read().unwrap().appointments.len()
    }

    pub fn deleted_appointments(&self) -> Vec<EntityId> {
        self.state.read().unwrap().deleted.clone()
    }
}

#[async_trait]
impl AppointmentsClient for InMemoryAppointmentsClient {
    async fn create_appointment(
        &self,
        appointment: &NewAppointment,
        idempotency_key: &str,
    ) -> Result<RemoteAppointment> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) = state.by_key.get(idempotency_key) {
            return Ok(RemoteAppointment {
                id: existing.clone(),
            });
        }
        if state.fail_on_create {
            return Err(GatewayError::RemoteService {
                service: "appointments".to_string(),
                reason: "appointment creation rejected".to_string(),
            });
        }

        let id = EntityId::generate();
        state.appointments.insert(id.clone(), appointment.clone());
        state.by_key.insert(idempotency_key.to_string(), id.clone());
        Ok(RemoteAppointment { id })
    }

    async fn delete_appointment(&self, id: &EntityId, _idempotency_key: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.appointments.remove(id);
        state.deleted.push(id.clone());
        Ok(())
    }
}
