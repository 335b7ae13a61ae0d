//! HTTP API server with observability for the saga platform.
//!
//! Exposes saga trigger endpoints, the read-only saga query surface, and
//! operational endpoints (health, Prometheus metrics), with structured
//! logging (tracing) throughout.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use gateway::{
    AppointmentsClient, CrossServiceSaga, InMemoryAppointmentsClient, InMemoryLawyersClient,
    InMemoryUsersClient, LawyersClient, UsersClient,
};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestration::{
    AppointmentSaga, InMemoryAppointmentRepository, InMemoryEmailService,
    InMemoryLawyerProfileRepository, InMemoryUserRepository, InMemoryWorkSlotRepository,
    LawyerSaga, UserRegistrationSaga,
};
use saga_store::{InMemorySagaStore, SagaStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::sagas::AppState;

/// Application state backed entirely by in-memory implementations.
pub type InMemoryAppState = AppState<
    InMemorySagaStore,
    InMemoryUsersClient,
    InMemoryLawyersClient,
    InMemoryAppointmentsClient,
>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, U, L, A>(
    state: Arc<AppState<S, U, L, A>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S, U, L, A>))
        .route("/sagas", get(routes::sagas::list::<S, U, L, A>))
        .route("/sagas/failed", get(routes::sagas::failed::<S, U, L, A>))
        .route(
            "/sagas/incomplete",
            get(routes::sagas::incomplete::<S, U, L, A>),
        )
        .route("/sagas/{id}", get(routes::sagas::get::<S, U, L, A>))
        .route(
            "/sagas/entity/{saga_type}/{entity_id}",
            get(routes::sagas::get_by_entity::<S, U, L, A>),
        )
        .route(
            "/users/register",
            post(routes::workflows::register_user::<S, U, L, A>),
        )
        .route("/lawyers", post(routes::workflows::create_lawyer::<S, U, L, A>))
        .route(
            "/lawyers/{id}",
            put(routes::workflows::update_lawyer::<S, U, L, A>),
        )
        .route(
            "/appointments",
            post(routes::workflows::create_appointment::<S, U, L, A>),
        )
        .route(
            "/gateway/registrations",
            post(routes::workflows::gateway_register::<S, U, L, A>),
        )
        .route(
            "/gateway/appointments",
            post(routes::workflows::gateway_book::<S, U, L, A>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the orchestrators around the given saga store and service
/// clients. The domain repositories run in-process; the work slot
/// repository and email service are shared between the orchestrators that
/// touch them.
pub fn create_state<S, U, L, A>(
    store: Arc<S>,
    users_client: Arc<U>,
    lawyers_client: Arc<L>,
    appointments_client: Arc<A>,
) -> Arc<AppState<S, U, L, A>>
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let users = Arc::new(InMemoryUserRepository::new());
    let profiles = Arc::new(InMemoryLawyerProfileRepository::new());
    let slots = Arc::new(InMemoryWorkSlotRepository::new());
    let appointments = Arc::new(InMemoryAppointmentRepository::new());
    let email = Arc::new(InMemoryEmailService::new());

    Arc::new(AppState {
        registration: UserRegistrationSaga::new(store.clone(), users, email.clone()),
        lawyers: LawyerSaga::new(store.clone(), profiles, slots.clone()),
        appointments: AppointmentSaga::new(store.clone(), appointments, slots, email),
        cross_service: CrossServiceSaga::new(
            store.clone(),
            users_client,
            lawyers_client,
            appointments_client,
        ),
        store,
    })
}

/// Creates the default application state: in-memory saga store, in-memory
/// domain repositories, and in-memory gateway clients.
pub fn create_default_state() -> Arc<InMemoryAppState> {
    create_state(
        Arc::new(InMemorySagaStore::new()),
        Arc::new(InMemoryUsersClient::new()),
        Arc::new(InMemoryLawyersClient::new()),
        Arc::new(InMemoryAppointmentsClient::new()),
    )
}
