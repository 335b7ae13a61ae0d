//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::EntityId;
use gateway::{
    InMemoryAppointmentsClient, InMemoryLawyersClient, InMemoryUsersClient, NewLawyerProfile,
    NewUser,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::{InMemorySagaStore, SagaRecord, SagaStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: Arc<InMemorySagaStore>,
    lawyers_client: Arc<InMemoryLawyersClient>,
    users_client: Arc<InMemoryUsersClient>,
}

fn setup() -> TestApp {
    let store = Arc::new(InMemorySagaStore::new());
    let users_client = Arc::new(InMemoryUsersClient::new());
    let lawyers_client = Arc::new(InMemoryLawyersClient::new());
    let appointments_client = Arc::new(InMemoryAppointmentsClient::new());

    let state = api::create_state(
        store.clone(),
        users_client.clone(),
        lawyers_client.clone(),
        appointments_client,
    );
    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        store,
        lawyers_client,
        users_client,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn registration_body(email: &str) -> serde_json::Value {
    serde_json::json!({
        "email": email,
        "full_name": "Jordan Doe",
        "phone_number": "555-0100"
    })
}

fn lawyer_body() -> serde_json::Value {
    serde_json::json!({
        "user_id": "u-1",
        "bio": "Family law attorney",
        "specialties": "Family Law",
        "license_number": "LIC-1234",
        "experience_years": 8,
        "price_per_hour": 250000,
        "day_of_week": "Mon,Tue",
        "work_time": "09:00-11:00"
    })
}

#[tokio::test]
async fn health_check_reports_store_and_in_flight_count() {
    let t = setup();
    let (status, json) = send(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["active_sagas"], 0);

    // A record stuck mid-flight shows up in the count.
    let stuck = SagaRecord::started(
        "UserRegistration",
        EntityId::from("stuck@example.com"),
        serde_json::json!({}),
    );
    t.store.create(stuck).await.unwrap();

    let (status, json) = send(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["active_sagas"], 1);
}

#[tokio::test]
async fn default_state_serves_requests() {
    let app = api::create_app(api::create_default_state(), get_metrics_handle());

    let (status, json) = send(
        &app,
        "POST",
        "/users/register",
        Some(registration_body("a@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["state"], "Completed");
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let t = setup();
    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_user_returns_completed_saga() {
    let t = setup();

    let (status, json) = send(
        &t.app,
        "POST",
        "/users/register",
        Some(registration_body("a@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["saga_type"], "UserRegistration");
    assert_eq!(json["state"], "Completed");
    assert_eq!(json["entity_id"], "a@example.com");
    assert!(json["completed_at"].as_str().is_some());
}

#[tokio::test]
async fn invalid_registration_is_bad_request() {
    let t = setup();

    let (status, json) = send(
        &t.app,
        "POST",
        "/users/register",
        Some(registration_body("not-an-email")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn active_saga_for_same_entity_conflicts() {
    let t = setup();

    // An in-flight registration for the same email, as another process
    // would leave it.
    let active = SagaRecord::started(
        "UserRegistration",
        EntityId::from("a@example.com"),
        serde_json::json!({}),
    );
    t.store.create(active).await.unwrap();

    let (status, _) = send(
        &t.app,
        "POST",
        "/users/register",
        Some(registration_body("a@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn saga_query_surface() {
    let t = setup();

    let (_, created) = send(
        &t.app,
        "POST",
        "/users/register",
        Some(registration_body("a@example.com")),
    )
    .await;
    let saga_id = created["id"].as_str().unwrap();

    // By execution id.
    let (status, json) = send(&t.app, "GET", &format!("/sagas/{saga_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], created["id"]);

    // By entity.
    let (status, json) = send(
        &t.app,
        "GET",
        "/sagas/entity/UserRegistration/a@example.com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "Completed");

    // Filtered listing.
    let (status, json) = send(&t.app, "GET", "/sagas?saga_type=UserRegistration", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (_, json) = send(&t.app, "GET", "/sagas?saga_type=LawyerCreation", None).await;
    assert!(json.as_array().unwrap().is_empty());

    // Nothing failed, nothing stuck.
    let (_, json) = send(&t.app, "GET", "/sagas/failed", None).await;
    assert!(json.as_array().unwrap().is_empty());
    let (_, json) = send(&t.app, "GET", "/sagas/incomplete", None).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_and_malformed_saga_ids() {
    let t = setup();

    let (status, _) = send(&t.app, "GET", "/sagas/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let random = uuid::Uuid::new_v4();
    let (status, _) = send(&t.app, "GET", &format!("/sagas/{random}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&t.app, "GET", "/sagas/entity/UserRegistration/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lawyer_creation_then_booking_through_the_api() {
    let t = setup();

    let (status, lawyer_saga) = send(&t.app, "POST", "/lawyers", Some(lawyer_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lawyer_saga["saga_type"], "LawyerCreation");
    assert_eq!(lawyer_saga["state"], "Completed");

    // The saga snapshot carries the created slot ids.
    let slot_ids = lawyer_saga["data"]["work_slot_ids"].as_array().unwrap();
    assert_eq!(slot_ids.len(), 4);
    let lawyer_id = lawyer_saga["entity_id"].as_str().unwrap();

    let (status, booking_saga) = send(
        &t.app,
        "POST",
        "/appointments",
        Some(serde_json::json!({
            "user_id": "u-2",
            "lawyer_id": lawyer_id,
            "work_slot_id": slot_ids[0],
            "scheduled_at": "2026-09-07T09:00:00Z",
            "specialty": "Family Law",
            "services": "Consultation",
            "user_email": "client@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking_saga["saga_type"], "AppointmentCreation");
    assert_eq!(booking_saga["state"], "Completed");

    // Booking the same slot again is rejected up front.
    let (status, json) = send(
        &t.app,
        "POST",
        "/appointments",
        Some(serde_json::json!({
            "user_id": "u-3",
            "lawyer_id": lawyer_id,
            "work_slot_id": slot_ids[0],
            "scheduled_at": "2026-09-07T09:00:00Z",
            "user_email": "other@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("not available"));
}

#[tokio::test]
async fn lawyer_update_of_unknown_id_is_bad_request() {
    let t = setup();

    let (status, _) = send(&t.app, "PUT", "/lawyers/nope", Some(lawyer_body())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gateway_lawyer_registration_happy_path() {
    let t = setup();

    let mut body = registration_body("lawyer@example.com");
    body["role"] = serde_json::json!("lawyer");
    let (status, json) = send(&t.app, "POST", "/gateway/registrations", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["saga_type"], "CrossServiceRegistration");
    assert_eq!(json["state"], "Completed");
    assert_eq!(t.users_client.user_count(), 1);
    assert_eq!(t.lawyers_client.profile_count(), 1);
}

#[tokio::test]
async fn gateway_client_registration_creates_no_profile() {
    let t = setup();

    // No role in the body defaults to a plain client account.
    let (status, json) = send(
        &t.app,
        "POST",
        "/gateway/registrations",
        Some(registration_body("client@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["state"], "Completed");
    assert_eq!(t.users_client.user_count(), 1);
    assert_eq!(t.lawyers_client.profile_count(), 0);
}

#[tokio::test]
async fn gateway_registration_failure_lands_on_triage_queue() {
    let t = setup();
    t.lawyers_client.set_fail_on_create_profile(true);

    let mut body = registration_body("lawyer@example.com");
    body["role"] = serde_json::json!("lawyer");
    let (status, json) = send(&t.app, "POST", "/gateway/registrations", Some(body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().is_some());

    // The remote account was compensated away.
    assert_eq!(t.users_client.user_count(), 0);

    let (status, json) = send(&t.app, "GET", "/sagas/failed", None).await;
    assert_eq!(status, StatusCode::OK);
    let failed = json.as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["saga_type"], "CrossServiceRegistration");
    assert!(failed[0]["error_message"].as_str().is_some());
}

#[tokio::test]
async fn gateway_booking_happy_path() {
    let t = setup();
    t.users_client.seed_user(
        EntityId::from("u-1"),
        NewUser {
            email: "client@example.com".to_string(),
            full_name: "Casey Client".to_string(),
            phone_number: "555-0101".to_string(),
            role: "client".to_string(),
        },
    );
    t.lawyers_client.seed_profile(
        EntityId::from("l-1"),
        NewLawyerProfile {
            user_id: EntityId::from("u-9"),
            bio: "Family law attorney".to_string(),
            specialties: "Family Law".to_string(),
            license_number: "LIC-1234".to_string(),
            experience_years: 8,
            description: String::new(),
            price_per_hour: 250_000,
            image_url: String::new(),
            day_of_week: "Mon".to_string(),
            work_time: "09:00-17:00".to_string(),
        },
    );

    let (status, json) = send(
        &t.app,
        "POST",
        "/gateway/appointments",
        Some(serde_json::json!({
            "user_id": "u-1",
            "lawyer_id": "l-1",
            "work_slot_id": "s-1",
            "scheduled_at": "2026-09-07T09:00:00Z",
            "specialty": "Family Law",
            "services": "Consultation"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["saga_type"], "CrossServiceAppointment");
    assert_eq!(json["state"], "Completed");
    assert!(json["data"]["appointment_id"].as_str().is_some());
}

#[tokio::test]
async fn gateway_booking_of_unknown_lawyer_fails() {
    let t = setup();
    t.users_client.seed_user(
        EntityId::from("u-1"),
        NewUser {
            email: "client@example.com".to_string(),
            full_name: "Casey Client".to_string(),
            phone_number: "555-0101".to_string(),
            role: "client".to_string(),
        },
    );

    let (status, _) = send(
        &t.app,
        "POST",
        "/gateway/appointments",
        Some(serde_json::json!({
            "user_id": "u-1",
            "lawyer_id": "l-404",
            "work_slot_id": "s-1",
            "scheduled_at": "2026-09-07T09:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, json) = send(&t.app, "GET", "/sagas/failed", None).await;
    let failed = json.as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert!(
        failed[0]["error_message"]
            .as_str()
            .unwrap()
            .contains("l-404")
    );
}
