//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use saga_store::{EntityId, PostgresSagaStore, SagaId, SagaRecord, SagaStore, SagaStoreError};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_records_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresSagaStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE saga_records")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaStore::new(pool)
}

fn record_for(saga_type: &str, entity: &str) -> SagaRecord {
    SagaRecord::started(
        saga_type,
        EntityId::from(entity),
        serde_json::json!({"entity": entity}),
    )
}

#[tokio::test]
async fn create_and_get_roundtrip() {
    let store = get_test_store().await;
    let record = record_for("UserRegistration", "user-1");
    let id = record.id;

    let stored = store.create(record).await.unwrap();
    assert_eq!(stored.state, SagaRecord::STARTED);

    let fetched = store.get(id).await.unwrap().unwrap();
    assert_eq!(fetched.id, id);
    assert_eq!(fetched.saga_type, "UserRegistration");
    assert_eq!(fetched.entity_id.as_str(), "user-1");
    assert_eq!(fetched.data, serde_json::json!({"entity": "user-1"}));
}

#[tokio::test]
async fn get_missing_record_returns_none() {
    let store = get_test_store().await;
    assert!(store.get(SagaId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn unique_index_rejects_second_active_saga() {
    let store = get_test_store().await;
    store
        .create(record_for("AppointmentCreation", "appt-1"))
        .await
        .unwrap();

    let result = store
        .create(record_for("AppointmentCreation", "appt-1"))
        .await;
    assert!(matches!(result, Err(SagaStoreError::Conflict { .. })));
}

#[tokio::test]
async fn terminal_record_does_not_block_new_saga() {
    let store = get_test_store().await;
    let mut first = store
        .create(record_for("AppointmentCreation", "appt-1"))
        .await
        .unwrap();
    first.mark_failed("slot taken");
    store.update(first).await.unwrap();

    let result = store
        .create(record_for("AppointmentCreation", "appt-1"))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn update_persists_state_transition() {
    let store = get_test_store().await;
    let mut record = store
        .create(record_for("LawyerCreation", "lawyer-1"))
        .await
        .unwrap();

    record.set_state("ProfileCreated");
    record.data = serde_json::json!({"lawyer_id": "lawyer-1", "work_slot_ids": []});
    store.update(record.clone()).await.unwrap();

    let fetched = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, "ProfileCreated");
    assert_eq!(fetched.data["lawyer_id"], "lawyer-1");
}

#[tokio::test]
async fn update_missing_record_fails() {
    let store = get_test_store().await;
    let record = record_for("LawyerCreation", "lawyer-1");

    let result = store.update(record).await;
    assert!(matches!(result, Err(SagaStoreError::NotFound(_))));
}

#[tokio::test]
async fn delete_record() {
    let store = get_test_store().await;
    let record = store
        .create(record_for("UserRegistration", "user-1"))
        .await
        .unwrap();

    assert!(store.delete(record.id).await.unwrap());
    assert!(!store.delete(record.id).await.unwrap());
}

#[tokio::test]
async fn get_by_entity_returns_latest() {
    let store = get_test_store().await;
    let mut first = store
        .create(record_for("LawyerUpdate", "lawyer-1"))
        .await
        .unwrap();
    first.mark_completed();
    store.update(first).await.unwrap();

    let second = store
        .create(record_for("LawyerUpdate", "lawyer-1"))
        .await
        .unwrap();

    let latest = store
        .get_by_entity("LawyerUpdate", &EntityId::from("lawyer-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, second.id);
}

#[tokio::test]
async fn list_queries_filter_and_order() {
    let store = get_test_store().await;

    let started = store
        .create(record_for("UserRegistration", "user-1"))
        .await
        .unwrap();

    let mut completed = store
        .create(record_for("UserRegistration", "user-2"))
        .await
        .unwrap();
    completed.mark_completed();
    store.update(completed).await.unwrap();

    let mut failed = store
        .create(record_for("LawyerCreation", "lawyer-1"))
        .await
        .unwrap();
    failed.mark_failed("work slot insert failed");
    store.update(failed.clone()).await.unwrap();

    let by_type = store.list_by_type("UserRegistration").await.unwrap();
    assert_eq!(by_type.len(), 2);

    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 3);

    let failed_list = store.list_failed().await.unwrap();
    assert_eq!(failed_list.len(), 1);
    assert_eq!(failed_list[0].id, failed.id);
    assert_eq!(
        failed_list[0].error_message.as_deref(),
        Some("work slot insert failed")
    );

    let incomplete = store.list_incomplete().await.unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].id, started.id);
}
