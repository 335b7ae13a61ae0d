use async_trait::async_trait;

use crate::{EntityId, Result, SagaId, SagaRecord};

/// Core trait for saga record store implementations.
///
/// The store is the only shared mutable resource between sagas; every
/// mutation is a single atomic write of the full record. Implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists a new record, stamping `created_at` and `last_updated_at`.
    ///
    /// Fails with [`SagaStoreError::Conflict`] when an active (non-terminal)
    /// record already exists for the same `(saga_type, entity_id)` pair, so
    /// two concurrent starts for one entity cannot race.
    ///
    /// [`SagaStoreError::Conflict`]: crate::SagaStoreError::Conflict
    async fn create(&self, record: SagaRecord) -> Result<SagaRecord>;

    /// Retrieves a record by saga execution id.
    async fn get(&self, id: SagaId) -> Result<Option<SagaRecord>>;

    /// Retrieves the latest record for a `(saga_type, entity_id)` pair.
    async fn get_by_entity(
        &self,
        saga_type: &str,
        entity_id: &EntityId,
    ) -> Result<Option<SagaRecord>>;

    /// Replaces the stored row with the given record, refreshing
    /// `last_updated_at`. Fails with `NotFound` if the record was never
    /// created.
    async fn update(&self, record: SagaRecord) -> Result<SagaRecord>;

    /// Deletes a record. Returns false if no record existed.
    async fn delete(&self, id: SagaId) -> Result<bool>;

    /// Lists every record, newest-first.
    async fn list_all(&self) -> Result<Vec<SagaRecord>>;

    /// Lists records of one saga type, newest-first.
    async fn list_by_type(&self, saga_type: &str) -> Result<Vec<SagaRecord>>;

    /// Lists failed records ordered by `failed_at` descending, the
    /// operational triage queue.
    async fn list_failed(&self) -> Result<Vec<SagaRecord>>;

    /// Lists records whose state is neither `Completed` nor `Failed`, the
    /// recovery queue a supervisor scans after a crash.
    async fn list_incomplete(&self) -> Result<Vec<SagaRecord>>;
}
