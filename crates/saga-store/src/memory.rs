use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    EntityId, Result, SagaId, SagaRecord, SagaStoreError,
    store::SagaStore,
};

/// In-memory saga record store for tests and the self-contained demo server.
///
/// Provides the same interface and conflict semantics as the PostgreSQL
/// implementation. The active-record uniqueness check runs under the write
/// lock, so concurrent `create` calls for the same entity serialize.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    records: Arc<RwLock<HashMap<SagaId, SagaRecord>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn create(&self, mut record: SagaRecord) -> Result<SagaRecord> {
        let mut records = self.records.write().await;

        let conflict = records.values().any(|r| {
            r.saga_type == record.saga_type && r.entity_id == record.entity_id && r.is_active()
        });
        if conflict {
            return Err(SagaStoreError::Conflict {
                saga_type: record.saga_type,
                entity_id: record.entity_id,
            });
        }

        let now = Utc::now();
        record.created_at = now;
        record.last_updated_at = now;
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: SagaId) -> Result<Option<SagaRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_entity(
        &self,
        saga_type: &str,
        entity_id: &EntityId,
    ) -> Result<Option<SagaRecord>> {
        let records = self.records.read().await;
        let latest = records
            .values()
            .filter(|r| r.saga_type == saga_type && &r.entity_id == entity_id)
            .max_by_key(|r| r.created_at)
            .cloned();
        Ok(latest)
    }

    async fn update(&self, mut record: SagaRecord) -> Result<SagaRecord> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(SagaStoreError::NotFound(record.id));
        }
        record.last_updated_at = Utc::now();
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: SagaId) -> Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<SagaRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_by_type(&self, saga_type: &str) -> Result<Vec<SagaRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<_> = records
            .values()
            .filter(|r| r.saga_type == saga_type)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn list_failed(&self) -> Result<Vec<SagaRecord>> {
        let records = self.records.read().await;
        let mut failed: Vec<_> = records
            .values()
            .filter(|r| r.state == SagaRecord::FAILED)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(failed)
    }

    async fn list_incomplete(&self) -> Result<Vec<SagaRecord>> {
        let records = self.records.read().await;
        let mut incomplete: Vec<_> = records
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect();
        incomplete.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(incomplete)
    }
}
