use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EntityId, Result, SagaId, SagaRecord, SagaStoreError,
    store::SagaStore,
};

/// PostgreSQL-backed saga record store.
///
/// The at-most-one-active invariant is enforced by a partial unique index
/// on `(saga_type, entity_id)` covering non-terminal states, so two
/// concurrent `create` calls for the same entity cannot both succeed.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<SagaRecord> {
        Ok(SagaRecord {
            id: SagaId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_type: row.try_get("saga_type")?,
            entity_id: EntityId::new(row.try_get::<String, _>("entity_id")?),
            state: row.try_get("state")?,
            data: row.try_get("data")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            completed_at: row.try_get("completed_at")?,
            failed_at: row.try_get("failed_at")?,
        })
    }
}

const COLUMNS: &str = "id, saga_type, entity_id, state, data, error_message, \
                       created_at, last_updated_at, completed_at, failed_at";

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn create(&self, mut record: SagaRecord) -> Result<SagaRecord> {
        let now = Utc::now();
        record.created_at = now;
        record.last_updated_at = now;

        sqlx::query(
            r#"
            INSERT INTO saga_records
                (id, saga_type, entity_id, state, data, error_message,
                 created_at, last_updated_at, completed_at, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.saga_type)
        .bind(record.entity_id.as_str())
        .bind(&record.state)
        .bind(&record.data)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.last_updated_at)
        .bind(record.completed_at)
        .bind(record.failed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_active_saga")
            {
                return SagaStoreError::Conflict {
                    saga_type: record.saga_type.clone(),
                    entity_id: record.entity_id.clone(),
                };
            }
            SagaStoreError::Database(e)
        })?;

        Ok(record)
    }

    async fn get(&self, id: SagaId) -> Result<Option<SagaRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM saga_records WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn get_by_entity(
        &self,
        saga_type: &str,
        entity_id: &EntityId,
    ) -> Result<Option<SagaRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM saga_records
            WHERE saga_type = $1 AND entity_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(saga_type)
        .bind(entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn update(&self, mut record: SagaRecord) -> Result<SagaRecord> {
        record.last_updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE saga_records
            SET saga_type = $2, entity_id = $3, state = $4, data = $5,
                error_message = $6, last_updated_at = $7, completed_at = $8,
                failed_at = $9
            WHERE id = $1
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.saga_type)
        .bind(record.entity_id.as_str())
        .bind(&record.state)
        .bind(&record.data)
        .bind(&record.error_message)
        .bind(record.last_updated_at)
        .bind(record.completed_at)
        .bind(record.failed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SagaStoreError::NotFound(record.id));
        }

        Ok(record)
    }

    async fn delete(&self, id: SagaId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saga_records WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM saga_records ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn list_by_type(&self, saga_type: &str) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM saga_records
            WHERE saga_type = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(saga_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn list_failed(&self) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM saga_records
            WHERE state = $1
            ORDER BY failed_at DESC
            "#
        ))
        .bind(SagaRecord::FAILED)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn list_incomplete(&self) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM saga_records
            WHERE state NOT IN ($1, $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(SagaRecord::COMPLETED)
        .bind(SagaRecord::FAILED)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}
