//! # Entity Record Repository
//!
//! The LocalStore surface: transactional storage of entity records and
//! their sync metadata.
//!
//! Payload and sync metadata live in one row, so every mutation here is a
//! single statement — a reader never observes a payload ahead of its own
//! `sync_state`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use summit_core::{EntityRecord, EntityType, SyncState};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw row shape; converted into the domain type after fetch.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub entity_type: String,
    pub local_id: String,
    pub remote_id: Option<String>,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
    pub sync_state: String,
}

impl TryFrom<RecordRow> for EntityRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(EntityRecord {
            entity_type: row.entity_type.parse()?,
            local_id: row.local_id,
            remote_id: row.remote_id,
            payload: serde_json::from_str(&row.payload)?,
            updated_at: row.updated_at,
            sync_state: row.sync_state.parse()?,
        })
    }
}

// =============================================================================
// Record Repository
// =============================================================================

/// Repository for entity records.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    /// Inserts or replaces a record. Payload and sync metadata are
    /// written in one statement.
    pub async fn upsert(&self, record: &EntityRecord) -> StoreResult<()> {
        debug!(
            entity_type = %record.entity_type,
            local_id = %record.local_id,
            sync_state = %record.sync_state,
            "Upserting record"
        );

        let payload = serde_json::to_string(&record.payload)?;
        let entity_type = record.entity_type.as_str();
        let sync_state = record.sync_state.as_str();

        sqlx::query(
            r#"
            INSERT INTO entity_records (
                entity_type, local_id, remote_id, payload, updated_at, sync_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(entity_type, local_id) DO UPDATE SET
                remote_id = excluded.remote_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at,
                sync_state = excluded.sync_state
            "#,
        )
        .bind(entity_type)
        .bind(&record.local_id)
        .bind(&record.remote_id)
        .bind(payload)
        .bind(record.updated_at)
        .bind(sync_state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches a record by its local id.
    pub async fn get(
        &self,
        entity_type: EntityType,
        local_id: &str,
    ) -> StoreResult<Option<EntityRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT entity_type, local_id, remote_id, payload, updated_at, sync_state
            FROM entity_records
            WHERE entity_type = ?1 AND local_id = ?2
            "#,
        )
        .bind(entity_type.as_str())
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRecord::try_from).transpose()
    }

    /// Fetches a record by its remote id.
    pub async fn get_by_remote_id(
        &self,
        entity_type: EntityType,
        remote_id: &str,
    ) -> StoreResult<Option<EntityRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT entity_type, local_id, remote_id, payload, updated_at, sync_state
            FROM entity_records
            WHERE entity_type = ?1 AND remote_id = ?2
            "#,
        )
        .bind(entity_type.as_str())
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRecord::try_from).transpose()
    }

    /// Lists all records of a type, oldest update first.
    pub async fn list(&self, entity_type: EntityType) -> StoreResult<Vec<EntityRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT entity_type, local_id, remote_id, payload, updated_at, sync_state
            FROM entity_records
            WHERE entity_type = ?1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntityRecord::try_from).collect()
    }

    /// Lists records of a type matching a caller-supplied predicate.
    pub async fn list_matching(
        &self,
        entity_type: EntityType,
        predicate: impl Fn(&EntityRecord) -> bool,
    ) -> StoreResult<Vec<EntityRecord>> {
        let records = self.list(entity_type).await?;
        Ok(records.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Lists records of a type in a given sync state.
    pub async fn list_in_state(
        &self,
        entity_type: EntityType,
        state: SyncState,
    ) -> StoreResult<Vec<EntityRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT entity_type, local_id, remote_id, payload, updated_at, sync_state
            FROM entity_records
            WHERE entity_type = ?1 AND sync_state = ?2
            ORDER BY updated_at ASC
            "#,
        )
        .bind(entity_type.as_str())
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntityRecord::try_from).collect()
    }

    /// Deletes a record row. Only called for remotely acknowledged
    /// deletes and adopted remote deletions.
    pub async fn delete(&self, entity_type: EntityType, local_id: &str) -> StoreResult<()> {
        debug!(
            entity_type = %entity_type,
            local_id = %local_id,
            "Deleting record"
        );

        sqlx::query("DELETE FROM entity_records WHERE entity_type = ?1 AND local_id = ?2")
            .bind(entity_type.as_str())
            .bind(local_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Updates only the sync state of a record.
    pub async fn set_sync_state(
        &self,
        entity_type: EntityType,
        local_id: &str,
        state: SyncState,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE entity_records SET sync_state = ?3
            WHERE entity_type = ?1 AND local_id = ?2
            "#,
        )
        .bind(entity_type.as_str())
        .bind(local_id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks a record synced, setting its remote id when one was
    /// returned by the remote.
    pub async fn mark_synced(
        &self,
        entity_type: EntityType,
        local_id: &str,
        remote_id: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE entity_records SET
                sync_state = 'synced',
                remote_id = COALESCE(?3, remote_id)
            WHERE entity_type = ?1 AND local_id = ?2
            "#,
        )
        .bind(entity_type.as_str())
        .bind(local_id)
        .bind(remote_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts records in a given sync state, across all entity types.
    pub async fn count_in_state(&self, state: SyncState) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM entity_records WHERE sync_state = ?1")
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Store, StoreConfig};
    use chrono::Utc;
    use serde_json::json;

    async fn store() -> Store {
        Store::new(StoreConfig::in_memory()).await.unwrap()
    }

    fn checkin(local_id: &str) -> EntityRecord {
        EntityRecord::new(
            EntityType::Attendance,
            local_id,
            json!({"session": "opening-keynote", "at": "09:01"}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_upsert_get_round_trip() {
        let repo = store().await.records();
        let record = checkin("att-1");

        repo.upsert(&record).await.unwrap();
        let loaded = repo.get(EntityType::Attendance, "att-1").await.unwrap();

        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_upsert_replaces_payload_and_state_together() {
        let repo = store().await.records();
        let mut record = checkin("att-1");
        repo.upsert(&record).await.unwrap();

        record.payload = json!({"session": "closing", "at": "17:44"});
        record.sync_state = SyncState::Synced;
        record.remote_id = Some("r-900".into());
        repo.upsert(&record).await.unwrap();

        let loaded = repo
            .get(EntityType::Attendance, "att-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.sync_state, SyncState::Synced);
        assert_eq!(loaded.payload["session"], "closing");
        assert_eq!(loaded.remote_id.as_deref(), Some("r-900"));
    }

    #[tokio::test]
    async fn test_get_by_remote_id() {
        let repo = store().await.records();
        let mut record = checkin("att-2");
        record.remote_id = Some("r-17".into());
        repo.upsert(&record).await.unwrap();

        let loaded = repo
            .get_by_remote_id(EntityType::Attendance, "r-17")
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().local_id, "att-2");

        let missing = repo
            .get_by_remote_id(EntityType::Attendance, "r-999")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_mark_synced_keeps_existing_remote_id() {
        let repo = store().await.records();
        let mut record = checkin("att-3");
        record.remote_id = Some("r-1".into());
        repo.upsert(&record).await.unwrap();

        // No remote id in the ack: the existing one is kept.
        repo.mark_synced(EntityType::Attendance, "att-3", None)
            .await
            .unwrap();

        let loaded = repo
            .get(EntityType::Attendance, "att-3")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.sync_state, SyncState::Synced);
        assert_eq!(loaded.remote_id.as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_list_in_state_filters() {
        let repo = store().await.records();
        repo.upsert(&checkin("att-a")).await.unwrap();

        let mut synced = checkin("att-b");
        synced.sync_state = SyncState::Synced;
        repo.upsert(&synced).await.unwrap();

        let pending = repo
            .list_in_state(EntityType::Attendance, SyncState::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, "att-a");

        assert_eq!(repo.count_in_state(SyncState::Synced).await.unwrap(), 1);

        let keynotes = repo
            .list_matching(EntityType::Attendance, |r| {
                r.payload["session"] == "opening-keynote"
            })
            .await
            .unwrap();
        assert_eq!(keynotes.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let repo = store().await.records();
        repo.upsert(&checkin("att-gone")).await.unwrap();

        repo.delete(EntityType::Attendance, "att-gone")
            .await
            .unwrap();

        assert!(repo
            .get(EntityType::Attendance, "att-gone")
            .await
            .unwrap()
            .is_none());
    }
}
