//! # Operation Queue Repository
//!
//! Durable storage for the pending-mutation queue.
//!
//! ## The Queue Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Durable Operation Queue                                 │
//! │                                                                         │
//! │  LOCAL WRITE (e.g., record a check-in)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   SINGLE TRANSACTION                            │    │
//! │  │                                                                 │    │
//! │  │  1. UPSERT entity_records (payload + sync_state = 'pending')    │    │
//! │  │                                                                 │    │
//! │  │  2. INSERT INTO operation_queue ... ON CONFLICT of the live     │    │
//! │  │     (entity_type, local_id, kind) row DO UPDATE:                │    │
//! │  │       payload  ← newest snapshot                                │    │
//! │  │       priority ← more urgent of old/new                         │    │
//! │  │     (id, idempotency_key, enqueued_at survive the merge)        │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Record and queue row land together or not at all              │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                        │
//! │  • The write is never lost (it's in the local store)                    │
//! │  • The queue row is never orphaned (same transaction)                   │
//! │  • Offline? Entries queue up; back online? The drain delivers them      │
//! │  • Restart mid-backoff? next_retry_at is in the row, not in memory      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are an arena referenced by operation id. Dequeue order is
//! effective priority (rank minus the aging boost) then FIFO.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use summit_core::{EntityRecord, EntityType, Operation, OperationKind};

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OperationRow {
    pub id: String,
    pub entity_type: String,
    pub local_id: String,
    pub kind: String,
    pub payload: String,
    pub snapshot_updated_at: DateTime<Utc>,
    pub priority: i64,
    pub status: String,
    pub attempt_count: i64,
    pub aged_cycles: i64,
    pub next_retry_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub last_error: Option<String>,
}

impl TryFrom<OperationRow> for Operation {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        Ok(Operation {
            id: row.id,
            entity_type: row.entity_type.parse()?,
            local_id: row.local_id,
            kind: row.kind.parse()?,
            payload_snapshot: serde_json::from_str(&row.payload)?,
            snapshot_updated_at: row.snapshot_updated_at,
            priority: summit_core::Priority::from_rank(row.priority),
            status: row.status.parse()?,
            attempt_count: row.attempt_count,
            aged_cycles: row.aged_cycles,
            next_retry_at: row.next_retry_at,
            enqueued_at: row.enqueued_at,
            idempotency_key: row.idempotency_key,
            last_error: row.last_error,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    id, entity_type, local_id, kind, payload, snapshot_updated_at,
    priority, status, attempt_count, aged_cycles, next_retry_at,
    enqueued_at, idempotency_key, last_error
"#;

// =============================================================================
// Queue Repository
// =============================================================================

/// Repository for the operation queue.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Enqueues an operation together with its record write, in one
    /// transaction.
    ///
    /// If a live operation already exists for the same
    /// `(entity_type, local_id, kind)`, the write collapses into it:
    /// payload and snapshot basis are replaced, priority is raised to the
    /// more urgent of old and new, and `id`, `idempotency_key`,
    /// `enqueued_at` are preserved. Returns the live operation as stored.
    pub async fn enqueue(
        &self,
        op: &Operation,
        record: &EntityRecord,
    ) -> StoreResult<Operation> {
        debug!(
            entity_type = %op.entity_type,
            local_id = %op.local_id,
            kind = %op.kind,
            priority = %op.priority,
            "Enqueuing operation"
        );

        let mut tx = self.pool.begin().await?;

        let record_payload = serde_json::to_string(&record.payload)?;
        sqlx::query(
            r#"
            INSERT INTO entity_records (
                entity_type, local_id, remote_id, payload, updated_at, sync_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(entity_type, local_id) DO UPDATE SET
                remote_id = COALESCE(excluded.remote_id, entity_records.remote_id),
                payload = excluded.payload,
                updated_at = excluded.updated_at,
                sync_state = excluded.sync_state
            "#,
        )
        .bind(record.entity_type.as_str())
        .bind(&record.local_id)
        .bind(&record.remote_id)
        .bind(record_payload)
        .bind(record.updated_at)
        .bind(record.sync_state.as_str())
        .execute(&mut *tx)
        .await?;

        let op_payload = serde_json::to_string(&op.payload_snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO operation_queue (
                id, entity_type, local_id, kind, payload, snapshot_updated_at,
                priority, status, attempt_count, aged_cycles, next_retry_at,
                enqueued_at, idempotency_key, last_error
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14
            )
            ON CONFLICT(entity_type, local_id, kind) WHERE status != 'dead_letter'
            DO UPDATE SET
                payload = excluded.payload,
                snapshot_updated_at = excluded.snapshot_updated_at,
                priority = MIN(operation_queue.priority, excluded.priority)
            "#,
        )
        .bind(&op.id)
        .bind(op.entity_type.as_str())
        .bind(&op.local_id)
        .bind(op.kind.as_str())
        .bind(op_payload)
        .bind(op.snapshot_updated_at)
        .bind(op.priority.rank())
        .bind(op.status.as_str())
        .bind(op.attempt_count)
        .bind(op.aged_cycles)
        .bind(op.next_retry_at)
        .bind(op.enqueued_at)
        .bind(&op.idempotency_key)
        .bind(&op.last_error)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM operation_queue
            WHERE entity_type = ?1 AND local_id = ?2 AND kind = ?3
              AND status != 'dead_letter'
            "#
        );
        let row: OperationRow = sqlx::query_as(&query)
            .bind(op.entity_type.as_str())
            .bind(&op.local_id)
            .bind(op.kind.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Operation::try_from(row)
    }

    /// Fetches an operation by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Operation>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM operation_queue WHERE id = ?1");
        let row: Option<OperationRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Operation::try_from).transpose()
    }

    /// Pending operations that are due at `now`, ordered by effective
    /// priority then FIFO.
    ///
    /// The effective rank is `max(priority - aged_cycles / threshold, 0)`:
    /// one tier of promotion per `aging_threshold` drain cycles an
    /// operation sat due without being dequeued. `aging_threshold <= 0`
    /// disables the boost.
    pub async fn due(
        &self,
        now: DateTime<Utc>,
        aging_threshold: i64,
        limit: u32,
    ) -> StoreResult<Vec<Operation>> {
        let rows: Vec<OperationRow> = if aging_threshold > 0 {
            let query = format!(
                r#"
                SELECT {SELECT_COLUMNS} FROM operation_queue
                WHERE status = 'pending' AND next_retry_at <= ?1
                ORDER BY MAX(priority - (aged_cycles / ?2), 0) ASC, enqueued_at ASC
                LIMIT ?3
                "#
            );
            sqlx::query_as(&query)
                .bind(now)
                .bind(aging_threshold)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let query = format!(
                r#"
                SELECT {SELECT_COLUMNS} FROM operation_queue
                WHERE status = 'pending' AND next_retry_at <= ?1
                ORDER BY priority ASC, enqueued_at ASC
                LIMIT ?2
                "#
            );
            sqlx::query_as(&query)
                .bind(now)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(Operation::try_from).collect()
    }

    /// Marks an operation in flight and its record `syncing`, in one
    /// transaction. The aging counter resets: the operation got its turn.
    pub async fn mark_in_flight(&self, op: &Operation) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE operation_queue SET status = 'in_flight', aged_cycles = 0
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(&op.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE entity_records SET sync_state = 'syncing'
            WHERE entity_type = ?1 AND local_id = ?2
            "#,
        )
        .bind(op.entity_type.as_str())
        .bind(&op.local_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reverts an in-flight operation to `pending` without counting an
    /// attempt (mid-flight disconnect / cycle cancellation).
    pub async fn revert_in_flight(&self, op: &Operation) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE operation_queue SET status = 'pending'
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(&op.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE entity_records SET sync_state = 'pending'
            WHERE entity_type = ?1 AND local_id = ?2 AND sync_state = 'syncing'
            "#,
        )
        .bind(op.entity_type.as_str())
        .bind(&op.local_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Resets every stale in-flight operation to `pending` and every
    /// `syncing` record to `pending`. Called once at coordinator startup;
    /// nothing stays marked `syncing` across a crash.
    pub async fn reset_stale_in_flight(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let reset = sqlx::query(
            "UPDATE operation_queue SET status = 'pending' WHERE status = 'in_flight'",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("UPDATE entity_records SET sync_state = 'pending' WHERE sync_state = 'syncing'")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(reset)
    }

    /// Increments `aged_cycles` for every operation still pending and due
    /// at the end of a drain cycle.
    pub async fn age_due(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE operation_queue SET aged_cycles = aged_cycles + 1
            WHERE status = 'pending' AND next_retry_at <= ?1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Acknowledges a delivered operation, in one transaction: the queue
    /// row is removed; the record becomes `synced` (adopting a returned
    /// remote id), except for deletes, whose record row is destroyed.
    pub async fn ack(&self, op: &Operation, remote_id: Option<&str>) -> StoreResult<()> {
        debug!(op_id = %op.id, entity_type = %op.entity_type, local_id = %op.local_id, "Acking operation");

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM operation_queue WHERE id = ?1")
            .bind(&op.id)
            .execute(&mut *tx)
            .await?;

        if op.kind == OperationKind::Delete {
            sqlx::query("DELETE FROM entity_records WHERE entity_type = ?1 AND local_id = ?2")
                .bind(op.entity_type.as_str())
                .bind(&op.local_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE entity_records SET
                    sync_state = 'synced',
                    remote_id = COALESCE(?3, remote_id)
                WHERE entity_type = ?1 AND local_id = ?2
                "#,
            )
            .bind(op.entity_type.as_str())
            .bind(&op.local_id)
            .bind(remote_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records a transient delivery failure: the attempt is counted, the
    /// retry is scheduled, and the record returns to `pending`.
    pub async fn record_failure(
        &self,
        op: &Operation,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE operation_queue SET
                status = 'pending',
                attempt_count = attempt_count + 1,
                last_error = ?2,
                next_retry_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(&op.id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE entity_records SET sync_state = 'pending'
            WHERE entity_type = ?1 AND local_id = ?2 AND sync_state = 'syncing'
            "#,
        )
        .bind(op.entity_type.as_str())
        .bind(&op.local_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Dead-letters an operation: parked for manual handling, never
    /// retried automatically; its record becomes `failed`.
    pub async fn dead_letter(&self, op: &Operation, error: &str) -> StoreResult<()> {
        debug!(op_id = %op.id, error = %error, "Dead-lettering operation");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE operation_queue SET
                status = 'dead_letter',
                attempt_count = attempt_count + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(&op.id)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE entity_records SET sync_state = 'failed'
            WHERE entity_type = ?1 AND local_id = ?2
            "#,
        )
        .bind(op.entity_type.as_str())
        .bind(&op.local_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Cancels (removes) a single operation row.
    pub async fn cancel(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM operation_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Purges every live operation targeting a record. Returns how many
    /// were removed.
    pub async fn cancel_for_record(
        &self,
        entity_type: EntityType,
        local_id: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM operation_queue
            WHERE entity_type = ?1 AND local_id = ?2 AND status != 'dead_letter'
            "#,
        )
        .bind(entity_type.as_str())
        .bind(local_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The live operation with the newest snapshot basis for a record,
    /// if any.
    pub async fn live_for_record(
        &self,
        entity_type: EntityType,
        local_id: &str,
    ) -> StoreResult<Option<Operation>> {
        let query = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM operation_queue
            WHERE entity_type = ?1 AND local_id = ?2 AND status != 'dead_letter'
            ORDER BY snapshot_updated_at DESC
            LIMIT 1
            "#
        );
        let row: Option<OperationRow> = sqlx::query_as(&query)
            .bind(entity_type.as_str())
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Operation::try_from).transpose()
    }

    /// All dead-lettered operations, oldest first.
    pub async fn dead_letters(&self) -> StoreResult<Vec<Operation>> {
        let query = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM operation_queue
            WHERE status = 'dead_letter'
            ORDER BY enqueued_at ASC
            "#
        );
        let rows: Vec<OperationRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        rows.into_iter().map(Operation::try_from).collect()
    }

    /// Counts operations awaiting delivery (pending or in flight).
    pub async fn count_pending(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM operation_queue WHERE status != 'dead_letter'",
        )
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
    use chrono::{Duration, Utc};
    use serde_json::json;
    use summit_core::{OperationStatus, Priority, SyncState};

    async fn store() -> Store {
        Store::new(StoreConfig::in_memory()).await.unwrap()
    }

    fn write(
        entity_type: EntityType,
        local_id: &str,
        kind: OperationKind,
        priority: Priority,
        payload: serde_json::Value,
    ) -> (Operation, EntityRecord) {
        let now = Utc::now();
        let record = EntityRecord::new(entity_type, local_id, payload.clone(), now);
        let op = Operation::new(entity_type, local_id, kind, payload, now, priority, now);
        (op, record)
    }

    #[tokio::test]
    async fn test_enqueue_round_trip() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Attendance,
            "att-1",
            OperationKind::Create,
            Priority::Critical,
            json!({"session": "s-1"}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();

        assert_eq!(stored.id, op.id);
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.priority, Priority::Critical);

        // The record landed in the same transaction.
        let rec = store
            .records()
            .get(EntityType::Attendance, "att-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.sync_state, SyncState::Pending);
    }

    #[tokio::test]
    async fn test_enqueue_collapses_repeated_writes() {
        let store = store().await;
        let queue = store.queue();

        let (first, record) = write(
            EntityType::Profile,
            "p-1",
            OperationKind::Update,
            Priority::Medium,
            json!({"name": "Ada"}),
        );
        let stored_first = queue.enqueue(&first, &record).await.unwrap();

        // Second write to the same (type, id, kind): higher priority,
        // newer payload.
        let (second, record2) = write(
            EntityType::Profile,
            "p-1",
            OperationKind::Update,
            Priority::High,
            json!({"name": "Ada L."}),
        );
        let merged = queue.enqueue(&second, &record2).await.unwrap();

        // Collapsed into the original row: same id, same idempotency key,
        // same enqueue time; latest payload; raised priority.
        assert_eq!(merged.id, stored_first.id);
        assert_eq!(merged.idempotency_key, stored_first.idempotency_key);
        assert_eq!(merged.enqueued_at, stored_first.enqueued_at);
        assert_eq!(merged.payload_snapshot["name"], "Ada L.");
        assert_eq!(merged.priority, Priority::High);

        // Still a single live row.
        assert_eq!(queue.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_merge_never_lowers_priority() {
        let store = store().await;
        let queue = store.queue();

        let (first, record) = write(
            EntityType::Registration,
            "reg-1",
            OperationKind::Update,
            Priority::High,
            json!({"v": 1}),
        );
        queue.enqueue(&first, &record).await.unwrap();

        let (second, record2) = write(
            EntityType::Registration,
            "reg-1",
            OperationKind::Update,
            Priority::Low,
            json!({"v": 2}),
        );
        let merged = queue.enqueue(&second, &record2).await.unwrap();

        assert_eq!(merged.priority, Priority::High);
        assert_eq!(merged.payload_snapshot["v"], 2);
    }

    #[tokio::test]
    async fn test_due_orders_by_priority_then_fifo() {
        let store = store().await;
        let queue = store.queue();

        let (media, r1) = write(
            EntityType::Media,
            "m-1",
            OperationKind::Create,
            Priority::Low,
            json!({}),
        );
        let (profile, r2) = write(
            EntityType::Profile,
            "p-1",
            OperationKind::Update,
            Priority::Medium,
            json!({}),
        );
        let (checkin, r3) = write(
            EntityType::Attendance,
            "a-1",
            OperationKind::Create,
            Priority::Critical,
            json!({}),
        );
        queue.enqueue(&media, &r1).await.unwrap();
        queue.enqueue(&profile, &r2).await.unwrap();
        queue.enqueue(&checkin, &r3).await.unwrap();

        let due = queue.due(Utc::now(), 0, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|o| o.local_id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "p-1", "m-1"]);
    }

    #[tokio::test]
    async fn test_fifo_within_priority_tier() {
        let store = store().await;
        let queue = store.queue();

        let now = Utc::now();
        for (i, id) in ["e-1", "e-2", "e-3"].iter().enumerate() {
            let t = now + Duration::milliseconds(i as i64 * 10);
            let record = EntityRecord::new(EntityType::Evaluation, *id, json!({}), t);
            let mut op = Operation::new(
                EntityType::Evaluation,
                *id,
                OperationKind::Create,
                json!({}),
                t,
                Priority::High,
                t,
            );
            op.enqueued_at = t;
            op.next_retry_at = t;
            queue.enqueue(&op, &record).await.unwrap();
        }

        let due = queue.due(now + Duration::seconds(1), 0, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|o| o.local_id.as_str()).collect();
        assert_eq!(ids, vec!["e-1", "e-2", "e-3"]);
    }

    #[tokio::test]
    async fn test_aging_promotes_one_tier() {
        let store = store().await;
        let queue = store.queue();

        let (low, r1) = write(
            EntityType::Media,
            "m-old",
            OperationKind::Create,
            Priority::Low,
            json!({}),
        );
        queue.enqueue(&low, &r1).await.unwrap();

        // Three missed cycles with threshold 3: one tier of promotion.
        for _ in 0..3 {
            queue.age_due(Utc::now()).await.unwrap();
        }

        let (medium, r2) = write(
            EntityType::Profile,
            "p-new",
            OperationKind::Update,
            Priority::Medium,
            json!({}),
        );
        queue.enqueue(&medium, &r2).await.unwrap();

        // Aged low-priority op now ties with medium at effective rank 2
        // and wins on FIFO.
        let due = queue.due(Utc::now(), 3, 10).await.unwrap();
        assert_eq!(due[0].local_id, "m-old");
        assert_eq!(due[0].effective_priority(3), Priority::Medium);
    }

    #[tokio::test]
    async fn test_in_flight_excluded_from_due_and_reset_on_restart() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Attendance,
            "a-9",
            OperationKind::Create,
            Priority::Critical,
            json!({}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();

        queue.mark_in_flight(&stored).await.unwrap();
        assert!(queue.due(Utc::now(), 0, 10).await.unwrap().is_empty());

        let rec = store
            .records()
            .get(EntityType::Attendance, "a-9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.sync_state, SyncState::Syncing);

        // Coordinator restart: stale in-flight state is cleared.
        let reset = queue.reset_stale_in_flight().await.unwrap();
        assert_eq!(reset, 1);

        let due = queue.due(Utc::now(), 0, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].idempotency_key, stored.idempotency_key);

        let rec = store
            .records()
            .get(EntityType::Attendance, "a-9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.sync_state, SyncState::Pending);
    }

    #[tokio::test]
    async fn test_ack_marks_record_synced_with_remote_id() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Registration,
            "reg-5",
            OperationKind::Create,
            Priority::High,
            json!({"event": "rustconf"}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();
        queue.mark_in_flight(&stored).await.unwrap();

        queue.ack(&stored, Some("srv-42")).await.unwrap();

        assert_eq!(queue.count_pending().await.unwrap(), 0);
        let rec = store
            .records()
            .get(EntityType::Registration, "reg-5")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.sync_state, SyncState::Synced);
        assert_eq!(rec.remote_id.as_deref(), Some("srv-42"));
    }

    #[tokio::test]
    async fn test_acked_delete_destroys_record() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Media,
            "m-del",
            OperationKind::Delete,
            Priority::Low,
            json!({}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();

        queue.ack(&stored, None).await.unwrap();

        assert!(store
            .records()
            .get(EntityType::Media, "m-del")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_failure_schedules_retry() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Evaluation,
            "ev-2",
            OperationKind::Update,
            Priority::High,
            json!({}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();
        queue.mark_in_flight(&stored).await.unwrap();

        let retry_at = Utc::now() + Duration::seconds(30);
        queue
            .record_failure(&stored, "timeout", retry_at)
            .await
            .unwrap();

        let reloaded = queue.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, OperationStatus::Pending);
        assert_eq!(reloaded.attempt_count, 1);
        assert_eq!(reloaded.last_error.as_deref(), Some("timeout"));

        // Not due until the scheduled retry time.
        assert!(queue.due(Utc::now(), 0, 10).await.unwrap().is_empty());
        assert_eq!(
            queue
                .due(retry_at + Duration::seconds(1), 0, 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_dead_letter_parks_op_and_fails_record() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Profile,
            "p-dead",
            OperationKind::Update,
            Priority::Medium,
            json!({}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();

        queue.dead_letter(&stored, "422 rejected").await.unwrap();

        // Parked, not retried, not lost.
        assert!(queue.due(Utc::now(), 0, 10).await.unwrap().is_empty());
        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("422 rejected"));

        let rec = store
            .records()
            .get(EntityType::Profile, "p-dead")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.sync_state, SyncState::Failed);
    }

    #[tokio::test]
    async fn test_dead_letter_frees_the_live_slot() {
        let store = store().await;
        let queue = store.queue();

        let (op, record) = write(
            EntityType::Profile,
            "p-retry",
            OperationKind::Update,
            Priority::Medium,
            json!({"v": 1}),
        );
        let stored = queue.enqueue(&op, &record).await.unwrap();
        queue.dead_letter(&stored, "rejected").await.unwrap();

        // A fresh write for the same (type, id, kind) gets a new live row
        // beside the parked one.
        let (op2, record2) = write(
            EntityType::Profile,
            "p-retry",
            OperationKind::Update,
            Priority::Medium,
            json!({"v": 2}),
        );
        let fresh = queue.enqueue(&op2, &record2).await.unwrap();

        assert_ne!(fresh.id, stored.id);
        assert_eq!(queue.dead_letters().await.unwrap().len(), 1);
        assert_eq!(queue.due(Utc::now(), 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_for_record_purges_live_ops() {
        let store = store().await;
        let queue = store.queue();

        let (create, r1) = write(
            EntityType::Certificate,
            "c-1",
            OperationKind::Create,
            Priority::Low,
            json!({}),
        );
        let (update, r2) = write(
            EntityType::Certificate,
            "c-1",
            OperationKind::Update,
            Priority::Low,
            json!({}),
        );
        queue.enqueue(&create, &r1).await.unwrap();
        queue.enqueue(&update, &r2).await.unwrap();

        let purged = queue
            .cancel_for_record(EntityType::Certificate, "c-1")
            .await
            .unwrap();
        assert_eq!(purged, 2);
        assert!(queue
            .live_for_record(EntityType::Certificate, "c-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summit.db");

        let idempotency_key;
        {
            let store = Store::new(StoreConfig::new(&path)).await.unwrap();
            let (op, record) = write(
                EntityType::Attendance,
                "a-persist",
                OperationKind::Create,
                Priority::Critical,
                json!({"session": "s-1"}),
            );
            let stored = store.queue().enqueue(&op, &record).await.unwrap();
            idempotency_key = stored.idempotency_key.clone();
            store.close().await;
        }

        // Reopen: committed queue rows and records are still there.
        let store = Store::new(StoreConfig::new(&path)).await.unwrap();
        let due = store.queue().due(Utc::now(), 0, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].idempotency_key, idempotency_key);

        let rec = store
            .records()
            .get(EntityType::Attendance, "a-persist")
            .await
            .unwrap();
        assert!(rec.is_some());
    }
}
