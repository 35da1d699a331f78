//! # Operation Queue Service
//!
//! Engine-level semantics over the durable queue: enqueue with
//! dedup/merge, single-consumer dequeue, retry scheduling with persisted
//! exponential backoff, dead-lettering, and crash recovery.
//!
//! ## Retry Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  next_retry_at = now + min(base * 2^attempts, cap) + jitter             │
//! │                                                                         │
//! │  base 500ms, cap 60s:                                                   │
//! │    attempt 1:  1s   (+ jitter)                                          │
//! │    attempt 2:  2s   (+ jitter)                                          │
//! │    attempt 3:  4s   (+ jitter)                                          │
//! │    ...                                                                  │
//! │    attempt 7+: 60s  (+ jitter)  ← capped                                │
//! │                                                                         │
//! │  jitter: uniform in 0..=base, applied after the cap                     │
//! │  attempts > max_attempts  → dead-letter, record marked `failed`         │
//! │  permanent rejection      → dead-letter immediately                     │
//! │                                                                         │
//! │  The schedule lives in the operation row, so a process restart          │
//! │  resumes the backoff where it left off.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use summit_core::{EntityRecord, EntityType, Operation, OperationKind, Priority, PushReceipt};
use summit_store::Store;

use crate::config::QueueSettings;
use crate::error::SyncResult;
use crate::observer::SyncObserver;

// =============================================================================
// New Operation
// =============================================================================

/// A local application write to be stored and queued.
#[derive(Debug, Clone)]
pub struct NewOperation {
    /// Entity type of the written record.
    pub entity_type: EntityType,

    /// Client-generated record id.
    pub local_id: String,

    /// Mutation kind.
    pub kind: OperationKind,

    /// The record payload as written.
    pub payload: serde_json::Value,

    /// Upload priority; defaults to the entity type's class when `None`.
    pub priority: Option<Priority>,
}

impl NewOperation {
    /// Creates a write with the entity type's default priority.
    pub fn new(
        entity_type: EntityType,
        local_id: impl Into<String>,
        kind: OperationKind,
        payload: serde_json::Value,
    ) -> Self {
        NewOperation {
            entity_type,
            local_id: local_id.into(),
            kind,
            payload,
            priority: None,
        }
    }

    /// Overrides the upload priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Outcome of a negative acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub enum NackOutcome {
    /// A retry was scheduled for the given instant.
    Scheduled(DateTime<Utc>),

    /// The retry budget is exhausted; the operation is parked.
    DeadLettered,
}

// =============================================================================
// Operation Queue
// =============================================================================

/// Durable, priority-ordered queue of pending mutations.
#[derive(Clone)]
pub struct OperationQueue {
    store: Store,
    settings: QueueSettings,
    observer: Arc<dyn SyncObserver>,
}

impl OperationQueue {
    /// Creates a queue service over a store.
    pub fn new(store: Store, settings: QueueSettings, observer: Arc<dyn SyncObserver>) -> Self {
        OperationQueue {
            store,
            settings,
            observer,
        }
    }

    /// Stores a local write and queues it for delivery, atomically.
    ///
    /// A repeated write to the same `(entity_type, local_id, kind)`
    /// collapses into the already-queued operation: latest payload, max
    /// priority, unchanged id and idempotency key. Returns the live
    /// operation.
    pub async fn enqueue(&self, write: NewOperation) -> SyncResult<Operation> {
        let now = Utc::now();
        let priority = write
            .priority
            .unwrap_or_else(|| write.entity_type.default_priority());

        let record = EntityRecord::new(
            write.entity_type,
            write.local_id.clone(),
            write.payload.clone(),
            now,
        );
        let op = Operation::new(
            write.entity_type,
            write.local_id,
            write.kind,
            write.payload,
            now,
            priority,
            now,
        );

        let stored = self.store.queue().enqueue(&op, &record).await?;
        self.emit_depth().await;

        Ok(stored)
    }

    /// Pending operations due at `now`, in dequeue order, without
    /// claiming them.
    pub async fn due_batch(&self, now: DateTime<Utc>, limit: u32) -> SyncResult<Vec<Operation>> {
        Ok(self
            .store
            .queue()
            .due(now, self.settings.aging_threshold_cycles, limit)
            .await?)
    }

    /// Claims the single next due operation: highest effective priority,
    /// FIFO within a tier. Returns `None` when nothing is due.
    pub async fn dequeue_next(&self, now: DateTime<Utc>) -> SyncResult<Option<Operation>> {
        let mut due = self.due_batch(now, 1).await?;
        let Some(mut op) = due.pop() else {
            return Ok(None);
        };

        self.store.queue().mark_in_flight(&op).await?;
        op.status = summit_core::OperationStatus::InFlight;
        op.aged_cycles = 0;
        Ok(Some(op))
    }

    /// Claims a specific due operation (used by the coordinator's lane
    /// drain, which fetches a batch first).
    pub async fn claim(&self, op: &mut Operation) -> SyncResult<()> {
        self.store.queue().mark_in_flight(op).await?;
        op.status = summit_core::OperationStatus::InFlight;
        op.aged_cycles = 0;
        Ok(())
    }

    /// Acknowledges a delivered operation: the queue row is removed and
    /// the record becomes `synced` (adopting the receipt's remote id).
    /// An acknowledged delete destroys the record row.
    pub async fn ack(&self, op: &Operation, receipt: &PushReceipt) -> SyncResult<()> {
        debug!(op_id = %op.id, entity = %op.entity_ref(), "Operation acknowledged");

        self.store
            .queue()
            .ack(op, receipt.remote_id.as_deref())
            .await?;
        self.emit_depth().await;

        Ok(())
    }

    /// Records a transient delivery failure.
    ///
    /// The attempt is counted and the next retry scheduled with
    /// exponential backoff; once `attempt_count` exceeds the configured
    /// maximum, the operation is dead-lettered instead and the record is
    /// surfaced to the user as `failed`.
    pub async fn nack(&self, op: &Operation, error: &str) -> SyncResult<NackOutcome> {
        let attempts = op.attempt_count + 1;

        if attempts > self.settings.max_attempts {
            warn!(
                op_id = %op.id,
                entity = %op.entity_ref(),
                attempts,
                error,
                "Retry budget exhausted, dead-lettering"
            );
            self.dead_letter(op, error).await?;
            return Ok(NackOutcome::DeadLettered);
        }

        let next_retry_at = Utc::now() + self.backoff_delay(attempts);
        debug!(
            op_id = %op.id,
            attempts,
            next_retry_at = %next_retry_at,
            error,
            "Transient failure, retry scheduled"
        );

        self.store
            .queue()
            .record_failure(op, error, next_retry_at)
            .await?;

        Ok(NackOutcome::Scheduled(next_retry_at))
    }

    /// Dead-letters an operation immediately (permanent rejection),
    /// regardless of its attempt count.
    pub async fn fail_permanent(&self, op: &Operation, error: &str) -> SyncResult<()> {
        warn!(
            op_id = %op.id,
            entity = %op.entity_ref(),
            error,
            "Permanent rejection, dead-lettering"
        );
        self.dead_letter(op, error).await
    }

    /// Reverts an in-flight operation to `pending` without counting an
    /// attempt. Used when a push is abandoned mid-flight (disconnect,
    /// cycle cancellation); the unchanged idempotency key makes the
    /// eventual re-delivery safe.
    pub async fn revert(&self, op: &Operation) -> SyncResult<()> {
        debug!(op_id = %op.id, "Reverting in-flight operation to pending");
        self.store.queue().revert_in_flight(op).await?;
        Ok(())
    }

    /// Cancels a queued operation (e.g., a newer remote write won under
    /// last-write-wins).
    pub async fn cancel(&self, op: &Operation) -> SyncResult<()> {
        debug!(op_id = %op.id, entity = %op.entity_ref(), "Cancelling queued operation");
        self.store.queue().cancel(&op.id).await?;
        self.emit_depth().await;
        Ok(())
    }

    /// Purges every live operation for a record (server-wins-hard).
    pub async fn purge_record(&self, entity_type: EntityType, local_id: &str) -> SyncResult<u64> {
        let purged = self
            .store
            .queue()
            .cancel_for_record(entity_type, local_id)
            .await?;
        if purged > 0 {
            info!(
                entity_type = %entity_type,
                local_id,
                purged,
                "Purged queued operations for record"
            );
            self.emit_depth().await;
        }
        Ok(purged)
    }

    /// The live operation for a record, if one is queued or in flight.
    pub async fn live_for_record(
        &self,
        entity_type: EntityType,
        local_id: &str,
    ) -> SyncResult<Option<Operation>> {
        Ok(self
            .store
            .queue()
            .live_for_record(entity_type, local_id)
            .await?)
    }

    /// Resets stale in-flight state after a crash: every `in_flight`
    /// operation returns to `pending`, every `syncing` record to
    /// `pending`. Called once at coordinator startup.
    pub async fn recover_stale(&self) -> SyncResult<u64> {
        let reset = self.store.queue().reset_stale_in_flight().await?;
        if reset > 0 {
            info!(reset, "Recovered stale in-flight operations");
        }
        Ok(reset)
    }

    /// Ends a drain cycle: operations that sat due without being
    /// dequeued age one cycle toward their next priority boost.
    pub async fn end_drain_cycle(&self, now: DateTime<Utc>) -> SyncResult<u64> {
        Ok(self.store.queue().age_due(now).await?)
    }

    /// Operations awaiting delivery (pending or in flight).
    pub async fn depth(&self) -> SyncResult<i64> {
        Ok(self.store.queue().count_pending().await?)
    }

    /// All dead-lettered operations, for manual handling.
    pub async fn dead_letters(&self) -> SyncResult<Vec<Operation>> {
        Ok(self.store.queue().dead_letters().await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn dead_letter(&self, op: &Operation, error: &str) -> SyncResult<()> {
        self.store.queue().dead_letter(op, error).await?;
        self.observer.on_dead_letter(op);
        self.emit_depth().await;
        Ok(())
    }

    /// `min(base * 2^attempts, cap) + jitter`, with saturating math and
    /// jitter uniform in `0..=base`.
    fn backoff_delay(&self, attempts: i64) -> Duration {
        let exp = attempts.clamp(0, 32) as u32;
        let exponential = self
            .settings
            .base_backoff_ms
            .saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX));
        let capped = exponential.min(self.settings.backoff_cap_ms);
        let jitter = rand::thread_rng().gen_range(0..=self.settings.base_backoff_ms);

        Duration::milliseconds((capped + jitter) as i64)
    }

    async fn emit_depth(&self) {
        if let Ok(depth) = self.depth().await {
            self.observer.on_queue_depth(depth);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
