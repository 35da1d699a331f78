//! # Domain Types
//!
//! Core types shared by the store and the sync engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  EntityRecord   │   │   Operation     │   │  RemoteDelta    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  entity_type    │   │  id (UUID)      │   │  entity_type    │       │
//! │  │  local_id       │   │  kind           │   │  remote_id      │       │
//! │  │  remote_id?     │   │  priority       │   │  payload        │       │
//! │  │  payload        │   │  attempt_count  │   │  updated_at     │       │
//! │  │  sync_state     │   │  next_retry_at  │   │  deleted        │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   EntityType    │   │   SyncState     │   │   Priority      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Attendance     │   │  Pending        │   │  Critical (0)   │       │
//! │  │  Registration   │   │  Syncing        │   │  High     (1)   │       │
//! │  │  Evaluation     │   │  Synced         │   │  Medium   (2)   │       │
//! │  │  Certificate    │   │  Conflict       │   │  Low      (3)   │       │
//! │  │  Media, Profile │   │  Failed         │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `local_id`: client-generated, stable from the moment of creation
//! - `remote_id`: assigned by the authoritative remote on first push

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Entity Type
// =============================================================================

/// The syncable entity kinds of the Summit application.
///
/// Each type carries a default upload priority and a default conflict
/// policy (see [`crate::policy::PolicyTable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Check-in / attendance proofs. Authority is server-side.
    Attendance,

    /// Event registrations.
    Registration,

    /// Survey / evaluation answers.
    Evaluation,

    /// Issued certificates. Read-mostly on the client.
    Certificate,

    /// Uploaded media (photos, signatures).
    Media,

    /// Attendee profile metadata.
    Profile,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 6] = [
        EntityType::Attendance,
        EntityType::Registration,
        EntityType::Evaluation,
        EntityType::Certificate,
        EntityType::Media,
        EntityType::Profile,
    ];

    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Attendance => "attendance",
            EntityType::Registration => "registration",
            EntityType::Evaluation => "evaluation",
            EntityType::Certificate => "certificate",
            EntityType::Media => "media",
            EntityType::Profile => "profile",
        }
    }

    /// Default upload priority for operations on this entity type.
    ///
    /// ## Priority Classes
    /// - `critical`: attendance / check-in proofs
    /// - `high`: registrations, evaluation submissions
    /// - `medium`: profile metadata edits
    /// - `low`: media, cached certificate documents
    pub const fn default_priority(&self) -> Priority {
        match self {
            EntityType::Attendance => Priority::Critical,
            EntityType::Registration => Priority::High,
            EntityType::Evaluation => Priority::High,
            EntityType::Profile => Priority::Medium,
            EntityType::Certificate => Priority::Low,
            EntityType::Media => Priority::Low,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attendance" => Ok(EntityType::Attendance),
            "registration" => Ok(EntityType::Registration),
            "evaluation" => Ok(EntityType::Evaluation),
            "certificate" => Ok(EntityType::Certificate),
            "media" => Ok(EntityType::Media),
            "profile" => Ok(EntityType::Profile),
            other => Err(CoreError::UnknownEntityType(other.to_string())),
        }
    }
}

// =============================================================================
// Sync State
// =============================================================================

/// Per-record reconciliation status.
///
/// ## State Transitions
/// ```text
/// Pending ──► Syncing ──► Synced
///    ▲           │
///    │           └──► Pending  (transient failure, retry scheduled)
///    │
///    ├──► Conflict  (divergence routed to arbitration)
///    └──► Failed    (operation dead-lettered)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local write not yet acknowledged by the remote.
    Pending,

    /// An operation for this record is currently in flight.
    Syncing,

    /// Local and remote agree as of the last exchange.
    Synced,

    /// Divergence awaiting manual arbitration.
    Conflict,

    /// The record's operation exceeded its retry budget.
    Failed,
}

impl SyncState {
    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
            SyncState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "syncing" => Ok(SyncState::Syncing),
            "synced" => Ok(SyncState::Synced),
            "conflict" => Ok(SyncState::Conflict),
            "failed" => Ok(SyncState::Failed),
            other => Err(CoreError::UnknownSyncState(other.to_string())),
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Upload priority of a queued operation.
///
/// Persisted as an integer rank where 0 is the most urgent; ordering via
/// `Ord` follows urgency, so `Priority::Critical > Priority::Low` and
/// `a.max(b)` yields the more urgent of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Attendance / check-in proofs.
    Critical,

    /// Registrations and evaluation submissions.
    High,

    /// Metadata edits.
    Medium,

    /// Media and cached documents.
    Low,
}

impl Priority {
    /// Persisted integer rank (0 = critical ... 3 = low).
    pub const fn rank(&self) -> i64 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// Rebuilds a priority from its persisted rank. Out-of-range ranks
    /// clamp to the nearest tier.
    pub const fn from_rank(rank: i64) -> Self {
        match rank {
            i64::MIN..=0 => Priority::Critical,
            1 => Priority::High,
            2 => Priority::Medium,
            _ => Priority::Low,
        }
    }

    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// One tier more urgent, saturating at `Critical`.
    pub const fn promoted(&self) -> Self {
        Self::from_rank(self.rank() - 1)
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Lower rank = more urgent = greater priority.
        other.rank().cmp(&self.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(CoreError::UnknownPriority(other.to_string())),
        }
    }
}

// =============================================================================
// Operation Kind / Status
// =============================================================================

/// The mutation kind carried by a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Entity created locally; remote has never seen it.
    Create,

    /// Entity modified locally.
    Update,

    /// Entity deleted locally; the record row survives until the delete
    /// is acknowledged remotely.
    Delete,
}

impl OperationKind {
    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(CoreError::UnknownOperationKind(other.to_string())),
        }
    }
}

/// Queue status of an operation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Eligible for dequeue once `next_retry_at` has passed.
    Pending,

    /// Handed to the coordinator; not eligible for a second dequeue.
    InFlight,

    /// Retry budget exceeded or permanent rejection; parked for manual
    /// handling, never retried automatically.
    DeadLetter,
}

impl OperationStatus {
    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InFlight => "in_flight",
            OperationStatus::DeadLetter => "dead_letter",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "in_flight" => Ok(OperationStatus::InFlight),
            "dead_letter" => Ok(OperationStatus::DeadLetter),
            other => Err(CoreError::UnknownOperationStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Entity Record
// =============================================================================

/// A locally stored entity together with its sync metadata.
///
/// Payload and sync metadata are written atomically by the store — no
/// reader ever observes a payload ahead of its own `sync_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity type.
    pub entity_type: EntityType,

    /// Client-generated identifier, stable from creation.
    pub local_id: String,

    /// Remote identifier; `None` until the first successful push.
    pub remote_id: Option<String>,

    /// Type-specific payload.
    pub payload: serde_json::Value,

    /// Last local modification time.
    pub updated_at: DateTime<Utc>,

    /// Reconciliation status.
    pub sync_state: SyncState,
}

impl EntityRecord {
    /// Creates a new pending record from a local application write.
    pub fn new(
        entity_type: EntityType,
        local_id: impl Into<String>,
        payload: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> Self {
        EntityRecord {
            entity_type,
            local_id: local_id.into(),
            remote_id: None,
            payload,
            updated_at,
            sync_state: SyncState::Pending,
        }
    }

    /// Reference to this record's identity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: self.entity_type,
            local_id: self.local_id.clone(),
        }
    }
}

/// Lightweight identity of an entity record, used in observer callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type.
    pub entity_type: EntityType,

    /// Client-generated identifier.
    pub local_id: String,
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.local_id)
    }
}

// =============================================================================
// Operation
// =============================================================================

/// A queued mutation awaiting remote delivery.
///
/// At most one live (non-dead-letter) operation exists per
/// `(entity_type, local_id, kind)`; a repeated local write collapses into
/// the existing row, replacing its payload and raising its priority to
/// the max of old and new. `id`, `idempotency_key` and `enqueued_at`
/// survive the merge unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation id (UUID v4).
    pub id: String,

    /// Entity type of the target record.
    pub entity_type: EntityType,

    /// Local id of the target record.
    pub local_id: String,

    /// Mutation kind.
    pub kind: OperationKind,

    /// Snapshot of the record payload at enqueue (or last merge) time.
    pub payload_snapshot: serde_json::Value,

    /// The record's `updated_at` when the snapshot was taken. Basis value
    /// for last-write-wins reconciliation.
    pub snapshot_updated_at: DateTime<Utc>,

    /// Upload priority.
    pub priority: Priority,

    /// Queue status.
    pub status: OperationStatus,

    /// Delivery attempts so far.
    pub attempt_count: i64,

    /// Drain cycles this operation sat due but undequeued. Feeds the
    /// aging boost that bounds starvation of low-priority work.
    pub aged_cycles: i64,

    /// Not eligible for dequeue before this instant.
    pub next_retry_at: DateTime<Utc>,

    /// First enqueue time; FIFO tie-breaker within a priority tier.
    pub enqueued_at: DateTime<Utc>,

    /// Stable dedup key for at-least-once delivery. Defaults to `id` and
    /// never changes across retries or merges.
    pub idempotency_key: String,

    /// Last delivery error, if any.
    pub last_error: Option<String>,
}

impl Operation {
    /// Creates a fresh pending operation for a local write.
    pub fn new(
        entity_type: EntityType,
        local_id: impl Into<String>,
        kind: OperationKind,
        payload_snapshot: serde_json::Value,
        snapshot_updated_at: DateTime<Utc>,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        Operation {
            idempotency_key: id.clone(),
            id,
            entity_type,
            local_id: local_id.into(),
            kind,
            payload_snapshot,
            snapshot_updated_at,
            priority,
            status: OperationStatus::Pending,
            attempt_count: 0,
            aged_cycles: 0,
            next_retry_at: now,
            enqueued_at: now,
            last_error: None,
        }
    }

    /// Effective priority after the aging boost: one tier of promotion
    /// per `threshold` missed drain cycles, floored at critical.
    pub fn effective_priority(&self, threshold: i64) -> Priority {
        if threshold <= 0 {
            return self.priority;
        }
        Priority::from_rank(self.priority.rank() - self.aged_cycles / threshold)
    }

    /// Reference to the target record's identity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: self.entity_type,
            local_id: self.local_id.clone(),
        }
    }
}

// =============================================================================
// Remote Exchange Types
// =============================================================================

/// One pulled remote change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDelta {
    /// Entity type.
    pub entity_type: EntityType,

    /// Remote identifier.
    pub remote_id: String,

    /// Client id echoed back by the remote, when it knows one.
    pub local_id: Option<String>,

    /// Remote payload (empty object for deletions).
    pub payload: serde_json::Value,

    /// Remote modification time.
    pub updated_at: DateTime<Utc>,

    /// Whether the entity was deleted remotely.
    pub deleted: bool,
}

/// Acknowledgment returned by the remote apply port for a pushed
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// Remote id assigned to the entity (present at least on creates).
    pub remote_id: Option<String>,

    /// Remote timestamp of the applied mutation.
    pub remote_updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Tests
// =============================================================================
