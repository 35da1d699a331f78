//! # Conflict Resolver
//!
//! Stateless resolution of local/remote divergence.
//!
//! ## Decision Matrix
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  divergence = queued op exists, OR local record is not `synced`         │
//! │                                                                         │
//! │  no divergence      → AdoptRemote (plain server refresh, any policy)    │
//! │                                                                         │
//! │  ServerWins         → queued op?  KeepLocal (deliver it first)          │
//! │                       no queued?  AdoptRemote                           │
//! │  ServerWinsHard     → AdoptRemote + cancel queued, unconditionally      │
//! │  LastWriteWins      → remote newer than the queued op's basis?          │
//! │                         yes: AdoptRemote + cancel queued                │
//! │                         no:  KeepLocal (unsent edit protected)          │
//! │  KeepBoth           → remote copy persisted as a distinct record        │
//! │  UserArbitration    → Arbitrate (record marked conflict, surfaced)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The resolver is a pure function; applying a [`Resolution`] to the
//! store and the queue is the coordinator's job.

use crate::policy::ConflictPolicy;
use crate::types::{EntityRecord, Operation, RemoteDelta, SyncState};

// =============================================================================
// Resolution
// =============================================================================

/// What the coordinator must do with a pulled delta.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionDecision {
    /// Write the remote state over the local record (delete the row when
    /// the delta is a deletion). `cancel_queued` voids any still-queued
    /// operation for the record.
    AdoptRemote {
        /// Whether queued operations for the record are cancelled.
        cancel_queued: bool,
    },

    /// The local queued write remains the winner; the delta is not
    /// applied over it.
    KeepLocal,

    /// The remote artifact is persisted as a distinct record beside the
    /// local one; the local record and its queued work are untouched.
    KeepBoth,

    /// No automatic action: mark the record `conflict` and surface it.
    Arbitrate,
}

/// Outcome of [`resolve`]: the decision plus the record to write for
/// decisions that produce one.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The decision to apply.
    pub decision: ResolutionDecision,

    /// Record to upsert. Present for `AdoptRemote` on a non-deleted delta
    /// (the adopted record) and for `KeepBoth` (the forked remote copy);
    /// absent otherwise.
    pub merged: Option<EntityRecord>,
}

// =============================================================================
// Resolve
// =============================================================================

/// Resolves one pulled delta against local state under a policy.
///
/// `local` is the stored record, if any; `queued` is the live (pending or
/// in-flight) operation targeting the same record, if any.
pub fn resolve(
    local: Option<&EntityRecord>,
    remote: &RemoteDelta,
    queued: Option<&Operation>,
    policy: ConflictPolicy,
) -> Resolution {
    // A delta only diverges from local state when unacknowledged local
    // work exists for the record.
    let divergent =
        queued.is_some() || local.map(|r| r.sync_state != SyncState::Synced).unwrap_or(false);

    if !divergent {
        return adopt(local, remote, false);
    }

    match policy {
        ConflictPolicy::ServerWins => {
            if queued.is_some() {
                keep_local()
            } else {
                // Queued work was already delivered or voided.
                adopt(local, remote, false)
            }
        }

        ConflictPolicy::ServerWinsHard => adopt(local, remote, queued.is_some()),

        ConflictPolicy::LastWriteWins => match queued {
            Some(op) if remote.updated_at > op.snapshot_updated_at => adopt(local, remote, true),
            Some(_) => keep_local(),
            None => adopt(local, remote, false),
        },

        ConflictPolicy::KeepBoth => {
            if remote.deleted {
                // A remote deletion leaves nothing to fork; the local
                // artifact persists.
                keep_local()
            } else {
                keep_both(local, remote, queued)
            }
        }

        ConflictPolicy::UserArbitration => Resolution {
            decision: ResolutionDecision::Arbitrate,
            merged: None,
        },
    }
}

fn keep_local() -> Resolution {
    Resolution {
        decision: ResolutionDecision::KeepLocal,
        merged: None,
    }
}

fn adopt(local: Option<&EntityRecord>, remote: &RemoteDelta, cancel_queued: bool) -> Resolution {
    let merged = if remote.deleted {
        None
    } else {
        let local_id = local
            .map(|r| r.local_id.clone())
            .or_else(|| remote.local_id.clone())
            .unwrap_or_else(|| remote.remote_id.clone());

        Some(EntityRecord {
            entity_type: remote.entity_type,
            local_id,
            remote_id: Some(remote.remote_id.clone()),
            payload: remote.payload.clone(),
            updated_at: remote.updated_at,
            sync_state: SyncState::Synced,
        })
    };

    Resolution {
        decision: ResolutionDecision::AdoptRemote { cancel_queued },
        merged,
    }
}

fn keep_both(
    local: Option<&EntityRecord>,
    remote: &RemoteDelta,
    queued: Option<&Operation>,
) -> Resolution {
    // Deterministic id for the forked copy: the logical subject's local
    // id joined with the remote id, so repeated pulls of the same delta
    // converge on one row.
    let subject_id = local
        .map(|r| r.local_id.as_str())
        .or_else(|| queued.map(|op| op.local_id.as_str()))
        .unwrap_or(remote.remote_id.as_str());
    let fork_id = format!("{}::{}", subject_id, remote.remote_id);

    Resolution {
        decision: ResolutionDecision::KeepBoth,
        merged: Some(EntityRecord {
            entity_type: remote.entity_type,
            local_id: fork_id,
            remote_id: Some(remote.remote_id.clone()),
            payload: remote.payload.clone(),
            updated_at: remote.updated_at,
            sync_state: SyncState::Synced,
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, OperationKind, Priority};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn record(state: SyncState) -> EntityRecord {
        EntityRecord {
            entity_type: EntityType::Evaluation,
            local_id: "ev-1".into(),
            remote_id: Some("r-1".into()),
            payload: json!({"score": 4}),
            updated_at: Utc::now(),
            sync_state: state,
        }
    }

    fn delta(updated_at: chrono::DateTime<Utc>) -> RemoteDelta {
        RemoteDelta {
            entity_type: EntityType::Evaluation,
            remote_id: "r-1".into(),
            local_id: Some("ev-1".into()),
            payload: json!({"score": 5}),
            updated_at,
            deleted: false,
        }
    }

    fn queued_op(snapshot_updated_at: chrono::DateTime<Utc>) -> Operation {
        Operation::new(
            EntityType::Evaluation,
            "ev-1",
            OperationKind::Update,
            json!({"score": 4}),
            snapshot_updated_at,
            Priority::High,
            snapshot_updated_at,
        )
    }

    #[test]
    fn test_fresh_remote_entity_is_adopted_under_any_policy() {
        let d = delta(Utc::now());
        for policy in [
            ConflictPolicy::ServerWins,
            ConflictPolicy::ServerWinsHard,
            ConflictPolicy::LastWriteWins,
            ConflictPolicy::KeepBoth,
            ConflictPolicy::UserArbitration,
        ] {
            let res = resolve(None, &d, None, policy);
            assert_eq!(
                res.decision,
                ResolutionDecision::AdoptRemote {
                    cancel_queued: false
                },
                "policy {policy}"
            );
            let merged = res.merged.unwrap();
            assert_eq!(merged.local_id, "ev-1");
            assert_eq!(merged.remote_id.as_deref(), Some("r-1"));
            assert_eq!(merged.sync_state, SyncState::Synced);
        }
    }

    #[test]
    fn test_server_wins_defers_to_queued_op() {
        let local = record(SyncState::Pending);
        let op = queued_op(Utc::now());
        let res = resolve(
            Some(&local),
            &delta(Utc::now()),
            Some(&op),
            ConflictPolicy::ServerWins,
        );
        assert_eq!(res.decision, ResolutionDecision::KeepLocal);

        // Once the queued op is gone, remote state is adopted.
        let res = resolve(
            Some(&record(SyncState::Failed)),
            &delta(Utc::now()),
            None,
            ConflictPolicy::ServerWins,
        );
        assert!(matches!(
            res.decision,
            ResolutionDecision::AdoptRemote {
                cancel_queued: false
            }
        ));
    }

    #[test]
    fn test_server_wins_hard_cancels_queued_op() {
        let local = record(SyncState::Pending);
        let op = queued_op(Utc::now());
        let res = resolve(
            Some(&local),
            &delta(Utc::now()),
            Some(&op),
            ConflictPolicy::ServerWinsHard,
        );
        assert_eq!(
            res.decision,
            ResolutionDecision::AdoptRemote { cancel_queued: true }
        );
        assert!(res.merged.is_some());
    }

    #[test]
    fn test_last_write_wins_yields_to_newer_remote() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(30);

        let local = record(SyncState::Pending);
        let op = queued_op(t1);

        // Remote observed at T2 > T1: queued op is cancelled.
        let res = resolve(
            Some(&local),
            &delta(t2),
            Some(&op),
            ConflictPolicy::LastWriteWins,
        );
        assert_eq!(
            res.decision,
            ResolutionDecision::AdoptRemote { cancel_queued: true }
        );
    }

    #[test]
    fn test_last_write_wins_protects_unsent_edit() {
        let t1 = Utc::now();
        let stale_remote = t1 - Duration::seconds(30);

        let local = record(SyncState::Pending);
        let op = queued_op(t1);

        let res = resolve(
            Some(&local),
            &delta(stale_remote),
            Some(&op),
            ConflictPolicy::LastWriteWins,
        );
        assert_eq!(res.decision, ResolutionDecision::KeepLocal);
    }

    #[test]
    fn test_keep_both_forks_deterministically() {
        let local = record(SyncState::Pending);
        let op = queued_op(Utc::now());
        let res = resolve(
            Some(&local),
            &delta(Utc::now()),
            Some(&op),
            ConflictPolicy::KeepBoth,
        );
        assert_eq!(res.decision, ResolutionDecision::KeepBoth);
        let fork = res.merged.unwrap();
        assert_eq!(fork.local_id, "ev-1::r-1");
        assert_eq!(fork.sync_state, SyncState::Synced);

        // Synced record with no queued work: plain refresh, no fork.
        let synced = record(SyncState::Synced);
        let res = resolve(
            Some(&synced),
            &delta(Utc::now()),
            None,
            ConflictPolicy::KeepBoth,
        );
        assert!(matches!(
            res.decision,
            ResolutionDecision::AdoptRemote { .. }
        ));
    }

    #[test]
    fn test_keep_both_ignores_remote_deletion() {
        let local = record(SyncState::Pending);
        let op = queued_op(Utc::now());
        let mut d = delta(Utc::now());
        d.deleted = true;

        let res = resolve(Some(&local), &d, Some(&op), ConflictPolicy::KeepBoth);
        assert_eq!(res.decision, ResolutionDecision::KeepLocal);
    }

    #[test]
    fn test_arbitration_takes_no_automatic_action() {
        let local = record(SyncState::Pending);
        let op = queued_op(Utc::now());
        let res = resolve(
            Some(&local),
            &delta(Utc::now()),
            Some(&op),
            ConflictPolicy::UserArbitration,
        );
        assert_eq!(res.decision, ResolutionDecision::Arbitrate);
        assert!(res.merged.is_none());
    }

    #[test]
    fn test_adopted_deletion_produces_no_record() {
        let synced = record(SyncState::Synced);
        let mut d = delta(Utc::now());
        d.deleted = true;

        let res = resolve(Some(&synced), &d, None, ConflictPolicy::ServerWins);
        assert!(matches!(
            res.decision,
            ResolutionDecision::AdoptRemote { .. }
        ));
        assert!(res.merged.is_none());
    }
}
