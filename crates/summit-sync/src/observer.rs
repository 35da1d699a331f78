//! # Sync Observer
//!
//! Event surface consumed by the UI layer. The engine never renders
//! anything; it reports state transitions, conflicts needing
//! arbitration, queue depth, and dead-lettered operations.

use summit_core::{EntityRef, Operation};

use crate::coordinator::SyncPhase;

/// Trait for observing sync engine events (implemented by the host
/// application's UI bridge).
pub trait SyncObserver: Send + Sync {
    /// The coordinator entered a new phase.
    fn on_status_changed(&self, phase: SyncPhase);

    /// A record diverged and requires manual arbitration.
    fn on_conflict(&self, entity: EntityRef);

    /// The number of operations awaiting delivery changed.
    fn on_queue_depth(&self, pending: i64);

    /// An operation exhausted its retry budget or was permanently
    /// rejected, and is parked for manual handling.
    fn on_dead_letter(&self, op: &Operation);
}

/// No-op observer for headless use and tests.
pub struct NoOpObserver;

impl SyncObserver for NoOpObserver {
    fn on_status_changed(&self, _phase: SyncPhase) {}
    fn on_conflict(&self, _entity: EntityRef) {}
    fn on_queue_depth(&self, _pending: i64) {}
    fn on_dead_letter(&self, _op: &Operation) {}
}
