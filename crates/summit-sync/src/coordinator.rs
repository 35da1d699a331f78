//! # Sync Coordinator
//!
//! Orchestrates connectivity-triggered sync cycles: drains the operation
//! queue to the remote, pulls remote deltas, and reconciles divergences
//! through the conflict policy engine.
//!
//! ## Cycle Phases
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Coordinator Phases                                │
//! │                                                                         │
//! │        connectivity regained / periodic tick / manual trigger           │
//! │                               │                                         │
//! │   ┌──────┐              ┌─────▼──────┐                                  │
//! │   │ Idle │ ───────────► │ Connecting │── offline ──► back to Idle       │
//! │   └──▲───┘              └─────┬──────┘                                  │
//! │      │                        │ online                                  │
//! │      │                  ┌─────▼──────┐                                  │
//! │      │                  │  Draining  │  per-entity-type lanes, each     │
//! │      │                  └─────┬──────┘  strictly ordered; lanes run     │
//! │      │                        │         concurrently up to K permits    │
//! │      │                  ┌─────▼──────┐                                  │
//! │      │                  │  Pulling   │  cursor-paged delta fetch        │
//! │      │                  └─────┬──────┘                                  │
//! │      │                  ┌─────▼──────┐                                  │
//! │      │                  │Reconciling │  policy per delta; one bad       │
//! │      │                  └─────┬──────┘  record never blocks the rest    │
//! │      └────────────────────────┘                                         │
//! │                                                                         │
//! │  Any remote-call failure returns to Idle with the queue intact.         │
//! │  Store corruption → Halted: explicit repair required, nothing dropped.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use summit_core::{
    resolve, EntityRecord, EntityType, Operation, OperationStatus, PolicyTable, RemoteDelta,
    Resolution, ResolutionDecision, SyncState,
};
use summit_store::Store;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::observer::SyncObserver;
use crate::ports::{RemoteApplyPort, RemoteError, RemotePullPort};
use crate::queue::OperationQueue;

// =============================================================================
// Sync Phase
// =============================================================================

/// Coordinator phase, published to observers on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Waiting for connectivity, a tick, or a trigger.
    Idle,

    /// Checking reachability before starting a cycle.
    Connecting,

    /// Pushing queued operations to the remote.
    Draining,

    /// Fetching remote deltas since the stored cursor.
    Pulling,

    /// Applying conflict policies to pulled deltas.
    Reconciling,

    /// Local persistence is damaged; the coordinator stopped and requires
    /// explicit repair. Queued operations remain persisted.
    Halted,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::Connecting => write!(f, "connecting"),
            SyncPhase::Draining => write!(f, "draining"),
            SyncPhase::Pulling => write!(f, "pulling"),
            SyncPhase::Reconciling => write!(f, "reconciling"),
            SyncPhase::Halted => write!(f, "halted"),
        }
    }
}

// =============================================================================
// Coordinator Handle
// =============================================================================

/// Handle for controlling a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    phase: Arc<RwLock<SyncPhase>>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl CoordinatorHandle {
    /// Current coordinator phase.
    pub async fn phase(&self) -> SyncPhase {
        *self.phase.read().await
    }

    /// Requests an immediate sync cycle (in addition to connectivity
    /// edges and the periodic tick).
    pub async fn trigger(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Stops the coordinator gracefully. Queued operations stay
    /// persisted for the next start.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// The only component that touches the network (through the ports).
#[derive(Clone)]
pub struct SyncCoordinator {
    store: Store,
    queue: OperationQueue,
    apply: Arc<dyn RemoteApplyPort>,
    pull: Arc<dyn RemotePullPort>,
    connectivity: watch::Receiver<bool>,
    observer: Arc<dyn SyncObserver>,
    config: SyncConfig,
    policies: PolicyTable,
    phase: Arc<RwLock<SyncPhase>>,
}

impl SyncCoordinator {
    /// Builds a coordinator. `connectivity` is the monitor's watch feed
    /// ([`crate::connectivity::ConnectivityHandle::watch`]).
    fn new(
        store: Store,
        queue: OperationQueue,
        apply: Arc<dyn RemoteApplyPort>,
        pull: Arc<dyn RemotePullPort>,
        connectivity: watch::Receiver<bool>,
        observer: Arc<dyn SyncObserver>,
        config: SyncConfig,
    ) -> Self {
        let policies = config.policy_table();
        SyncCoordinator {
            store,
            queue,
            apply,
            pull,
            connectivity,
            observer,
            config,
            policies,
            phase: Arc::new(RwLock::new(SyncPhase::Idle)),
        }
    }

    /// Recovers stale state and spawns the coordinator run loop.
    ///
    /// Recovery runs first: any operation left `in_flight` by a crash
    /// reverts to `pending` (its idempotency key unchanged), and no
    /// record stays `syncing`.
    pub async fn spawn(
        store: Store,
        queue: OperationQueue,
        apply: Arc<dyn RemoteApplyPort>,
        pull: Arc<dyn RemotePullPort>,
        connectivity: watch::Receiver<bool>,
        observer: Arc<dyn SyncObserver>,
        config: SyncConfig,
    ) -> SyncResult<CoordinatorHandle> {
        config.validate()?;

        let coordinator = Self::new(store, queue, apply, pull, connectivity, observer, config);
        coordinator.queue.recover_stale().await?;

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = CoordinatorHandle {
            phase: coordinator.phase.clone(),
            trigger_tx,
            shutdown_tx,
        };

        tokio::spawn(coordinator.run(trigger_rx, shutdown_rx));

        Ok(handle)
    }

    /// Coordinator run loop: react to connectivity transitions, the
    /// periodic tick, and manual triggers.
    async fn run(self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!("Sync coordinator started");

        let mut connectivity = self.connectivity.clone();
        let mut tick =
            tokio::time::interval(Duration::from_secs(self.config.drain.tick_interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; swallow it so a
        // freshly started coordinator waits for a real signal.
        tick.tick().await;

        loop {
            let should_cycle = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Coordinator received shutdown");
                    break;
                }

                changed = connectivity.changed() => {
                    match changed {
                        Ok(()) => {
                            let online = *connectivity.borrow_and_update();
                            debug!(online, "Connectivity transition received");
                            online
                        }
                        // Monitor gone; nothing will ever wake us again.
                        Err(_) => break,
                    }
                }

                _ = tick.tick() => *connectivity.borrow(),

                Some(()) = trigger_rx.recv() => true,
            };

            if !should_cycle {
                continue;
            }

            match self.run_cycle().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal store failure, halting coordinator");
                    self.set_phase(SyncPhase::Halted).await;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Sync cycle failed");
                    self.set_phase(SyncPhase::Idle).await;
                }
            }
        }

        info!("Sync coordinator stopped");
    }

    /// One full cycle: Connecting → Draining → Pulling → Reconciling →
    /// Idle. Remote failures return to Idle with the queue intact; only
    /// fatal store errors escape as `Err`.
    async fn run_cycle(&self) -> SyncResult<()> {
        self.set_phase(SyncPhase::Connecting).await;

        if !*self.connectivity.borrow() {
            debug!("Offline at cycle start, returning to idle");
            self.set_phase(SyncPhase::Idle).await;
            return Ok(());
        }

        self.set_phase(SyncPhase::Draining).await;
        let drained = self.drain().await?;

        if drained {
            self.set_phase(SyncPhase::Pulling).await;
            self.pull_and_reconcile().await?;
        }

        self.set_phase(SyncPhase::Idle).await;
        Ok(())
    }

    // =========================================================================
    // Draining
    // =========================================================================

    /// Drains due operations. Returns `false` when a transport-level
    /// failure ended the drain early (the cycle skips pulling; queued
    /// rows stay persisted for the next cycle).
    async fn drain(&self) -> SyncResult<bool> {
        let mut completed = true;

        loop {
            let due = self
                .queue
                .due_batch(Utc::now(), self.config.drain.drain_batch_size)
                .await?;
            if due.is_empty() {
                break;
            }

            debug!(count = due.len(), "Draining due operations");

            // Group into per-entity-type lanes, preserving dequeue order
            // inside each lane and the order lanes first appear (highest
            // effective priority first).
            let mut lane_index: HashMap<EntityType, usize> = HashMap::new();
            let mut lanes: Vec<(EntityType, Vec<Operation>)> = Vec::new();
            for op in due {
                match lane_index.get(&op.entity_type) {
                    Some(&i) => lanes[i].1.push(op),
                    None => {
                        lane_index.insert(op.entity_type, lanes.len());
                        lanes.push((op.entity_type, vec![op]));
                    }
                }
            }

            // Lanes run concurrently, bounded by max_concurrent_push
            // permits; within a lane operations go out one at a time, so
            // two operations for one entity are never in flight together.
            let semaphore = Arc::new(Semaphore::new(self.config.drain.max_concurrent_push));
            let mut tasks: JoinSet<SyncResult<bool>> = JoinSet::new();

            for (entity_type, ops) in lanes {
                let this = self.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| SyncError::ChannelError(e.to_string()))?;
                    this.drain_lane(entity_type, ops).await
                });
            }

            let mut round_ok = true;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(lane_ok)) => round_ok &= lane_ok,
                    Ok(Err(e)) if e.is_fatal() => return Err(e),
                    Ok(Err(e)) => {
                        warn!(error = %e, "Drain lane failed");
                        round_ok = false;
                    }
                    Err(join_err) => {
                        error!(error = %join_err, "Drain lane panicked");
                        round_ok = false;
                    }
                }
            }

            if !round_ok {
                completed = false;
                break;
            }
        }

        // Operations that sat due through this cycle age toward their
        // priority boost.
        self.queue.end_drain_cycle(Utc::now()).await?;

        Ok(completed)
    }

    /// Pushes one lane's operations sequentially. Returns `false` on a
    /// transport-level failure (lane abandoned for this cycle).
    async fn drain_lane(&self, entity_type: EntityType, ops: Vec<Operation>) -> SyncResult<bool> {
        let push_timeout = Duration::from_secs(self.config.drain.push_timeout_secs);

        for mut op in ops {
            // Mid-cycle disconnect: abandon the lane; unclaimed rows are
            // still pending.
            if !*self.connectivity.borrow() {
                debug!(entity_type = %entity_type, "Offline mid-drain, abandoning lane");
                return Ok(false);
            }

            self.queue.claim(&mut op).await?;

            match timeout(push_timeout, self.apply.push(&op)).await {
                Err(_elapsed) => {
                    self.queue.nack(&op, "push timed out").await?;
                    return Ok(false);
                }

                Ok(Ok(receipt)) => {
                    self.queue.ack(&op, &receipt).await?;
                }

                Ok(Err(RemoteError::Timeout)) => {
                    self.queue.nack(&op, "remote timeout").await?;
                    return Ok(false);
                }

                Ok(Err(RemoteError::Transient(msg))) => {
                    self.queue.nack(&op, &msg).await?;
                    return Ok(false);
                }

                Ok(Err(RemoteError::Permanent(msg))) => {
                    // The record is isolated as failed; the lane goes on.
                    self.queue.fail_permanent(&op, &msg).await?;
                }

                Ok(Err(RemoteError::Conflict { current })) => {
                    self.resolve_push_conflict(&op, current).await?;
                }
            }
        }

        Ok(true)
    }

    /// Handles a 409 from the push endpoint. With the remote's current
    /// state attached the conflict resolves right away; without it the
    /// operation backs off and the next pull carries the delta.
    async fn resolve_push_conflict(
        &self,
        op: &Operation,
        current: Option<RemoteDelta>,
    ) -> SyncResult<()> {
        match current {
            Some(delta) => {
                info!(entity = %op.entity_ref(), "Resolving push conflict in place");
                self.reconcile_delta(&delta).await?;

                // A decision that did not void the operation (server-wins
                // defers it, arbitration freezes it) leaves the row in
                // flight; schedule it back instead of stranding it.
                if let Some(still) = self.store.queue().get(&op.id).await? {
                    if still.status == OperationStatus::InFlight {
                        self.queue.nack(&still, "version conflict").await?;
                    }
                }
                Ok(())
            }
            None => {
                self.queue.nack(op, "version conflict").await?;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Pulling & Reconciling
    // =========================================================================

    /// Pulls delta pages since the stored cursor and reconciles each
    /// page. The cursor advances only after a page has been applied
    /// locally; a remote failure leaves it untouched.
    async fn pull_and_reconcile(&self) -> SyncResult<()> {
        let mut cursor = self.store.cursor().get().await?;
        let batch = self.config.drain.pull_batch_size;

        loop {
            let page = match self.pull.pull(cursor.as_deref(), batch).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Pull failed, ending cycle");
                    return Ok(());
                }
            };

            if page.deltas.is_empty() && page.next_cursor.is_none() {
                break;
            }

            self.set_phase(SyncPhase::Reconciling).await;

            for delta in &page.deltas {
                // Partial-failure isolation: one bad record is surfaced
                // and skipped; the rest of the batch still lands.
                if let Err(e) = self.reconcile_delta(delta).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(
                        entity_type = %delta.entity_type,
                        remote_id = %delta.remote_id,
                        error = %e,
                        "Failed to reconcile delta, skipping"
                    );
                }
            }

            let done = (page.deltas.len() as u32) < batch;

            if let Some(next) = page.next_cursor {
                self.store.cursor().set(&next).await?;
                cursor = Some(next);
            }

            if done {
                break;
            }

            self.set_phase(SyncPhase::Pulling).await;
        }

        Ok(())
    }

    /// Routes one delta through the policy engine and applies the
    /// decision.
    async fn reconcile_delta(&self, delta: &RemoteDelta) -> SyncResult<()> {
        let records = self.store.records();

        // Locate the local counterpart: the echoed client id first, the
        // remote id otherwise.
        let mut local: Option<EntityRecord> = None;
        if let Some(local_id) = &delta.local_id {
            local = records.get(delta.entity_type, local_id).await?;
        }
        if local.is_none() {
            local = records
                .get_by_remote_id(delta.entity_type, &delta.remote_id)
                .await?;
        }

        let queued = match &local {
            Some(record) => {
                self.queue
                    .live_for_record(record.entity_type, &record.local_id)
                    .await?
            }
            None => None,
        };

        let policy = self.policies.policy_for(delta.entity_type);
        let resolution = resolve(local.as_ref(), delta, queued.as_ref(), policy);

        debug!(
            entity_type = %delta.entity_type,
            remote_id = %delta.remote_id,
            policy = %policy,
            decision = ?resolution.decision,
            "Reconciling delta"
        );

        self.apply_resolution(local.as_ref(), delta, resolution)
            .await
    }

    /// Applies a resolution to the store and the queue.
    async fn apply_resolution(
        &self,
        local: Option<&EntityRecord>,
        delta: &RemoteDelta,
        resolution: Resolution,
    ) -> SyncResult<()> {
        let records = self.store.records();

        match resolution.decision {
            ResolutionDecision::AdoptRemote { cancel_queued } => {
                if cancel_queued {
                    if let Some(record) = local {
                        self.queue
                            .purge_record(record.entity_type, &record.local_id)
                            .await?;
                    }
                }

                match resolution.merged {
                    Some(record) => records.upsert(&record).await?,
                    None => {
                        // An adopted remote deletion removes the row.
                        if let Some(record) = local {
                            records.delete(record.entity_type, &record.local_id).await?;
                        }
                    }
                }
            }

            ResolutionDecision::KeepLocal => {
                // The queued local write stays the winner; nothing to do.
            }

            ResolutionDecision::KeepBoth => {
                if let Some(copy) = resolution.merged {
                    records.upsert(&copy).await?;
                }
            }

            ResolutionDecision::Arbitrate => {
                if let Some(record) = local {
                    records
                        .set_sync_state(record.entity_type, &record.local_id, SyncState::Conflict)
                        .await?;
                    self.observer.on_conflict(record.entity_ref());
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn set_phase(&self, phase: SyncPhase) {
        let mut current = self.phase.write().await;
        if *current != phase {
            debug!(phase = %phase, "Coordinator phase change");
            *current = phase;
            self.observer.on_status_changed(phase);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
