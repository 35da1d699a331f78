//! # summit-sync: Offline-First Sync Engine for Summit
//!
//! This crate reconciles mutations made on a disconnected client with a
//! single authoritative remote once connectivity returns, preserving
//! per-entity ordering and bounded, idempotent retry behavior.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                  SyncCoordinator (orchestrator)                  │   │
//! │  │                                                                  │   │
//! │  │  Idle → Connecting → Draining → Pulling → Reconciling → Idle     │   │
//! │  │  Wakes on connectivity regained, periodic tick, manual trigger   │   │
//! │  └────────────────────────────┬─────────────────────────────────────┘   │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                   │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐     │
//! │  │ Connectivity   │  │ OperationQueue │  │  Remote Ports          │     │
//! │  │ Monitor        │  │                │  │                        │     │
//! │  │                │  │ Durable, prio- │  │ RemoteApplyPort.push   │     │
//! │  │ Debounced      │  │ ordered queue: │  │  (idempotent by key)   │     │
//! │  │ reachability;  │  │ dedup/merge,   │  │ RemotePullPort.pull    │     │
//! │  │ watch channel  │  │ backoff, dead- │  │  (cursor paged)        │     │
//! │  │ to coordinator │  │ lettering      │  │                        │     │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘     │
//! │                                                                         │
//! │  Conflict resolution: per-entity-type policies (summit-core)            │
//! │  Persistence: entity records + queue + cursor (summit-store)            │
//! │                                                                         │
//! │  OBSERVER EVENTS (to the host UI):                                      │
//! │  • on_status_changed  - coordinator phase transitions                   │
//! │  • on_conflict        - record needs manual arbitration                 │
//! │  • on_queue_depth     - pending operation count                         │
//! │  • on_dead_letter     - operation parked after exhausting retries       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`coordinator`] - The `SyncCoordinator` orchestrator and phases
//! - [`queue`] - Operation queue service (enqueue, ack, nack, dead-letter)
//! - [`connectivity`] - Debounced reachability monitor
//! - [`ports`] - Remote apply/pull collaborator traits
//! - [`observer`] - Event surface for the host application
//! - [`config`] - Engine configuration (TOML + env)
//! - [`error`] - Sync error types and categorization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use summit_store::{Store, StoreConfig};
//! use summit_sync::{
//!     ConnectivityMonitor, NewOperation, OperationQueue, SyncConfig, SyncCoordinator,
//! };
//!
//! let config = SyncConfig::load_or_default(None);
//! let store = Store::new(StoreConfig::new("summit.db")).await?;
//!
//! let observer = Arc::new(MyUiBridge::new());
//! let queue = OperationQueue::new(store.clone(), config.queue.clone(), observer.clone());
//! let monitor = ConnectivityMonitor::spawn(config.connectivity.clone());
//!
//! let coordinator = SyncCoordinator::spawn(
//!     store,
//!     queue.clone(),
//!     Arc::new(MyApplyPort::new(api_client.clone())),
//!     Arc::new(MyPullPort::new(api_client)),
//!     monitor.watch(),
//!     observer,
//!     config,
//! )
//! .await?;
//!
//! // Application writes while offline:
//! queue.enqueue(NewOperation::new(entity_type, id, kind, payload)).await?;
//!
//! // Platform reachability callbacks:
//! monitor.report(true).await; // drains once the state holds
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod observer;
pub mod ports;
pub mod queue;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConnectivitySettings, DrainSettings, QueueSettings, SyncConfig};
pub use connectivity::{ConnectivityHandle, ConnectivityMonitor, Subscription};
pub use coordinator::{CoordinatorHandle, SyncCoordinator, SyncPhase};
pub use error::{SyncError, SyncResult};
pub use observer::{NoOpObserver, SyncObserver};
pub use ports::{PullPage, RemoteApplyPort, RemoteError, RemotePullPort};
pub use queue::{NackOutcome, NewOperation, OperationQueue};

// Core types most callers need alongside the engine.
pub use summit_core::{
    ConflictPolicy, EntityRecord, EntityRef, EntityType, Operation, OperationKind, PolicyTable,
    Priority, PushReceipt, RemoteDelta, SyncState,
};
