//! # summit-store: Persistence Layer for the Summit Sync Engine
//!
//! This crate provides durable local storage for entity records, the
//! operation queue, and the pull cursor. It uses SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Summit Sync Data Flow                              │
//! │                                                                         │
//! │  summit-sync (queue service, coordinator)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   summit-store (THIS CRATE)                     │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │    │
//! │  │   │     Store     │    │ Repositories  │    │  Migrations  │    │    │
//! │  │   │   (pool.rs)   │    │ records/queue │    │  (embedded)  │    │    │
//! │  │   │               │    │ /cursor       │    │              │    │    │
//! │  │   │ SqlitePool    │◄───│ one SQL home  │    │ 001_init.sql │    │    │
//! │  │   │ WAL + FKs     │    │ per aggregate │    │              │    │    │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (survives process restart; WAL mode)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store error types
//! - [`repository`] - Repository implementations (records, queue, cursor)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use summit_store::{Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::new("path/to/summit.db")).await?;
//!
//! let pending = store.queue().due(Utc::now(), 5, 50).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use pool::{Store, StoreConfig};

// Repository re-exports for convenience
pub use repository::cursor::CursorRepository;
pub use repository::queue::QueueRepository;
pub use repository::records::RecordRepository;
