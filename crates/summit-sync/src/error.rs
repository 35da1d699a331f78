//! # Sync Error Types
//!
//! Error types for the sync engine.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Handling                               │
//! │                                                                         │
//! │  Transient  (timeout, connection, 5xx)  → retry with backoff            │
//! │  Permanent  (validation, 4xx non-409)   → dead-letter immediately       │
//! │  Conflict   (409 / version mismatch)    → conflict resolver, not retry  │
//! │  Fatal      (store corruption)          → halt coordinator, repair      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use summit_core::EntityRef;
use summit_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering configuration, delivery, and persistence
/// failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// Transient remote failure; the operation will be retried with
    /// backoff.
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// Remote call exceeded its timeout; treated as transient.
    #[error("Remote call timed out after {0} seconds")]
    Timeout(u64),

    /// Permanent remote rejection; dead-lettered, never retried.
    #[error("Permanent remote rejection: {0}")]
    Permanent(String),

    /// Version conflict reported by the remote; routed to the conflict
    /// resolver, not treated as a generic failure.
    #[error("Version conflict for {entity}")]
    Conflict {
        /// The record whose push conflicted.
        entity: EntityRef,
    },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The engine is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Permanent(format!("payload serialization: {err}"))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (drives retry behavior)
// =============================================================================

impl SyncError {
    /// True if the failed operation should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transient(_) | SyncError::Timeout(_) => true,
            SyncError::Store(e) => !e.is_corruption(),
            _ => false,
        }
    }

    /// True if the operation must be dead-lettered without further
    /// retries.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SyncError::Permanent(_))
    }

    /// True if the failure is a version conflict to route through the
    /// resolver.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }

    /// True if the local persistence substrate is damaged: the
    /// coordinator halts and requires explicit repair; queued operations
    /// are never silently dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_corruption())
    }
}
