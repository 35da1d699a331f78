//! # Remote Ports
//!
//! Collaborator interfaces through which the engine reaches the
//! authoritative remote. The engine ships no transport of its own; the
//! surrounding application provides implementations (HTTP, gRPC, a test
//! double).
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RemoteApplyPort.push(op)      → Ack | RemoteError                      │
//! │    • idempotent by op.idempotency_key: at-least-once delivery means     │
//! │      the same operation may arrive twice; one remote side-effect        │
//! │                                                                         │
//! │  RemotePullPort.pull(cursor, n) → (deltas, next_cursor)                 │
//! │    • cursor is opaque; None means "from the beginning"                  │
//! │    • next_cursor is persisted only after local application              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use thiserror::Error;

use summit_core::{Operation, PushReceipt, RemoteDelta};

// =============================================================================
// Remote Error
// =============================================================================

/// Failure modes of a remote call, as classified by the port
/// implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level or 5xx failure; the operation retries with backoff.
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// The call exceeded its deadline; treated as transient.
    #[error("Remote call timed out")]
    Timeout,

    /// 4xx-style validation rejection (excluding version conflicts);
    /// never retried.
    #[error("Permanent remote rejection: {0}")]
    Permanent(String),

    /// 409 / version mismatch. Carries the remote's current view of the
    /// entity when the backend includes one, so the conflict can be
    /// resolved without waiting for the next pull.
    #[error("Version conflict reported by the remote")]
    Conflict {
        /// The remote's current state of the conflicting entity.
        current: Option<RemoteDelta>,
    },
}

// =============================================================================
// Ports
// =============================================================================

/// Push endpoint of the authoritative remote.
#[async_trait]
pub trait RemoteApplyPort: Send + Sync {
    /// Applies one operation remotely.
    ///
    /// Implementations must deduplicate on `op.idempotency_key`: the
    /// engine delivers at-least-once, so a retry after a lost ack
    /// re-sends the same key.
    async fn push(&self, op: &Operation) -> Result<PushReceipt, RemoteError>;
}

/// Pull/delta endpoint of the authoritative remote.
#[async_trait]
pub trait RemotePullPort: Send + Sync {
    /// Fetches remote changes after `since`, at most `limit` per page.
    async fn pull(&self, since: Option<&str>, limit: u32) -> Result<PullPage, RemoteError>;
}

/// One page of pulled deltas.
#[derive(Debug, Clone)]
pub struct PullPage {
    /// Remote changes, oldest first.
    pub deltas: Vec<RemoteDelta>,

    /// Cursor marking the end of this page; `None` when the remote has
    /// nothing further (the previous cursor remains in force).
    pub next_cursor: Option<String>,
}

impl PullPage {
    /// An empty page with no cursor movement.
    pub fn empty() -> Self {
        PullPage {
            deltas: Vec::new(),
            next_cursor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_page() {
        let page = PullPage::empty();
        assert!(page.deltas.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Transient("503 service unavailable".into());
        assert!(err.to_string().contains("503"));

        let conflict = RemoteError::Conflict { current: None };
        assert!(conflict.to_string().contains("conflict"));
    }
}
