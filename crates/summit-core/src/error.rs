//! # Error Types
//!
//! Domain-specific error types for summit-core.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (entity type, local id)
//! 3. Errors are enum variants, never bare strings at call sites

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A persisted entity-type name failed to parse.
    #[error("Unknown entity type: '{0}'")]
    UnknownEntityType(String),

    /// A persisted sync-state name failed to parse.
    #[error("Unknown sync state: '{0}'")]
    UnknownSyncState(String),

    /// A persisted priority name failed to parse.
    #[error("Unknown priority: '{0}'")]
    UnknownPriority(String),

    /// A persisted operation-kind name failed to parse.
    #[error("Unknown operation kind: '{0}'")]
    UnknownOperationKind(String),

    /// A persisted operation-status name failed to parse.
    #[error("Unknown operation status: '{0}'")]
    UnknownOperationStatus(String),

    /// A persisted conflict-policy name failed to parse.
    #[error("Unknown conflict policy: '{0}'")]
    UnknownConflictPolicy(String),

    /// An entity payload is not the JSON shape the caller expected.
    #[error("Invalid payload for {entity_type}/{local_id}: {reason}")]
    InvalidPayload {
        /// Entity type of the offending record.
        entity_type: String,
        /// Local id of the offending record.
        local_id: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = CoreError::InvalidPayload {
            entity_type: "evaluation".into(),
            local_id: "ev-7".into(),
            reason: "missing answers array".into(),
        };
        let text = err.to_string();
        assert!(text.contains("evaluation"));
        assert!(text.contains("ev-7"));
    }
}
