//! # Store Error Types
//!
//! Error types for persistence operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds context and categorization            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (summit-sync) ← Drives coordinator behavior                 │
//! │    (Corruption is fatal: the coordinator halts rather than retry)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found where one was required.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of row was looked up.
        entity: String,
        /// The id that missed.
        id: String,
    },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation {
        /// The constrained column(s).
        field: String,
        /// The offending value, when known.
        value: String,
    },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Persisted data failed to decode: an enum name, timestamp, or JSON
    /// payload that no longer parses. Treated as fatal by the sync
    /// coordinator; requires explicit repair, never silent discard.
    #[error("Store corruption: {0}")]
    Corruption(String),

    /// Internal store error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True for errors that mean the local substrate itself is damaged,
    /// as opposed to a failed individual statement.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corruption(_) | StoreError::MigrationFailed(_)
        )
    }
}

/// Convert sqlx errors to StoreError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → StoreError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::ColumnDecode   → StoreError::Corruption
/// sqlx::Error::PoolTimedOut   → StoreError::PoolExhausted
/// Other                       → StoreError::Internal
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "Row".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    StoreError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("database disk image is malformed")
                    || msg.contains("file is not a database")
                {
                    StoreError::Corruption(msg.to_string())
                } else {
                    StoreError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::Corruption(format!("column {index}: {source}"))
            }

            sqlx::Error::Decode(source) => StoreError::Corruption(source.to_string()),

            sqlx::Error::PoolTimedOut => StoreError::PoolExhausted,

            sqlx::Error::PoolClosed => StoreError::ConnectionFailed("Pool is closed".to_string()),

            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<summit_core::CoreError> for StoreError {
    fn from(err: summit_core::CoreError) -> Self {
        // A stored enum name that no longer parses is damaged data, not a
        // bad query.
        StoreError::Corruption(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corruption(format!("payload JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_classification() {
        assert!(StoreError::Corruption("bad enum".into()).is_corruption());
        assert!(StoreError::MigrationFailed("checksum".into()).is_corruption());
        assert!(!StoreError::PoolExhausted.is_corruption());
        assert!(!StoreError::not_found("Operation", "op-1").is_corruption());
    }
}
