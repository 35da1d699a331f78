//! # Pull Cursor Repository
//!
//! Single-row storage for the opaque remote-delta cursor.
//!
//! The cursor is advanced only after a pulled batch has been applied
//! locally; a crash between pull and apply re-delivers the same batch.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;

/// Repository for the sync pull cursor.
#[derive(Debug, Clone)]
pub struct CursorRepository {
    pool: SqlitePool,
}

impl CursorRepository {
    /// Creates a new CursorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CursorRepository { pool }
    }

    /// Returns the stored cursor, or `None` before the first pull.
    pub async fn get(&self) -> StoreResult<Option<String>> {
        let cursor: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM sync_cursor WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        Ok(cursor)
    }

    /// Stores a new cursor value.
    pub async fn set(&self, cursor: &str) -> StoreResult<()> {
        debug!(cursor = %cursor, "Advancing pull cursor");

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO sync_cursor (id, cursor, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cursor)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
