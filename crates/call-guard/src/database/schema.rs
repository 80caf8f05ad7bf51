//! Database schema definitions
//!
//! Timestamps are stored as epoch milliseconds.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

/// Create the blocked numbers table
pub async fn create_blocked_numbers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocked_numbers (
            number TEXT PRIMARY KEY NOT NULL,
            reason TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("blocked_numbers table ready");
    Ok(())
}

/// Create the call records table
pub async fn create_call_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS call_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            number TEXT NOT NULL,
            call_type INTEGER NOT NULL,
            started_at INTEGER NOT NULL,
            duration INTEGER NOT NULL DEFAULT 0 CHECK (duration >= 0),
            is_blocked INTEGER NOT NULL DEFAULT 0,
            block_reason TEXT,
            created_at INTEGER NOT NULL,
            CHECK (is_blocked = 0 OR block_reason IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("call_records table ready");
    Ok(())
}

/// Create indexes for recency queries
pub async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_call_records_started_at ON call_records(started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_blocked_numbers_created_at
         ON blocked_numbers(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
