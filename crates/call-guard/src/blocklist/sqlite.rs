use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::BlocklistStore;
use crate::database::CallGuardDatabase;
use crate::error::Result;
use crate::number::{self, normalize, normalize_strict};
use crate::types::{block_reason_or_default, from_millis, BlockedNumber};

/// SQLite-backed blocklist
#[derive(Clone)]
pub struct SqliteBlocklistStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow, Debug)]
struct BlockedNumberRow {
    number: String,
    reason: String,
    created_at: i64,
}

impl TryFrom<BlockedNumberRow> for BlockedNumber {
    type Error = crate::error::CallGuardError;

    fn try_from(row: BlockedNumberRow) -> Result<Self> {
        Ok(BlockedNumber {
            number: row.number,
            reason: row.reason,
            created_at: from_millis(row.created_at)?,
        })
    }
}

impl SqliteBlocklistStore {
    pub fn new(database: &CallGuardDatabase) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    async fn fetch_exact(&self, normalized: &str) -> Result<Option<BlockedNumber>> {
        let row = sqlx::query_as::<_, BlockedNumberRow>(
            "SELECT number, reason, created_at FROM blocked_numbers WHERE number = ?1",
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BlockedNumber::try_from).transpose()
    }
}

#[async_trait]
impl BlocklistStore for SqliteBlocklistStore {
    async fn contains(&self, number: &str) -> Result<bool> {
        let normalized = normalize(number);
        if normalized.is_empty() {
            return Ok(false);
        }
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM blocked_numbers WHERE number = ?1")
                .bind(&normalized)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn reason_for(&self, number: &str) -> Result<Option<String>> {
        let normalized = normalize(number);
        if normalized.is_empty() {
            return Ok(None);
        }
        Ok(self.fetch_exact(&normalized).await?.map(|entry| entry.reason))
    }

    async fn add(&self, number: &str, reason: &str) -> Result<BlockedNumber> {
        let normalized = normalize_strict(number)?;
        let reason = block_reason_or_default(reason);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO blocked_numbers (number, reason, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(number) DO UPDATE
             SET reason = excluded.reason, created_at = excluded.created_at",
        )
        .bind(&normalized)
        .bind(reason)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        info!(number = %normalized, reason, "Number blocked");
        Ok(BlockedNumber {
            number: normalized,
            reason: reason.to_string(),
            created_at: from_millis(now.timestamp_millis())?,
        })
    }

    async fn remove(&self, number: &str) -> Result<bool> {
        let normalized = normalize(number);
        if normalized.is_empty() {
            return Ok(false);
        }
        let result = sqlx::query("DELETE FROM blocked_numbers WHERE number = ?1")
            .bind(&normalized)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(number = %normalized, removed, "Unblock requested");
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<BlockedNumber>> {
        let rows = sqlx::query_as::<_, BlockedNumberRow>(
            "SELECT number, reason, created_at FROM blocked_numbers
             ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BlockedNumber::try_from).collect()
    }

    async fn find_match(
        &self,
        number: &str,
        min_suffix_digits: usize,
    ) -> Result<Option<BlockedNumber>> {
        let normalized = normalize(number);
        if normalized.is_empty() {
            return Ok(None);
        }
        if let Some(exact) = self.fetch_exact(&normalized).await? {
            return Ok(Some(exact));
        }

        let digits = number::digits(&normalized);
        if min_suffix_digits == 0 || digits.len() < min_suffix_digits {
            return Ok(None);
        }

        // Digits never contain LIKE wildcards, so plain concatenation is safe.
        let row = sqlx::query_as::<_, BlockedNumberRow>(
            "SELECT number, reason, created_at FROM blocked_numbers
             WHERE length(replace(number, '+', '')) >= ?2
               AND (?1 LIKE '%' || replace(number, '+', '')
                    OR replace(number, '+', '') LIKE '%' || ?1)
             ORDER BY length(number) DESC, created_at DESC
             LIMIT 1",
        )
        .bind(digits)
        .bind(min_suffix_digits as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BlockedNumber::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteBlocklistStore {
        let db = CallGuardDatabase::new_in_memory().await.unwrap();
        SqliteBlocklistStore::new(&db)
    }

    #[tokio::test]
    async fn test_add_is_visible_through_equivalent_forms() {
        let store = store().await;
        store.add("+1 (555) 010-0100", "spam").await.unwrap();

        assert!(store.contains("+15550100100").await.unwrap());
        assert!(store.contains("+1-555-010-0100").await.unwrap());
        assert!(!store.contains("15550100100").await.unwrap());
        assert_eq!(store.reason_for("+1.555.010.0100").await.unwrap().as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn test_add_replaces_on_conflict() {
        let store = store().await;
        store.add("5550100", "spam").await.unwrap();
        store.add("555-0100", "telemarketer").await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reason, "telemarketer");
    }

    #[tokio::test]
    async fn test_blank_reason_is_stored_as_default() {
        let store = store().await;
        store.add("5550100", "   ").await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all[0].reason, crate::types::DEFAULT_BLOCK_REASON);
    }

    #[tokio::test]
    async fn test_remove_absent_is_false() {
        let store = store().await;
        assert!(!store.remove("5550100").await.unwrap());
        store.add("5550100", "spam").await.unwrap();
        assert!(store.remove("555 0100").await.unwrap());
        assert!(!store.contains("5550100").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_rejects_numbers_without_digits() {
        let store = store().await;
        let err = store.add("anonymous", "spam").await.unwrap_err();
        assert!(matches!(err, crate::error::CallGuardError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_find_match_prefers_exact_then_suffix() {
        let store = store().await;
        store.add("5550100", "short").await.unwrap();
        store.add("+15550100", "full").await.unwrap();

        let hit = store.find_match("+1-555-0100", 7).await.unwrap().unwrap();
        assert_eq!(hit.reason, "full");

        store.remove("+15550100").await.unwrap();
        let hit = store.find_match("+1-555-0100", 7).await.unwrap().unwrap();
        assert_eq!(hit.number, "5550100");

        assert!(store.find_match("+1-555-0100", 0).await.unwrap().is_none());
        assert!(store.find_match("0100", 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_pool_is_store_unavailable() {
        let db = CallGuardDatabase::new_in_memory().await.unwrap();
        let store = SqliteBlocklistStore::new(&db);
        db.close().await;

        let err = store.contains("5550100").await.unwrap_err();
        assert!(matches!(err, crate::error::CallGuardError::StoreUnavailable(_)));
    }
}
