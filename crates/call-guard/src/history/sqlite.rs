use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use super::CallHistoryRecorder;
use crate::database::CallGuardDatabase;
use crate::error::{CallGuardError, Result};
use crate::types::{
    from_millis, CallFilter, CallRecord, CallRecordId, CallRecordPatch, CallStatistics, CallType,
    HistoryAvailability, NewCallRecord, StatsWindow, TrimPolicy,
};

const SELECT_RECORD: &str = "SELECT id, number, call_type, started_at, duration, is_blocked, \
                             block_reason, created_at FROM call_records";

/// SQLite-backed call history
#[derive(Clone)]
pub struct SqliteCallHistory {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow, Debug)]
struct CallRecordRow {
    id: i64,
    number: String,
    call_type: i64,
    started_at: i64,
    duration: i64,
    is_blocked: bool,
    block_reason: Option<String>,
    created_at: i64,
}

impl TryFrom<CallRecordRow> for CallRecord {
    type Error = CallGuardError;

    fn try_from(row: CallRecordRow) -> Result<Self> {
        Ok(CallRecord {
            id: CallRecordId(row.id),
            number: row.number,
            call_type: CallType::from_code(row.call_type)?,
            started_at: from_millis(row.started_at)?,
            duration: u32::try_from(row.duration.max(0)).unwrap_or(u32::MAX),
            is_blocked: row.is_blocked,
            block_reason: row.block_reason,
            created_at: from_millis(row.created_at)?,
        })
    }
}

impl SqliteCallHistory {
    pub fn new(database: &CallGuardDatabase) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }
}

#[async_trait]
impl CallHistoryRecorder for SqliteCallHistory {
    async fn append(&self, record: NewCallRecord) -> Result<CallRecordId> {
        record.validate()?;

        let result = sqlx::query(
            "INSERT INTO call_records
                 (number, call_type, started_at, duration, is_blocked, block_reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.number)
        .bind(record.call_type.code())
        .bind(record.started_at.timestamp_millis())
        .bind(i64::from(record.duration))
        .bind(record.is_blocked)
        .bind(&record.block_reason)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let id = CallRecordId(result.last_insert_rowid());
        if record.is_blocked {
            info!(%id, number = %record.number, "Blocked call recorded");
        } else {
            debug!(%id, number = %record.number, call_type = %record.call_type, "Call recorded");
        }
        Ok(id)
    }

    async fn update(&self, id: CallRecordId, patch: CallRecordPatch) -> Result<bool> {
        if patch.is_empty() {
            return match self.get(id).await? {
                Some(_) => Ok(false),
                None => Err(CallGuardError::invalid_argument(format!(
                    "unknown call record {}",
                    id
                ))),
            };
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CallRecordRow>(&format!("{} WHERE id = ?1", SELECT_RECORD))
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let current = match row {
            Some(row) => CallRecord::try_from(row)?,
            None => {
                tx.rollback().await?;
                return Err(CallGuardError::invalid_argument(format!("unknown call record {}", id)));
            }
        };

        let updated = patch.apply_to(&current)?;
        if updated == current {
            tx.rollback().await?;
            debug!(%id, "Call record already up to date");
            return Ok(false);
        }

        sqlx::query(
            "UPDATE call_records
             SET call_type = ?1, duration = ?2, is_blocked = ?3, block_reason = ?4
             WHERE id = ?5",
        )
        .bind(updated.call_type.code())
        .bind(i64::from(updated.duration))
        .bind(updated.is_blocked)
        .bind(&updated.block_reason)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            %id,
            call_type = %updated.call_type,
            duration = updated.duration,
            "Call record updated"
        );
        Ok(true)
    }

    async fn get(&self, id: CallRecordId) -> Result<Option<CallRecord>> {
        let row = sqlx::query_as::<_, CallRecordRow>(&format!("{} WHERE id = ?1", SELECT_RECORD))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CallRecord::try_from).transpose()
    }

    async fn query(&self, filter: &CallFilter, limit: u32) -> Result<Vec<CallRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_RECORD);
        builder.push(" WHERE 1 = 1");
        if let Some(call_type) = filter.call_type {
            builder.push(" AND call_type = ").push_bind(call_type.code());
        }
        if let Some(number) = &filter.number {
            builder.push(" AND number = ").push_bind(number.clone());
        }
        if filter.blocked_only {
            builder.push(" AND is_blocked = 1");
        }
        if let Some(since) = filter.since {
            builder.push(" AND started_at >= ").push_bind(since.timestamp_millis());
        }
        builder
            .push(" ORDER BY started_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = builder
            .build_query_as::<CallRecordRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CallRecord::try_from).collect()
    }

    async fn delete(&self, id: CallRecordId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM call_records WHERE id = ?1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        debug!(%id, deleted, "Call record delete requested");
        Ok(deleted)
    }

    async fn statistics(&self, window: StatsWindow) -> Result<CallStatistics> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(call_type = 3), 0) AS missed,
                    COALESCE(SUM(call_type = 1), 0) AS incoming,
                    COALESCE(SUM(call_type = 2), 0) AS outgoing,
                    COALESCE(SUM(call_type = 4), 0) AS blocked,
                    COALESCE(SUM(started_at >= ?1), 0) AS since_midnight
             FROM call_records
             WHERE ?2 IS NULL OR started_at >= ?2",
        )
        .bind(window.midnight.timestamp_millis())
        .bind(window.since.map(|s| s.timestamp_millis()))
        .fetch_one(&self.pool)
        .await?;

        let count = |name: &str| -> Result<u64> {
            let value: i64 = row.try_get(name)?;
            Ok(value.max(0) as u64)
        };

        Ok(CallStatistics {
            total: count("total")?,
            missed: count("missed")?,
            incoming: count("incoming")?,
            outgoing: count("outgoing")?,
            blocked: count("blocked")?,
            since_midnight: count("since_midnight")?,
        })
    }

    async fn trim(&self, policy: TrimPolicy) -> Result<u64> {
        let result = match policy {
            TrimPolicy::KeepLatest(keep) => {
                sqlx::query(
                    "DELETE FROM call_records WHERE id NOT IN
                     (SELECT id FROM call_records ORDER BY started_at DESC, id DESC LIMIT ?1)",
                )
                .bind(i64::from(keep))
                .execute(&self.pool)
                .await?
            }
            TrimPolicy::OlderThan(cutoff) => {
                sqlx::query("DELETE FROM call_records WHERE started_at < ?1")
                    .bind(cutoff.timestamp_millis())
                    .execute(&self.pool)
                    .await?
            }
        };
        let removed = result.rows_affected();
        info!(?policy, removed, "Call history trimmed");
        Ok(removed)
    }

    async fn availability(&self) -> HistoryAvailability {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM call_records")
            .fetch_one(&self.pool)
            .await
        {
            Ok(total) => HistoryAvailability {
                can_access_data: true,
                total_calls: total.max(0) as u64,
                error: None,
            },
            Err(e) => {
                warn!("Call history unavailable: {}", e);
                HistoryAvailability {
                    can_access_data: false,
                    total_calls: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
