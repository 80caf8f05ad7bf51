//! Presentation bridge
//!
//! Typed operations for a UI or remote caller, plus [`CallGuardBridge::handle`]
//! which takes a JSON method call (`{"method": "...", "args": {...}}`) and
//! answers `{"ok": ...}` or `{"error": {"kind": ..., "message": ...}}`.
//! Nothing here panics across the boundary; every failure is a [`BridgeError`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::decision::BlockingDecisionEngine;
use crate::error::{CallGuardError, ErrorKind, Result};
use crate::history::CallHistoryRecorder;
use crate::number::normalize_strict;
use crate::types::{
    BlockedNumber, CallFilter, CallRecord, CallRecordId, CallStatistics, HistoryAvailability,
    StatsWindow, TrimPolicy, DEFAULT_BLOCK_REASON,
};

/// Default page size for `getRecentCalls`
pub const DEFAULT_RECENT_LIMIT: u32 = 100;

/// Structured error returned across the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<CallGuardError> for BridgeError {
    fn from(err: CallGuardError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BridgeError {}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Method call accepted by [`CallGuardBridge::handle`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum BridgeRequest {
    IsNumberBlocked {
        number: String,
    },
    AddBlockedNumber {
        number: String,
        #[serde(default)]
        reason: Option<String>,
    },
    RemoveBlockedNumber {
        number: String,
    },
    ListBlockedNumbers,
    GetRecentCalls {
        #[serde(default = "default_recent_limit")]
        limit: u32,
    },
    DeleteCallRecord {
        id: i64,
    },
    GetStatistics,
    TrimCallHistory {
        #[serde(default, rename = "keepLatest")]
        keep_latest: Option<u32>,
        #[serde(default, rename = "olderThan")]
        older_than: Option<DateTime<Utc>>,
    },
    CheckCallLogAvailability,
}

fn default_recent_limit() -> u32 {
    DEFAULT_RECENT_LIMIT
}

/// Reply to a [`BridgeRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeResponse {
    Ok(Value),
    Error(BridgeError),
}

impl BridgeResponse {
    fn from_result<T: Serialize>(result: BridgeResult<T>) -> Self {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(json) => BridgeResponse::Ok(json),
                Err(e) => BridgeResponse::Error(CallGuardError::internal(e.to_string()).into()),
            },
            Err(e) => BridgeResponse::Error(e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BridgeResponse::Ok(_))
    }
}

/// Blocklist and history operations exposed to the presentation layer
#[derive(Clone)]
pub struct CallGuardBridge {
    engine: Arc<BlockingDecisionEngine>,
    history: Arc<dyn CallHistoryRecorder>,
}

impl CallGuardBridge {
    pub fn new(engine: Arc<BlockingDecisionEngine>, history: Arc<dyn CallHistoryRecorder>) -> Self {
        Self { engine, history }
    }

    /// Same match rules as the call path, but store failures are reported
    pub async fn is_number_blocked(&self, number: &str) -> BridgeResult<bool> {
        Ok(self.engine.lookup(number).await?.is_some())
    }

    /// Block a number. A blank reason falls back to the default reason.
    pub async fn add_blocked_number(
        &self,
        number: &str,
        reason: Option<&str>,
    ) -> BridgeResult<bool> {
        let normalized = normalize_strict(number)?;
        let entry = self
            .engine
            .store()
            .add(&normalized, reason.unwrap_or(DEFAULT_BLOCK_REASON))
            .await?;
        debug!(number = %entry.number, reason = %entry.reason, "Bridge blocked number");
        Ok(true)
    }

    /// `false` when the number was not blocked
    pub async fn remove_blocked_number(&self, number: &str) -> BridgeResult<bool> {
        let normalized = normalize_strict(number)?;
        let removed = self.engine.store().remove(&normalized).await?;
        if removed {
            info!(number = %normalized, "Number unblocked");
        } else {
            debug!(number = %normalized, "Unblock requested for a number that was not blocked");
        }
        Ok(removed)
    }

    pub async fn list_blocked_numbers(&self) -> BridgeResult<Vec<BlockedNumber>> {
        Ok(self.engine.store().list().await?)
    }

    pub async fn get_recent_calls(&self, limit: u32) -> BridgeResult<Vec<CallRecord>> {
        if limit == 0 {
            return Err(CallGuardError::invalid_argument("limit must be positive").into());
        }
        Ok(self.history.query(&CallFilter::default(), limit).await?)
    }

    /// `false` when no record has this id
    pub async fn delete_call_record(&self, id: i64) -> BridgeResult<bool> {
        if id <= 0 {
            let err = CallGuardError::invalid_argument(format!("malformed call record id {}", id));
            return Err(err.into());
        }
        Ok(self.history.delete(CallRecordId(id)).await?)
    }

    pub async fn get_statistics(&self) -> BridgeResult<CallStatistics> {
        Ok(self.history.statistics(StatsWindow::all_time()).await?)
    }

    /// Exactly one of `keep_latest` / `older_than` must be given
    pub async fn trim_call_history(
        &self,
        keep_latest: Option<u32>,
        older_than: Option<DateTime<Utc>>,
    ) -> BridgeResult<u64> {
        let policy = match (keep_latest, older_than) {
            (Some(keep), None) => TrimPolicy::KeepLatest(keep),
            (None, Some(cutoff)) => TrimPolicy::OlderThan(cutoff),
            _ => {
                return Err(CallGuardError::invalid_argument(
                    "exactly one of keepLatest or olderThan is required",
                )
                .into());
            }
        };
        Ok(self.history.trim(policy).await?)
    }

    pub async fn check_call_log_availability(&self) -> HistoryAvailability {
        self.history.availability().await
    }

    /// Dispatch a method call
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        debug!(?request, "Bridge request");
        let response = match request {
            BridgeRequest::IsNumberBlocked { number } => {
                BridgeResponse::from_result(self.is_number_blocked(&number).await)
            }
            BridgeRequest::AddBlockedNumber { number, reason } => BridgeResponse::from_result(
                self.add_blocked_number(&number, reason.as_deref()).await,
            ),
            BridgeRequest::RemoveBlockedNumber { number } => {
                BridgeResponse::from_result(self.remove_blocked_number(&number).await)
            }
            BridgeRequest::ListBlockedNumbers => {
                BridgeResponse::from_result(self.list_blocked_numbers().await)
            }
            BridgeRequest::GetRecentCalls { limit } => {
                BridgeResponse::from_result(self.get_recent_calls(limit).await)
            }
            BridgeRequest::DeleteCallRecord { id } => {
                BridgeResponse::from_result(self.delete_call_record(id).await)
            }
            BridgeRequest::GetStatistics => {
                BridgeResponse::from_result(self.get_statistics().await)
            }
            BridgeRequest::TrimCallHistory { keep_latest, older_than } => {
                BridgeResponse::from_result(self.trim_call_history(keep_latest, older_than).await)
            }
            BridgeRequest::CheckCallLogAvailability => {
                BridgeResponse::from_result(Ok(self.check_call_log_availability().await))
            }
        };
        if let BridgeResponse::Error(e) = &response {
            warn!(kind = %e.kind, message = %e.message, "Bridge request failed");
        }
        response
    }

    /// Parse and dispatch a raw JSON method call
    pub async fn handle_json(&self, raw: &str) -> BridgeResponse {
        match parse_request(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => BridgeResponse::Error(e.into()),
        }
    }
}

fn parse_request(raw: &str) -> Result<BridgeRequest> {
    serde_json::from_str(raw)
        .map_err(|e| CallGuardError::invalid_argument(format!("malformed bridge request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::MemoryBlocklistStore;
    use crate::config::DecisionConfig;
    use crate::history::MemoryCallHistory;
    use crate::types::{CallType, NewCallRecord};

    fn bridge() -> (CallGuardBridge, Arc<MemoryCallHistory>) {
        let engine = Arc::new(BlockingDecisionEngine::new(
            Arc::new(MemoryBlocklistStore::new()),
            &DecisionConfig::default(),
        ));
        let history = Arc::new(MemoryCallHistory::new());
        (CallGuardBridge::new(engine, history.clone()), history)
    }

    #[tokio::test]
    async fn test_blank_reason_uses_default() {
        let (bridge, _) = bridge();
        assert!(bridge.add_blocked_number("555 0100", Some("  ")).await.unwrap());

        let list = bridge.list_blocked_numbers().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].reason, DEFAULT_BLOCK_REASON);
        assert!(bridge.is_number_blocked("5550100").await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_number_is_invalid_argument() {
        let (bridge, _) = bridge();
        let err = bridge.add_blocked_number("call me", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(bridge.list_blocked_numbers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unblocking_absent_number_is_false() {
        let (bridge, _) = bridge();
        assert!(!bridge.remove_blocked_number("5550100").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let (bridge, _) = bridge();
        let err = bridge.get_recent_calls(0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_call_record_ids() {
        let (bridge, history) = bridge();
        let id = history
            .append(NewCallRecord::allowed("5550100", Utc::now(), CallType::Incoming, 4))
            .await
            .unwrap();

        for malformed in [0, -7] {
            let err = bridge.delete_call_record(malformed).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument);
        }
        assert!(!bridge.delete_call_record(id.0 + 100).await.unwrap());
        assert!(bridge.delete_call_record(id.0).await.unwrap());
        assert!(history.snapshot().is_empty());

        let response = bridge.handle_json(r#"{"method":"deleteCallRecord","args":{"id":0}}"#).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["kind"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_trim_needs_exactly_one_policy() {
        let (bridge, _) = bridge();
        assert!(bridge.trim_call_history(None, None).await.is_err());
        assert!(bridge.trim_call_history(Some(1), Some(Utc::now())).await.is_err());
        assert_eq!(bridge.trim_call_history(Some(10), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_json_dispatch() {
        let (bridge, history) = bridge();
        history
            .append(NewCallRecord::allowed("5550100", Utc::now(), CallType::Missed, 0))
            .await
            .unwrap();

        let request = r#"{"method":"addBlockedNumber","args":{"number":"+1 555 0199","reason":"robocall"}}"#;
        let response = bridge.handle_json(request).await;
        assert_eq!(response, BridgeResponse::Ok(Value::Bool(true)));

        let response = bridge.handle_json(r#"{"method":"getStatistics"}"#).await;
        let BridgeResponse::Ok(stats) = response else {
            panic!("expected statistics");
        };
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["missed"], 1);

        let response = bridge.handle_json(r#"{"method":"getRecentCalls","args":{}}"#).await;
        assert!(response.is_ok());

        let response = bridge.handle_json(r#"{"method":"explode"}"#).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["kind"], "INVALID_ARGUMENT");
    }
}
