//! Core types for call-guard
//!
//! Blocklist entries, call records and the value types used to query and
//! patch call history.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CallGuardError, Result};

/// Reason stored when a number is blocked without an explicit reason
pub const DEFAULT_BLOCK_REASON: &str = "Spam";

/// Trimmed reason, or [`DEFAULT_BLOCK_REASON`] when it is blank
pub fn block_reason_or_default(reason: &str) -> &str {
    match reason.trim() {
        "" => DEFAULT_BLOCK_REASON,
        trimmed => trimmed,
    }
}

/// A blocked number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedNumber {
    /// Normalized number, unique within the blocklist
    pub number: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Opaque call record handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallRecordId(pub i64);

impl fmt::Display for CallRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Blocked,
}

impl CallType {
    /// Persisted integer code
    pub fn code(&self) -> i64 {
        match self {
            CallType::Incoming => 1,
            CallType::Outgoing => 2,
            CallType::Missed => 3,
            CallType::Blocked => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(CallType::Incoming),
            2 => Ok(CallType::Outgoing),
            3 => Ok(CallType::Missed),
            4 => Ok(CallType::Blocked),
            other => Err(CallGuardError::internal(format!("unknown call type code {}", other))),
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallType::Incoming => "incoming",
            CallType::Outgoing => "outgoing",
            CallType::Missed => "missed",
            CallType::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Persisted call record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: CallRecordId,
    pub number: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub started_at: DateTime<Utc>,
    /// Duration in whole seconds
    pub duration: u32,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A call record that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCallRecord {
    pub number: String,
    pub call_type: CallType,
    pub started_at: DateTime<Utc>,
    pub duration: u32,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
}

impl NewCallRecord {
    /// Record for a call the blocklist matched
    pub fn blocked(
        number: impl Into<String>,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            call_type: CallType::Blocked,
            started_at,
            duration: 0,
            is_blocked: true,
            block_reason: Some(block_reason_or_default(&reason.into()).to_string()),
        }
    }

    /// Record for an allowed call with the given final type
    pub fn allowed(
        number: impl Into<String>,
        started_at: DateTime<Utc>,
        call_type: CallType,
        duration: u32,
    ) -> Self {
        Self {
            number: number.into(),
            call_type,
            started_at,
            duration,
            is_blocked: false,
            block_reason: None,
        }
    }

    /// Enforce `is_blocked => block_reason present`
    pub fn validate(&self) -> Result<()> {
        validate_block_fields(self.is_blocked, self.block_reason.as_deref())
    }

    pub fn into_record(self, id: CallRecordId, created_at: DateTime<Utc>) -> CallRecord {
        CallRecord {
            id,
            number: self.number,
            call_type: self.call_type,
            started_at: self.started_at,
            duration: self.duration,
            is_blocked: self.is_blocked,
            block_reason: self.block_reason,
            created_at,
        }
    }
}

/// Partial update of a call record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRecordPatch {
    pub call_type: Option<CallType>,
    pub duration: Option<u32>,
    /// Marks the record blocked with this reason
    pub block_reason: Option<String>,
}

impl CallRecordPatch {
    pub fn classify(call_type: CallType, duration: u32) -> Self {
        Self {
            call_type: Some(call_type),
            duration: Some(duration),
            block_reason: None,
        }
    }

    pub fn reclassify_blocked(reason: impl Into<String>) -> Self {
        Self {
            call_type: Some(CallType::Blocked),
            duration: None,
            block_reason: Some(block_reason_or_default(&reason.into()).to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.call_type.is_none() && self.duration.is_none() && self.block_reason.is_none()
    }

    /// Apply the patch, returning the updated record
    pub fn apply_to(&self, record: &CallRecord) -> Result<CallRecord> {
        let mut updated = record.clone();
        if let Some(call_type) = self.call_type {
            updated.call_type = call_type;
        }
        if let Some(duration) = self.duration {
            updated.duration = duration;
        }
        if let Some(reason) = &self.block_reason {
            updated.is_blocked = true;
            updated.block_reason = Some(reason.clone());
        }
        validate_block_fields(updated.is_blocked, updated.block_reason.as_deref())?;
        Ok(updated)
    }
}

fn validate_block_fields(is_blocked: bool, reason: Option<&str>) -> Result<()> {
    if is_blocked && reason.map_or(true, |r| r.trim().is_empty()) {
        return Err(CallGuardError::invalid_argument(
            "blocked call records require a block reason",
        ));
    }
    Ok(())
}

/// Filter for history queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallFilter {
    pub call_type: Option<CallType>,
    /// Matches the stored (normalized) number exactly
    pub number: Option<String>,
    pub blocked_only: bool,
    pub since: Option<DateTime<Utc>>,
}

impl CallFilter {
    pub fn matches(&self, record: &CallRecord) -> bool {
        if let Some(call_type) = self.call_type {
            if record.call_type != call_type {
                return false;
            }
        }
        if let Some(number) = &self.number {
            if &record.number != number {
                return false;
            }
        }
        if self.blocked_only && !record.is_blocked {
            return false;
        }
        if let Some(since) = self.since {
            if record.started_at < since {
                return false;
            }
        }
        true
    }
}

/// Window over which statistics are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    /// Only records started at or after this instant count; `None` means all
    pub since: Option<DateTime<Utc>>,
    /// Start of "today" for the `since_midnight` counter
    pub midnight: DateTime<Utc>,
}

impl StatsWindow {
    /// All records, with "today" measured from local midnight
    pub fn all_time() -> Self {
        Self {
            since: None,
            midnight: local_midnight(),
        }
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            midnight: local_midnight(),
        }
    }
}

/// Start of the current day in local time, expressed in UTC
pub fn local_midnight() -> DateTime<Utc> {
    let today = Local::now().date_naive().and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&today)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Read-side call statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatistics {
    pub total: u64,
    pub missed: u64,
    pub incoming: u64,
    pub outgoing: u64,
    pub blocked: u64,
    #[serde(rename = "today")]
    pub since_midnight: u64,
}

/// History trimming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Keep the newest `n` records
    KeepLatest(u32),
    /// Delete records started before the instant
    OlderThan(DateTime<Utc>),
}

/// Diagnostics about history storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryAvailability {
    pub can_access_data: bool,
    pub total_calls: u64,
    pub error: Option<String>,
}

/// Convert epoch milliseconds from storage into a timestamp
pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| CallGuardError::internal(format!("timestamp {} out of range", ms)))
}
