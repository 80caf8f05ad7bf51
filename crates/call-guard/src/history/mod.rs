//! Call history recording
//!
//! Records are appended once and patched afterwards; statistics are always
//! computed from the records themselves, never from stored counters.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CallFilter, CallRecord, CallRecordId, CallRecordPatch, CallStatistics, HistoryAvailability,
    NewCallRecord, StatsWindow, TrimPolicy,
};

pub use memory::MemoryCallHistory;
pub use sqlite::SqliteCallHistory;

/// Call history storage trait
#[async_trait]
pub trait CallHistoryRecorder: Send + Sync {
    /// Store a new record and return its handle
    async fn append(&self, record: NewCallRecord) -> Result<CallRecordId>;

    /// Patch a record. Returns `false` when the patch matched the stored
    /// fields and nothing was written. Unknown ids are `InvalidArgument`.
    async fn update(&self, id: CallRecordId, patch: CallRecordPatch) -> Result<bool>;

    async fn get(&self, id: CallRecordId) -> Result<Option<CallRecord>>;

    /// Matching records, newest first, at most `limit`
    async fn query(&self, filter: &CallFilter, limit: u32) -> Result<Vec<CallRecord>>;

    /// Delete a record; `false` when it did not exist
    async fn delete(&self, id: CallRecordId) -> Result<bool>;

    async fn statistics(&self, window: StatsWindow) -> Result<CallStatistics>;

    /// Remove old records, returning how many were deleted
    async fn trim(&self, policy: TrimPolicy) -> Result<u64>;

    async fn availability(&self) -> HistoryAvailability;
}
