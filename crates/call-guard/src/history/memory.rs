use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::CallHistoryRecorder;
use crate::error::{CallGuardError, Result};
use crate::types::{
    CallFilter, CallRecord, CallRecordId, CallRecordPatch, CallStatistics, CallType,
    HistoryAvailability, NewCallRecord, StatsWindow, TrimPolicy,
};

/// In-memory call history, used by tests and dry runs
#[derive(Default)]
pub struct MemoryCallHistory {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<CallRecordId, CallRecord>,
    writes: u64,
}

impl MemoryCallHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of appends and effective updates performed so far
    pub fn write_count(&self) -> u64 {
        self.inner.read().writes
    }

    /// Every record, newest first
    pub fn snapshot(&self) -> Vec<CallRecord> {
        let inner = self.inner.read();
        newest_first(inner.records.values().cloned().collect())
    }
}

fn newest_first(mut records: Vec<CallRecord>) -> Vec<CallRecord> {
    records.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
    records
}

#[async_trait]
impl CallHistoryRecorder for MemoryCallHistory {
    async fn append(&self, record: NewCallRecord) -> Result<CallRecordId> {
        record.validate()?;
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = CallRecordId(inner.next_id);
        inner.records.insert(id, record.into_record(id, Utc::now()));
        inner.writes += 1;
        Ok(id)
    }

    async fn update(&self, id: CallRecordId, patch: CallRecordPatch) -> Result<bool> {
        let mut inner = self.inner.write();
        let current = inner.records.get(&id).ok_or_else(|| {
            CallGuardError::invalid_argument(format!("unknown call record {}", id))
        })?;
        if patch.is_empty() {
            return Ok(false);
        }
        let updated = patch.apply_to(current)?;
        if &updated == current {
            return Ok(false);
        }
        inner.records.insert(id, updated);
        inner.writes += 1;
        Ok(true)
    }

    async fn get(&self, id: CallRecordId) -> Result<Option<CallRecord>> {
        Ok(self.inner.read().records.get(&id).cloned())
    }

    async fn query(&self, filter: &CallFilter, limit: u32) -> Result<Vec<CallRecord>> {
        let inner = self.inner.read();
        let matching = inner.records.values().filter(|r| filter.matches(r)).cloned().collect();
        let mut records = newest_first(matching);
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn delete(&self, id: CallRecordId) -> Result<bool> {
        Ok(self.inner.write().records.remove(&id).is_some())
    }

    async fn statistics(&self, window: StatsWindow) -> Result<CallStatistics> {
        let inner = self.inner.read();
        let mut stats = CallStatistics::default();
        for record in inner.records.values() {
            if window.since.is_some_and(|since| record.started_at < since) {
                continue;
            }
            stats.total += 1;
            match record.call_type {
                CallType::Incoming => stats.incoming += 1,
                CallType::Outgoing => stats.outgoing += 1,
                CallType::Missed => stats.missed += 1,
                CallType::Blocked => stats.blocked += 1,
            }
            if record.started_at >= window.midnight {
                stats.since_midnight += 1;
            }
        }
        Ok(stats)
    }

    async fn trim(&self, policy: TrimPolicy) -> Result<u64> {
        let mut inner = self.inner.write();
        let doomed: Vec<CallRecordId> = match policy {
            TrimPolicy::KeepLatest(keep) => newest_first(inner.records.values().cloned().collect())
                .into_iter()
                .skip(keep as usize)
                .map(|r| r.id)
                .collect(),
            TrimPolicy::OlderThan(cutoff) => inner
                .records
                .values()
                .filter(|r| r.started_at < cutoff)
                .map(|r| r.id)
                .collect(),
        };
        for id in &doomed {
            inner.records.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn availability(&self) -> HistoryAvailability {
        HistoryAvailability {
            can_access_data: true,
            total_calls: self.inner.read().records.len() as u64,
            error: None,
        }
    }
}
