#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use call_guard::error::{CallGuardError, Result};
use call_guard::types::{
    CallFilter, CallRecordPatch, HistoryAvailability, NewCallRecord, StatsWindow, TrimPolicy,
};
use call_guard::{
    BlockedNumber, BlocklistStore, CallControlSurface, CallGuard, CallGuardConfig,
    CallHistoryRecorder, CallRecord, CallRecordId, CallStatistics, ControlCapabilities,
    MemoryBlocklistStore, MemoryCallHistory, SessionHandle, TerminationStrategy, TrackerEvent,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Call-control surface that records every termination attempt
pub struct RecordingSurface {
    capabilities: ControlCapabilities,
    fail_everything: bool,
    live: Mutex<bool>,
    attempts: Mutex<Vec<(u64, TerminationStrategy)>>,
}

impl RecordingSurface {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            capabilities: ControlCapabilities { call_control: true, privileged_hangup: true },
            fail_everything: false,
            live: Mutex::new(true),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            capabilities: ControlCapabilities { call_control: true, privileged_hangup: true },
            fail_everything: true,
            live: Mutex::new(true),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<(u64, TerminationStrategy)> {
        self.attempts.lock().clone()
    }

    fn record(&self, call: &SessionHandle, strategy: TerminationStrategy) -> Result<()> {
        self.attempts.lock().push((call.generation, strategy));
        if self.fail_everything {
            return Err(CallGuardError::termination_failed(format!("{} refused", strategy)));
        }
        *self.live.lock() = false;
        Ok(())
    }
}

#[async_trait]
impl CallControlSurface for RecordingSurface {
    fn capabilities(&self) -> ControlCapabilities {
        self.capabilities
    }

    async fn reject(&self, call: &SessionHandle) -> Result<()> {
        self.record(call, TerminationStrategy::Reject)
    }

    async fn disconnect(&self, call: &SessionHandle) -> Result<()> {
        self.record(call, TerminationStrategy::Disconnect)
    }

    async fn is_live(&self, _call: &SessionHandle) -> Result<bool> {
        Ok(*self.live.lock())
    }

    async fn privileged_hangup(&self, call: &SessionHandle) -> Result<()> {
        self.record(call, TerminationStrategy::PrivilegedHangup)
    }
}

/// Blocklist whose lookups take `delay` before answering
pub struct SlowStore {
    inner: MemoryBlocklistStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self { inner: MemoryBlocklistStore::new(), delay }
    }
}

#[async_trait]
impl BlocklistStore for SlowStore {
    async fn contains(&self, number: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.contains(number).await
    }

    async fn reason_for(&self, number: &str) -> Result<Option<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner.reason_for(number).await
    }

    async fn add(&self, number: &str, reason: &str) -> Result<BlockedNumber> {
        self.inner.add(number, reason).await
    }

    async fn remove(&self, number: &str) -> Result<bool> {
        self.inner.remove(number).await
    }

    async fn list(&self) -> Result<Vec<BlockedNumber>> {
        self.inner.list().await
    }

    async fn find_match(
        &self,
        number: &str,
        min_suffix_digits: usize,
    ) -> Result<Option<BlockedNumber>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_match(number, min_suffix_digits).await
    }
}

/// Blocklist that is always unreachable
pub struct FailingStore;

#[async_trait]
impl BlocklistStore for FailingStore {
    async fn contains(&self, _number: &str) -> Result<bool> {
        Err(CallGuardError::store_unavailable("database is locked"))
    }

    async fn reason_for(&self, _number: &str) -> Result<Option<String>> {
        Err(CallGuardError::store_unavailable("database is locked"))
    }

    async fn add(&self, _number: &str, _reason: &str) -> Result<BlockedNumber> {
        Err(CallGuardError::store_unavailable("database is locked"))
    }

    async fn remove(&self, _number: &str) -> Result<bool> {
        Err(CallGuardError::store_unavailable("database is locked"))
    }

    async fn list(&self) -> Result<Vec<BlockedNumber>> {
        Err(CallGuardError::store_unavailable("database is locked"))
    }

    async fn find_match(
        &self,
        _number: &str,
        _min_suffix_digits: usize,
    ) -> Result<Option<BlockedNumber>> {
        Err(CallGuardError::store_unavailable("database is locked"))
    }
}

/// Call history whose first `failures` appends fail
pub struct FlakyHistory {
    pub inner: MemoryCallHistory,
    failures: AtomicUsize,
}

impl FlakyHistory {
    pub fn new(failures: usize) -> Self {
        Self { inner: MemoryCallHistory::new(), failures: AtomicUsize::new(failures) }
    }
}

#[async_trait]
impl CallHistoryRecorder for FlakyHistory {
    async fn append(&self, record: NewCallRecord) -> Result<CallRecordId> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CallGuardError::store_unavailable("disk I/O error"));
        }
        self.inner.append(record).await
    }

    async fn update(&self, id: CallRecordId, patch: CallRecordPatch) -> Result<bool> {
        self.inner.update(id, patch).await
    }

    async fn get(&self, id: CallRecordId) -> Result<Option<CallRecord>> {
        self.inner.get(id).await
    }

    async fn query(&self, filter: &CallFilter, limit: u32) -> Result<Vec<CallRecord>> {
        self.inner.query(filter, limit).await
    }

    async fn delete(&self, id: CallRecordId) -> Result<bool> {
        self.inner.delete(id).await
    }

    async fn statistics(&self, window: StatsWindow) -> Result<CallStatistics> {
        self.inner.statistics(window).await
    }

    async fn trim(&self, policy: TrimPolicy) -> Result<u64> {
        self.inner.trim(policy).await
    }

    async fn availability(&self) -> HistoryAvailability {
        self.inner.availability().await
    }
}

/// A call guard over in-memory stores
pub struct Harness {
    pub guard: CallGuard,
    pub history: Arc<MemoryCallHistory>,
    pub surface: Arc<RecordingSurface>,
    pub events: broadcast::Receiver<TrackerEvent>,
}

impl Harness {
    pub fn new(blocklist: Arc<dyn BlocklistStore>, surface: Arc<RecordingSurface>) -> Self {
        Self::with_config(CallGuardConfig::in_memory(), blocklist, surface)
    }

    pub fn with_config(
        config: CallGuardConfig,
        blocklist: Arc<dyn BlocklistStore>,
        surface: Arc<RecordingSurface>,
    ) -> Self {
        let history = Arc::new(MemoryCallHistory::new());
        let guard = CallGuard::with_stores(config, blocklist, history.clone(), surface.clone())
            .expect("valid configuration");
        let events = guard.tracker().subscribe();
        Self { guard, history, surface, events }
    }

    /// Every event published so far
    pub fn drain_events(&mut self) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
