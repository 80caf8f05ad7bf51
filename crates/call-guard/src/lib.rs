//! # Call-Guard
//!
//! Incoming call filtering for a single phone line.
//!
//! This crate provides:
//! - A persistent blocklist with number normalization
//! - A fail-open blocking decision engine
//! - Call termination through an ordered fallback of strategies
//! - A call lifecycle tracker that classifies every call as blocked,
//!   incoming or missed and records it
//! - Call history with read-side statistics
//! - A JSON method bridge for presentation layers
//!
//! ## Architecture
//!
//! Platform call-state events go to the [`TrackerHandle`]. The tracker asks
//! the [`BlockingDecisionEngine`] for a verdict in the background, terminates
//! blocked calls via the [`CallControlAdapter`] and writes every call to the
//! [`CallHistoryRecorder`]. The [`CallGuardBridge`] exposes blocklist and
//! history maintenance to a UI.

pub mod blocklist;
pub mod bridge;
pub mod config;
pub mod control;
pub mod database;
pub mod decision;
pub mod error;
pub mod history;
pub mod logging;
pub mod number;
pub mod tracker;
pub mod types;

use std::sync::Arc;

use tracing::info;

pub use blocklist::{BlocklistStore, MemoryBlocklistStore, SqliteBlocklistStore};
pub use bridge::{BridgeError, BridgeRequest, BridgeResponse, CallGuardBridge};
pub use config::CallGuardConfig;
pub use control::{
    CallControlAdapter, CallControlSurface, ControlCapabilities, GenerationGate, SessionHandle,
    TerminationOutcome, TerminationStrategy,
};
pub use database::CallGuardDatabase;
pub use decision::{BlockingDecisionEngine, Decision};
pub use error::{CallGuardError, ErrorKind, Result};
pub use history::{CallHistoryRecorder, MemoryCallHistory, SqliteCallHistory};
pub use number::normalize;
pub use tracker::{CallLifecycleTracker, CallSession, CallStateEvent, TrackerEvent, TrackerHandle};
pub use types::{BlockedNumber, CallRecord, CallRecordId, CallStatistics, CallType};

/// A fully wired call guard service
pub struct CallGuard {
    config: CallGuardConfig,
    database: Option<CallGuardDatabase>,
    engine: Arc<BlockingDecisionEngine>,
    history: Arc<dyn CallHistoryRecorder>,
    tracker: TrackerHandle,
    bridge: CallGuardBridge,
}

impl CallGuard {
    /// Open the configured database and start the tracker
    pub async fn new(
        config: CallGuardConfig,
        surface: Arc<dyn CallControlSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let database = CallGuardDatabase::connect(&config.database).await?;
        let blocklist = Arc::new(SqliteBlocklistStore::new(&database));
        let history = Arc::new(SqliteCallHistory::new(&database));

        let mut guard = Self::with_stores(config, blocklist, history, surface)?;
        guard.database = Some(database);
        Ok(guard)
    }

    /// Wire the service over caller-supplied stores
    pub fn with_stores(
        config: CallGuardConfig,
        blocklist: Arc<dyn BlocklistStore>,
        history: Arc<dyn CallHistoryRecorder>,
        surface: Arc<dyn CallControlSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(BlockingDecisionEngine::new(blocklist, &config.decision));
        let adapter = Arc::new(CallControlAdapter::new(surface, &config.control));
        let tracker =
            CallLifecycleTracker::spawn(&config.tracker, engine.clone(), adapter, history.clone());
        let bridge = CallGuardBridge::new(engine.clone(), history.clone());

        info!("Call guard ready");
        Ok(Self {
            config,
            database: None,
            engine,
            history,
            tracker,
            bridge,
        })
    }

    pub fn config(&self) -> &CallGuardConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TrackerHandle {
        &self.tracker
    }

    pub fn bridge(&self) -> &CallGuardBridge {
        &self.bridge
    }

    pub fn engine(&self) -> &Arc<BlockingDecisionEngine> {
        &self.engine
    }

    pub fn history(&self) -> &Arc<dyn CallHistoryRecorder> {
        &self.history
    }

    pub fn database(&self) -> Option<&CallGuardDatabase> {
        self.database.as_ref()
    }

    /// Stop the tracker, finishing any live call, then close the database
    pub async fn shutdown(self) {
        self.tracker.flush().await;
        self.tracker.shutdown().await;
        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("Call guard stopped");
    }
}
