use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::control::{GenerationGate, SessionHandle};
use crate::number::normalize;
use crate::types::{CallRecordId, CallType};

/// Lifecycle state of the tracked call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Ringing,
    Active,
    Ended,
}

/// Where the blocking decision for a session stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DecisionStatus {
    Pending,
    Blocked { reason: String },
    Allowed,
}

/// The single live call
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    pub generation: u64,
    /// Number as delivered by the platform
    pub number: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub record_id: Option<CallRecordId>,
    pub decision: DecisionStatus,
    #[serde(skip)]
    clock: Instant,
}

impl CallSession {
    pub(crate) fn start(generation: u64, number: String) -> Self {
        Self {
            generation,
            number,
            state: SessionState::Ringing,
            started_at: Utc::now(),
            record_id: None,
            decision: DecisionStatus::Pending,
            clock: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn reached_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Number as written to history: normalized, or raw for withheld callers
    pub fn record_number(&self) -> String {
        let normalized = normalize(&self.number);
        if normalized.is_empty() {
            self.number.clone()
        } else {
            normalized
        }
    }

    pub(crate) fn handle(&self, gate: &GenerationGate) -> SessionHandle {
        SessionHandle::new(self.generation, self.number.clone(), gate.clone())
    }

    /// Final classification for a session that was not blocked.
    ///
    /// An unanswered ring shorter than `threshold` is missed; anything else
    /// is incoming with the elapsed whole seconds as duration.
    pub fn classify_unblocked(&self, threshold: Duration) -> (CallType, u32) {
        let elapsed = self.elapsed();
        if !self.reached_active() && elapsed < threshold {
            (CallType::Missed, 0)
        } else {
            let secs = u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX);
            (CallType::Incoming, secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_short_unanswered_ring_is_missed() {
        let session = CallSession::start(1, "+1 555 0100".into());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(session.classify_unblocked(Duration::from_secs(5)), (CallType::Missed, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_call_keeps_elapsed() {
        let mut session = CallSession::start(1, "5550100".into());
        session.state = SessionState::Active;
        tokio::time::advance(Duration::from_millis(12_400)).await;
        assert_eq!(session.classify_unblocked(Duration::from_secs(5)), (CallType::Incoming, 12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_unanswered_ring_is_incoming() {
        let session = CallSession::start(1, "5550100".into());
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(session.classify_unblocked(Duration::from_secs(5)), (CallType::Incoming, 7));
    }

    #[tokio::test]
    async fn test_withheld_number_recorded_raw() {
        assert_eq!(CallSession::start(1, "Private".into()).record_number(), "Private");
        assert_eq!(CallSession::start(1, "+1-555-0100".into()).record_number(), "+15550100");
    }
}
