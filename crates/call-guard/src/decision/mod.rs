//! Blocking decision engine
//!
//! Maps a raw incoming number to a verdict. The call path uses [`decide`],
//! which fails open: a store error or a lookup slower than the configured
//! bound yields [`Decision::Allowed`]. The bridge uses [`lookup`], which
//! reports those failures instead.
//!
//! [`decide`]: BlockingDecisionEngine::decide
//! [`lookup`]: BlockingDecisionEngine::lookup

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blocklist::BlocklistStore;
use crate::config::DecisionConfig;
use crate::error::{CallGuardError, Result};
use crate::number::normalize;
use crate::types::BlockedNumber;

/// Verdict for an incoming call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Decision {
    Blocked { reason: String },
    Allowed,
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Blocked { .. })
    }
}

/// Blocking decision engine
pub struct BlockingDecisionEngine {
    store: Arc<dyn BlocklistStore>,
    lookup_timeout: Duration,
    suffix_match_digits: usize,
}

impl BlockingDecisionEngine {
    pub fn new(store: Arc<dyn BlocklistStore>, config: &DecisionConfig) -> Self {
        Self {
            store,
            lookup_timeout: config.lookup_timeout(),
            suffix_match_digits: config.suffix_match_digits,
        }
    }

    pub fn store(&self) -> &Arc<dyn BlocklistStore> {
        &self.store
    }

    /// Bounded blocklist lookup that surfaces store errors and timeouts
    pub async fn lookup(&self, raw_number: &str) -> Result<Option<BlockedNumber>> {
        let normalized = normalize(raw_number);
        if normalized.is_empty() {
            return Ok(None);
        }
        match tokio::time::timeout(
            self.lookup_timeout,
            self.store.find_match(&normalized, self.suffix_match_digits),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CallGuardError::timeout(format!(
                "blocklist lookup exceeded {:?}",
                self.lookup_timeout
            ))),
        }
    }

    /// Decide whether a call must be blocked. Never fails.
    pub async fn decide(&self, raw_number: &str) -> Decision {
        match self.lookup(raw_number).await {
            Ok(Some(entry)) => {
                debug!(number = %raw_number, matched = %entry.number, "Blocklist match");
                Decision::Blocked { reason: entry.reason }
            }
            Ok(None) => Decision::Allowed,
            Err(e) => {
                warn!(number = %raw_number, error = %e, "Blocklist lookup failed, allowing call");
                Decision::Allowed
            }
        }
    }
}
