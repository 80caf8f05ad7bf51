//! Call termination
//!
//! [`CallControlAdapter`] wraps the platform's [`CallControlSurface`] and walks
//! an ordered list of termination strategies chosen once, at construction,
//! from the capabilities the surface advertises:
//!
//! 1. `Reject` the ringing call
//! 2. `Disconnect` it if it is still live afterwards
//! 3. `PrivilegedHangup` for platforms without (1)/(2) or where they failed
//!
//! The first strategy that leaves the call gone wins. Every attempt is bounded
//! by a timeout and preceded by a freshness check against the owning session's
//! generation, so a call that already ended is never touched. The adapter
//! never notifies anyone; callers decide what a failure means.

pub mod gate;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ControlConfig;
use crate::error::{CallGuardError, Result};

pub use gate::{GenerationGate, SessionHandle};

/// Capabilities advertised by the platform call-control surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCapabilities {
    /// Reject / disconnect of a live call
    pub call_control: bool,
    /// Low-level hangup path
    pub privileged_hangup: bool,
}

/// Platform call-control surface consumed by the adapter
#[async_trait]
pub trait CallControlSurface: Send + Sync {
    fn capabilities(&self) -> ControlCapabilities;

    /// Reject a ringing call
    async fn reject(&self, call: &SessionHandle) -> Result<()>;

    /// Disconnect a live call
    async fn disconnect(&self, call: &SessionHandle) -> Result<()>;

    /// Whether the call is still ringing or active
    async fn is_live(&self, call: &SessionHandle) -> Result<bool>;

    async fn privileged_hangup(&self, _call: &SessionHandle) -> Result<()> {
        Err(CallGuardError::termination_failed("privileged hangup not supported"))
    }
}

/// Named termination strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStrategy {
    Reject,
    Disconnect,
    PrivilegedHangup,
}

impl fmt::Display for TerminationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationStrategy::Reject => "reject",
            TerminationStrategy::Disconnect => "disconnect",
            TerminationStrategy::PrivilegedHangup => "privileged_hangup",
        };
        f.write_str(name)
    }
}

/// Result of a termination request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminationOutcome {
    Terminated { strategy: TerminationStrategy },
    Failed { cause: String },
    /// The session ended or was superseded; nothing was attempted
    Stale,
}

/// Strategy plan for a set of capabilities
pub fn plan_for(capabilities: ControlCapabilities) -> Vec<TerminationStrategy> {
    let mut plan = Vec::with_capacity(3);
    if capabilities.call_control {
        plan.push(TerminationStrategy::Reject);
        plan.push(TerminationStrategy::Disconnect);
    }
    if capabilities.privileged_hangup {
        plan.push(TerminationStrategy::PrivilegedHangup);
    }
    plan
}

/// Ordered-fallback call terminator
pub struct CallControlAdapter {
    surface: Arc<dyn CallControlSurface>,
    plan: Vec<TerminationStrategy>,
    attempt_timeout: Duration,
}

impl CallControlAdapter {
    pub fn new(surface: Arc<dyn CallControlSurface>, config: &ControlConfig) -> Self {
        let capabilities = surface.capabilities();
        let plan = plan_for(capabilities);
        if plan.is_empty() {
            warn!(?capabilities, "Call control surface offers no termination capability");
        } else {
            info!(?plan, "Call termination strategies selected");
        }
        Self {
            surface,
            plan,
            attempt_timeout: config.attempt_timeout(),
        }
    }

    pub fn plan(&self) -> &[TerminationStrategy] {
        &self.plan
    }

    /// Terminate the call, trying each strategy in order until one sticks
    pub async fn terminate(&self, call: &SessionHandle) -> TerminationOutcome {
        let mut last_cause: Option<String> = None;

        for &strategy in &self.plan {
            if !call.is_current() {
                debug!(
                    generation = call.generation,
                    %strategy,
                    "Session no longer live, skipping termination"
                );
                return TerminationOutcome::Stale;
            }

            match self.attempt(strategy, call).await {
                Ok(()) => match self.probe_live(call).await {
                    Some(true) => {
                        warn!(
                            generation = call.generation,
                            %strategy,
                            "Call still live after termination attempt"
                        );
                        last_cause = Some(format!("{} left the call live", strategy));
                    }
                    _ => {
                        info!(
                            generation = call.generation,
                            number = %call.number,
                            %strategy,
                            "Call terminated"
                        );
                        return TerminationOutcome::Terminated { strategy };
                    }
                },
                Err(e) => {
                    warn!(
                        generation = call.generation,
                        %strategy,
                        error = %e,
                        "Termination attempt failed"
                    );
                    last_cause = Some(e.to_string());
                }
            }
        }

        let cause = last_cause.unwrap_or_else(|| "no termination strategy available".to_string());
        error!(
            generation = call.generation,
            number = %call.number,
            %cause,
            "All termination strategies failed"
        );
        TerminationOutcome::Failed { cause }
    }

    async fn attempt(&self, strategy: TerminationStrategy, call: &SessionHandle) -> Result<()> {
        let fut = async {
            match strategy {
                TerminationStrategy::Reject => self.surface.reject(call).await,
                TerminationStrategy::Disconnect => self.surface.disconnect(call).await,
                TerminationStrategy::PrivilegedHangup => self.surface.privileged_hangup(call).await,
            }
        };
        match tokio::time::timeout(self.attempt_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CallGuardError::termination_failed(format!(
                "{} timed out after {:?}",
                strategy, self.attempt_timeout
            ))),
        }
    }

    /// `None` when liveness cannot be determined
    async fn probe_live(&self, call: &SessionHandle) -> Option<bool> {
        match tokio::time::timeout(self.attempt_timeout, self.surface.is_live(call)).await {
            Ok(Ok(live)) => Some(live),
            Ok(Err(e)) => {
                debug!(generation = call.generation, error = %e, "Liveness probe failed");
                None
            }
            Err(_) => None,
        }
    }
}
