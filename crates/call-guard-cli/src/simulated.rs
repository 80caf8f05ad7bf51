//! Call-control surface for `call-guard simulate`
//!
//! There is no real phone line behind the CLI, so termination requests are
//! logged and recorded instead of reaching a platform API.

use async_trait::async_trait;
use call_guard::error::{CallGuardError, Result};
use call_guard::{CallControlSurface, ControlCapabilities, SessionHandle, TerminationStrategy};
use parking_lot::Mutex;
use tracing::info;

pub struct SimulatedCallControl {
    capabilities: ControlCapabilities,
    live: Mutex<bool>,
    attempts: Mutex<Vec<TerminationStrategy>>,
}

impl SimulatedCallControl {
    pub fn new(capabilities: ControlCapabilities) -> Self {
        Self {
            capabilities,
            live: Mutex::new(true),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<TerminationStrategy> {
        self.attempts.lock().clone()
    }

    fn hang_up(&self, call: &SessionHandle, strategy: TerminationStrategy) -> Result<()> {
        self.attempts.lock().push(strategy);
        info!(
            generation = call.generation,
            number = %call.number,
            %strategy,
            "Simulated termination"
        );
        *self.live.lock() = false;
        Ok(())
    }
}

#[async_trait]
impl CallControlSurface for SimulatedCallControl {
    fn capabilities(&self) -> ControlCapabilities {
        self.capabilities
    }

    async fn reject(&self, call: &SessionHandle) -> Result<()> {
        self.hang_up(call, TerminationStrategy::Reject)
    }

    async fn disconnect(&self, call: &SessionHandle) -> Result<()> {
        self.hang_up(call, TerminationStrategy::Disconnect)
    }

    async fn is_live(&self, _call: &SessionHandle) -> Result<bool> {
        Ok(*self.live.lock())
    }

    async fn privileged_hangup(&self, call: &SessionHandle) -> Result<()> {
        if !self.capabilities.privileged_hangup {
            return Err(CallGuardError::termination_failed("privileged hangup not available"));
        }
        self.hang_up(call, TerminationStrategy::PrivilegedHangup)
    }
}
