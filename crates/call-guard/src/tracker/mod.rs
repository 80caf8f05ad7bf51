//! Call lifecycle tracker
//!
//! A single spawned loop owns the live [`CallSession`]. Platform call-state
//! events reach it through an unbounded channel so the platform callback
//! returns immediately. Decision lookups and terminations run in their own
//! tasks and report back through a second channel; their results are only
//! ever applied by the loop itself.
//!
//! Every session gets a new generation. Results tagged with a generation
//! other than the live one never terminate anything; a late `Blocked` verdict
//! for a call that already ended only reclassifies its history record.
//!
//! ```text
//! Idle --Ringing--> Ringing --Answered--> Active
//!                      |                     |
//!                      +------- Idle --------+--> Ended --> Idle
//! ```

pub mod session;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::TrackerConfig;
use crate::control::{CallControlAdapter, GenerationGate, TerminationOutcome, TerminationStrategy};
use crate::decision::{BlockingDecisionEngine, Decision};
use crate::history::CallHistoryRecorder;
use crate::types::{CallRecordId, CallRecordPatch, CallType, NewCallRecord};

pub use session::{CallSession, DecisionStatus, SessionState};

/// Call-state notification from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "number", rename_all = "lowercase")]
pub enum CallStateEvent {
    Ringing(String),
    Answered,
    Idle,
}

/// Notifications published by the tracker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    SessionStarted {
        generation: u64,
        number: String,
    },
    /// A ring arrived while a session was still live
    SessionSuperseded {
        previous: u64,
        generation: u64,
    },
    DecisionApplied {
        generation: u64,
        decision: Decision,
        record_id: Option<CallRecordId>,
    },
    StaleDecisionDiscarded {
        generation: u64,
    },
    LateDecisionReclassified {
        generation: u64,
        record_id: CallRecordId,
    },
    CallTerminated {
        generation: u64,
        strategy: TerminationStrategy,
    },
    /// Every termination strategy failed. Notify-only.
    TerminationFailed {
        generation: u64,
        number: String,
        cause: String,
    },
    SessionEnded {
        generation: u64,
        call_type: CallType,
        duration: u32,
        record_id: Option<CallRecordId>,
    },
}

enum Command {
    State(CallStateEvent),
    Snapshot(oneshot::Sender<Option<CallSession>>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

enum TaskResult {
    Decision { generation: u64, decision: Decision },
    Termination { generation: u64, number: String, outcome: TerminationOutcome },
}

/// Handle to a running tracker
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<TrackerEvent>,
}

impl TrackerHandle {
    /// Feed a platform call-state event. Never blocks and never fails; a
    /// stopped tracker only produces a log line.
    pub fn on_call_state_changed(&self, event: CallStateEvent) {
        if self.commands.send(Command::State(event)).is_err() {
            warn!("Call lifecycle tracker is not running, dropping call-state event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the live session, if any
    pub async fn current_session(&self) -> Option<CallSession> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok().flatten()
    }

    /// Wait until every queued event and every outstanding decision or
    /// termination task has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// End the live session, if any, and stop the loop
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Spawns the tracker loop
pub struct CallLifecycleTracker;

impl CallLifecycleTracker {
    pub fn spawn(
        config: &TrackerConfig,
        engine: Arc<BlockingDecisionEngine>,
        adapter: Arc<CallControlAdapter>,
        history: Arc<dyn CallHistoryRecorder>,
    ) -> TrackerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let tracker = TrackerLoop {
            engine,
            adapter,
            history,
            events: events.clone(),
            results: result_tx,
            gate: GenerationGate::new(),
            session: None,
            last_generation: 0,
            unresolved: VecDeque::new(),
            unresolved_capacity: config.unresolved_capacity,
            missed_threshold: config.missed_call_threshold(),
            in_flight: 0,
            flush_waiters: Vec::new(),
        };
        tokio::spawn(tracker.run(command_rx, result_rx));

        TrackerHandle {
            commands: command_tx,
            events,
        }
    }
}

struct TrackerLoop {
    engine: Arc<BlockingDecisionEngine>,
    adapter: Arc<CallControlAdapter>,
    history: Arc<dyn CallHistoryRecorder>,
    events: broadcast::Sender<TrackerEvent>,
    results: mpsc::UnboundedSender<TaskResult>,
    gate: GenerationGate,
    session: Option<CallSession>,
    last_generation: u64,
    /// Ended sessions whose decision had not resolved yet
    unresolved: VecDeque<(u64, CallRecordId)>,
    unresolved_capacity: usize,
    missed_threshold: Duration,
    in_flight: usize,
    flush_waiters: Vec<oneshot::Sender<()>>,
}

impl TrackerLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut results: mpsc::UnboundedReceiver<TaskResult>,
    ) {
        info!("Call lifecycle tracker started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::State(event)) => self.on_state(event).await,
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.session.clone());
                    }
                    Some(Command::Flush(reply)) => {
                        if self.in_flight == 0 {
                            let _ = reply.send(());
                        } else {
                            self.flush_waiters.push(reply);
                        }
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.end_session().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.end_session().await;
                        break;
                    }
                },

                Some(result) = results.recv() => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    match result {
                        TaskResult::Decision { generation, decision } => {
                            self.on_decision(generation, decision).await
                        }
                        TaskResult::Termination { generation, number, outcome } => {
                            self.on_termination(generation, number, outcome)
                        }
                    }
                    if self.in_flight == 0 {
                        for waiter in self.flush_waiters.drain(..) {
                            let _ = waiter.send(());
                        }
                    }
                }
            }
        }

        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("Call lifecycle tracker stopped");
    }

    fn publish(&self, event: TrackerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn on_state(&mut self, event: CallStateEvent) {
        match event {
            CallStateEvent::Ringing(number) => {
                let previous = self.session.as_ref().map(|s| s.generation);
                if previous.is_some() {
                    warn!(?previous, "Ringing while a call is still tracked, ending previous one");
                    self.end_session().await;
                }

                self.last_generation += 1;
                let generation = self.last_generation;
                self.gate.open(generation);
                self.session = Some(CallSession::start(generation, number.clone()));

                info!(generation, %number, "Incoming call ringing");
                if let Some(previous) = previous {
                    self.publish(TrackerEvent::SessionSuperseded { previous, generation });
                }
                self.publish(TrackerEvent::SessionStarted { generation, number: number.clone() });
                self.dispatch_decision(generation, number);
            }
            CallStateEvent::Answered => match self.session.as_mut() {
                Some(session) => {
                    if session.state == SessionState::Ringing {
                        session.state = SessionState::Active;
                        debug!(generation = session.generation, "Call answered");
                    }
                }
                None => debug!("Answered with no tracked call, ignoring"),
            },
            CallStateEvent::Idle => {
                if self.session.is_some() {
                    self.end_session().await;
                } else {
                    debug!("Idle with no tracked call, ignoring");
                }
            }
        }
    }

    fn dispatch_decision(&mut self, generation: u64, number: String) {
        let engine = self.engine.clone();
        let results = self.results.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let decision = engine.decide(&number).await;
            let _ = results.send(TaskResult::Decision { generation, decision });
        });
    }

    fn dispatch_termination(&mut self, session: &CallSession) {
        let adapter = self.adapter.clone();
        let results = self.results.clone();
        let handle = session.handle(&self.gate);
        self.in_flight += 1;
        tokio::spawn(async move {
            let outcome = adapter.terminate(&handle).await;
            let _ = results.send(TaskResult::Termination {
                generation: handle.generation,
                number: handle.number,
                outcome,
            });
        });
    }

    async fn on_decision(&mut self, generation: u64, decision: Decision) {
        let is_live = self
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation && s.decision == DecisionStatus::Pending);
        if is_live {
            self.apply_decision(decision).await;
            return;
        }

        let position = self.unresolved.iter().position(|(g, _)| *g == generation);
        match (position, decision) {
            (Some(index), Decision::Blocked { reason }) => {
                let Some((_, record_id)) = self.unresolved.remove(index) else {
                    return;
                };
                match self
                    .history
                    .update(record_id, CallRecordPatch::reclassify_blocked(reason))
                    .await
                {
                    Ok(_) => {
                        info!(generation, %record_id, "Late blocking decision, reclassified");
                        self.publish(TrackerEvent::LateDecisionReclassified {
                            generation,
                            record_id,
                        });
                    }
                    Err(e) => {
                        error!(generation, %record_id, error = %e, "Failed to reclassify record")
                    }
                }
            }
            (Some(index), Decision::Allowed) => {
                self.unresolved.remove(index);
                debug!(generation, "Late decision allowed the call, record unchanged");
                self.publish(TrackerEvent::StaleDecisionDiscarded { generation });
            }
            (None, _) => {
                debug!(generation, "Discarding stale decision");
                self.publish(TrackerEvent::StaleDecisionDiscarded { generation });
            }
        }
    }

    async fn apply_decision(&mut self, decision: Decision) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let generation = session.generation;

        let record = match &decision {
            Decision::Blocked { reason } => {
                session.decision = DecisionStatus::Blocked { reason: reason.clone() };
                self.dispatch_termination(&session);
                NewCallRecord::blocked(session.record_number(), session.started_at, reason.clone())
            }
            Decision::Allowed => {
                session.decision = DecisionStatus::Allowed;
                let number = session.record_number();
                NewCallRecord::allowed(number, session.started_at, CallType::Incoming, 0)
            }
        };

        match self.history.append(record).await {
            Ok(id) => session.record_id = Some(id),
            Err(e) => error!(generation, error = %e, "Failed to record call"),
        }

        info!(generation, ?decision, "Blocking decision applied");
        self.publish(TrackerEvent::DecisionApplied {
            generation,
            decision,
            record_id: session.record_id,
        });
        self.session = Some(session);
    }

    fn on_termination(&mut self, generation: u64, number: String, outcome: TerminationOutcome) {
        match outcome {
            TerminationOutcome::Terminated { strategy } => {
                self.publish(TrackerEvent::CallTerminated { generation, strategy });
            }
            TerminationOutcome::Failed { cause } => {
                warn!(generation, %number, %cause, "Blocked call could not be terminated");
                self.publish(TrackerEvent::TerminationFailed { generation, number, cause });
            }
            TerminationOutcome::Stale => {
                debug!(generation, "Termination skipped, session already over");
            }
        }
    }

    /// Finalize the live session's record and return to idle
    async fn end_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let generation = session.generation;
        self.gate.close(generation);
        session.state = SessionState::Ended;

        let (call_type, duration) = match &session.decision {
            DecisionStatus::Blocked { .. } => (CallType::Blocked, 0),
            _ => session.classify_unblocked(self.missed_threshold),
        };

        match (&session.decision, session.record_id) {
            // recorded in full when the decision was applied
            (DecisionStatus::Blocked { .. }, Some(_)) => {}
            (DecisionStatus::Blocked { reason }, None) => {
                let number = session.record_number();
                let record = NewCallRecord::blocked(number, session.started_at, reason.clone());
                match self.history.append(record).await {
                    Ok(id) => session.record_id = Some(id),
                    Err(e) => error!(generation, error = %e, "Failed to record blocked call"),
                }
            }
            (_, Some(id)) => {
                if let Err(e) = self
                    .history
                    .update(id, CallRecordPatch::classify(call_type, duration))
                    .await
                {
                    error!(generation, %id, error = %e, "Failed to finalize call record");
                }
            }
            (status, None) => {
                let pending = *status == DecisionStatus::Pending;
                let record = NewCallRecord::allowed(
                    session.record_number(),
                    session.started_at,
                    call_type,
                    duration,
                );
                match self.history.append(record).await {
                    Ok(id) => {
                        session.record_id = Some(id);
                        if pending {
                            self.remember_unresolved(generation, id);
                        }
                    }
                    Err(e) => error!(generation, error = %e, "Failed to record call"),
                }
            }
        }

        info!(generation, %call_type, duration, "Call ended");
        self.publish(TrackerEvent::SessionEnded {
            generation,
            call_type,
            duration,
            record_id: session.record_id,
        });
    }

    fn remember_unresolved(&mut self, generation: u64, record_id: CallRecordId) {
        if self.unresolved_capacity == 0 {
            return;
        }
        if self.unresolved.len() >= self.unresolved_capacity {
            self.unresolved.pop_front();
        }
        self.unresolved.push_back((generation, record_id));
    }
}
