//! Interrupt coordinator: drives [`InterruptMachine`] from snapshots and
//! delivers approve/reject decisions to the agent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::interrupt::{Decision, InterruptMachine, InterruptView, Transition};
use crate::error::DecisionError;
use crate::io::agent_client::AgentClient;
use crate::io::document::VersionedSnapshot;

/// Result of an approve/reject call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// The decision was written for this episode.
    Sent { episode: u64, decision: Decision },
    /// No interrupt was pending; nothing was sent.
    Ignored,
}

pub struct InterruptCoordinator<C> {
    client: Arc<C>,
    machine: Mutex<InterruptMachine>,
    view: watch::Sender<InterruptView>,
}

impl<C: AgentClient> InterruptCoordinator<C> {
    pub fn new(client: Arc<C>) -> Self {
        let (view, _) = watch::channel(InterruptView::idle());
        InterruptCoordinator {
            client,
            machine: Mutex::new(InterruptMachine::new()),
            view,
        }
    }

    /// Feed a new snapshot. Only the snapshot pump calls this.
    pub fn observe(&self, versioned: &VersionedSnapshot) -> Transition {
        let active = versioned.snapshot.active_interrupt();
        let mut machine = self.lock();
        let transition = machine.observe(active);
        match transition {
            Transition::Raised { episode } => {
                info!(episode, version = versioned.version, "agent interrupted, awaiting decision");
            }
            Transition::Cleared => {
                info!(version = versioned.version, "agent interrupt cleared");
            }
            Transition::Unchanged => {}
        }
        self.publish(&machine);
        transition
    }

    pub fn view(&self) -> InterruptView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InterruptView> {
        self.view.subscribe()
    }

    pub async fn approve(&self) -> Result<DecisionOutcome, DecisionError> {
        self.decide(Decision::Approve).await
    }

    pub async fn reject(&self) -> Result<DecisionOutcome, DecisionError> {
        self.decide(Decision::Reject).await
    }

    /// Send the decision once per pending episode.
    ///
    /// The view clears before the write starts. If the write fails the
    /// interrupt is re-surfaced as pending with the error attached.
    pub async fn decide(&self, decision: Decision) -> Result<DecisionOutcome, DecisionError> {
        let ticket = {
            let mut machine = self.lock();
            let Some(ticket) = machine.decide(decision) else {
                info!(?decision, "no pending interrupt, decision ignored");
                return Ok(DecisionOutcome::Ignored);
            };
            self.publish(&machine);
            ticket
        };

        info!(episode = ticket.episode, ?decision, "sending resume decision");
        match self.client.write_state(&ticket.patch()).await {
            Ok(()) => {
                let mut machine = self.lock();
                machine.confirm(ticket);
                self.publish(&machine);
                Ok(DecisionOutcome::Sent {
                    episode: ticket.episode,
                    decision,
                })
            }
            Err(err) => {
                warn!(episode = ticket.episode, error = %err, "resume decision failed");
                let mut machine = self.lock();
                let rolled_back = machine.rollback(ticket, err.to_string());
                self.publish(&machine);
                Err(DecisionError {
                    episode: ticket.episode,
                    rolled_back,
                    source: err,
                })
            }
        }
    }

    fn publish(&self, machine: &InterruptMachine) {
        self.view.send_replace(machine.view());
    }

    fn lock(&self) -> MutexGuard<'_, InterruptMachine> {
        // The machine has no invariants a panicking holder could break midway.
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
