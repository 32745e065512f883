//! Human-in-the-loop interrupt state machine.
//!
//! ```text
//! Idle --snapshot(interrupted, payload)--> Pending --approve/reject--> Resolved
//!  ^                                          ^                           |
//!  |                                          +---- write failed ---------+
//!  +------------------ snapshot(not interrupted) -------------------------+
//! ```
//!
//! The machine is pure: it never talks to the agent. Callers take the
//! [`ResumeTicket`] returned by [`InterruptMachine::decide`], deliver the
//! decision, then report back with [`InterruptMachine::confirm`] or
//! [`InterruptMachine::rollback`].

use serde::Serialize;

use crate::core::patch::StatePatch;
use crate::core::types::InterruptPayload;

/// The human's answer to an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_bool(self) -> bool {
        matches!(self, Decision::Approve)
    }

    pub fn to_patch(self) -> StatePatch {
        StatePatch {
            interrupt_response: self.as_bool(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPhase {
    Idle,
    Pending,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Pending {
        episode: u64,
        payload: InterruptPayload,
    },
    Resolved {
        episode: u64,
        payload: InterruptPayload,
        decision: Decision,
    },
}

/// What a snapshot did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// A new interrupt (or a different head payload) is now pending.
    Raised { episode: u64 },
    /// The agent cleared the interrupt flag.
    Cleared,
}

/// Proof that a decision was taken for one episode; redeem it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeTicket {
    pub episode: u64,
    pub decision: Decision,
}

impl ResumeTicket {
    pub fn patch(&self) -> StatePatch {
        self.decision.to_patch()
    }
}

/// Read model for the confirmation surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterruptView {
    pub phase: InterruptPhase,
    pub is_interrupted: bool,
    pub payload: Option<InterruptPayload>,
    pub episode: Option<u64>,
    pub last_error: Option<String>,
}

impl InterruptView {
    pub fn idle() -> Self {
        InterruptView {
            phase: InterruptPhase::Idle,
            is_interrupted: false,
            payload: None,
            episode: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterruptMachine {
    state: State,
    episodes: u64,
    last_error: Option<String>,
}

impl Default for InterruptMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptMachine {
    pub fn new() -> Self {
        InterruptMachine {
            state: State::Idle,
            episodes: 0,
            last_error: None,
        }
    }

    pub fn phase(&self) -> InterruptPhase {
        match self.state {
            State::Idle => InterruptPhase::Idle,
            State::Pending { .. } => InterruptPhase::Pending,
            State::Resolved { .. } => InterruptPhase::Resolved,
        }
    }

    /// Feed the active interrupt of the newest snapshot (`None` when the
    /// snapshot is not interrupted or its queue is empty).
    ///
    /// A head payload equal to the one already pending or resolved is the
    /// same interrupt seen again and causes no transition.
    pub fn observe(&mut self, active: Option<&InterruptPayload>) -> Transition {
        let Some(active) = active else {
            return match self.state {
                State::Idle => Transition::Unchanged,
                State::Pending { .. } | State::Resolved { .. } => {
                    self.state = State::Idle;
                    self.last_error = None;
                    Transition::Cleared
                }
            };
        };

        let current = match &self.state {
            State::Idle => None,
            State::Pending { payload, .. } | State::Resolved { payload, .. } => Some(payload),
        };
        if current == Some(active) {
            return Transition::Unchanged;
        }

        self.episodes += 1;
        self.last_error = None;
        self.state = State::Pending {
            episode: self.episodes,
            payload: active.clone(),
        };
        Transition::Raised {
            episode: self.episodes,
        }
    }

    /// Record the human's decision. Only the first decision of a pending
    /// episode yields a ticket; any other call is a no-op returning `None`.
    pub fn decide(&mut self, decision: Decision) -> Option<ResumeTicket> {
        let State::Pending { episode, payload } = &self.state else {
            return None;
        };
        let episode = *episode;
        self.state = State::Resolved {
            episode,
            payload: payload.clone(),
            decision,
        };
        Some(ResumeTicket { episode, decision })
    }

    /// The decision was delivered.
    pub fn confirm(&mut self, ticket: ResumeTicket) {
        if matches!(self.state, State::Resolved { episode, .. } if episode == ticket.episode) {
            self.last_error = None;
        }
    }

    /// The decision could not be delivered: re-surface the interrupt.
    ///
    /// Returns false when a newer snapshot already moved the machine away
    /// from the ticket's episode; the stale failure is then ignored.
    pub fn rollback(&mut self, ticket: ResumeTicket, error: String) -> bool {
        let State::Resolved {
            episode, payload, ..
        } = &self.state
        else {
            return false;
        };
        if *episode != ticket.episode {
            return false;
        }
        self.state = State::Pending {
            episode: *episode,
            payload: payload.clone(),
        };
        self.last_error = Some(error);
        true
    }

    pub fn view(&self) -> InterruptView {
        match &self.state {
            State::Idle => InterruptView {
                last_error: self.last_error.clone(),
                ..InterruptView::idle()
            },
            State::Pending { episode, payload } => InterruptView {
                phase: InterruptPhase::Pending,
                is_interrupted: true,
                payload: Some(payload.clone()),
                episode: Some(*episode),
                last_error: self.last_error.clone(),
            },
            // Cleared locally as soon as the decision is taken.
            State::Resolved { episode, .. } => InterruptView {
                phase: InterruptPhase::Resolved,
                is_interrupted: false,
                payload: None,
                episode: Some(*episode),
                last_error: None,
            },
        }
    }
}

/// Copy shown by the confirmation surface for a pending interrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationPrompt {
    pub title: &'static str,
    pub message: String,
    pub query_preview: Option<String>,
    pub notice: &'static str,
    pub approve_label: &'static str,
    pub reject_label: &'static str,
}

impl ConfirmationPrompt {
    pub fn for_view(view: &InterruptView) -> Option<Self> {
        if !view.is_interrupted {
            return None;
        }
        let payload = view.payload.as_ref()?;
        Some(ConfirmationPrompt {
            title: "Confirm Query Execution",
            message: payload.message.clone(),
            query_preview: payload.query_preview.clone().filter(|p| !p.is_empty()),
            notice: "This query was generated automatically. Review it before execution.",
            approve_label: "Yes, Run Query",
            reject_label: "No, Don't Run",
        })
    }
}
