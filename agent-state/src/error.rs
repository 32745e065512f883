//! Error types surfaced by the synchronizer and the interrupt coordinator.

use thiserror::Error;

use crate::core::types::StateItemType;

/// Failure talking to the remote agent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent transport error: {0}")]
    Transport(String),
    #[error("agent rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("agent unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a synchronizer intent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        kind: StateItemType,
        index: usize,
        len: usize,
    },
    #[error("table_id must not be empty")]
    EmptyTableId,
    #[error("invalid item reference: {0}")]
    InvalidItemRef(String),
    #[error("invalid patch for {kind}: {reason}")]
    InvalidPatch { kind: StateItemType, reason: String },
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl SyncError {
    /// Local validation failures are never retried; agent failures may be.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Agent(_))
    }
}

/// Failure to deliver a resume decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("resume decision for interrupt episode {episode} not delivered: {source}")]
pub struct DecisionError {
    pub episode: u64,
    /// True when the interrupt was re-surfaced as pending so the user can retry.
    pub rolled_back: bool,
    #[source]
    pub source: AgentError,
}
