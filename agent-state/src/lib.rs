//! Agent-state console core.
//!
//! Mirrors the working memory of a remote data-orchestration agent and
//! mediates the human-in-the-loop confirmation the agent requests before it
//! runs a generated query. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (snapshot decoding, tree view,
//!   interrupt state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: The versioned document channel, the agent transport, and
//!   the synchronizer/coordinator that tie them to the core logic.
//!
//! Data flows one way: the agent publishes a snapshot, the
//! [`io::pump::SnapshotPump`] rebuilds the projection and advances the
//! interrupt machine, and intents travel back to the agent through an
//! [`io::agent_client::AgentClient`].

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
