//! Deterministic, pure logic for the agent-state console.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod interrupt;
pub mod item_ref;
pub mod patch;
pub mod snapshot;
pub mod tree_view;
pub mod types;
