//! Stable exit codes for `agent-state` CLI commands.

/// Command succeeded and no interrupt is pending.
pub const OK: i32 = 0;
/// Command failed: unreadable snapshot, invalid JSON, or other errors.
pub const INVALID: i32 = 1;
/// `agent-state inspect` found an interrupt awaiting a decision.
pub const INTERRUPTED: i32 = 2;
