//! Side-effecting parts of the console: channels, agent transport, files.

pub mod agent_client;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod local_agent;
pub mod pump;
pub mod snapshot_file;
pub mod sync;
