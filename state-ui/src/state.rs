//! Shared application state for the console server.

use std::sync::Arc;

use agent_state::core::patch::{AgentAction, StatePatch};
use agent_state::error::AgentError;
use agent_state::io::agent_client::{ActionReceipt, AgentClient, HttpAgentClient};
use agent_state::io::coordinator::InterruptCoordinator;
use agent_state::io::document::DocumentChannel;
use agent_state::io::local_agent::LocalAgent;
use agent_state::io::pump::{ProjectionEvent, SnapshotPump};
use agent_state::io::sync::StateSynchronizer;
use tokio::sync::broadcast;

/// Agent transport selected at startup.
#[derive(Clone)]
pub enum ConsoleClient {
    Http(HttpAgentClient),
    /// In-process agent republishing into the server's own document.
    Local(LocalAgent),
}

impl AgentClient for ConsoleClient {
    async fn invoke(&self, action: &AgentAction) -> Result<ActionReceipt, AgentError> {
        match self {
            ConsoleClient::Http(client) => client.invoke(action).await,
            ConsoleClient::Local(agent) => agent.invoke(action).await,
        }
    }

    async fn write_state(&self, patch: &StatePatch) -> Result<(), AgentError> {
        match self {
            ConsoleClient::Http(client) => client.write_state(patch).await,
            ConsoleClient::Local(agent) => agent.write_state(patch).await,
        }
    }

    async fn request_snapshot(&self) -> Result<(), AgentError> {
        match self {
            ConsoleClient::Http(client) => client.request_snapshot().await,
            ConsoleClient::Local(agent) => agent.request_snapshot().await,
        }
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Inbound document; every snapshot the console sees is published here.
    pub document: DocumentChannel,
    pub synchronizer: Arc<StateSynchronizer<ConsoleClient>>,
    pub coordinator: Arc<InterruptCoordinator<ConsoleClient>>,
    /// Broadcast sender for projection change events.
    pub event_tx: Arc<broadcast::Sender<ProjectionEvent>>,
}

impl AppState {
    pub fn new(document: DocumentChannel, client: ConsoleClient, channel_capacity: usize) -> Self {
        let client = Arc::new(client);
        let (event_tx, _) = broadcast::channel(channel_capacity);
        Self {
            document,
            synchronizer: Arc::new(StateSynchronizer::new(client.clone())),
            coordinator: Arc::new(InterruptCoordinator::new(client)),
            event_tx: Arc::new(event_tx),
        }
    }

    /// State backed by an in-process agent.
    #[cfg(test)]
    pub fn local(channel_capacity: usize) -> Self {
        let document = DocumentChannel::new();
        let agent = LocalAgent::new(document.clone());
        Self::new(document, ConsoleClient::Local(agent), channel_capacity)
    }

    /// A pump feeding this state's synchronizer and coordinator from its document.
    pub fn pump(&self) -> SnapshotPump<ConsoleClient> {
        SnapshotPump::new(
            self.document.subscribe(),
            self.synchronizer.clone(),
            self.coordinator.clone(),
        )
    }
}
