//! Transport to the remote orchestration agent.
//!
//! The [`AgentClient`] trait decouples the synchronizer and the interrupt
//! coordinator from how the agent is reached. [`HttpAgentClient`] talks to a
//! running agent; tests and local development use in-process clients.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::patch::{AgentAction, StatePatch};
use crate::error::AgentError;
use crate::io::config::AgentConfig;

/// Acknowledgement returned by the agent for an invoked action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionReceipt {
    #[serde(default)]
    pub message: String,
}

/// Abstraction over agent transports.
///
/// Completion of any call only means the agent accepted the request; the
/// effect becomes visible through a later snapshot.
pub trait AgentClient: Send + Sync + 'static {
    /// Invoke a named action with typed arguments.
    fn invoke(
        &self,
        action: &AgentAction,
    ) -> impl Future<Output = Result<ActionReceipt, AgentError>> + Send;

    /// Merge a partial document into the agent's state.
    fn write_state(&self, patch: &StatePatch)
    -> impl Future<Output = Result<(), AgentError>> + Send;

    /// Ask the agent to re-send its current document.
    fn request_snapshot(&self) -> impl Future<Output = Result<(), AgentError>> + Send;
}

/// JSON-over-HTTP client for an agent exposing `/agents/{name}/...`.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: Client,
    agent_url: String,
}

impl HttpAgentClient {
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|err| AgentError::Transport(err.to_string()))?;
        let agent_url = format!(
            "{}/agents/{}",
            config.base_url.trim_end_matches('/'),
            config.name
        );
        Ok(HttpAgentClient { client, agent_url })
    }

    pub fn agent_url(&self) -> &str {
        &self.agent_url
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, AgentError> {
        let url = format!("{}{}", self.agent_url, path);
        debug!(url = %url, "posting to agent");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    AgentError::Unavailable(err.to_string())
                } else {
                    AgentError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| AgentError::Transport(err.to_string()))?;
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "agent rejected request");
            return Err(AgentError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

impl AgentClient for HttpAgentClient {
    #[instrument(skip_all, fields(action = action.name()))]
    async fn invoke(&self, action: &AgentAction) -> Result<ActionReceipt, AgentError> {
        let body = self.post("/actions", action).await?;
        if body.trim().is_empty() {
            return Ok(ActionReceipt::default());
        }
        if let Ok(receipt) = serde_json::from_str::<ActionReceipt>(&body) {
            return Ok(receipt);
        }
        // Agents may answer with a bare string instead of a receipt object.
        let message = serde_json::from_str::<String>(&body).unwrap_or(body);
        Ok(ActionReceipt { message })
    }

    #[instrument(skip_all, fields(interrupt_response = patch.interrupt_response))]
    async fn write_state(&self, patch: &StatePatch) -> Result<(), AgentError> {
        self.post("/state", patch).await.map(|_| ())
    }

    async fn request_snapshot(&self) -> Result<(), AgentError> {
        self.post("/state/refresh", &serde_json::json!({}))
            .await
            .map(|_| ())
    }
}
