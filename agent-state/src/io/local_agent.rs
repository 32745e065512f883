//! In-process stand-in for the remote agent.
//!
//! Applies actions and state writes to the latest document and republishes
//! it, so every change still reaches the console through the inbound
//! snapshot path. Useful for local development and end-to-end tests.

use tracing::info;

use crate::core::patch::{AgentAction, StatePatch};
use crate::core::snapshot::{INTERRUPT_RESPONSE_KEY, Snapshot};
use crate::core::types::Dataset;
use crate::error::AgentError;
use crate::io::agent_client::{ActionReceipt, AgentClient};
use crate::io::document::DocumentChannel;

const UNPROCESSABLE: u16 = 422;

#[derive(Clone)]
pub struct LocalAgent {
    document: DocumentChannel,
}

impl LocalAgent {
    pub fn new(document: DocumentChannel) -> Self {
        LocalAgent { document }
    }

    /// Apply `action` to a copy of the current document.
    pub fn apply_action(snapshot: &mut Snapshot, action: &AgentAction) -> Result<String, AgentError> {
        let collections = &mut snapshot.collections;
        match action {
            AgentAction::UpdateQuery { index, data } => {
                let len = collections.queries.len();
                let query = collections
                    .queries
                    .get_mut(*index)
                    .ok_or_else(|| out_of_range("query", *index, len))?;
                data.apply_to(query);
                Ok(format!("Updated query at index {index}"))
            }
            AgentAction::UpdateDataset { table_id, data } => {
                let dataset = collections
                    .datasets
                    .entry(table_id.clone())
                    .or_insert_with(|| Dataset {
                        table_id: table_id.clone(),
                        ..Dataset::default()
                    });
                data.apply_to(dataset);
                Ok(format!("Updated dataset {table_id}"))
            }
            AgentAction::UpdateQueryResult { index, data } => {
                let len = collections.query_results.len();
                let result = collections
                    .query_results
                    .get_mut(*index)
                    .ok_or_else(|| out_of_range("query result", *index, len))?;
                data.apply_to(result);
                Ok(format!("Updated query result at index {index}"))
            }
            AgentAction::SwitchMode { mode } => {
                snapshot.session.current_mode = *mode;
                Ok(format!("Switched to {} mode", mode.as_str()))
            }
        }
    }

    /// Resume from an interrupt: record the decision and drop the head of
    /// the interrupt queue.
    pub fn apply_state(snapshot: &mut Snapshot, patch: &StatePatch) {
        snapshot.raw.insert(
            INTERRUPT_RESPONSE_KEY.to_string(),
            serde_json::Value::Bool(patch.interrupt_response),
        );
        if snapshot.interrupted && !snapshot.interrupt_payload.is_empty() {
            snapshot.interrupt_payload.remove(0);
        }
        snapshot.interrupted = false;
    }
}

fn out_of_range(what: &str, index: usize, len: usize) -> AgentError {
    AgentError::Rejected {
        status: UNPROCESSABLE,
        body: format!("{what} index {index} out of range (len {len})"),
    }
}

impl AgentClient for LocalAgent {
    async fn invoke(&self, action: &AgentAction) -> Result<ActionReceipt, AgentError> {
        let (version, message) = self
            .document
            .update(|snapshot| Self::apply_action(snapshot, action))?;
        info!(action = action.name(), version, "local agent applied action");
        Ok(ActionReceipt { message })
    }

    async fn write_state(&self, patch: &StatePatch) -> Result<(), AgentError> {
        let (version, ()) = self.document.update(|snapshot| {
            Self::apply_state(snapshot, patch);
            Ok::<_, AgentError>(())
        })?;
        info!(
            interrupt_response = patch.interrupt_response,
            version, "local agent resumed"
        );
        Ok(())
    }

    async fn request_snapshot(&self) -> Result<(), AgentError> {
        self.document.update(|_| Ok::<_, AgentError>(()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::patch::{DatasetPatch, QueryPatch};
    use crate::core::types::AgentMode;
    use crate::test_support::{interrupted_json, snapshot_json};

    #[tokio::test]
    async fn action_is_visible_only_in_new_version() {
        let channel = DocumentChannel::new();
        channel.publish_value(snapshot_json(1, &[], 0));
        let agent = LocalAgent::new(channel.clone());

        let receipt = agent
            .invoke(&AgentAction::UpdateQuery {
                index: 0,
                data: QueryPatch {
                    querysummary: Some("Renamed".to_string()),
                    ..QueryPatch::default()
                },
            })
            .await
            .expect("invoke");
        assert_eq!(receipt.message, "Updated query at index 0");

        let latest = channel.latest().expect("latest");
        assert_eq!(latest.version, 2);
        assert_eq!(latest.snapshot.collections.queries[0].querysummary, "Renamed");
    }

    #[tokio::test]
    async fn update_dataset_creates_missing_entry() {
        let channel = DocumentChannel::new();
        let agent = LocalAgent::new(channel.clone());
        agent
            .invoke(&AgentAction::UpdateDataset {
                table_id: "proj.d.orders".to_string(),
                data: DatasetPatch {
                    details: Some("# Orders".to_string()),
                    ..DatasetPatch::default()
                },
            })
            .await
            .expect("invoke");

        let latest = channel.latest().expect("latest");
        let dataset = &latest.snapshot.collections.datasets["proj.d.orders"];
        assert_eq!(dataset.table_id, "proj.d.orders");
        assert_eq!(dataset.details, "# Orders");
    }

    #[tokio::test]
    async fn out_of_range_is_rejected_without_publishing() {
        let channel = DocumentChannel::new();
        channel.publish_value(snapshot_json(0, &[], 1));
        let agent = LocalAgent::new(channel.clone());
        let err = agent
            .invoke(&AgentAction::UpdateQuery {
                index: 0,
                data: QueryPatch::default(),
            })
            .await
            .expect_err("no queries");
        assert!(matches!(err, AgentError::Rejected { status: 422, .. }));
        assert_eq!(channel.latest().expect("latest").version, 1);
    }

    #[tokio::test]
    async fn write_state_resumes_and_pops_head() {
        let channel = DocumentChannel::new();
        channel.publish_value(interrupted_json("Run?", Some("SELECT 1")));
        let agent = LocalAgent::new(channel.clone());
        agent
            .write_state(&StatePatch {
                interrupt_response: false,
            })
            .await
            .expect("write");

        let latest = channel.latest().expect("latest");
        assert!(!latest.snapshot.interrupted);
        assert!(latest.snapshot.interrupt_payload.is_empty());
        assert_eq!(latest.snapshot.raw[INTERRUPT_RESPONSE_KEY], false);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_dataset_edits_all_land() {
        let channel = DocumentChannel::new();
        let agent = Arc::new(LocalAgent::new(channel.clone()));
        let tasks: Vec<_> = (0..400)
            .map(|i| {
                let agent = agent.clone();
                tokio::spawn(async move {
                    agent
                        .invoke(&AgentAction::UpdateDataset {
                            table_id: format!("proj.d.table_{i}"),
                            data: DatasetPatch::default(),
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("invoke");
        }

        let latest = channel.latest().expect("latest");
        assert_eq!(latest.snapshot.collections.datasets.len(), 400);
        assert_eq!(latest.version, 400);
    }

    #[tokio::test]
    async fn switch_mode_updates_session() {
        let channel = DocumentChannel::new();
        let agent = LocalAgent::new(channel.clone());
        agent
            .invoke(&AgentAction::SwitchMode {
                mode: AgentMode::Action,
            })
            .await
            .expect("invoke");
        let latest = channel.latest().expect("latest");
        assert_eq!(latest.snapshot.session.current_mode, AgentMode::Action);
    }
}
