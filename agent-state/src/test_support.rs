//! Test-only helpers: a scripted agent client and document builders.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use crate::core::patch::{AgentAction, StatePatch};
use crate::error::AgentError;
use crate::io::agent_client::{ActionReceipt, AgentClient};

#[derive(Default)]
struct Script {
    actions: Vec<AgentAction>,
    state_writes: Vec<StatePatch>,
    snapshot_requests: usize,
    invoke_failures: VecDeque<AgentError>,
    write_failures: VecDeque<AgentError>,
}

/// Agent client that records every call and fails on demand.
///
/// Failed calls are not recorded.
#[derive(Default)]
pub struct ScriptedAgentClient {
    script: Mutex<Script>,
}

impl ScriptedAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_invoke(&self, err: AgentError) {
        self.lock().invoke_failures.push_back(err);
    }

    pub fn fail_next_write(&self, err: AgentError) {
        self.lock().write_failures.push_back(err);
    }

    pub fn actions(&self) -> Vec<AgentAction> {
        self.lock().actions.clone()
    }

    pub fn state_writes(&self) -> Vec<StatePatch> {
        self.lock().state_writes.clone()
    }

    pub fn snapshot_requests(&self) -> usize {
        self.lock().snapshot_requests
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AgentClient for ScriptedAgentClient {
    async fn invoke(&self, action: &AgentAction) -> Result<ActionReceipt, AgentError> {
        let mut script = self.lock();
        if let Some(err) = script.invoke_failures.pop_front() {
            return Err(err);
        }
        script.actions.push(action.clone());
        Ok(ActionReceipt {
            message: format!("accepted {}", action.name()),
        })
    }

    async fn write_state(&self, patch: &StatePatch) -> Result<(), AgentError> {
        let mut script = self.lock();
        if let Some(err) = script.write_failures.pop_front() {
            return Err(err);
        }
        script.state_writes.push(*patch);
        Ok(())
    }

    async fn request_snapshot(&self) -> Result<(), AgentError> {
        self.lock().snapshot_requests += 1;
        Ok(())
    }
}

/// Document with `queries` queries, the given datasets and `results` results.
pub fn snapshot_json(queries: usize, table_ids: &[&str], results: usize) -> Value {
    let queries: Vec<Value> = (0..queries)
        .map(|i| {
            json!({
                "query": format!("SELECT {i}"),
                "querysummary": format!("Query summary {i}"),
                "question": format!("question {i}"),
                "timestamp": "2024-05-01T10:00:00Z",
            })
        })
        .collect();
    let datasets: serde_json::Map<String, Value> = table_ids
        .iter()
        .map(|id| {
            (
                id.to_string(),
                json!({ "table_id": id, "details": format!("# {id}"), "timestamp": "2024-05-02T10:00:00Z" }),
            )
        })
        .collect();
    let results: Vec<Value> = (0..results)
        .map(|i| {
            json!({
                "query": format!("SELECT {i}"),
                "result": format!("| n |\n|---|\n| {i} |"),
                "timestamp": "2024-05-03T10:00:00Z",
            })
        })
        .collect();
    json!({
        "user:queries": queries,
        "user:datasets": datasets,
        "user:query_results": results,
        "interrupted": false,
        "interrupt_payload": [],
    })
}

/// Document paused on a single interrupt.
pub fn interrupted_json(message: &str, query_preview: Option<&str>) -> Value {
    let mut payload = json!({ "message": message });
    if let Some(preview) = query_preview {
        payload["query_preview"] = json!(preview);
    }
    json!({
        "interrupted": true,
        "interrupt_payload": [payload],
    })
}
