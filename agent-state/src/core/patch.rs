//! Partial updates and the outbound messages that carry them.

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentMode, Dataset, Query, QueryResult};

/// Fields to merge into a [`Query`]. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub querysummary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Fields to merge into a [`Dataset`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Fields to merge into a [`QueryResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryResultPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn merge(slot: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        slot.clone_from(value);
    }
}

impl QueryPatch {
    pub fn apply_to(&self, target: &mut Query) {
        merge(&mut target.query, &self.query);
        merge(&mut target.querysummary, &self.querysummary);
        merge(&mut target.question, &self.question);
        merge(&mut target.timestamp, &self.timestamp);
    }
}

impl DatasetPatch {
    pub fn apply_to(&self, target: &mut Dataset) {
        merge(&mut target.table_id, &self.table_id);
        merge(&mut target.details, &self.details);
        merge(&mut target.timestamp, &self.timestamp);
    }
}

impl QueryResultPatch {
    pub fn apply_to(&self, target: &mut QueryResult) {
        merge(&mut target.query, &self.query);
        merge(&mut target.result, &self.result);
        merge(&mut target.timestamp, &self.timestamp);
    }
}

/// A named action invoked on the remote agent.
///
/// Wire shape: `{"name": "update_query", "arguments": {"index": 0, "data": {...}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum AgentAction {
    UpdateQuery { index: usize, data: QueryPatch },
    UpdateDataset { table_id: String, data: DatasetPatch },
    UpdateQueryResult { index: usize, data: QueryResultPatch },
    SwitchMode { mode: AgentMode },
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::UpdateQuery { .. } => "update_query",
            AgentAction::UpdateDataset { .. } => "update_dataset",
            AgentAction::UpdateQueryResult { .. } => "update_query_result",
            AgentAction::SwitchMode { .. } => "switch_mode",
        }
    }
}

/// Partial document merge that resolves a pending interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePatch {
    pub interrupt_response: bool,
}
