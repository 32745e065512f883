//! Entity records mirrored from the agent's shared-state document.
//!
//! Every record here is owned by the remote agent. The console only reflects
//! them; nothing in this crate originates or destroys an entity.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Read a text field, treating an explicit `null` like a missing key.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A SQL query the agent generated and ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    #[serde(deserialize_with = "text")]
    pub query: String,
    #[serde(deserialize_with = "text")]
    pub querysummary: String,
    #[serde(deserialize_with = "text")]
    pub question: String,
    #[serde(deserialize_with = "text")]
    pub timestamp: String,
}

/// Metadata about a warehouse table, keyed by its dotted `table_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    #[serde(deserialize_with = "text")]
    pub table_id: String,
    /// Markdown body.
    #[serde(deserialize_with = "text")]
    pub details: String,
    #[serde(deserialize_with = "text")]
    pub timestamp: String,
}

/// Output of one query execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResult {
    #[serde(deserialize_with = "text")]
    pub query: String,
    /// Markdown table.
    #[serde(deserialize_with = "text")]
    pub result: String,
    #[serde(deserialize_with = "text")]
    pub timestamp: String,
}

/// Entity category, also used as the tree node `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateItemType {
    Queries,
    Datasets,
    QueryResults,
}

impl StateItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            StateItemType::Queries => "queries",
            StateItemType::Datasets => "datasets",
            StateItemType::QueryResults => "query_results",
        }
    }

    /// Human title used for folder labels.
    pub fn title(self) -> &'static str {
        match self {
            StateItemType::Queries => "Queries",
            StateItemType::Datasets => "Datasets",
            StateItemType::QueryResults => "Query Results",
        }
    }
}

impl fmt::Display for StateItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity of any kind, as carried by a tree leaf.
///
/// Serializes untagged so the wire shape is exactly the entity's own shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StateItem {
    Query(Query),
    Dataset(Dataset),
    QueryResult(QueryResult),
}

impl StateItem {
    pub fn kind(&self) -> StateItemType {
        match self {
            StateItem::Query(_) => StateItemType::Queries,
            StateItem::Dataset(_) => StateItemType::Datasets,
            StateItem::QueryResult(_) => StateItemType::QueryResults,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            StateItem::Query(q) => &q.timestamp,
            StateItem::Dataset(d) => &d.timestamp,
            StateItem::QueryResult(r) => &r.timestamp,
        }
    }
}

/// A pause request raised by the agent before it runs a generated query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptPayload {
    #[serde(default, deserialize_with = "text")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_preview: Option<String>,
}

/// Operating mode of the orchestration agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Ask,
    Planning,
    Action,
}

impl AgentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentMode::Ask => "ask",
            AgentMode::Planning => "planning",
            AgentMode::Action => "action",
        }
    }
}

/// Session-level fields the agent keeps next to its collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub current_mode: AgentMode,
    pub planning_complete: bool,
    pub action_step: Option<String>,
}
