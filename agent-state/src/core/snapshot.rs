//! Typed view of one whole shared-state document.
//!
//! The agent's document is loosely shaped. Each known key is decoded on its
//! own: a missing key falls back to its default, and a key of the wrong shape
//! falls back too but is reported as a [`RecoveredField`]. Collections are
//! decoded entry by entry, so one bad entry never takes its neighbours with
//! it. Decoding never fails.

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::types::{AgentMode, Dataset, InterruptPayload, Query, QueryResult, SessionInfo};

pub const QUERIES_KEY: &str = "user:queries";
pub const DATASETS_KEY: &str = "user:datasets";
pub const QUERY_RESULTS_KEY: &str = "user:query_results";
pub const INTERRUPTED_KEY: &str = "interrupted";
pub const INTERRUPT_PAYLOAD_KEY: &str = "interrupt_payload";
pub const INTERRUPT_RESPONSE_KEY: &str = "interrupt_response";
pub const CURRENT_MODE_KEY: &str = "current_mode";
pub const PLANNING_COMPLETE_KEY: &str = "planning_complete";
pub const ACTION_STEP_KEY: &str = "action_step";

/// The three entity collections the tree view is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Collections {
    pub queries: Vec<Query>,
    /// Keyed by `table_id`, iterated in the order the agent wrote them.
    pub datasets: IndexMap<String, Dataset>,
    pub query_results: Vec<QueryResult>,
}

impl Collections {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.datasets.is_empty() && self.query_results.is_empty()
    }
}

/// A decoded snapshot of the shared-state document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub collections: Collections,
    pub interrupted: bool,
    pub interrupt_payload: Vec<InterruptPayload>,
    pub session: SessionInfo,
    /// Original document, kept so writers can merge into it without loss.
    pub raw: Map<String, Value>,
}

/// A key whose value was present but unusable and was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredField {
    pub key: String,
    pub reason: String,
}

/// Decoded snapshot plus every field that had to be defaulted.
#[derive(Debug, Clone, Default)]
pub struct ParsedSnapshot {
    pub snapshot: Snapshot,
    pub recovered: Vec<RecoveredField>,
}

impl Snapshot {
    /// Decode a document. Never fails; see [`ParsedSnapshot::recovered`].
    pub fn from_value(value: Value) -> ParsedSnapshot {
        let mut recovered = Vec::new();
        let raw = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                recovered.push(RecoveredField {
                    key: "$".to_string(),
                    reason: format!("expected object, found {}", type_name(&other)),
                });
                Map::new()
            }
        };

        let queries = read_list::<Query>(&raw, QUERIES_KEY, &mut recovered);
        let datasets = read_datasets(&raw, &mut recovered);
        let query_results = read_list::<QueryResult>(&raw, QUERY_RESULTS_KEY, &mut recovered);
        let interrupted = read_field::<bool>(&raw, INTERRUPTED_KEY, &mut recovered);
        let interrupt_payload =
            read_list::<InterruptPayload>(&raw, INTERRUPT_PAYLOAD_KEY, &mut recovered);
        let session = SessionInfo {
            current_mode: read_field::<AgentMode>(&raw, CURRENT_MODE_KEY, &mut recovered),
            planning_complete: read_field::<bool>(&raw, PLANNING_COMPLETE_KEY, &mut recovered),
            action_step: read_field::<Option<String>>(&raw, ACTION_STEP_KEY, &mut recovered),
        };

        ParsedSnapshot {
            snapshot: Snapshot {
                collections: Collections {
                    queries,
                    datasets,
                    query_results,
                },
                interrupted,
                interrupt_payload,
                session,
                raw,
            },
            recovered,
        }
    }

    /// The interrupt to surface: the queue head, only while `interrupted` is set.
    ///
    /// `interrupted = true` with an empty queue is treated as no interrupt.
    pub fn active_interrupt(&self) -> Option<&InterruptPayload> {
        if !self.interrupted {
            return None;
        }
        self.interrupt_payload.first()
    }

    /// Serialize back into a whole document, preserving keys this crate
    /// does not model.
    pub fn to_value(&self) -> Value {
        let mut map = self.raw.clone();
        map.insert(QUERIES_KEY.to_string(), to_value_or_null(&self.collections.queries));
        map.insert(DATASETS_KEY.to_string(), to_value_or_null(&self.collections.datasets));
        map.insert(
            QUERY_RESULTS_KEY.to_string(),
            to_value_or_null(&self.collections.query_results),
        );
        map.insert(INTERRUPTED_KEY.to_string(), Value::Bool(self.interrupted));
        map.insert(
            INTERRUPT_PAYLOAD_KEY.to_string(),
            to_value_or_null(&self.interrupt_payload),
        );
        map.insert(
            CURRENT_MODE_KEY.to_string(),
            Value::String(self.session.current_mode.as_str().to_string()),
        );
        map.insert(
            PLANNING_COMPLETE_KEY.to_string(),
            Value::Bool(self.session.planning_complete),
        );
        match &self.session.action_step {
            Some(step) => {
                map.insert(ACTION_STEP_KEY.to_string(), Value::String(step.clone()));
            }
            None => {
                map.remove(ACTION_STEP_KEY);
            }
        }
        Value::Object(map)
    }
}

fn read_field<T: DeserializeOwned + Default>(
    raw: &Map<String, Value>,
    key: &str,
    recovered: &mut Vec<RecoveredField>,
) -> T {
    match raw.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => decode_or_default(value, || key.to_string(), recovered),
    }
}

/// Decode a sequence element by element. A malformed element is replaced by
/// its default in place so the positions of the others stay valid.
fn read_list<T: DeserializeOwned + Default>(
    raw: &Map<String, Value>,
    key: &str,
    recovered: &mut Vec<RecoveredField>,
) -> Vec<T> {
    match raw.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| decode_or_default(item, || format!("{key}[{index}]"), recovered))
            .collect(),
        Some(other) => {
            recovered.push(RecoveredField {
                key: key.to_string(),
                reason: format!("expected array, found {}", type_name(other)),
            });
            Vec::new()
        }
    }
}

/// Decode the dataset mapping entry by entry. An entry without a usable
/// `table_id` takes it from its key.
fn read_datasets(
    raw: &Map<String, Value>,
    recovered: &mut Vec<RecoveredField>,
) -> IndexMap<String, Dataset> {
    match raw.get(DATASETS_KEY) {
        None | Some(Value::Null) => IndexMap::new(),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(table_id, entry)| {
                let mut dataset: Dataset = decode_or_default(
                    entry,
                    || format!("{DATASETS_KEY}[{table_id}]"),
                    recovered,
                );
                if dataset.table_id.is_empty() {
                    dataset.table_id.clone_from(table_id);
                }
                (table_id.clone(), dataset)
            })
            .collect(),
        Some(other) => {
            recovered.push(RecoveredField {
                key: DATASETS_KEY.to_string(),
                reason: format!("expected object, found {}", type_name(other)),
            });
            IndexMap::new()
        }
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(
    value: &Value,
    key: impl FnOnce() -> String,
    recovered: &mut Vec<RecoveredField>,
) -> T {
    match T::deserialize(value) {
        Ok(parsed) => parsed,
        Err(err) => {
            recovered.push(RecoveredField {
                key: key(),
                reason: err.to_string(),
            });
            T::default()
        }
    }
}

fn to_value_or_null<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
