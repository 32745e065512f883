//! Addressing entities by tree node id.

use serde::Deserialize;
use serde_json::Value;

use crate::core::patch::{DatasetPatch, QueryPatch, QueryResultPatch};
use crate::core::tree_view::{DATASET_ID_PREFIX, QUERY_ID_PREFIX, RESULT_ID_PREFIX};
use crate::core::types::StateItemType;
use crate::error::SyncError;

/// Identity of one entity inside the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Query(usize),
    Dataset(String),
    QueryResult(usize),
}

impl ItemRef {
    /// Parse a leaf id (`query-3`, `dataset-proj.d.orders`, `result-0`)
    /// declared to be of `kind`.
    pub fn parse(kind: StateItemType, id: &str) -> Result<Self, SyncError> {
        let invalid = || SyncError::InvalidItemRef(format!("{kind}/{id}"));
        match kind {
            StateItemType::Queries => {
                let index = id.strip_prefix(QUERY_ID_PREFIX).ok_or_else(invalid)?;
                index.parse().map(ItemRef::Query).map_err(|_| invalid())
            }
            StateItemType::Datasets => {
                let table_id = id.strip_prefix(DATASET_ID_PREFIX).ok_or_else(invalid)?;
                if table_id.trim().is_empty() {
                    return Err(SyncError::EmptyTableId);
                }
                Ok(ItemRef::Dataset(table_id.to_string()))
            }
            StateItemType::QueryResults => {
                let index = id.strip_prefix(RESULT_ID_PREFIX).ok_or_else(invalid)?;
                index.parse().map(ItemRef::QueryResult).map_err(|_| invalid())
            }
        }
    }

    pub fn kind(&self) -> StateItemType {
        match self {
            ItemRef::Query(_) => StateItemType::Queries,
            ItemRef::Dataset(_) => StateItemType::Datasets,
            ItemRef::QueryResult(_) => StateItemType::QueryResults,
        }
    }
}

/// An update aimed at one entity, patch already decoded for its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityUpdate {
    Query { index: usize, patch: QueryPatch },
    Dataset { table_id: String, patch: DatasetPatch },
    QueryResult { index: usize, patch: QueryResultPatch },
}

/// Loosely typed update request as posted by an editor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateUpdateRequest {
    #[serde(rename = "type")]
    pub kind: Option<StateItemType>,
    pub id: Option<String>,
    pub data: Option<Value>,
}

pub const MISSING_FIELDS: &str = "Missing required fields: type, id, data";

impl StateUpdateRequest {
    /// Validate the request and decode `data` as the patch for its kind.
    pub fn resolve(self) -> Result<EntityUpdate, SyncError> {
        let (Some(kind), Some(id), Some(data)) = (self.kind, self.id, self.data) else {
            return Err(SyncError::InvalidItemRef(MISSING_FIELDS.to_string()));
        };
        if id.is_empty() || data.is_null() {
            return Err(SyncError::InvalidItemRef(MISSING_FIELDS.to_string()));
        }
        let invalid_patch = |err: serde_json::Error| SyncError::InvalidPatch {
            kind,
            reason: err.to_string(),
        };
        Ok(match ItemRef::parse(kind, &id)? {
            ItemRef::Query(index) => EntityUpdate::Query {
                index,
                patch: serde_json::from_value(data).map_err(invalid_patch)?,
            },
            ItemRef::Dataset(table_id) => EntityUpdate::Dataset {
                table_id,
                patch: serde_json::from_value(data).map_err(invalid_patch)?,
            },
            ItemRef::QueryResult(index) => EntityUpdate::QueryResult {
                index,
                patch: serde_json::from_value(data).map_err(invalid_patch)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_leaf_ids() {
        assert_eq!(
            ItemRef::parse(StateItemType::Queries, "query-3").expect("query"),
            ItemRef::Query(3)
        );
        assert_eq!(
            ItemRef::parse(StateItemType::Datasets, "dataset-proj.d.orders").expect("dataset"),
            ItemRef::Dataset("proj.d.orders".to_string())
        );
        assert_eq!(
            ItemRef::parse(StateItemType::QueryResults, "result-0").expect("result"),
            ItemRef::QueryResult(0)
        );
    }

    #[test]
    fn rejects_mismatched_kind_and_bad_index() {
        assert!(ItemRef::parse(StateItemType::Queries, "result-0").is_err());
        assert!(ItemRef::parse(StateItemType::Queries, "query-x").is_err());
        assert!(ItemRef::parse(StateItemType::QueryResults, "result--1").is_err());
        assert_eq!(
            ItemRef::parse(StateItemType::Datasets, "dataset-"),
            Err(SyncError::EmptyTableId)
        );
    }

    #[test]
    fn request_requires_all_fields() {
        let request: StateUpdateRequest =
            serde_json::from_value(json!({ "type": "queries", "id": "query-0" })).expect("parse");
        let err = request.resolve().expect_err("missing data");
        assert!(err.to_string().contains(MISSING_FIELDS));
    }

    #[test]
    fn request_decodes_patch_for_kind() {
        let request: StateUpdateRequest = serde_json::from_value(json!({
            "type": "datasets",
            "id": "dataset-proj.d.orders",
            "data": { "details": "# Orders" }
        }))
        .expect("parse");
        let update = request.resolve().expect("resolve");
        assert_eq!(
            update,
            EntityUpdate::Dataset {
                table_id: "proj.d.orders".to_string(),
                patch: DatasetPatch {
                    details: Some("# Orders".to_string()),
                    ..DatasetPatch::default()
                },
            }
        );
    }

    #[test]
    fn request_rejects_patch_of_wrong_kind() {
        let request: StateUpdateRequest = serde_json::from_value(json!({
            "type": "query_results",
            "id": "result-1",
            "data": { "querysummary": "nope" }
        }))
        .expect("parse");
        assert!(matches!(
            request.resolve(),
            Err(SyncError::InvalidPatch { kind: StateItemType::QueryResults, .. })
        ));
    }
}
