//! Hierarchical tree view over the entity collections.
//!
//! The tree is derived and ephemeral: it is rebuilt from scratch for every
//! snapshot and carries no state of its own.

use serde::Serialize;

use crate::core::snapshot::Collections;
use crate::core::types::{StateItem, StateItemType};

/// One node of the state tree.
///
/// A folder has children and no `data`; a leaf has `data` and no children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: StateItemType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StateItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_folder(&self) -> bool {
        !self.children.is_empty() && self.data.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.data.is_some() && self.children.is_empty()
    }

    fn folder(kind: StateItemType, children: Vec<TreeNode>) -> Self {
        TreeNode {
            id: kind.as_str().to_string(),
            label: format!("{} ({})", kind.title(), children.len()),
            kind,
            timestamp: None,
            data: None,
            children,
        }
    }

    fn leaf(id: String, label: String, item: StateItem) -> Self {
        let timestamp = Some(item.timestamp())
            .filter(|ts| !ts.is_empty())
            .map(str::to_string);
        TreeNode {
            id,
            label,
            kind: item.kind(),
            timestamp,
            data: Some(item),
            children: Vec::new(),
        }
    }
}

/// Build the root nodes: Queries, Datasets, Query Results, skipping empty
/// categories.
pub fn build_tree(collections: &Collections) -> Vec<TreeNode> {
    let mut tree = Vec::with_capacity(3);

    if !collections.queries.is_empty() {
        let children = collections
            .queries
            .iter()
            .enumerate()
            .map(|(index, query)| {
                let label = if query.querysummary.is_empty() {
                    format!("Query {}", index + 1)
                } else {
                    query.querysummary.clone()
                };
                TreeNode::leaf(query_node_id(index), label, StateItem::Query(query.clone()))
            })
            .collect();
        tree.push(TreeNode::folder(StateItemType::Queries, children));
    }

    if !collections.datasets.is_empty() {
        let children = collections
            .datasets
            .iter()
            .map(|(table_id, dataset)| {
                TreeNode::leaf(
                    dataset_node_id(table_id),
                    dataset_label(table_id).to_string(),
                    StateItem::Dataset(dataset.clone()),
                )
            })
            .collect();
        tree.push(TreeNode::folder(StateItemType::Datasets, children));
    }

    if !collections.query_results.is_empty() {
        let children = collections
            .query_results
            .iter()
            .enumerate()
            .map(|(index, result)| {
                TreeNode::leaf(
                    result_node_id(index),
                    format!("Result {}", index + 1),
                    StateItem::QueryResult(result.clone()),
                )
            })
            .collect();
        tree.push(TreeNode::folder(StateItemType::QueryResults, children));
    }

    tree
}

/// Depth-first lookup by node id.
pub fn find_node<'a>(nodes: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    None
}

pub(crate) const QUERY_ID_PREFIX: &str = "query-";
pub(crate) const DATASET_ID_PREFIX: &str = "dataset-";
pub(crate) const RESULT_ID_PREFIX: &str = "result-";

pub fn query_node_id(index: usize) -> String {
    format!("{QUERY_ID_PREFIX}{index}")
}

pub fn dataset_node_id(table_id: &str) -> String {
    format!("{DATASET_ID_PREFIX}{table_id}")
}

pub fn result_node_id(index: usize) -> String {
    format!("{RESULT_ID_PREFIX}{index}")
}

/// Last dot-separated segment of a qualified table name.
///
/// Falls back to the whole id when the last segment is empty (`"a."`).
pub fn dataset_label(table_id: &str) -> &str {
    match table_id.rsplit('.').next() {
        Some(last) if !last.is_empty() => last,
        _ => table_id,
    }
}
