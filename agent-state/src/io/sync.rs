//! State synchronizer: the console's projection of the agent document plus
//! the update intents that are forwarded to the agent.
//!
//! Intents are remote-confirmed: a successful call only means the agent took
//! the request. The projection changes only when a later snapshot arrives.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::core::item_ref::EntityUpdate;
use crate::core::patch::{AgentAction, DatasetPatch, QueryPatch, QueryResultPatch};
use crate::core::snapshot::Collections;
use crate::core::tree_view::{TreeNode, build_tree};
use crate::core::types::{AgentMode, SessionInfo, StateItemType};
use crate::error::SyncError;
use crate::io::agent_client::{ActionReceipt, AgentClient};
use crate::io::document::VersionedSnapshot;

/// Read-only cached view derived from the newest snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    /// Version of the snapshot this projection was built from.
    pub version: Option<u64>,
    pub loading: bool,
    pub collections: Collections,
    pub session: SessionInfo,
    pub tree: Vec<TreeNode>,
}

impl Projection {
    fn initial() -> Self {
        Projection {
            version: None,
            loading: true,
            collections: Collections::default(),
            session: SessionInfo::default(),
            tree: Vec::new(),
        }
    }

    fn from_snapshot(versioned: &VersionedSnapshot) -> Self {
        let snapshot = &versioned.snapshot;
        Projection {
            version: Some(versioned.version),
            loading: false,
            tree: build_tree(&snapshot.collections),
            collections: snapshot.collections.clone(),
            session: snapshot.session.clone(),
        }
    }
}

pub struct StateSynchronizer<C> {
    client: Arc<C>,
    projection: watch::Sender<Arc<Projection>>,
}

impl<C: AgentClient> StateSynchronizer<C> {
    pub fn new(client: Arc<C>) -> Self {
        let (projection, _) = watch::channel(Arc::new(Projection::initial()));
        StateSynchronizer { client, projection }
    }

    /// Replace the projection with one built from `versioned`.
    ///
    /// Only the snapshot pump calls this. Versions at or below the current
    /// one are ignored so a late delivery can never roll the view back.
    /// Returns true when the projection changed.
    pub fn apply_snapshot(&self, versioned: &VersionedSnapshot) -> bool {
        if let Some(current) = self.projection.borrow().version
            && versioned.version <= current
        {
            debug!(version = versioned.version, current, "ignoring stale snapshot");
            return false;
        }
        let next = Projection::from_snapshot(versioned);
        debug!(
            version = versioned.version,
            queries = next.collections.queries.len(),
            datasets = next.collections.datasets.len(),
            query_results = next.collections.query_results.len(),
            "projection rebuilt"
        );
        self.projection.send_replace(Arc::new(next));
        true
    }

    pub fn projection(&self) -> Arc<Projection> {
        self.projection.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Projection>> {
        self.projection.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.projection.borrow().loading
    }

    /// Ask the agent to merge `patch` into the query at `index`.
    #[instrument(skip(self, patch))]
    pub async fn update_query(
        &self,
        index: usize,
        patch: QueryPatch,
    ) -> Result<ActionReceipt, SyncError> {
        let len = self.projection.borrow().collections.queries.len();
        check_index(StateItemType::Queries, index, len)?;
        self.invoke(AgentAction::UpdateQuery { index, data: patch })
            .await
    }

    /// Ask the agent to merge `patch` into (or create) the dataset `table_id`.
    #[instrument(skip(self, patch))]
    pub async fn update_dataset(
        &self,
        table_id: &str,
        patch: DatasetPatch,
    ) -> Result<ActionReceipt, SyncError> {
        if table_id.trim().is_empty() {
            return Err(SyncError::EmptyTableId);
        }
        self.invoke(AgentAction::UpdateDataset {
            table_id: table_id.to_string(),
            data: patch,
        })
        .await
    }

    /// Ask the agent to merge `patch` into the query result at `index`.
    #[instrument(skip(self, patch))]
    pub async fn update_query_result(
        &self,
        index: usize,
        patch: QueryResultPatch,
    ) -> Result<ActionReceipt, SyncError> {
        let len = self.projection.borrow().collections.query_results.len();
        check_index(StateItemType::QueryResults, index, len)?;
        self.invoke(AgentAction::UpdateQueryResult { index, data: patch })
            .await
    }

    /// Dispatch a resolved editor update to the matching intent.
    pub async fn apply_update(&self, update: EntityUpdate) -> Result<ActionReceipt, SyncError> {
        match update {
            EntityUpdate::Query { index, patch } => self.update_query(index, patch).await,
            EntityUpdate::Dataset { table_id, patch } => {
                self.update_dataset(&table_id, patch).await
            }
            EntityUpdate::QueryResult { index, patch } => {
                self.update_query_result(index, patch).await
            }
        }
    }

    /// Ask the agent to switch its operating mode.
    pub async fn switch_mode(&self, mode: AgentMode) -> Result<ActionReceipt, SyncError> {
        self.invoke(AgentAction::SwitchMode { mode }).await
    }

    /// Best-effort re-subscribe: marks the projection loading and asks the
    /// agent to re-send its document. Loading clears when the request
    /// settles (if a snapshot was ever received) or when the next snapshot
    /// arrives.
    pub async fn refresh(&self) {
        self.projection
            .send_modify(|projection| Arc::make_mut(projection).loading = true);
        if let Err(err) = self.client.request_snapshot().await {
            warn!(error = %err, "refresh request failed");
        }
        self.projection.send_if_modified(|projection| {
            if projection.loading && projection.version.is_some() {
                Arc::make_mut(projection).loading = false;
                true
            } else {
                false
            }
        });
    }

    async fn invoke(&self, action: AgentAction) -> Result<ActionReceipt, SyncError> {
        info!(action = action.name(), "forwarding intent to agent");
        match self.client.invoke(&action).await {
            Ok(receipt) => {
                debug!(action = action.name(), message = %receipt.message, "agent accepted intent");
                Ok(receipt)
            }
            Err(err) => {
                warn!(action = action.name(), error = %err, "agent intent failed");
                Err(SyncError::Agent(err))
            }
        }
    }
}

fn check_index(kind: StateItemType, index: usize, len: usize) -> Result<(), SyncError> {
    if index >= len {
        return Err(SyncError::IndexOutOfRange { kind, index, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::Snapshot;
    use crate::error::AgentError;
    use crate::test_support::{ScriptedAgentClient, snapshot_json};
    use serde_json::json;

    fn versioned(version: u64, value: serde_json::Value) -> VersionedSnapshot {
        VersionedSnapshot {
            version,
            snapshot: Arc::new(Snapshot::from_value(value).snapshot),
        }
    }

    fn synchronizer() -> (Arc<ScriptedAgentClient>, StateSynchronizer<ScriptedAgentClient>) {
        let client = Arc::new(ScriptedAgentClient::new());
        let sync = StateSynchronizer::new(client.clone());
        (client, sync)
    }

    #[test]
    fn loading_until_first_snapshot() {
        let (_, sync) = synchronizer();
        assert!(sync.is_loading());
        assert!(sync.apply_snapshot(&versioned(1, json!({}))));
        assert!(!sync.is_loading());
        assert!(sync.projection().tree.is_empty());
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let (_, sync) = synchronizer();
        sync.apply_snapshot(&versioned(2, snapshot_json(2, &["a.b"], 0)));
        assert!(!sync.apply_snapshot(&versioned(1, json!({}))));
        assert_eq!(sync.projection().collections.queries.len(), 2);
    }

    #[test]
    fn snapshot_fully_replaces_projection() {
        let (_, sync) = synchronizer();
        sync.apply_snapshot(&versioned(1, snapshot_json(2, &["a.b"], 1)));
        sync.apply_snapshot(&versioned(2, snapshot_json(0, &[], 1)));
        let projection = sync.projection();
        assert!(projection.collections.queries.is_empty());
        assert!(projection.collections.datasets.is_empty());
        let ids: Vec<&str> = projection.tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["query_results"]);
    }

    #[tokio::test]
    async fn out_of_range_update_is_local_error() {
        let (client, sync) = synchronizer();
        sync.apply_snapshot(&versioned(1, snapshot_json(1, &[], 0)));

        let err = sync
            .update_query(5, QueryPatch::default())
            .await
            .expect_err("out of range");
        assert_eq!(
            err,
            SyncError::IndexOutOfRange {
                kind: StateItemType::Queries,
                index: 5,
                len: 1
            }
        );
        assert!(!err.is_retryable());
        assert!(client.actions().is_empty());

        let err = sync
            .update_query_result(0, QueryResultPatch::default())
            .await
            .expect_err("no results");
        assert!(matches!(err, SyncError::IndexOutOfRange { len: 0, .. }));
    }

    #[tokio::test]
    async fn intents_are_forwarded_not_applied_locally() {
        let (client, sync) = synchronizer();
        sync.apply_snapshot(&versioned(1, snapshot_json(1, &[], 0)));
        let patch = QueryPatch {
            querysummary: Some("Renamed".to_string()),
            ..QueryPatch::default()
        };

        sync.update_query(0, patch.clone()).await.expect("update");
        sync.update_dataset("proj.d.new", DatasetPatch::default())
            .await
            .expect("create dataset");

        assert_eq!(
            client.actions(),
            vec![
                AgentAction::UpdateQuery { index: 0, data: patch },
                AgentAction::UpdateDataset {
                    table_id: "proj.d.new".to_string(),
                    data: DatasetPatch::default()
                },
            ]
        );
        assert_ne!(sync.projection().collections.queries[0].querysummary, "Renamed");
    }

    #[tokio::test]
    async fn empty_table_id_is_rejected() {
        let (client, sync) = synchronizer();
        let err = sync
            .update_dataset("  ", DatasetPatch::default())
            .await
            .expect_err("empty");
        assert_eq!(err, SyncError::EmptyTableId);
        assert!(client.actions().is_empty());
    }

    #[tokio::test]
    async fn agent_failure_is_retryable() {
        let (client, sync) = synchronizer();
        client.fail_next_invoke(AgentError::Unavailable("down".to_string()));
        let err = sync
            .switch_mode(AgentMode::Planning)
            .await
            .expect_err("agent down");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn refresh_settles_loading_after_request() {
        let (client, sync) = synchronizer();
        sync.apply_snapshot(&versioned(1, json!({})));
        sync.refresh().await;
        assert!(!sync.is_loading());
        assert_eq!(client.snapshot_requests(), 1);
    }

    #[tokio::test]
    async fn refresh_before_first_snapshot_stays_loading() {
        let (_, sync) = synchronizer();
        sync.refresh().await;
        assert!(sync.is_loading());
    }
}
