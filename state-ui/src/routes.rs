//! HTTP route handlers for the console API.

use agent_state::core::interrupt::{ConfirmationPrompt, InterruptView};
use agent_state::core::item_ref::StateUpdateRequest;
use agent_state::core::patch::{DatasetPatch, QueryPatch, QueryResultPatch};
use agent_state::core::snapshot::RecoveredField;
use agent_state::core::tree_view::TreeNode;
use agent_state::core::types::AgentMode;
use agent_state::error::{DecisionError, SyncError};
use agent_state::io::agent_client::ActionReceipt;
use agent_state::io::coordinator::DecisionOutcome;
use agent_state::io::sync::Projection;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route("/tree", get(get_tree))
        .route("/interrupt", get(get_interrupt))
        .route("/interrupt/approve", post(approve))
        .route("/interrupt/reject", post(reject))
        .route("/queries/{index}", put(put_query))
        .route("/datasets/{table_id}", put(put_dataset))
        .route("/query-results/{index}", put(put_query_result))
        .route("/agent-state", post(post_agent_state))
        .route("/mode", post(post_mode))
        .route("/refresh", post(post_refresh))
        .route("/snapshot", post(post_snapshot))
}

/// Error body shared by every failing route: `{ "success": false, "error": ... }`.
#[derive(Debug)]
pub enum ApiError {
    /// Body could not be read as the expected request.
    BadRequest(String),
    Sync(SyncError),
    Decision(DecisionError),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError::Sync(err)
    }
}

impl From<DecisionError> for ApiError {
    fn from(err: DecisionError) -> Self {
        ApiError::Decision(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            ApiError::Sync(SyncError::InvalidItemRef(reason)) => {
                (StatusCode::BAD_REQUEST, reason.clone())
            }
            ApiError::Sync(err @ SyncError::EmptyTableId) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Sync(
                err @ (SyncError::IndexOutOfRange { .. } | SyncError::InvalidPatch { .. }),
            ) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            ApiError::Sync(err @ SyncError::Agent(_)) => (StatusCode::BAD_GATEWAY, err.to_string()),
            ApiError::Decision(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };
        let body = ErrorBody {
            success: false,
            error,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ActionResponse {
    success: bool,
    message: String,
}

impl From<ActionReceipt> for ActionResponse {
    fn from(receipt: ActionReceipt) -> Self {
        ActionResponse {
            success: true,
            message: receipt.message,
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/state - current projection.
async fn get_state(State(state): State<AppState>) -> Json<Projection> {
    Json(state.synchronizer.projection().as_ref().clone())
}

/// GET /api/tree - tree view of the current projection.
async fn get_tree(State(state): State<AppState>) -> Json<Vec<TreeNode>> {
    Json(state.synchronizer.projection().tree.clone())
}

#[derive(Serialize)]
struct InterruptResponse {
    #[serde(flatten)]
    view: InterruptView,
    prompt: Option<ConfirmationPrompt>,
}

/// GET /api/interrupt - interrupt view plus the confirmation prompt, if any.
async fn get_interrupt(State(state): State<AppState>) -> Json<InterruptResponse> {
    let view = state.coordinator.view();
    let prompt = ConfirmationPrompt::for_view(&view);
    Json(InterruptResponse { view, prompt })
}

async fn approve(State(state): State<AppState>) -> Result<Json<DecisionOutcome>, ApiError> {
    Ok(Json(state.coordinator.approve().await?))
}

async fn reject(State(state): State<AppState>) -> Result<Json<DecisionOutcome>, ApiError> {
    Ok(Json(state.coordinator.reject().await?))
}

async fn put_query(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(patch): Json<QueryPatch>,
) -> Result<Json<ActionResponse>, ApiError> {
    let receipt = state.synchronizer.update_query(index, patch).await?;
    Ok(Json(receipt.into()))
}

async fn put_dataset(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    Json(patch): Json<DatasetPatch>,
) -> Result<Json<ActionResponse>, ApiError> {
    let receipt = state.synchronizer.update_dataset(&table_id, patch).await?;
    Ok(Json(receipt.into()))
}

async fn put_query_result(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(patch): Json<QueryResultPatch>,
) -> Result<Json<ActionResponse>, ApiError> {
    let receipt = state.synchronizer.update_query_result(index, patch).await?;
    Ok(Json(receipt.into()))
}

/// POST /api/agent-state - editor update addressed by tree leaf id.
async fn post_agent_state(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let request: StateUpdateRequest = serde_json::from_value(body)
        .map_err(|err| ApiError::BadRequest(format!("Invalid request: {err}")))?;
    let update = request.resolve()?;
    let receipt = state.synchronizer.apply_update(update).await?;
    Ok(Json(receipt.into()))
}

#[derive(Deserialize)]
struct ModeRequest {
    mode: AgentMode,
}

async fn post_mode(
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let receipt = state.synchronizer.switch_mode(request.mode).await?;
    Ok(Json(receipt.into()))
}

/// POST /api/refresh - ask the agent to re-send its document.
async fn post_refresh(State(state): State<AppState>) -> (StatusCode, Json<ActionResponse>) {
    state.synchronizer.refresh().await;
    (
        StatusCode::ACCEPTED,
        Json(ActionResponse {
            success: true,
            message: "Refresh requested".to_string(),
        }),
    )
}

#[derive(Serialize)]
struct SnapshotAccepted {
    version: u64,
    recovered: Vec<RecoveredField>,
}

/// POST /api/snapshot - inbound push of a whole document.
async fn post_snapshot(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> Json<SnapshotAccepted> {
    let (version, recovered) = state.document.publish_value(document);
    Json(SnapshotAccepted { version, recovered })
}
