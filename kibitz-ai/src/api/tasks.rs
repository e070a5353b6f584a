//! Managed-queue callback endpoint
//!
//! The queue retries on non-2xx responses. Worker failures are recorded on
//! the job itself, so once the signature checks out this always answers 200.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use kibitz_common::api::validate_task_signature;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::services::{TaskPayload, SIGNATURE_HEADER};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub analysis_id: Uuid,
    /// What the worker did, e.g. "completed" or "already_handled"
    pub outcome: &'static str,
}

/// POST /tasks/analyze
pub async fn run_analysis_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TaskPayload>,
) -> ApiResult<Json<TaskResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    validate_task_signature(&payload.analysis_id.to_string(), signature, state.shared_secret)
        .map_err(|e| {
            warn!(analysis_id = %payload.analysis_id, "Rejected task callback: {}", e);
            ApiError::Unauthorized("Invalid task signature".to_string())
        })?;

    let outcome = state.worker.run(payload.analysis_id).await;

    Ok(Json(TaskResponse {
        analysis_id: payload.analysis_id,
        outcome: outcome.as_str(),
    }))
}

/// Build task callback routes
pub fn task_routes() -> Router<AppState> {
    Router::new().route("/tasks/analyze", post(run_analysis_task))
}
