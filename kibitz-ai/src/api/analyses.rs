//! Analysis job endpoints
//!
//! Every query is scoped to the requesting [`Owner`]; another owner's jobs
//! behave exactly like missing ones.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use kibitz_common::Owner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::db::analyses::{
    count_analyses_for_owner, list_analyses_for_owner, list_batch, load_owned_analysis,
    load_statuses,
};
use crate::models::{Analysis, AnalysisResult, AnalysisStatus, Side};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::services::{BulkSubmitter, SubmissionOutcome};
use crate::{ApiError, ApiResult, AppState};

/// Most ids accepted by one status query
pub const MAX_STATUS_IDS: usize = 200;

// ============================================================================
// Response shapes
// ============================================================================

/// Listing view of a job, without game text or result body
#[derive(Debug, Serialize)]
pub struct AnalysisSummary {
    pub analysis_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    pub player_name: String,
    pub player_side: Side,
    pub white: String,
    pub black: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Analysis> for AnalysisSummary {
    fn from(a: &Analysis) -> Self {
        Self {
            analysis_id: a.analysis_id,
            batch_id: a.batch_id,
            player_name: a.player_name.clone(),
            player_side: a.player_side,
            white: a.white.clone(),
            black: a.black.clone(),
            outcome: a.outcome.clone(),
            event: a.event.clone(),
            date: a.date.clone(),
            opening: a.opening.clone(),
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
            completed_at: a.completed_at,
        }
    }
}

/// Full job record
#[derive(Debug, Serialize)]
pub struct AnalysisDetail {
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    pub pgn: String,
    pub file_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eco: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Analysis> for AnalysisDetail {
    fn from(a: Analysis) -> Self {
        Self {
            summary: AnalysisSummary::from(&a),
            pgn: a.pgn,
            file_ref: a.file_ref,
            eco: a.eco,
            result: a.result,
            error: a.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisSummary>,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub total_results: i64,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub count: usize,
    pub analyses: Vec<AnalysisSummary>,
}

#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub status: AnalysisStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub statuses: BTreeMap<Uuid, StatusEntry>,
}

#[derive(Debug, Serialize)]
pub struct RedispatchResponse {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BulkAnalysisRequest {
    pub file_refs: Vec<String>,
    pub player_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub analysis_ids: Vec<String>,
}

fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid {}: {}", what, raw)))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/analyses/bulk
///
/// Creates and dispatches one job per game the player appears in.
/// Returns 202 because analysis happens after the response.
pub async fn submit_bulk(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(request): Json<BulkAnalysisRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionOutcome>)> {
    let submitter = BulkSubmitter::new(&state.db, state.storage.as_ref(), state.dispatcher.as_ref());

    match submitter
        .submit(&owner, &request.file_refs, &request.player_name)
        .await
    {
        Ok(outcome) => Ok((StatusCode::ACCEPTED, Json(outcome))),
        Err(e) => {
            let err = ApiError::from(e);
            if matches!(err, ApiError::BadGateway(_) | ApiError::Internal(_)) {
                state.record_error(err.to_string()).await;
            }
            Err(err)
        }
    }
}

/// GET /api/analyses?page=N
pub async fn list_analyses(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<AnalysisListResponse>> {
    let total = count_analyses_for_owner(&state.db, &owner).await?;
    let pagination = calculate_pagination(total, query.page.unwrap_or(1));

    let analyses = list_analyses_for_owner(&state.db, &owner, PAGE_SIZE, pagination.offset).await?;

    Ok(Json(AnalysisListResponse {
        analyses: analyses.iter().map(AnalysisSummary::from).collect(),
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        total_results: total,
    }))
}

/// GET /api/analyses/:analysis_id
pub async fn get_analysis(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(analysis_id): Path<String>,
) -> ApiResult<Json<AnalysisDetail>> {
    let analysis_id = parse_id(&analysis_id, "analysis id")?;

    let analysis = load_owned_analysis(&state.db, &owner, analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis {}", analysis_id)))?;

    Ok(Json(analysis.into()))
}

/// GET /api/analyses/batch/:batch_id
pub async fn get_batch(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchResponse>> {
    let batch_id = parse_id(&batch_id, "batch id")?;

    let analyses = list_batch(&state.db, &owner, batch_id).await?;
    if analyses.is_empty() {
        return Err(ApiError::NotFound(format!("Batch {}", batch_id)));
    }

    Ok(Json(BatchResponse {
        batch_id,
        count: analyses.len(),
        analyses: analyses.iter().map(AnalysisSummary::from).collect(),
    }))
}

/// POST /api/analyses/status
///
/// Unknown ids and other owners' ids are simply absent from the mapping.
pub async fn get_statuses(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if request.analysis_ids.len() > MAX_STATUS_IDS {
        return Err(ApiError::BadRequest(format!(
            "At most {} ids per status query",
            MAX_STATUS_IDS
        )));
    }

    let ids = request
        .analysis_ids
        .iter()
        .map(|raw| parse_id(raw, "analysis id"))
        .collect::<ApiResult<Vec<Uuid>>>()?;

    let statuses = load_statuses(&state.db, &owner, &ids).await?;

    Ok(Json(StatusResponse {
        statuses: statuses
            .into_iter()
            .map(|(id, status)| (id, StatusEntry { status }))
            .collect(),
    }))
}

/// POST /api/analyses/:analysis_id/redispatch
///
/// Hands a job that is still PENDING to the dispatcher again, e.g. after a
/// queue submission failed during bulk submission.
pub async fn redispatch_analysis(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(analysis_id): Path<String>,
) -> ApiResult<(StatusCode, Json<RedispatchResponse>)> {
    let analysis_id = parse_id(&analysis_id, "analysis id")?;

    let analysis = load_owned_analysis(&state.db, &owner, analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis {}", analysis_id)))?;

    if analysis.status != AnalysisStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "Analysis {} is {}, only pending analyses can be re-dispatched",
            analysis_id, analysis.status
        )));
    }

    if let Err(e) = state.dispatcher.dispatch(analysis_id).await {
        let err = ApiError::from(e);
        state.record_error(err.to_string()).await;
        return Err(err);
    }
    info!(analysis_id = %analysis_id, "Analysis re-dispatched");

    Ok((
        StatusCode::ACCEPTED,
        Json(RedispatchResponse {
            analysis_id,
            status: analysis.status,
        }),
    ))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyses", get(list_analyses))
        .route("/api/analyses/bulk", post(submit_bulk))
        .route("/api/analyses/status", post(get_statuses))
        .route("/api/analyses/batch/:batch_id", get(get_batch))
        .route("/api/analyses/:analysis_id", get(get_analysis))
        .route("/api/analyses/:analysis_id/redispatch", post(redispatch_analysis))
}
