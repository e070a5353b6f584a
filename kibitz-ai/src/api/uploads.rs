//! File upload endpoint

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use kibitz_common::Owner;
use serde::{Deserialize, Serialize};

use crate::{ApiError, ApiResult, AppState};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Original client-side file name, for logging only
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Reference to pass in `file_refs` of a bulk submission
    pub reference: String,
    pub size: usize,
}

/// POST /api/uploads?filename=<name>
///
/// Raw request body is stored as-is under the requester's owner directory.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Upload body is empty".to_string()));
    }

    let reference = state
        .storage
        .store(&body, &owner, query.filename.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            reference,
            size: body.len(),
        }),
    ))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/api/uploads", post(upload_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
