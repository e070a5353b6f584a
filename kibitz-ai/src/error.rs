//! HTTP error type for kibitz-ai
//!
//! Every handler error renders as `{"error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{DispatchError, StorageError, SubmissionError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or rejected credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict (409) - e.g., re-dispatching a job that already started
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream queue refused or could not be reached (502)
    #[error("Upstream failure: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "DISPATCH_FAILED", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<kibitz_common::Error> for ApiError {
    fn from(err: kibitz_common::Error) -> Self {
        match err {
            kibitz_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            kibitz_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(reference) => {
                ApiError::NotFound(format!("Stored file not found: {}", reference))
            }
            StorageError::InvalidReference(_) | StorageError::Format(_, _) => {
                ApiError::BadRequest(err.to_string())
            }
            StorageError::Io(e) => {
                tracing::error!(error = %e, "Object storage IO failure");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        tracing::error!(error = %err, "Dispatch failed");
        ApiError::BadGateway(err.to_string())
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SubmissionError::Storage(e) => e.into(),
            SubmissionError::Database(e) => e.into(),
            dispatch @ SubmissionError::Dispatch { .. } => {
                tracing::error!(error = %dispatch, "Bulk submission aborted");
                ApiError::BadGateway(dispatch.to_string())
            }
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
