//! Identity middleware for `/api` routes
//!
//! `Authorization: Bearer <subject_id>:<email>:<hash>` resolves to a
//! registered owner; no header means anonymous. A header that is present
//! but malformed or wrongly signed is rejected with 401 rather than
//! silently downgraded to anonymous.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use kibitz_common::api::{parse_bearer_token, ApiAuthError};
use kibitz_common::Owner;
use tracing::warn;

use crate::{ApiError, AppState};

/// Resolve the requester and insert an [`Owner`] into request extensions
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let owner = match request.headers().get(AUTHORIZATION) {
        None => Owner::Anonymous,
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::Unauthorized("Authorization header is not ASCII".to_string()))?;
            let token = value.strip_prefix("Bearer ").ok_or_else(|| {
                ApiError::Unauthorized("Expected a Bearer token".to_string())
            })?;

            let identity = parse_bearer_token(token, state.shared_secret).map_err(|e| {
                if let ApiAuthError::InvalidHash { provided, calculated } = &e {
                    warn!(
                        "Token hash validation failed: provided={}, calculated={}",
                        provided, calculated
                    );
                }
                ApiError::Unauthorized(e.to_string())
            })?;

            Owner::from(Some(identity))
        }
    };

    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}
