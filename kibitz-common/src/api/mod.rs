//! Shared HTTP API functionality
//!
//! Contains ONLY pure functions, database operations and shared types.
//! Each service wraps these with framework-specific middleware (Axum).

pub mod auth;
pub mod identity;

pub use auth::{
    calculate_hash, load_shared_secret, parse_bearer_token, resolve_shared_secret, sign_identity,
    sign_task, validate_task_signature, ApiAuthError,
};
pub use identity::{Identity, Owner};
