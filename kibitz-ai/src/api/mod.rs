//! HTTP API handlers for kibitz-ai
//!
//! - Public: `/health`, `/tasks/analyze` (signed queue callback)
//! - Identity-resolved: everything under `/api`

pub mod analyses;
pub mod auth;
pub mod health;
pub mod tasks;
pub mod uploads;

pub use analyses::analysis_routes;
pub use auth::identity_middleware;
pub use health::health_routes;
pub use tasks::task_routes;
pub use uploads::upload_routes;
