//! kibitz-ai library interface
//!
//! Exposes [`AppState`] and [`build_router`] so integration tests can drive
//! the service with in-memory collaborators.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{AnalysisWorker, Dispatcher, ObjectStorage};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Job store and settings
    pub db: SqlitePool,
    /// Uploaded game files
    pub storage: Arc<dyn ObjectStorage>,
    /// Hands created jobs to a worker
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Executes jobs delivered through `/tasks/analyze`
    pub worker: Arc<AnalysisWorker>,
    /// Token and callback signing secret; 0 disables verification
    pub shared_secret: i64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        storage: Arc<dyn ObjectStorage>,
        dispatcher: Arc<dyn Dispatcher>,
        worker: Arc<AnalysisWorker>,
        shared_secret: i64,
    ) -> Self {
        Self {
            db,
            storage,
            dispatcher,
            worker,
            shared_secret,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember a failure for `/health`
    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    // Identity-resolved routes
    let api = Router::new()
        .merge(api::upload_routes())
        .merge(api::analysis_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::identity_middleware,
        ));

    // Public routes
    let public = Router::new()
        .merge(api::health_routes())
        .merge(api::task_routes());

    Router::new()
        .merge(api)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
