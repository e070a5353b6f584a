//! Dispatch gateway
//!
//! `dispatch` returns once the hand-off is acknowledged, never once the job
//! finishes. Two strategies share the same worker entry point:
//!
//! - [`InlineDispatcher`] spawns the worker on the local runtime
//! - [`QueueDispatcher`] submits a one-shot HTTP callback task to a managed
//!   queue, which invokes `POST /tasks/analyze` with at-least-once delivery
//!
//! A failed submission leaves the job PENDING; nothing here retries it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use kibitz_common::api::sign_task;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::services::analysis_worker::AnalysisWorker;

/// Header carrying the callback signature
pub const SIGNATURE_HEADER: &str = "x-kibitz-signature";

/// Dispatch submission errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Queue unreachable: {0}")]
    Network(String),

    #[error("Queue rejected task ({0}): {1}")]
    Rejected(u16, String),

    #[error("Failed to encode task: {0}")]
    Serialize(String),
}

/// Hand a job id to whatever will eventually execute it
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, analysis_id: Uuid) -> Result<(), DispatchError>;
}

/// Body of a task callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub analysis_id: Uuid,
}

/// Runs the worker in a background task on this process
pub struct InlineDispatcher {
    worker: Arc<AnalysisWorker>,
}

impl InlineDispatcher {
    pub fn new(worker: Arc<AnalysisWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Dispatcher for InlineDispatcher {
    async fn dispatch(&self, analysis_id: Uuid) -> Result<(), DispatchError> {
        let worker = Arc::clone(&self.worker);
        tokio::spawn(async move {
            worker.run(analysis_id).await;
        });

        tracing::debug!(analysis_id = %analysis_id, "Analysis scheduled inline");
        Ok(())
    }
}

/// Settings for [`QueueDispatcher`]
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Task creation endpoint of the queue
    pub queue_url: String,
    /// Public URL of this service's `/tasks/analyze`
    pub callback_url: String,
    /// Bearer token for the queue API
    pub auth_token: Option<String>,
    pub shared_secret: i64,
}

/// Submits HTTP callback tasks to a managed queue
pub struct QueueDispatcher {
    http_client: reqwest::Client,
    settings: QueueSettings,
}

impl QueueDispatcher {
    pub fn new(settings: QueueSettings) -> Result<Self, DispatchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Task document as accepted by Cloud Tasks `tasks.create`
    pub fn build_task(&self, analysis_id: Uuid) -> Result<serde_json::Value, DispatchError> {
        let body = serde_json::to_vec(&TaskPayload { analysis_id })
            .map_err(|e| DispatchError::Serialize(e.to_string()))?;
        let signature = sign_task(&analysis_id.to_string(), self.settings.shared_secret);

        Ok(json!({
            "task": {
                "httpRequest": {
                    "httpMethod": "POST",
                    "url": self.settings.callback_url,
                    "headers": {
                        "Content-Type": "application/json",
                        (SIGNATURE_HEADER): signature,
                    },
                    "body": BASE64.encode(body),
                }
            }
        }))
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(&self, analysis_id: Uuid) -> Result<(), DispatchError> {
        let task = self.build_task(analysis_id)?;

        let mut request = self.http_client.post(&self.settings.queue_url).json(&task);
        if let Some(token) = &self.settings.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected(status.as_u16(), error_text));
        }

        tracing::debug!(analysis_id = %analysis_id, "Analysis task queued");
        Ok(())
    }
}
