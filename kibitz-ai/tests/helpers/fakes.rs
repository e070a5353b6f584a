//! In-test collaborators

use async_trait::async_trait;
use kibitz_ai::services::{AnalysisModel, DispatchError, Dispatcher, ModelError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

/// Model returning a fixed reply or a fixed error
pub struct FakeModel {
    reply: Result<String, String>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Replies only after the returned gate is notified
    pub fn gated(text: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let model = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::replying(text)
        };
        (model, gate)
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisModel for FakeModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply
            .clone()
            .map_err(|body| ModelError::Api(503, body))
    }
}

/// Dispatcher that records ids instead of running anything
///
/// Optionally rejects the n-th dispatch (1-based) to simulate a queue outage.
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<Uuid>>,
    fail_on: Option<usize>,
    attempts: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            fail_on: None,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(attempt: usize) -> Self {
        Self {
            fail_on: Some(attempt),
            ..Self::new()
        }
    }

    pub fn dispatched(&self) -> Vec<Uuid> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, analysis_id: Uuid) -> Result<(), DispatchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            return Err(DispatchError::Rejected(503, "queue unavailable".to_string()));
        }
        self.dispatched.lock().unwrap().push(analysis_id);
        Ok(())
    }
}
