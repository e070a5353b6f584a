//! Test Helper Utilities
//!
//! Shared fakes and app construction for kibitz-ai integration tests

#![allow(dead_code)]

pub mod fakes;

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use kibitz_ai::db::init_memory_pool;
use kibitz_ai::services::{AnalysisWorker, Dispatcher, LocalObjectStorage, ObjectStorage};
use kibitz_ai::AppState;
use kibitz_common::Owner;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub use fakes::{FakeModel, RecordingDispatcher};

/// Signing secret used by test apps
pub const TEST_SECRET: i64 = 4242;

/// App state plus handles tests need to inspect
pub struct TestApp {
    pub state: AppState,
    pub model: Arc<FakeModel>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub storage: Arc<LocalObjectStorage>,
    // Keeps the upload folder alive for the test's duration
    _uploads: TempDir,
}

impl TestApp {
    pub async fn new(model: FakeModel, dispatcher: RecordingDispatcher) -> Self {
        Self::with_secret(model, dispatcher, TEST_SECRET).await
    }

    pub async fn with_secret(model: FakeModel, dispatcher: RecordingDispatcher, secret: i64) -> Self {
        let db = init_memory_pool().await.unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalObjectStorage::new(uploads.path()));
        let model = Arc::new(model);
        let dispatcher = Arc::new(dispatcher);
        let worker = Arc::new(AnalysisWorker::new(db.clone(), model.clone()));

        let state = AppState::new(
            db,
            storage.clone() as Arc<dyn ObjectStorage>,
            dispatcher.clone() as Arc<dyn Dispatcher>,
            worker,
            secret,
        );

        Self {
            state,
            model,
            dispatcher,
            storage,
            _uploads: uploads,
        }
    }

    /// Store a PGN file directly, bypassing HTTP
    pub async fn upload(&self, owner: &Owner, pgn: &str) -> String {
        self.storage
            .store(pgn.as_bytes(), owner, Some("games.pgn"))
            .await
            .unwrap()
    }
}

/// Build a JSON request
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// One game in PGN form
pub fn pgn_game(white: &str, black: &str, result: &str) -> String {
    format!(
        "[Event \"Club Night\"]\n[Date \"2024.05.01\"]\n[White \"{}\"]\n[Black \"{}\"]\n[Result \"{}\"]\n[ECO \"B01\"]\n\n1. e4 d5 2. exd5 Qxd5 3. Nc3 Qa5 {}\n",
        white, black, result, result
    )
}

/// Model reply containing a complete analysis
pub const GOOD_REPLY: &str = r#"Here is my analysis:
{
  "summary": "A sharp Scandinavian where the queen was chased early.",
  "phases": [
    {"name": "Opening", "moves": "1-3", "evaluation": "equal", "key_ideas": ["Early queen sortie", "Tempo gain with Nc3"]}
  ],
  "key_moments": [
    {"move_number": 3, "move": "Nc3", "fen": "rnb1kbnr/ppp1pppp/8/3q4/8/2N5/PPPP1PPP/R1BQKBNR b KQkq - 1 3", "evaluation": "+0.4", "comment": "Develops with tempo", "is_mistake": false}
  ],
  "recommendations": ["Review Scandinavian main lines"]
}"#;
