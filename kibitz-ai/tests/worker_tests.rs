//! Job lifecycle integration tests
//!
//! Submission followed by worker runs, checking status transitions and the
//! fields that must survive them unchanged.

mod helpers;

use helpers::{pgn_game, FakeModel, RecordingDispatcher, TestApp, GOOD_REPLY};
use kibitz_ai::db::analyses::{load_analysis, load_statuses};
use kibitz_ai::models::{AnalysisStatus, Side};
use kibitz_ai::services::{BulkSubmitter, InlineDispatcher, RunOutcome};
use kibitz_common::Owner;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn submit_one(app: &TestApp, owner: &Owner, white: &str, black: &str, player: &str) -> Uuid {
    let reference = app.upload(owner, &pgn_game(white, black, "0-1")).await;
    let submitter = BulkSubmitter::new(
        &app.state.db,
        app.state.storage.as_ref(),
        app.state.dispatcher.as_ref(),
    );
    let outcome = submitter.submit(owner, &[reference], player).await.unwrap();
    outcome.analysis_ids[0]
}

#[tokio::test]
async fn black_side_job_keeps_immutable_fields_through_completion() {
    let app = TestApp::new(FakeModel::replying(GOOD_REPLY), RecordingDispatcher::new()).await;
    let owner = Owner::Registered("subject-7".to_string());
    let id = submit_one(&app, &owner, "Magnus", "Hikaru Nakamura", "nakamura").await;

    let before = load_analysis(&app.state.db, id).await.unwrap().unwrap();
    assert_eq!(before.player_side, Side::Black);

    assert_eq!(app.state.worker.run(id).await, RunOutcome::Completed);

    let after = load_analysis(&app.state.db, id).await.unwrap().unwrap();
    assert_eq!(after.status, AnalysisStatus::Completed);
    assert_eq!(after.player_side, Side::Black);
    assert_eq!(after.white, before.white);
    assert_eq!(after.black, before.black);
    assert_eq!(after.batch_id, before.batch_id);
    assert_eq!(after.owner, before.owner);
    assert_eq!(after.pgn, before.pgn);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert!(after.completed_at.is_some());

    let result = after.result.unwrap();
    assert_eq!(result.phases[0].name, "Opening");
    assert_eq!(result.key_moments[0].played_move, "Nc3");
    assert!(after.error.is_none());
}

#[tokio::test]
async fn model_error_fails_job_without_result() {
    let app = TestApp::new(FakeModel::failing("overloaded"), RecordingDispatcher::new()).await;
    let id = submit_one(&app, &Owner::Anonymous, "Ann", "Bob", "Ann").await;

    assert_eq!(app.state.worker.run(id).await, RunOutcome::Failed);

    let job = load_analysis(&app.state.db, id).await.unwrap().unwrap();
    assert_eq!(job.status, AnalysisStatus::Failed);
    assert!(job.result.is_none());
    assert!(job.completed_at.is_none());
    let reason = job.error.unwrap();
    assert!(reason.contains("503"));
}

#[tokio::test]
async fn repeated_delivery_does_not_reprocess() {
    let app = TestApp::new(FakeModel::replying(GOOD_REPLY), RecordingDispatcher::new()).await;
    let id = submit_one(&app, &Owner::Anonymous, "Ann", "Bob", "Ann").await;

    assert_eq!(app.state.worker.run(id).await, RunOutcome::Completed);
    let first = load_analysis(&app.state.db, id).await.unwrap().unwrap();

    assert_eq!(
        app.state.worker.run(id).await,
        RunOutcome::AlreadyHandled(AnalysisStatus::Completed)
    );
    let second = load_analysis(&app.state.db, id).await.unwrap().unwrap();

    assert_eq!(app.model.calls(), 1);
    assert_eq!(first.updated_at, second.updated_at);
    assert_eq!(first.completed_at, second.completed_at);
}

#[tokio::test]
async fn concurrent_deliveries_process_once() {
    let app = TestApp::new(FakeModel::replying(GOOD_REPLY), RecordingDispatcher::new()).await;
    let id = submit_one(&app, &Owner::Anonymous, "Ann", "Bob", "Ann").await;

    let (a, b) = tokio::join!(app.state.worker.run(id), app.state.worker.run(id));

    let completed = [a, b]
        .iter()
        .filter(|o| **o == RunOutcome::Completed)
        .count();
    assert_eq!(completed, 1);
    assert_eq!(app.model.calls(), 1);
}

#[tokio::test]
async fn unknown_job_is_a_silent_noop() {
    let app = TestApp::new(FakeModel::replying(GOOD_REPLY), RecordingDispatcher::new()).await;
    let id = submit_one(&app, &Owner::Anonymous, "Ann", "Bob", "Ann").await;

    assert_eq!(app.state.worker.run(Uuid::new_v4()).await, RunOutcome::NotFound);

    let job = load_analysis(&app.state.db, id).await.unwrap().unwrap();
    assert_eq!(job.status, AnalysisStatus::Pending);
    assert_eq!(app.model.calls(), 0);
}

#[tokio::test]
async fn status_mapping_covers_exactly_requested_jobs() {
    let app = TestApp::new(FakeModel::replying(GOOD_REPLY), RecordingDispatcher::new()).await;
    let owner = Owner::Anonymous;
    let done = submit_one(&app, &owner, "Ann", "Bob", "Ann").await;
    let waiting = submit_one(&app, &owner, "Ann", "Cat", "Ann").await;
    let unrelated = submit_one(&app, &owner, "Ann", "Dan", "Ann").await;
    app.state.worker.run(done).await;

    let statuses = load_statuses(&app.state.db, &owner, &[done, waiting, Uuid::new_v4()])
        .await
        .unwrap();

    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[&done], AnalysisStatus::Completed);
    assert_eq!(statuses[&waiting], AnalysisStatus::Pending);
    assert!(!statuses.contains_key(&unrelated));

    let other_owner = Owner::Registered("someone-else".to_string());
    let hidden = load_statuses(&app.state.db, &other_owner, &[done, waiting])
        .await
        .unwrap();
    assert!(hidden.is_empty());
}

#[tokio::test]
async fn inline_dispatch_returns_before_worker_completes_job() {
    let (model, gate) = FakeModel::gated(GOOD_REPLY);
    let app = TestApp::new(model, RecordingDispatcher::new()).await;
    let owner = Owner::Anonymous;
    let reference = app.upload(&owner, &pgn_game("Ann", "Bob", "1-0")).await;

    let inline = InlineDispatcher::new(Arc::clone(&app.state.worker));
    let submitter = BulkSubmitter::new(&app.state.db, app.state.storage.as_ref(), &inline);
    let outcome = submitter.submit(&owner, &[reference], "Ann").await.unwrap();
    let id = outcome.analysis_ids[0];

    // Model is held at the gate, so the job cannot be finished yet
    let early = load_analysis(&app.state.db, id).await.unwrap().unwrap();
    assert!(!early.status.is_terminal());

    gate.notify_one();

    let mut status = early.status;
    for _ in 0..200 {
        status = load_analysis(&app.state.db, id).await.unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(status, AnalysisStatus::Completed);
    assert_eq!(app.model.calls(), 1);
    // Inline dispatch bypasses the recording dispatcher entirely
    assert!(app.dispatcher.dispatched().is_empty());
}
