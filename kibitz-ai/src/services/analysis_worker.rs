//! Job executor
//!
//! Runs one analysis job: claim it (PENDING → PROCESSING), call the model,
//! then persist COMPLETED or FAILED. The claim is a conditional write that
//! only applies while the stored status is still PENDING, so duplicate
//! deliveries of the same id are no-ops once any worker has claimed it.
//!
//! Failures never escape [`AnalysisWorker::run`]; callers (queue callbacks,
//! inline dispatch) always see success. If the final write fails, one more
//! write records the job as FAILED. When that write fails too the job stays
//! PROCESSING with nothing but an error log to show for it.

use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::analyses::{load_analysis, save_analysis, save_analysis_if_status};
use crate::models::{Analysis, AnalysisStatus};
use crate::services::model_client::{parse_analysis_result, AnalysisModel};
use crate::services::prompt::build_analysis_prompt;

/// What a single worker invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No job with this id
    NotFound,
    /// Job was not pending (already claimed or finished)
    AlreadyHandled(AnalysisStatus),
    /// Another invocation claimed the job between load and claim
    LostClaim,
    Completed,
    Failed,
    /// Store error; the job is left pending, processing, or failed
    Aborted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::NotFound => "not_found",
            RunOutcome::AlreadyHandled(_) => "already_handled",
            RunOutcome::LostClaim => "lost_claim",
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::Aborted => "aborted",
        }
    }
}

/// Executes analysis jobs against the job store and the model
pub struct AnalysisWorker {
    db: SqlitePool,
    model: Arc<dyn AnalysisModel>,
}

impl AnalysisWorker {
    pub fn new(db: SqlitePool, model: Arc<dyn AnalysisModel>) -> Self {
        Self { db, model }
    }

    /// Run one job to a terminal state, logging instead of returning errors
    pub async fn run(&self, analysis_id: Uuid) -> RunOutcome {
        match self.try_run(analysis_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(analysis_id = %analysis_id, error = %e, "Analysis job aborted by store error");
                RunOutcome::Aborted
            }
        }
    }

    async fn try_run(&self, analysis_id: Uuid) -> kibitz_common::Result<RunOutcome> {
        let Some(mut analysis) = load_analysis(&self.db, analysis_id).await? else {
            tracing::warn!(analysis_id = %analysis_id, "Analysis job not found, ignoring");
            return Ok(RunOutcome::NotFound);
        };

        if analysis.status != AnalysisStatus::Pending {
            tracing::warn!(
                analysis_id = %analysis_id,
                status = %analysis.status,
                "Analysis job already handled, ignoring duplicate delivery"
            );
            return Ok(RunOutcome::AlreadyHandled(analysis.status));
        }

        if analysis.start_processing().is_err() {
            return Ok(RunOutcome::AlreadyHandled(analysis.status));
        }
        if !save_analysis_if_status(&self.db, &analysis, AnalysisStatus::Pending).await? {
            tracing::warn!(analysis_id = %analysis_id, "Analysis job claimed by another worker");
            return Ok(RunOutcome::LostClaim);
        }

        tracing::info!(
            analysis_id = %analysis_id,
            player = %analysis.player_name,
            side = %analysis.player_side,
            "Analysis processing"
        );

        let claimed = analysis.clone();
        let outcome = self.analyze(&mut analysis).await;
        if let Err(e) = save_analysis(&self.db, &analysis).await {
            self.record_lost_outcome(claimed, &e).await;
            return Err(e);
        }

        match outcome {
            RunOutcome::Completed => {
                tracing::info!(analysis_id = %analysis_id, "Analysis completed")
            }
            _ => tracing::error!(
                analysis_id = %analysis_id,
                reason = analysis.error.as_deref().unwrap_or(""),
                "Analysis failed"
            ),
        }

        Ok(outcome)
    }

    /// Call the model and move the job to its terminal state in memory
    async fn analyze(&self, analysis: &mut Analysis) -> RunOutcome {
        let prompt = build_analysis_prompt(analysis);

        let parsed = match self.model.generate(&prompt).await {
            Ok(text) => parse_analysis_result(&text),
            Err(e) => Err(e),
        };

        // Job is PROCESSING here, so both terminal transitions are legal
        match parsed {
            Ok(result) => match analysis.complete(result) {
                Ok(_) => RunOutcome::Completed,
                Err(e) => self.fail(analysis, e.to_string()),
            },
            Err(e) => self.fail(analysis, e.to_string()),
        }
    }

    fn fail(&self, analysis: &mut Analysis, reason: String) -> RunOutcome {
        match analysis.fail(reason) {
            Ok(_) => RunOutcome::Failed,
            Err(e) => {
                tracing::error!(analysis_id = %analysis.analysis_id, error = %e, "Could not mark analysis failed");
                RunOutcome::Aborted
            }
        }
    }

    /// Single attempt to move a claimed job to FAILED after its outcome was lost
    async fn record_lost_outcome(&self, mut claimed: Analysis, cause: &kibitz_common::Error) {
        let analysis_id = claimed.analysis_id;
        if claimed
            .fail(format!("Could not store analysis outcome: {}", cause))
            .is_err()
        {
            return;
        }
        match save_analysis(&self.db, &claimed).await {
            Ok(()) => tracing::warn!(analysis_id = %analysis_id, "Analysis outcome lost, job marked failed"),
            Err(e) => tracing::error!(
                analysis_id = %analysis_id,
                error = %e,
                "Analysis outcome lost, job left processing"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{analyses::create_analysis, init_memory_pool};
    use crate::models::{ParsedGame, Side};
    use crate::services::model_client::ModelError;
    use async_trait::async_trait;
    use kibitz_common::Owner;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AnalysisModel for ScriptedModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(ModelError::Network)
        }
    }

    async fn pending_job(pool: &SqlitePool) -> Analysis {
        let game = ParsedGame {
            pgn: "[White \"Ann\"]\n[Black \"Bob\"]\n\n1. e4 e5 *".to_string(),
            white: "Ann".to_string(),
            black: "Bob".to_string(),
            outcome: "*".to_string(),
            event: None,
            date: None,
            eco: None,
            opening: None,
        };
        let job = Analysis::new(
            &game,
            "local://anonymous/a.pgn".to_string(),
            "Ann".to_string(),
            Side::White,
            Some(Uuid::new_v4()),
            Owner::Anonymous,
        );
        create_analysis(pool, &job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_successful_run_completes_job() {
        let pool = init_memory_pool().await.unwrap();
        let job = pending_job(&pool).await;
        let model = ScriptedModel::replying(r#"Sure! {"summary": "Good game", "recommendations": ["Castle earlier"]}"#);
        let worker = AnalysisWorker::new(pool.clone(), model.clone());

        assert_eq!(worker.run(job.analysis_id).await, RunOutcome::Completed);

        let stored = load_analysis(&pool, job.analysis_id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Completed);
        assert_eq!(stored.result.unwrap().summary, "Good game");
        assert!(stored.error.is_none());
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unparsable_reply_fails_job() {
        let pool = init_memory_pool().await.unwrap();
        let job = pending_job(&pool).await;
        let worker = AnalysisWorker::new(pool.clone(), ScriptedModel::replying("no idea"));

        assert_eq!(worker.run(job.analysis_id).await, RunOutcome::Failed);

        let stored = load_analysis(&pool, job.analysis_id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Failed);
        assert!(stored.result.is_none());
        assert!(!stored.error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let pool = init_memory_pool().await.unwrap();
        let job = pending_job(&pool).await;
        let model = ScriptedModel::failing("quota exceeded");
        let worker = AnalysisWorker::new(pool.clone(), model.clone());

        assert_eq!(worker.run(job.analysis_id).await, RunOutcome::Failed);
        let first = load_analysis(&pool, job.analysis_id).await.unwrap().unwrap();

        assert_eq!(
            worker.run(job.analysis_id).await,
            RunOutcome::AlreadyHandled(AnalysisStatus::Failed)
        );
        let second = load_analysis(&pool, job.analysis_id).await.unwrap().unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.updated_at, second.updated_at);
        assert_eq!(second.error.as_deref(), Some("Network error: quota exceeded"));
    }

    #[tokio::test]
    async fn test_lost_outcome_marks_job_failed() {
        let pool = init_memory_pool().await.unwrap();
        let job = pending_job(&pool).await;
        sqlx::query(
            "CREATE TRIGGER reject_completed BEFORE UPDATE ON analyses \
             WHEN NEW.status = 'completed' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&pool)
        .await
        .unwrap();
        let worker = AnalysisWorker::new(pool.clone(), ScriptedModel::replying(r#"{"summary": "ok"}"#));

        assert_eq!(worker.run(job.analysis_id).await, RunOutcome::Aborted);

        let stored = load_analysis(&pool, job.analysis_id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Failed);
        assert!(stored.result.is_none());
        assert!(stored.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let pool = init_memory_pool().await.unwrap();
        let model = ScriptedModel::replying("{}");
        let worker = AnalysisWorker::new(pool, model.clone());

        assert_eq!(worker.run(Uuid::new_v4()).await, RunOutcome::NotFound);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
