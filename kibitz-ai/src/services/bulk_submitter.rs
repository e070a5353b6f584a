//! Bulk submission: stored files → one analysis job per game
//!
//! Files are processed one at a time in request order, and games in file
//! order, so `analysis_ids` preserves that ordering. Each created job is
//! dispatched before the next game is looked at.
//!
//! Games that are not well-formed PGN, or that the subject did not play in,
//! produce a [`SkippedGame`] instead of a job. Every parsed game therefore
//! ends up in exactly one of `analysis_ids` or `skipped`.
//!
//! A retrieval failure aborts the whole call; jobs already created for
//! earlier files stay in place. A dispatch failure also aborts, leaving that
//! job PENDING; the error names it so it can be re-dispatched.

use kibitz_common::Owner;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::db::analyses::create_analysis;
use crate::models::{Analysis, ParsedGame};
use crate::services::dispatcher::{DispatchError, Dispatcher};
use crate::services::object_storage::{retrieve_text, ObjectStorage, StorageError};
use crate::services::pgn_parser::{is_valid_pgn, parse_games};
use crate::services::player_matcher::resolve_side;

/// Most files accepted in one submission
pub const MAX_FILES: usize = 50;

/// Longest accepted subject name, in characters
pub const MAX_PLAYER_NAME_LEN: usize = 100;

/// Bulk submission errors
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Dispatch failed, analysis {analysis_id} left pending: {source}")]
    Dispatch {
        analysis_id: Uuid,
        #[source]
        source: DispatchError,
    },

    #[error(transparent)]
    Database(#[from] kibitz_common::Error),
}

/// A game for which no job was created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedGame {
    pub white: String,
    pub black: String,
    pub reason: String,
}

/// Result of one bulk submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub batch_id: Uuid,
    pub analysis_ids: Vec<Uuid>,
    pub count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedGame>,
}

/// Check request shape before anything is read or written
pub fn validate_submission(file_refs: &[String], player_name: &str) -> Result<(), SubmissionError> {
    if file_refs.is_empty() {
        return Err(SubmissionError::InvalidInput(
            "file_refs must contain at least one reference".to_string(),
        ));
    }
    if file_refs.len() > MAX_FILES {
        return Err(SubmissionError::InvalidInput(format!(
            "At most {} files may be submitted at once",
            MAX_FILES
        )));
    }
    if file_refs.iter().any(|r| r.trim().is_empty()) {
        return Err(SubmissionError::InvalidInput(
            "file_refs must not contain blank references".to_string(),
        ));
    }

    let name = player_name.trim();
    if name.is_empty() {
        return Err(SubmissionError::InvalidInput(
            "player_name must not be blank".to_string(),
        ));
    }
    if name.chars().count() > MAX_PLAYER_NAME_LEN {
        return Err(SubmissionError::InvalidInput(format!(
            "player_name must be at most {} characters",
            MAX_PLAYER_NAME_LEN
        )));
    }

    Ok(())
}

/// Turns stored files into dispatched analysis jobs
pub struct BulkSubmitter<'a> {
    db: &'a SqlitePool,
    storage: &'a dyn ObjectStorage,
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> BulkSubmitter<'a> {
    pub fn new(
        db: &'a SqlitePool,
        storage: &'a dyn ObjectStorage,
        dispatcher: &'a dyn Dispatcher,
    ) -> Self {
        Self {
            db,
            storage,
            dispatcher,
        }
    }

    pub async fn submit(
        &self,
        owner: &Owner,
        file_refs: &[String],
        player_name: &str,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        validate_submission(file_refs, player_name)?;

        let player_name = player_name.trim();
        let batch_id = Uuid::new_v4();
        let mut analysis_ids = Vec::new();
        let mut skipped = Vec::new();

        tracing::info!(
            batch_id = %batch_id,
            owner = %owner,
            files = file_refs.len(),
            player = %player_name,
            "Bulk submission started"
        );

        for file_ref in file_refs {
            let text = retrieve_text(self.storage, file_ref).await?;
            let games = parse_games(&text);
            tracing::debug!(batch_id = %batch_id, file_ref = %file_ref, games = games.len(), "File parsed");

            for game in &games {
                match self.submit_game(game, file_ref, player_name, batch_id, owner).await? {
                    Ok(analysis_id) => analysis_ids.push(analysis_id),
                    Err(skip) => {
                        tracing::warn!(
                            batch_id = %batch_id,
                            white = %skip.white,
                            black = %skip.black,
                            reason = %skip.reason,
                            "Game skipped"
                        );
                        skipped.push(skip);
                    }
                }
            }
        }

        tracing::info!(
            batch_id = %batch_id,
            created = analysis_ids.len(),
            skipped = skipped.len(),
            "Bulk submission finished"
        );

        Ok(SubmissionOutcome {
            batch_id,
            count: analysis_ids.len(),
            analysis_ids,
            skipped,
        })
    }

    /// Create and dispatch one job, or describe why the game was skipped
    async fn submit_game(
        &self,
        game: &ParsedGame,
        file_ref: &str,
        player_name: &str,
        batch_id: Uuid,
        owner: &Owner,
    ) -> Result<Result<Uuid, SkippedGame>, SubmissionError> {
        if !is_valid_pgn(&game.pgn) {
            return Ok(Err(SkippedGame {
                white: game.white.clone(),
                black: game.black.clone(),
                reason: "Not a valid PGN game (needs header tags and numbered moves)".to_string(),
            }));
        }

        let Some(side) = resolve_side(player_name, &game.white, &game.black) else {
            return Ok(Err(SkippedGame {
                white: game.white.clone(),
                black: game.black.clone(),
                reason: format!(
                    "Player \"{}\" not found in game ({} vs {})",
                    player_name, game.white, game.black
                ),
            }));
        };

        let analysis = Analysis::new(
            game,
            file_ref.to_string(),
            player_name.to_string(),
            side,
            Some(batch_id),
            owner.clone(),
        );
        let analysis_id = analysis.analysis_id;

        create_analysis(self.db, &analysis).await?;
        tracing::info!(batch_id = %batch_id, analysis_id = %analysis_id, side = %side, "Analysis created");

        self.dispatcher
            .dispatch(analysis_id)
            .await
            .map_err(|source| SubmissionError::Dispatch {
                analysis_id,
                source,
            })?;
        tracing::info!(analysis_id = %analysis_id, "Analysis dispatched");

        Ok(Ok(analysis_id))
    }
}
