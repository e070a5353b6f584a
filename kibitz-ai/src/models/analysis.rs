//! Analysis job record and status state machine
//!
//! A job progresses through a strict forward-only lifecycle:
//! PENDING → PROCESSING → COMPLETED | FAILED
//!
//! Terminal states never transition again. `result` is present only when
//! COMPLETED and `error` only when FAILED.

use chrono::{DateTime, Utc};
use kibitz_common::Owner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::game::ParsedGame;

/// Analysis job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Created and dispatched, not yet picked up by a worker
    Pending,
    /// Claimed by a worker, model call in flight
    Processing,
    /// Result stored
    Completed,
    /// Failure reason stored
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        matches!(
            (self, next),
            (AnalysisStatus::Pending, AnalysisStatus::Processing)
                | (AnalysisStatus::Processing, AnalysisStatus::Completed)
                | (AnalysisStatus::Processing, AnalysisStatus::Failed)
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(format!("Unknown analysis status: {}", other)),
        }
    }
}

/// Side of the board the subject played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }

    pub fn opponent(&self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(Side::White),
            "black" => Ok(Side::Black),
            other => Err(format!("Unknown side: {}", other)),
        }
    }
}

/// One phase of the game (opening, middlegame, endgame)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePhase {
    pub name: String,
    /// Move range covered, e.g. "1-12"
    #[serde(default)]
    pub moves: String,
    #[serde(default)]
    pub evaluation: String,
    #[serde(default)]
    pub key_ideas: Vec<String>,
}

/// A flagged moment in the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMoment {
    pub move_number: u32,
    #[serde(rename = "move")]
    pub played_move: String,
    #[serde(default)]
    pub fen: String,
    #[serde(default)]
    pub evaluation: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub is_mistake: bool,
}

/// Structured analysis produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    #[serde(default)]
    pub phases: Vec<GamePhase>,
    #[serde(default)]
    pub key_moments: Vec<KeyMoment>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Recorded status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub analysis_id: Uuid,
    pub old_status: AnalysisStatus,
    pub new_status: AnalysisStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal status transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
}

/// One game's analysis unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Client-facing identifier, distinct from the storage key
    pub analysis_id: Uuid,
    /// Shared by all jobs of one bulk submission
    pub batch_id: Option<Uuid>,
    pub owner: Owner,

    pub pgn: String,
    pub file_ref: String,
    pub player_name: String,
    pub player_side: Side,

    pub white: String,
    pub black: String,
    pub outcome: String,
    pub event: Option<String>,
    pub date: Option<String>,
    pub eco: Option<String>,
    pub opening: Option<String>,

    pub status: AnalysisStatus,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Analysis {
    /// Create a pending job for a parsed game whose side has been resolved
    pub fn new(
        game: &ParsedGame,
        file_ref: String,
        player_name: String,
        player_side: Side,
        batch_id: Option<Uuid>,
        owner: Owner,
    ) -> Self {
        let now = Utc::now();
        Self {
            analysis_id: Uuid::new_v4(),
            batch_id,
            owner,
            pgn: game.pgn.clone(),
            file_ref,
            player_name,
            player_side,
            white: game.white.clone(),
            black: game.black.clone(),
            outcome: game.outcome.clone(),
            event: game.event.clone(),
            date: game.date.clone(),
            eco: game.eco.clone(),
            opening: game.opening.clone(),
            status: AnalysisStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Name of the opponent from the subject's perspective
    pub fn opponent(&self) -> &str {
        match self.player_side {
            Side::White => &self.black,
            Side::Black => &self.white,
        }
    }

    fn transition_to(
        &mut self,
        new_status: AnalysisStatus,
    ) -> Result<StateTransition, IllegalTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(IllegalTransition {
                from: self.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        let transition = StateTransition {
            analysis_id: self.analysis_id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;
        self.updated_at = now;

        Ok(transition)
    }

    /// PENDING → PROCESSING
    pub fn start_processing(&mut self) -> Result<StateTransition, IllegalTransition> {
        self.transition_to(AnalysisStatus::Processing)
    }

    /// PROCESSING → COMPLETED, storing the result and completion time
    pub fn complete(
        &mut self,
        result: AnalysisResult,
    ) -> Result<StateTransition, IllegalTransition> {
        let transition = self.transition_to(AnalysisStatus::Completed)?;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(transition.transitioned_at);
        Ok(transition)
    }

    /// PROCESSING → FAILED, storing the reason
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<StateTransition, IllegalTransition> {
        let transition = self.transition_to(AnalysisStatus::Failed)?;
        self.error = Some(reason.into());
        self.result = None;
        Ok(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
