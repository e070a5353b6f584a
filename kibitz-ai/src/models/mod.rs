//! Data models for kibitz-ai
//!
//! - Analysis job record and its status state machine
//! - Parsed game records

pub mod analysis;
pub mod game;

pub use analysis::{
    Analysis, AnalysisResult, AnalysisStatus, GamePhase, IllegalTransition, KeyMoment, Side,
    StateTransition,
};
pub use game::{ParsedGame, UNKNOWN};
