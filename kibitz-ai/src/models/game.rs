//! Parsed game records

use serde::{Deserialize, Serialize};

/// Sentinel for a missing participant or outcome header
pub const UNKNOWN: &str = "Unknown";

/// One game split out of an uploaded PGN file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedGame {
    /// Raw PGN text of this game only
    pub pgn: String,
    pub white: String,
    pub black: String,
    /// Result tag value ("1-0", "0-1", "1/2-1/2", "*") or [`UNKNOWN`]
    pub outcome: String,
    pub event: Option<String>,
    pub date: Option<String>,
    pub eco: Option<String>,
    pub opening: Option<String>,
}
