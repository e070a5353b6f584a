//! PGN splitting and header extraction
//!
//! A file may hold many concatenated games. A new game begins wherever a
//! blank line is followed by the start of a header block (`[Tag "..."]`).
//! The blank line between a game's headers and its movetext does not split,
//! because movetext does not start with `[`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ParsedGame, UNKNOWN};

static HEADER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\[\s*\w+\s+"[^"]*"\s*\]"#).unwrap());
static NUMBERED_MOVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\.\s*\S").unwrap());

/// Split raw PGN text into individual game texts, in file order
///
/// Empty fragments are discarded, so whitespace-only input yields nothing.
pub fn split_games(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut games = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut previous_blank = false;

    for line in normalized.lines() {
        let trimmed = line.trim();
        let starts_header = trimmed.starts_with('[');

        if starts_header && previous_blank && has_content(&current) {
            push_game(&mut games, &current);
            current.clear();
        }

        current.push(line);
        previous_blank = trimmed.is_empty();
    }

    push_game(&mut games, &current);
    games
}

fn has_content(lines: &[&str]) -> bool {
    lines.iter().any(|l| !l.trim().is_empty())
}

fn push_game(games: &mut Vec<String>, lines: &[&str]) {
    let game = lines.join("\n").trim().to_string();
    if !game.is_empty() {
        games.push(game);
    }
}

/// Value of a header tag, matched case-insensitively
pub fn header_value(pgn: &str, tag: &str) -> Option<String> {
    let pattern = format!(r#"(?i)\[\s*{}\s+"([^"]*)"\s*\]"#, regex::escape(tag));
    // Tag names are escaped, so the pattern always compiles
    let re = Regex::new(&pattern).ok()?;
    re.captures(pgn)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extract header fields from a single game's text
///
/// Missing participants or outcome become [`UNKNOWN`]; other fields stay absent.
pub fn parse_game(pgn: &str) -> ParsedGame {
    ParsedGame {
        pgn: pgn.to_string(),
        white: header_value(pgn, "White").unwrap_or_else(|| UNKNOWN.to_string()),
        black: header_value(pgn, "Black").unwrap_or_else(|| UNKNOWN.to_string()),
        outcome: header_value(pgn, "Result").unwrap_or_else(|| UNKNOWN.to_string()),
        event: header_value(pgn, "Event"),
        date: header_value(pgn, "Date"),
        eco: header_value(pgn, "ECO"),
        opening: header_value(pgn, "Opening"),
    }
}

/// Split and parse every game in a file
pub fn parse_games(text: &str) -> Vec<ParsedGame> {
    split_games(text).iter().map(|g| parse_game(g)).collect()
}

/// A game is well-formed if it has at least one header tag and one numbered move
pub fn is_valid_pgn(pgn: &str) -> bool {
    HEADER_TAG.is_match(pgn) && NUMBERED_MOVE.is_match(&movetext(pgn))
}

/// Text outside header tags, so dates like "2024.01.01" are not taken as moves
fn movetext(pgn: &str) -> String {
    HEADER_TAG.replace_all(pgn, "").into_owned()
}
