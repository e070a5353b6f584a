//! Decide which side a named player had in a game
//!
//! Names are compared trimmed and lowercased. A participant matches when
//! either name contains the other, so "carlsen" finds "Carlsen, Magnus" and
//! "Magnus Carlsen (NOR)" finds "Magnus Carlsen".
//!
//! If both participants match, White wins the tie. This happens with short
//! or shared names (e.g. subject "an" against "Ann" and "Dan") and is
//! accepted rather than reported as an error.
//!
//! A participant recorded as [`UNKNOWN`] never matches.

use crate::models::{Side, UNKNOWN};

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn names_match(subject: &str, participant: &str) -> bool {
    if participant.is_empty() || participant.eq_ignore_ascii_case(UNKNOWN) {
        return false;
    }
    subject.contains(participant) || participant.contains(subject)
}

/// Resolve the subject's side, or `None` if neither participant matches
pub fn resolve_side(subject: &str, white: &str, black: &str) -> Option<Side> {
    let subject = normalize(subject);
    if subject.is_empty() {
        return None;
    }

    if names_match(&subject, &normalize(white)) {
        Some(Side::White)
    } else if names_match(&subject, &normalize(black)) {
        Some(Side::Black)
    } else {
        None
    }
}
