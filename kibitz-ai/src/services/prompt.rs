//! Analysis prompt construction

use crate::models::Analysis;

const RESULT_SCHEMA: &str = r#"{
  "summary": "string",
  "phases": [{"name": "string", "moves": "string", "evaluation": "string", "key_ideas": ["string"]}],
  "key_moments": [{"move_number": 0, "move": "string", "fen": "string", "evaluation": "string", "comment": "string", "is_mistake": false}],
  "recommendations": ["string"]
}"#;

/// Build the request text for one job, written from the subject's side
pub fn build_analysis_prompt(analysis: &Analysis) -> String {
    let mut context = vec![
        format!("White: {}", analysis.white),
        format!("Black: {}", analysis.black),
        format!("Result: {}", analysis.outcome),
    ];
    let optional = [
        ("Event", &analysis.event),
        ("Date", &analysis.date),
        ("ECO", &analysis.eco),
        ("Opening", &analysis.opening),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            context.push(format!("{}: {}", label, value));
        }
    }

    format!(
        "You are a chess coach reviewing a game for {player}, who played the {side} pieces \
against {opponent}.\n\
Explain the game from {player}'s perspective: what went well, where the \
mistakes were, and what to work on next.\n\n\
Game information:\n{context}\n\n\
PGN:\n{pgn}\n\n\
Respond with a single JSON object and nothing else, matching this structure:\n{schema}\n\
Mark key_moments where {player} went wrong with \"is_mistake\": true.",
        player = analysis.player_name,
        side = analysis.player_side,
        opponent = analysis.opponent(),
        context = context.join("\n"),
        pgn = analysis.pgn,
        schema = RESULT_SCHEMA,
    )
}
