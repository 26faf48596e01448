//! PGN (Portable Game Notation) output for finished games.
//!
//! Games are appended to a single file that grows over the whole match.
//! Each entry is rendered completely in memory and written with one call,
//! so an entry is never interleaved with another and existing content is
//! never truncated.

use crate::record::{AbortKind, GameRecord, GameResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Movetext lines are wrapped before this column.
const LINE_WIDTH: usize = 80;

/// Appends `record` to the PGN file at `path`, creating the file if needed.
///
/// # Errors
///
/// Returns an `std::io::Error` if the file cannot be opened or written.
/// Nothing is written in that case.
///
/// # Example
///
/// ```no_run
/// use engine_duel::pgn::append_game;
/// use engine_duel::record::{GameRecord, GameTags};
///
/// let record = GameRecord::new(GameTags::default());
/// append_game("games.pgn", &record)?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn append_game<P: AsRef<Path>>(path: P, record: &GameRecord) -> std::io::Result<()> {
    let text = render_game(record);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()
}

/// Renders one PGN entry: a blank separator line, the tag pairs, a blank
/// line and the movetext ending with the result token.
pub fn render_game(record: &GameRecord) -> String {
    let tags = &record.tags;
    let result = record.result.token();

    let mut out = String::from("\n");
    tag(&mut out, "Event", tags.event.as_deref());
    tag(&mut out, "Site", tags.site.as_deref());
    tag(
        &mut out,
        "Date",
        tags.date.map(|d| d.format("%Y.%m.%d").to_string()).as_deref(),
    );
    tag(&mut out, "Round", tags.round.map(|r| r.to_string()).as_deref());
    tag(&mut out, "White", tags.white.as_deref());
    tag(&mut out, "Black", tags.black.as_deref());
    tag(&mut out, "Result", Some(result));
    if let Some(termination) = termination(&record.result) {
        tag(&mut out, "Termination", Some(termination));
    }
    out.push('\n');

    let mut tokens: Vec<String> = Vec::with_capacity(record.moves.len() * 3 / 2 + 2);
    for (i, mv) in record.moves.iter().enumerate() {
        if i % 2 == 0 {
            tokens.push(format!("{}.", i / 2 + 1));
        }
        tokens.push(mv.san.clone());
    }
    if let GameResult::Aborted(reason) = &record.result {
        // A brace inside the text would end the comment early.
        let comment = format!("{{{}}}", reason.to_string().replace('}', ")"));
        tokens.extend(comment.split_whitespace().map(str::to_string));
    }
    tokens.push(result.to_string());

    for line in wrap(&tokens) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn tag(out: &mut String, name: &str, value: Option<&str>) {
    let value = value.map(escape).unwrap_or_else(|| "?".to_string());
    out.push_str(&format!("[{} \"{}\"]\n", name, value));
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn termination(result: &GameResult) -> Option<&'static str> {
    match result {
        GameResult::Finished(_) => None,
        GameResult::Unterminated => Some("unterminated"),
        GameResult::Aborted(reason) if reason.kind == AbortKind::IllegalMove => {
            Some("rules infraction")
        }
        GameResult::Aborted(_) => Some("abandoned"),
    }
}

/// Greedy wrap on token boundaries. A token longer than a line gets a line
/// of its own.
fn wrap(tokens: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for token in tokens {
        if !line.is_empty() && line.len() + 1 + token.len() > LINE_WIDTH {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(token);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
