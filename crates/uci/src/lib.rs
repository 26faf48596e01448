//! UCI (Universal Chess Interface) protocol vocabulary, seen from the GUI side.
//!
//! This crate formats the commands a controlling program sends to an engine
//! and parses the lines an engine prints back. It performs no I/O; the
//! process plumbing lives with the caller.
//!
//! # Commands sent to the engine
//!
//! - `uci` - Initialize engine, get id and options
//! - `isready` / `readyok` - Synchronization
//! - `ucinewgame` - Next search belongs to a new game
//! - `position startpos [moves <move>...]` - Set position
//! - `go movetime <ms>` - Search for a fixed time
//! - `quit` - Exit engine
//!
//! # Lines read from the engine
//!
//! - `id name <name>` / `id author <author>`
//! - `uciok`, `readyok`
//! - `info ...` - Search progress
//! - `bestmove <move> [ponder <move>]`

mod command;
mod info;

pub use command::GuiCommand;
pub use info::{EngineInfo, Score};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine name (`id name ...`).
    IdName(String),
    /// Engine author (`id author ...`).
    IdAuthor(String),
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found.
    BestMove { mv: String, ponder: Option<String> },
    /// `option` declarations and anything else the GUI does not act on.
    Other(String),
}

impl EngineMessage {
    /// Parse one line of engine output.
    ///
    /// Lines that are not part of the vocabulary above come back as
    /// [`EngineMessage::Other`]; only a malformed `bestmove` is an error.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next().unwrap_or("") {
            "uciok" => Ok(EngineMessage::UciOk),
            "readyok" => Ok(EngineMessage::ReadyOk),
            "id" => match parts.next() {
                Some("name") => Ok(EngineMessage::IdName(rest_after(line, 2))),
                Some("author") => Ok(EngineMessage::IdAuthor(rest_after(line, 2))),
                _ => Ok(EngineMessage::Other(line.to_string())),
            },
            "info" => Ok(EngineInfo::parse(line)
                .map(EngineMessage::Info)
                .unwrap_or_else(|| EngineMessage::Other(line.to_string()))),
            "bestmove" => {
                let mv = parts
                    .next()
                    .ok_or_else(|| UciError::ParseError("bestmove without a move".to_string()))?
                    .to_string();
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(str::to_string),
                    _ => None,
                };
                Ok(EngineMessage::BestMove { mv, ponder })
            }
            _ => Ok(EngineMessage::Other(line.to_string())),
        }
    }

    /// Returns true for the `bestmove` placeholders engines print when they
    /// have no legal move (`(none)` and `0000`).
    pub fn is_null_move(mv: &str) -> bool {
        mv == "(none)" || mv == "0000"
    }
}

/// Everything after the first `n` whitespace-separated tokens, with inner
/// spacing preserved (engine names often contain spaces).
fn rest_after(line: &str, n: usize) -> String {
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        rest = rest
            .find(char::is_whitespace)
            .map(|idx| &rest[idx..])
            .unwrap_or("");
    }
    rest.trim().to_string()
}
