//! Game records: the moves and metadata of one played game.
//!
//! A [`GameRecord`] is built ply by ply by the game session, carries its
//! final [`GameResult`] once the session is over, and is handed to the PGN
//! writer by the match controller.

use crate::rules::{DrawReason, Outcome};
use chrono::NaiveDate;
use std::fmt;

/// The two sides of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "White"),
            Color::Black => write!(f, "Black"),
        }
    }
}

/// A single ply in UCI coordinate notation (e.g. `e2e4`, `e7e8q`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Move(String);

impl Move {
    pub fn new(uci: impl Into<String>) -> Self {
        Self(uci.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Move {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Move {
    fn from(uci: &str) -> Self {
        Self::new(uci)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A move as played, in both the wire form and the notation written to PGN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMove {
    /// The move exactly as the engine sent it.
    pub uci: Move,
    /// Standard algebraic notation, computed before the move was applied.
    pub san: String,
}

/// Which of the per-game failures stopped the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortKind {
    /// The executable could not be started.
    Launch,
    /// The engine stopped answering within the protocol ceiling.
    ProtocolTimeout,
    /// The engine process exited or closed its output.
    EngineCrashed,
    /// The engine printed something the protocol does not allow.
    ProtocolViolation,
    /// The engine proposed a move the rules engine rejected.
    IllegalMove,
}

impl fmt::Display for AbortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortKind::Launch => "launch failure",
            AbortKind::ProtocolTimeout => "protocol timeout",
            AbortKind::EngineCrashed => "engine crashed",
            AbortKind::ProtocolViolation => "protocol violation",
            AbortKind::IllegalMove => "illegal move",
        };
        f.write_str(s)
    }
}

/// Why a game was abandoned, and who is to blame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReason {
    /// The side whose engine caused the abort.
    pub blamed: Color,
    /// Label of the blamed engine (configured name, or executable path).
    pub engine: String,
    pub kind: AbortKind,
    /// Human readable detail, e.g. the rejected move or the I/O error.
    pub detail: String,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {}: {}",
            self.blamed, self.engine, self.kind, self.detail
        )
    }
}

/// Final classification of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameResult {
    /// The rules engine declared the game over.
    Finished(Outcome),
    /// The ply cap was reached before the game was decided.
    Unterminated,
    /// An engine misbehaved and the game was abandoned.
    Aborted(AbortReason),
}

impl GameResult {
    /// The PGN result token.
    pub fn token(&self) -> &'static str {
        match self {
            GameResult::Finished(Outcome::WhiteWins) => "1-0",
            GameResult::Finished(Outcome::BlackWins) => "0-1",
            GameResult::Finished(Outcome::Draw(_)) => "1/2-1/2",
            GameResult::Unterminated | GameResult::Aborted(_) => "*",
        }
    }

    /// True when the game ended without a winner but was not abandoned:
    /// a draw, or a game cut off by the ply cap.
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            GameResult::Finished(Outcome::Draw(_)) | GameResult::Unterminated
        )
    }

    /// Why the game was drawn; `None` for anything but a finished draw.
    pub fn draw_reason(&self) -> Option<DrawReason> {
        match self {
            GameResult::Finished(Outcome::Draw(reason)) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Finished(Outcome::WhiteWins) => write!(f, "White wins"),
            GameResult::Finished(Outcome::BlackWins) => write!(f, "Black wins"),
            GameResult::Finished(Outcome::Draw(reason)) => write!(f, "Draw ({})", reason),
            GameResult::Unterminated => write!(f, "Unterminated"),
            GameResult::Aborted(reason) => write!(f, "Aborted: {}", reason),
        }
    }
}

/// PGN header values. `None` is written as `"?"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameTags {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<NaiveDate>,
    pub round: Option<u32>,
    pub white: Option<String>,
    pub black: Option<String>,
}

/// One game: metadata, moves from the initial position, and the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub tags: GameTags,
    pub moves: Vec<RecordedMove>,
    pub result: GameResult,
}

impl GameRecord {
    /// Starts an empty record. The result stays [`GameResult::Unterminated`]
    /// until the session finalizes it.
    pub fn new(tags: GameTags) -> Self {
        Self {
            tags,
            moves: Vec::new(),
            result: GameResult::Unterminated,
        }
    }

    /// The move history in UCI form, as sent with `position startpos moves`.
    pub fn uci_moves(&self) -> Vec<Move> {
        self.moves.iter().map(|m| m.uci.clone()).collect()
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }
}
