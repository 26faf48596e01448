//! The rules engine seam.
//!
//! The game session never decides legality or game termination itself; it
//! asks a [`Rules`] implementation. [`StandardRules`] provides FIDE chess on
//! top of `shakmaty`.

use crate::record::{Color, Move};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use std::fmt;

/// Result of a game the rules engine declared over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// White checkmated Black.
    WhiteWins,
    /// Black checkmated White.
    BlackWins,
    /// Draw with a specific reason.
    Draw(DrawReason),
}

/// Reason for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    /// No legal moves but not in check.
    Stalemate,
    /// Neither side can possibly checkmate.
    InsufficientMaterial,
    /// 100 half-moves without a pawn move or capture.
    FiftyMoveRule,
    /// The same position occurred for the third time.
    ThreefoldRepetition,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrawReason::Stalemate => "stalemate",
            DrawReason::InsufficientMaterial => "insufficient material",
            DrawReason::FiftyMoveRule => "fifty-move rule",
            DrawReason::ThreefoldRepetition => "threefold repetition",
        };
        f.write_str(s)
    }
}

/// Legality and termination oracle used by the game session.
///
/// Positions are immutable snapshots: [`apply`](Rules::apply) returns a new
/// one and leaves its input untouched.
pub trait Rules {
    type Position: Clone;

    /// Returns the position every game starts from.
    fn initial_position(&self) -> Self::Position;

    /// Returns the side that moves next.
    fn side_to_move(&self, position: &Self::Position) -> Color;

    /// Returns every legal move in UCI notation.
    fn legal_moves(&self, position: &Self::Position) -> Vec<Move>;

    /// Plays a move, returning `None` if it is illegal.
    fn apply(&self, position: &Self::Position, mv: &Move) -> Option<Self::Position>;

    /// Returns the outcome if the game is over, otherwise `None`.
    fn is_terminal(&self, position: &Self::Position) -> Option<Outcome>;

    /// Renders a legal move for the game record. Defaults to the UCI form.
    fn san(&self, position: &Self::Position, mv: &Move) -> String {
        let _ = position;
        mv.to_string()
    }

    /// One-line description of the position for logs.
    fn describe(&self, position: &Self::Position) -> String {
        let _ = position;
        String::new()
    }
}

/// Standard chess rules, delegated to `shakmaty`.
///
/// Draws are declared for stalemate, insufficient material, the fifty-move
/// rule (100 half-moves) and threefold repetition.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

/// A chess position plus the hashes of every position reached since the
/// last pawn move or capture, so repetition can be judged from the snapshot.
#[derive(Debug, Clone)]
pub struct StandardPosition {
    chess: Chess,
    history: Vec<Zobrist64>,
}

impl StandardPosition {
    fn start() -> Self {
        let chess = Chess::default();
        let history = vec![repetition_key(&chess)];
        Self { chess, history }
    }

    /// FEN of the position, en passant square only when a capture is legal.
    pub fn fen(&self) -> String {
        Fen::from_position(self.chess.clone(), EnPassantMode::Legal).to_string()
    }

    /// How many times the current position has occurred in this game.
    pub fn repetitions(&self) -> u32 {
        let current = repetition_key(&self.chess);
        self.history.iter().filter(|&&h| h == current).count() as u32
    }

    fn to_legal_move(&self, mv: &Move) -> Option<shakmaty::Move> {
        let uci: UciMove = mv.as_str().parse().ok()?;
        uci.to_move(&self.chess).ok()
    }
}

impl PartialEq for StandardPosition {
    fn eq(&self, other: &Self) -> bool {
        self.fen() == other.fen()
    }
}

/// Covers placement, side to move, castling rights and a capturable en
/// passant square. Move counters are not part of the key.
fn repetition_key(chess: &Chess) -> Zobrist64 {
    chess.zobrist_hash(EnPassantMode::Legal)
}

impl Rules for StandardRules {
    type Position = StandardPosition;

    fn initial_position(&self) -> StandardPosition {
        StandardPosition::start()
    }

    fn side_to_move(&self, position: &StandardPosition) -> Color {
        match position.chess.turn() {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }

    fn legal_moves(&self, position: &StandardPosition) -> Vec<Move> {
        position
            .chess
            .legal_moves()
            .iter()
            .map(|m| Move::new(m.to_uci(CastlingMode::Standard).to_string()))
            .collect()
    }

    fn apply(&self, position: &StandardPosition, mv: &Move) -> Option<StandardPosition> {
        let m = position.to_legal_move(mv)?;
        let mut chess = position.chess.clone();
        chess.play_unchecked(&m);

        // Nothing before a pawn move or capture can recur.
        let mut history = if chess.halfmoves() == 0 {
            Vec::new()
        } else {
            position.history.clone()
        };
        history.push(repetition_key(&chess));
        Some(StandardPosition { chess, history })
    }

    fn is_terminal(&self, position: &StandardPosition) -> Option<Outcome> {
        let chess = &position.chess;
        if chess.is_checkmate() {
            return Some(match chess.turn() {
                shakmaty::Color::White => Outcome::BlackWins,
                shakmaty::Color::Black => Outcome::WhiteWins,
            });
        }
        if chess.is_stalemate() {
            return Some(Outcome::Draw(DrawReason::Stalemate));
        }
        if chess.is_insufficient_material() {
            return Some(Outcome::Draw(DrawReason::InsufficientMaterial));
        }
        if position.repetitions() >= 3 {
            return Some(Outcome::Draw(DrawReason::ThreefoldRepetition));
        }
        if chess.halfmoves() >= 100 {
            return Some(Outcome::Draw(DrawReason::FiftyMoveRule));
        }
        None
    }

    fn san(&self, position: &StandardPosition, mv: &Move) -> String {
        let Some(m) = position.to_legal_move(mv) else {
            return mv.to_string();
        };
        SanPlus::from_move(position.chess.clone(), &m).to_string()
    }

    fn describe(&self, position: &StandardPosition) -> String {
        position.fen()
    }
}
