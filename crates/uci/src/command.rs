//! UCI command formatting.

use std::fmt;
use std::time::Duration;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// The next search starts a new game.
    UciNewGame,
    /// Set up the start position plus the moves played so far.
    Position { moves: Vec<String> },
    /// Search for exactly this long (`go movetime <ms>`).
    Go { movetime: Duration },
    /// Quit the engine.
    Quit,
}

impl GuiCommand {
    /// `position startpos moves ...` for a game played from the initial position.
    pub fn startpos<S: AsRef<str>>(moves: &[S]) -> Self {
        GuiCommand::Position {
            moves: moves.iter().map(|m| m.as_ref().to_string()).collect(),
        }
    }

    /// Format the command as the single line written to the engine.
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::Position { moves } if moves.is_empty() => "position startpos".to_string(),
            GuiCommand::Position { moves } => format!("position startpos moves {}", moves.join(" ")),
            GuiCommand::Go { movetime } => format!("go movetime {}", movetime.as_millis()),
            GuiCommand::Quit => "quit".to_string(),
        }
    }
}

impl fmt::Display for GuiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}
