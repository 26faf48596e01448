//! Stand-ins for engines and rules used across the unit tests.

use crate::engine::{Engine, EngineError, Launcher, MoveLimit, PlayerSpec};
use crate::record::{Color, Move};
use crate::rules::{Outcome, Rules};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::Span;

/// Moves [`ScriptedRules`] accepts in every position.
pub const LEGAL: [&str; 2] = ["a2a3", "a7a6"];

/// Rules where any move in [`LEGAL`] is playable and every game ends after a
/// fixed number of plies with a scripted outcome.
pub struct ScriptedRules {
    game_length: u32,
    /// Outcome per game; the last entry repeats. `None` never terminates.
    outcomes: Vec<Option<Outcome>>,
    games: Cell<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPosition {
    game: usize,
    ply: u32,
}

impl ScriptedRules {
    pub fn always(outcome: Outcome, game_length: u32) -> Self {
        Self::sequence(vec![Some(outcome)], game_length)
    }

    pub fn sequence(outcomes: Vec<Option<Outcome>>, game_length: u32) -> Self {
        assert!(!outcomes.is_empty());
        Self {
            game_length,
            outcomes,
            games: Cell::new(0),
        }
    }

    /// Number of games that asked for an initial position.
    pub fn games_started(&self) -> usize {
        self.games.get()
    }
}

impl Rules for ScriptedRules {
    type Position = ScriptedPosition;

    fn initial_position(&self) -> ScriptedPosition {
        let game = self.games.get();
        self.games.set(game + 1);
        ScriptedPosition { game, ply: 0 }
    }

    fn side_to_move(&self, position: &ScriptedPosition) -> Color {
        if position.ply % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    fn legal_moves(&self, _position: &ScriptedPosition) -> Vec<Move> {
        LEGAL.iter().map(|m| Move::from(*m)).collect()
    }

    fn apply(&self, position: &ScriptedPosition, mv: &Move) -> Option<ScriptedPosition> {
        LEGAL.contains(&mv.as_str()).then(|| ScriptedPosition {
            game: position.game,
            ply: position.ply + 1,
        })
    }

    fn is_terminal(&self, position: &ScriptedPosition) -> Option<Outcome> {
        if position.ply < self.game_length {
            return None;
        }
        let idx = position.game.min(self.outcomes.len() - 1);
        self.outcomes[idx]
    }
}

/// What a scripted engine does when asked for a move.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Play(&'static str),
    Timeout,
    Crash,
}

/// Launch and shutdown counters shared between a launcher and its engines.
#[derive(Debug, Default)]
pub struct LaunchLog {
    pub launched: Cell<u32>,
    pub shut_down: Cell<u32>,
    /// Length of the move history sent with each request, per engine name.
    pub requests: RefCell<Vec<(String, usize)>>,
}

impl LaunchLog {
    /// Every launched engine was shut down exactly once.
    pub fn all_shut_down(&self) -> bool {
        self.launched.get() == self.shut_down.get()
    }
}

pub struct ScriptedEngine {
    name: String,
    replies: VecDeque<Reply>,
    log: Rc<LaunchLog>,
    closed: bool,
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_move(&mut self, moves: &[Move], limit: &MoveLimit) -> Result<Move, EngineError> {
        assert!(!self.closed, "request after shutdown");
        self.log
            .requests
            .borrow_mut()
            .push((self.name.clone(), moves.len()));

        let reply = self.replies.pop_front().unwrap_or(Reply::Play(
            if moves.len() % 2 == 0 { LEGAL[0] } else { LEGAL[1] },
        ));
        match reply {
            Reply::Play(mv) => Ok(Move::from(mv)),
            Reply::Timeout => Err(EngineError::ProtocolTimeout {
                waiting_for: "bestmove",
                after: limit.movetime + Duration::from_millis(1),
            }),
            Reply::Crash => Err(EngineError::Crashed {
                waiting_for: "bestmove",
            }),
        }
    }

    fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.shut_down.set(self.log.shut_down.get() + 1);
        }
    }
}

/// Launches [`ScriptedEngine`]s keyed by the player's path.
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: HashMap<PathBuf, Vec<Reply>>,
    unlaunchable: HashSet<PathBuf>,
    pub log: Rc<LaunchLog>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every engine launched from `path` replays `replies`, then plays the
    /// default legal moves.
    pub fn script(mut self, path: &str, replies: Vec<Reply>) -> Self {
        self.scripts.insert(PathBuf::from(path), replies);
        self
    }

    pub fn unlaunchable(mut self, path: &str) -> Self {
        self.unlaunchable.insert(PathBuf::from(path));
        self
    }
}

impl Launcher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    fn launch(&self, player: &PlayerSpec, _span: Span) -> Result<ScriptedEngine, EngineError> {
        if self.unlaunchable.contains(&player.path) {
            return Err(EngineError::Launch {
                path: player.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        self.log.launched.set(self.log.launched.get() + 1);
        let replies = self
            .scripts
            .get(&player.path)
            .cloned()
            .unwrap_or_default();
        Ok(ScriptedEngine {
            name: format!("{} engine", player.path.display()),
            replies: replies.into(),
            log: Rc::clone(&self.log),
            closed: false,
        })
    }
}

/// Behaviour of a shell-script UCI engine.
#[derive(Debug, Clone, Copy)]
pub enum StubMode {
    /// Answers the n-th `go` with the n-th move, then goes silent.
    Moves(&'static [&'static str]),
    /// Completes the handshake but never answers `go`.
    NeverMoves,
    /// Exits as soon as it receives `go`.
    ExitOnGo,
    /// Never answers `uci`.
    NoHandshake,
    /// Plays nothing and keeps running after `quit`.
    IgnoresQuit,
    /// Answers `go` with a `bestmove` line that carries no move.
    BareBestMove,
    /// Exits as soon as it receives `uci`.
    ExitOnUci,
}

/// Writes a `/bin/sh` UCI engine into `dir` and returns how to start it.
pub fn stub_engine(dir: &Path, name: &str, mode: StubMode) -> PlayerSpec {
    let on_uci = match mode {
        StubMode::NoHandshake => ":".to_string(),
        StubMode::ExitOnUci => "exit 1".to_string(),
        _ => format!(
            "echo \"id name {}\"; echo \"id author test suite\"; echo uciok",
            name
        ),
    };
    let on_go = match mode {
        StubMode::Moves(moves) => {
            let mut arms = String::new();
            for (i, mv) in moves.iter().enumerate() {
                arms.push_str(&format!(
                    "        {}) echo \"info depth 1 score cp 0 pv {mv}\"; echo \"bestmove {mv}\" ;;\n",
                    i + 1,
                    mv = mv
                ));
            }
            format!("n=$((n+1))\n      case $n in\n{}      esac", arms)
        }
        StubMode::ExitOnGo => "exit 3".to_string(),
        StubMode::BareBestMove => "echo bestmove".to_string(),
        _ => ":".to_string(),
    };
    let on_quit = match mode {
        StubMode::IgnoresQuit => ":",
        _ => "exit 0",
    };

    let file_name = stub_file_name(name);
    let pid_file = dir.join(format!("{}.pid", file_name));
    let script = format!(
        "echo $$ > '{}'\n\
         n=0\n\
         while IFS= read -r line; do\n  \
           case \"$line\" in\n    \
             uci) {} ;;\n    \
             isready) echo readyok ;;\n    \
             go*) {} ;;\n    \
             quit) {} ;;\n  \
           esac\n\
         done\n",
        pid_file.display(),
        on_uci,
        on_go,
        on_quit
    );

    let path = dir.join(format!("{}.sh", file_name));
    std::fs::write(&path, script).expect("write stub engine");

    PlayerSpec::new("/bin/sh").with_args(vec![path.display().to_string()])
}

/// Process id a stub engine recorded when it started.
pub fn stub_pid(dir: &Path, name: &str) -> u32 {
    let pid_file = dir.join(format!("{}.pid", stub_file_name(name)));
    std::fs::read_to_string(pid_file)
        .expect("stub engine wrote its pid")
        .trim()
        .parse()
        .expect("pid is numeric")
}

fn stub_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
