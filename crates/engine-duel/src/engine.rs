//! UCI engine subprocesses.
//!
//! [`UciEngine`] owns one engine process and its UCI dialogue. Standard output
//! is drained by a reader thread into a channel so that every wait on the
//! engine is bounded: the handshake by [`EngineTimeouts::handshake`], each
//! move request by the move limit plus [`EngineTimeouts::move_margin`].
//!
//! The game session talks to engines through the [`Engine`] and [`Launcher`]
//! traits, which lets tests substitute in-memory players.
//!
//! # Example
//!
//! ```no_run
//! use engine_duel::engine::{Engine, EngineTimeouts, MoveLimit, UciEngine};
//! use std::time::Duration;
//!
//! let mut engine = UciEngine::start(
//!     "/usr/games/stockfish",
//!     &[],
//!     EngineTimeouts::default(),
//!     tracing::Span::none(),
//! )?;
//! let limit = MoveLimit::new(Duration::from_millis(500));
//! let best = engine.request_move(&[], &limit)?;
//! println!("{} plays {}", engine.name(), best);
//! engine.shutdown();
//! # Ok::<(), engine_duel::engine::EngineError>(())
//! ```

use crate::record::Move;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn, Span};
use uci::{EngineMessage, GuiCommand, UciError};

/// Errors that can occur when driving a UCI engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The executable is missing or cannot be run.
    #[error("Failed to launch {}: {source}", .path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The engine did not answer within the allowed time.
    #[error("No {waiting_for} from engine within {after:?}")]
    ProtocolTimeout {
        waiting_for: &'static str,
        after: Duration,
    },
    /// The engine exited or closed its pipes.
    #[error("Engine exited while waiting for {waiting_for}")]
    Crashed { waiting_for: &'static str },
    /// The engine printed a line that breaks the protocol.
    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] UciError),
}

/// Per-move budget applied to both engines for the whole match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveLimit {
    /// Wall clock time per move, sent as `go movetime`.
    pub movetime: Duration,
}

impl MoveLimit {
    /// Creates a limit of `movetime` per move.
    pub fn new(movetime: Duration) -> Self {
        Self { movetime }
    }

    /// Shorthand for [`MoveLimit::new`] in milliseconds.
    ///
    /// # Example
    ///
    /// ```
    /// use engine_duel::engine::MoveLimit;
    ///
    /// let limit = MoveLimit::from_millis(500);
    /// assert_eq!(limit.to_string(), "0.5");
    /// ```
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl fmt::Display for MoveLimit {
    /// Seconds, e.g. `1` or `0.5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.movetime.as_secs_f64())
    }
}

/// Bounds on every blocking wait in the engine dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimeouts {
    /// Whole `uci`/`isready` handshake.
    pub handshake: Duration,
    /// Added to the move limit to form the hard ceiling for `bestmove`.
    pub move_margin: Duration,
    /// Time given to exit voluntarily after `quit` before the process is killed.
    pub shutdown_grace: Duration,
}

/// Smallest margin ever applied on top of the move limit.
const MIN_MOVE_MARGIN: Duration = Duration::from_millis(1);

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            move_margin: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl EngineTimeouts {
    /// Hard ceiling on a move request; always strictly above the limit.
    pub fn move_ceiling(&self, limit: &MoveLimit) -> Duration {
        limit.movetime + self.move_margin.max(MIN_MOVE_MARGIN)
    }
}

/// How to start one of the two players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSpec {
    /// Path to the UCI engine executable.
    pub path: PathBuf,
    /// Extra command line arguments.
    pub args: Vec<String>,
    /// Name written to PGN; the engine's `id name` is used when absent.
    pub name: Option<String>,
}

impl PlayerSpec {
    /// Creates a player started as `path` with no arguments.
    ///
    /// # Arguments
    ///
    /// * `path` - Engine executable, absolute or resolved through `PATH`
    ///
    /// # Example
    ///
    /// ```
    /// use engine_duel::engine::PlayerSpec;
    ///
    /// let player = PlayerSpec::new("/usr/games/stockfish")
    ///     .with_args(vec!["--threads".to_string(), "2".to_string()])
    ///     .with_name("STOCKFISH");
    /// assert_eq!(player.args.len(), 2);
    /// assert_eq!(player.label(), "STOCKFISH");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            name: None,
        }
    }

    /// Overrides the name written to PGN.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the command line arguments passed to the engine.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Identity used in logs: the configured name, else the executable path.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.path.display().to_string(),
        }
    }
}

/// A chess engine that can be asked for moves.
pub trait Engine {
    /// Name the engine reported with `id name` (may be empty).
    fn name(&self) -> &str;

    /// Asks for a move in the position reached by `moves` from the start
    /// position, within `limit`.
    fn request_move(&mut self, moves: &[Move], limit: &MoveLimit) -> Result<Move, EngineError>;

    /// Stops the engine. Safe to call more than once; never fails.
    fn shutdown(&mut self);
}

/// Creates engines for a game session.
pub trait Launcher {
    type Engine: Engine;

    /// Starts the engine described by `player` and completes its handshake.
    /// The engine logs inside `span`.
    fn launch(&self, player: &PlayerSpec, span: Span) -> Result<Self::Engine, EngineError>;
}

/// Launches real engine subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher {
    pub timeouts: EngineTimeouts,
}

impl ProcessLauncher {
    /// Every engine it starts uses `timeouts`.
    pub fn new(timeouts: EngineTimeouts) -> Self {
        Self { timeouts }
    }
}

impl Launcher for ProcessLauncher {
    type Engine = UciEngine;

    fn launch(&self, player: &PlayerSpec, span: Span) -> Result<UciEngine, EngineError> {
        UciEngine::start(&player.path, &player.args, self.timeouts, span)
    }
}

/// A running UCI engine process.
///
/// # Lifecycle
///
/// 1. [`UciEngine::start`] spawns the process and completes the handshake
/// 2. [`Engine::request_move`] is called once per ply
/// 3. [`Engine::shutdown`] sends `quit`, then kills the process if it lingers
///
/// Dropping the engine performs the shutdown if it has not happened yet.
pub struct UciEngine {
    /// The child process handle.
    process: Child,
    /// Handle to write commands to the engine's stdin.
    stdin: ChildStdin,
    /// Lines read from the engine's stdout by the reader thread.
    lines: Receiver<String>,
    /// The engine's name as reported during UCI initialization.
    name: String,
    author: String,
    timeouts: EngineTimeouts,
    span: Span,
    closed: bool,
}

impl UciEngine {
    /// Spawns the engine and runs the `uci` / `isready` / `ucinewgame`
    /// handshake.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Launch`] if the executable is missing or not runnable
    /// - [`EngineError::ProtocolTimeout`] if the handshake outlasts
    ///   [`EngineTimeouts::handshake`]
    /// - [`EngineError::Crashed`] if the engine exits during the handshake
    ///
    /// On error the process has already been terminated.
    pub fn start<P: AsRef<Path>>(
        path: P,
        args: &[String],
        timeouts: EngineTimeouts,
        span: Span,
    ) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let launch_error = |source| EngineError::Launch {
            path: path.to_path_buf(),
            source,
        };

        let mut process = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(launch_error)?;

        let (stdin, stdout) = match (process.stdin.take(), process.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(launch_error(std::io::Error::other(
                    "engine stdio was not captured",
                )));
            }
        };

        let mut engine = Self {
            process,
            stdin,
            lines: spawn_reader(stdout),
            name: String::new(),
            author: String::new(),
            timeouts,
            span,
            closed: false,
        };
        engine.handshake()?;
        Ok(engine)
    }

    /// The engine's author as reported during the handshake.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// True once the process has exited and been reaped.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(Some(_)))
    }

    fn handshake(&mut self) -> Result<(), EngineError> {
        let span = self.span.clone();
        let _guard = span.enter();

        let deadline = Instant::now() + self.timeouts.handshake;
        self.send(&GuiCommand::Uci)?;
        loop {
            match self.next_message("uciok", deadline, self.timeouts.handshake)? {
                EngineMessage::IdName(name) => self.name = name,
                EngineMessage::IdAuthor(author) => self.author = author,
                EngineMessage::UciOk => break,
                _ => {}
            }
        }
        self.sync_ready(deadline)?;

        self.send(&GuiCommand::UciNewGame)?;
        self.sync_ready(Instant::now() + self.timeouts.handshake)?;

        info!(name = %self.name, author = %self.author, pid = self.pid(), "engine ready");
        Ok(())
    }

    fn sync_ready(&mut self, deadline: Instant) -> Result<(), EngineError> {
        self.send(&GuiCommand::IsReady)?;
        while self.next_message("readyok", deadline, self.timeouts.handshake)?
            != EngineMessage::ReadyOk
        {}
        Ok(())
    }

    /// Writes one command line and flushes it immediately.
    fn send(&mut self, cmd: &GuiCommand) -> Result<(), EngineError> {
        let line = cmd.to_uci();
        trace!(">> {}", line);
        writeln!(self.stdin, "{}", line)
            .and_then(|_| self.stdin.flush())
            .map_err(|e| {
                debug!(error = %e, "write to engine failed");
                EngineError::Crashed {
                    waiting_for: "command delivery",
                }
            })
    }

    /// Waits for the next line until `deadline`; `budget` is only reported.
    fn next_message(
        &mut self,
        waiting_for: &'static str,
        deadline: Instant,
        budget: Duration,
    ) -> Result<EngineMessage, EngineError> {
        let timeout = EngineError::ProtocolTimeout {
            waiting_for,
            after: budget,
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timeout);
        }

        match self.lines.recv_timeout(remaining) {
            Ok(line) => {
                trace!("<< {}", line);
                Ok(EngineMessage::parse(&line)?)
            }
            Err(RecvTimeoutError::Timeout) => Err(timeout),
            Err(RecvTimeoutError::Disconnected) => {
                if let Ok(Some(status)) = self.process.try_wait() {
                    warn!(%status, "engine exited");
                }
                Err(EngineError::Crashed { waiting_for })
            }
        }
    }
}

impl Engine for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_move(&mut self, moves: &[Move], limit: &MoveLimit) -> Result<Move, EngineError> {
        let span = self.span.clone();
        let _guard = span.enter();

        self.send(&GuiCommand::startpos(moves))?;
        self.send(&GuiCommand::Go {
            movetime: limit.movetime,
        })?;

        let ceiling = self.timeouts.move_ceiling(limit);
        let deadline = Instant::now() + ceiling;
        loop {
            match self.next_message("bestmove", deadline, ceiling)? {
                EngineMessage::BestMove { mv, .. } => {
                    if EngineMessage::is_null_move(&mv) {
                        info!(mv = %mv, "engine reports no move");
                    }
                    return Ok(Move::new(mv));
                }
                EngineMessage::Info(info) => debug!(
                    depth = ?info.depth,
                    score = ?info.score,
                    nodes = ?info.nodes,
                    pv = %info.pv.join(" "),
                    "search info"
                ),
                _ => {}
            }
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        let span = self.span.clone();
        let _guard = span.enter();

        let _ = self.send(&GuiCommand::Quit);
        self.closed = true;

        let deadline = Instant::now() + self.timeouts.shutdown_grace;
        loop {
            match self.process.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "engine exited after quit");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "could not poll engine process");
                    break;
                }
            }
        }

        warn!(pid = self.pid(), "engine ignored quit, killing it");
        if let Err(e) = self.process.kill() {
            debug!(error = %e, "kill failed");
        }
        let _ = self.process.wait();
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forwards stdout lines until the pipe closes or the receiver goes away.
fn spawn_reader(stdout: ChildStdout) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
