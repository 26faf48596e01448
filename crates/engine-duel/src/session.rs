//! One game between two engines.
//!
//! A [`GameSession`] launches both engines, asks them for moves in turn,
//! checks every move with the [`Rules`] and builds the [`GameRecord`]. It
//! never returns an error: a misbehaving engine aborts the game and the
//! record says who is to blame.
//!
//! The session is a small state machine:
//!
//! ```text
//! Init -> InProgress -> Over(Finished | Unterminated | Aborted)
//! ```
//!
//! Each call to [`GameSession::run`] plays exactly one game. Both engines are
//! shut down before it returns, whatever the outcome.

use crate::engine::{Engine, EngineError, Launcher, MoveLimit, PlayerSpec};
use crate::record::{
    AbortKind, AbortReason, Color, GameRecord, GameResult, GameTags, Move, RecordedMove,
};
use crate::rules::Rules;
use thiserror::Error;
use tracing::{info, info_span, warn, Span};

/// Plies after which a game still running is recorded as unterminated.
pub const DEFAULT_MAX_PLIES: usize = 500;

/// Why a game had to be abandoned. Only lives inside the session; callers
/// see it as an [`AbortReason`] on the record.
#[derive(Error, Debug)]
enum SessionError {
    #[error("{side} engine failed: {source}")]
    Engine {
        side: Color,
        #[source]
        source: EngineError,
    },
    #[error("{side} played illegal move {mv}")]
    IllegalMove { side: Color, mv: Move },
}

impl SessionError {
    fn side(&self) -> Color {
        match self {
            SessionError::Engine { side, .. } | SessionError::IllegalMove { side, .. } => *side,
        }
    }

    fn kind(&self) -> AbortKind {
        match self {
            SessionError::Engine { source, .. } => match source {
                EngineError::Launch { .. } => AbortKind::Launch,
                EngineError::ProtocolTimeout { .. } => AbortKind::ProtocolTimeout,
                EngineError::Crashed { .. } => AbortKind::EngineCrashed,
                EngineError::InvalidResponse(_) => AbortKind::ProtocolViolation,
            },
            SessionError::IllegalMove { .. } => AbortKind::IllegalMove,
        }
    }

    fn detail(&self) -> String {
        match self {
            SessionError::Engine { source, .. } => source.to_string(),
            SessionError::IllegalMove { mv, .. } => mv.to_string(),
        }
    }
}

/// Both engines of a running game. Dropping the seats shuts both down.
struct Seats<E: Engine> {
    white: E,
    black: E,
}

impl<E: Engine> Seats<E> {
    fn get_mut(&mut self, side: Color) -> &mut E {
        match side {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    fn shutdown(&mut self) {
        self.white.shutdown();
        self.black.shutdown();
    }
}

impl<E: Engine> Drop for Seats<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum State<E: Engine, P> {
    Init,
    InProgress { seats: Seats<E>, position: P },
    Over(GameResult),
}

/// Result of a single ply.
enum Ply<P> {
    Continue(P),
    Over(GameResult),
}

/// Plays one game between `white` and `black`.
pub struct GameSession<'a, R: Rules, L: Launcher> {
    rules: &'a R,
    launcher: &'a L,
    white: &'a PlayerSpec,
    black: &'a PlayerSpec,
    limit: MoveLimit,
    max_plies: usize,
    span: Span,
}

impl<'a, R: Rules, L: Launcher> GameSession<'a, R, L> {
    /// Prepares a game; no engine is started until [`run`](Self::run).
    ///
    /// # Arguments
    ///
    /// * `rules` - Decides legality and the end of the game
    /// * `launcher` - Starts both engines
    /// * `white`, `black` - The players, by color
    /// * `limit` - Time per move for both sides
    pub fn new(
        rules: &'a R,
        launcher: &'a L,
        white: &'a PlayerSpec,
        black: &'a PlayerSpec,
        limit: MoveLimit,
    ) -> Self {
        Self {
            rules,
            launcher,
            white,
            black,
            limit,
            max_plies: DEFAULT_MAX_PLIES,
            span: Span::none(),
        }
    }

    /// Stops the game as unterminated once `max_plies` half-moves were
    /// played without a result.
    pub fn with_max_plies(mut self, max_plies: usize) -> Self {
        self.max_plies = max_plies;
        self
    }

    /// Logs inside `span`; engine spans become its children.
    pub fn in_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Plays the game to the end and returns its record.
    ///
    /// Tags already set in `tags` are kept; missing player names are filled
    /// in from the engines' `id name`.
    pub fn run(self, tags: GameTags) -> GameRecord {
        let span = self.span.clone();
        let _guard = span.enter();

        let mut record = GameRecord::new(tags);
        let mut state = State::Init;
        loop {
            state = match state {
                State::Init => self.start(&mut record),
                State::InProgress { seats, position } => self.step(seats, position, &mut record),
                State::Over(result) => {
                    record.result = result;
                    break;
                }
            };
        }

        match &record.result {
            GameResult::Aborted(reason) => warn!(
                side = %reason.blamed,
                engine = %reason.engine,
                kind = %reason.kind,
                detail = %reason.detail,
                plies = record.ply_count(),
                "game aborted"
            ),
            result => info!(result = %result, plies = record.ply_count(), "game over"),
        }
        record
    }

    fn start(&self, record: &mut GameRecord) -> State<L::Engine, R::Position> {
        let white = match self.launch(Color::White, record) {
            Ok(engine) => engine,
            Err(e) => return State::Over(self.abort(e, record)),
        };
        let black = match self.launch(Color::Black, record) {
            Ok(engine) => engine,
            Err(e) => {
                let mut white = white;
                white.shutdown();
                return State::Over(self.abort(e, record));
            }
        };

        State::InProgress {
            seats: Seats { white, black },
            position: self.rules.initial_position(),
        }
    }

    fn launch(&self, side: Color, record: &mut GameRecord) -> Result<L::Engine, SessionError> {
        let player = self.player(side);
        let span = info_span!(parent: &self.span, "engine", %side, player = %player.label());
        let engine = self
            .launcher
            .launch(player, span)
            .map_err(|source| SessionError::Engine { side, source })?;

        let tag = self.tag_mut(side, record);
        if tag.is_none() {
            *tag = Some(match &player.name {
                Some(name) => name.clone(),
                None if !engine.name().is_empty() => engine.name().to_string(),
                None => player.label(),
            });
        }
        Ok(engine)
    }

    fn step(
        &self,
        mut seats: Seats<L::Engine>,
        position: R::Position,
        record: &mut GameRecord,
    ) -> State<L::Engine, R::Position> {
        match self.play_ply(&mut seats, &position, record) {
            Ok(Ply::Continue(next)) => State::InProgress {
                seats,
                position: next,
            },
            Ok(Ply::Over(result)) => {
                seats.shutdown();
                State::Over(result)
            }
            Err(e) => {
                seats.shutdown();
                State::Over(self.abort(e, record))
            }
        }
    }

    fn play_ply(
        &self,
        seats: &mut Seats<L::Engine>,
        position: &R::Position,
        record: &mut GameRecord,
    ) -> Result<Ply<R::Position>, SessionError> {
        if record.ply_count() >= self.max_plies {
            return Ok(Ply::Over(GameResult::Unterminated));
        }

        let side = self.rules.side_to_move(position);
        let history = record.uci_moves();
        let mv = seats
            .get_mut(side)
            .request_move(&history, &self.limit)
            .map_err(|source| SessionError::Engine { side, source })?;

        if !self.rules.legal_moves(position).contains(&mv) {
            return Err(SessionError::IllegalMove { side, mv });
        }
        let san = self.rules.san(position, &mv);
        let Some(next) = self.rules.apply(position, &mv) else {
            return Err(SessionError::IllegalMove { side, mv });
        };

        info!(
            ply = record.ply_count() + 1,
            %side,
            mv = %mv,
            san = %san,
            position = %self.rules.describe(&next),
            "move"
        );
        record.moves.push(RecordedMove { uci: mv, san });

        Ok(match self.rules.is_terminal(&next) {
            Some(outcome) => Ply::Over(GameResult::Finished(outcome)),
            None => Ply::Continue(next),
        })
    }

    fn abort(&self, error: SessionError, record: &mut GameRecord) -> GameResult {
        let side = error.side();
        let engine = self
            .tag_mut(side, record)
            .get_or_insert_with(|| self.player(side).label())
            .clone();
        GameResult::Aborted(AbortReason {
            blamed: side,
            engine,
            kind: error.kind(),
            detail: error.detail(),
        })
    }

    fn player(&self, side: Color) -> &'a PlayerSpec {
        match side {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    fn tag_mut<'r>(&self, side: Color, record: &'r mut GameRecord) -> &'r mut Option<String> {
        match side {
            Color::White => &mut record.tags.white,
            Color::Black => &mut record.tags.black,
        }
    }
}
