//! Match orchestration: N games between the same two engines.
//!
//! Drawn and unterminated games are replayed from a fresh start, up to
//! [`MatchSettings::max_draw_replays`] times per round, so that each round
//! preferably produces a decisive game. Every finished round is appended to
//! the PGN file immediately.

use crate::engine::{Launcher, MoveLimit, PlayerSpec};
use crate::pgn;
use crate::record::{GameRecord, GameResult, GameTags};
use crate::rules::{Outcome, Rules};
use crate::session::{GameSession, DEFAULT_MAX_PLIES};
use chrono::Local;
use std::path::PathBuf;
use tracing::{error, info, info_span, warn, Span};

/// Default bound on replays of a drawn round.
pub const DEFAULT_MAX_DRAW_REPLAYS: u32 = 10;

/// Everything a match needs, passed in as plain values.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Always plays White.
    pub white: PlayerSpec,
    /// Always plays Black.
    pub black: PlayerSpec,
    pub limit: MoveLimit,
    /// Number of rounds, each producing exactly one written record.
    pub total_games: u32,
    pub max_draw_replays: u32,
    pub max_plies: usize,
    pub event: Option<String>,
    pub site: Option<String>,
    /// PGN file the games are appended to.
    pub output: PathBuf,
}

impl MatchSettings {
    /// One game at one second per move; adjust the public fields for more.
    pub fn new(white: PlayerSpec, black: PlayerSpec, output: impl Into<PathBuf>) -> Self {
        Self {
            white,
            black,
            limit: MoveLimit::from_millis(1000),
            total_games: 1,
            max_draw_replays: DEFAULT_MAX_DRAW_REPLAYS,
            max_plies: DEFAULT_MAX_PLIES,
            event: None,
            site: None,
            output: output.into(),
        }
    }
}

/// One round of the match.
#[derive(Debug, Clone)]
pub struct PlayedGame {
    /// 1-based round number.
    pub round: u32,
    /// The record that was written: the last attempt of the round.
    pub record: GameRecord,
    /// How many times this round was replayed because of a draw.
    pub draw_replays: u32,
    /// Whether the record reached the PGN file.
    pub saved: bool,
}

/// Everything a finished match produced.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub games: Vec<PlayedGame>,
    pub white_wins: u32,
    pub black_wins: u32,
    /// Draws and unterminated games that survived all replays.
    pub draws: u32,
    pub aborted: u32,
}

impl MatchReport {
    fn add(&mut self, game: PlayedGame) {
        match &game.record.result {
            GameResult::Finished(Outcome::WhiteWins) => self.white_wins += 1,
            GameResult::Finished(Outcome::BlackWins) => self.black_wins += 1,
            GameResult::Finished(Outcome::Draw(_)) | GameResult::Unterminated => self.draws += 1,
            GameResult::Aborted(_) => self.aborted += 1,
        }
        self.games.push(game);
    }

    /// Total replays over all rounds.
    pub fn total_draw_replays(&self) -> u32 {
        self.games.iter().map(|g| g.draw_replays).sum()
    }

    /// Rounds whose record could not be written.
    pub fn unsaved(&self) -> usize {
        self.games.iter().filter(|g| !g.saved).count()
    }
}

/// Runs matches with one rules engine and one way of launching engines.
pub struct MatchController<'a, R: Rules, L: Launcher> {
    rules: &'a R,
    launcher: &'a L,
    span: Span,
}

impl<'a, R: Rules, L: Launcher> MatchController<'a, R, L> {
    /// Both references are shared by every game of every match it runs.
    pub fn new(rules: &'a R, launcher: &'a L) -> Self {
        Self {
            rules,
            launcher,
            span: Span::none(),
        }
    }

    /// Game spans become children of `span`.
    pub fn in_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Plays `settings.total_games` rounds. Never fails: aborted games and
    /// write errors are recorded in the report and the match goes on.
    pub fn run_match(&self, settings: &MatchSettings) -> MatchReport {
        let span = self.span.clone();
        let _guard = span.enter();

        info!(
            white = %settings.white.label(),
            black = %settings.black.label(),
            games = settings.total_games,
            movetime = %settings.limit,
            output = %settings.output.display(),
            "match started"
        );

        let mut report = MatchReport::default();
        for round in 1..=settings.total_games {
            info!(round, total_games = settings.total_games, "round started");
            let (record, draw_replays) = self.play_round(settings, round);

            info!(
                round,
                result = %record.result,
                plies = record.ply_count(),
                draw_replays,
                "round finished"
            );

            let saved = match pgn::append_game(&settings.output, &record) {
                Ok(()) => true,
                Err(e) => {
                    error!(
                        round,
                        path = %settings.output.display(),
                        error = %e,
                        "failed to write game record"
                    );
                    false
                }
            };

            report.add(PlayedGame {
                round,
                record,
                draw_replays,
                saved,
            });
        }

        info!(
            white_wins = report.white_wins,
            black_wins = report.black_wins,
            draws = report.draws,
            aborted = report.aborted,
            "match finished"
        );
        report
    }

    /// Plays a round, replaying inconclusive games while replays remain.
    fn play_round(&self, settings: &MatchSettings, round: u32) -> (GameRecord, u32) {
        let mut draw_replays = 0;
        loop {
            let record = self.play_game(settings, round, draw_replays);
            if !record.result.is_inconclusive() {
                return (record, draw_replays);
            }
            if draw_replays >= settings.max_draw_replays {
                warn!(
                    round,
                    draw_replays,
                    result = %record.result,
                    "draw replays exhausted, keeping last game"
                );
                return (record, draw_replays);
            }
            draw_replays += 1;
            info!(
                round,
                draw_replays,
                reason = ?record.result.draw_reason(),
                "replaying drawn game"
            );
        }
    }

    fn play_game(&self, settings: &MatchSettings, round: u32, attempt: u32) -> GameRecord {
        let span = info_span!(parent: &self.span, "game", round, attempt);
        let tags = GameTags {
            event: settings.event.clone(),
            site: settings.site.clone(),
            date: Some(Local::now().date_naive()),
            round: Some(round),
            white: settings.white.name.clone(),
            black: settings.black.name.clone(),
        };

        GameSession::new(
            self.rules,
            self.launcher,
            &settings.white,
            &settings.black,
            settings.limit,
        )
        .with_max_plies(settings.max_plies)
        .in_span(span)
        .run(tags)
    }
}
