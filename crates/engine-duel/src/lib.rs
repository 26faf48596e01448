//! Engine Duel - plays chess games between two UCI engines.
//!
//! A match is a fixed number of rounds between the same two engines with
//! fixed colors. Each round launches fresh engine processes, plays one game
//! under a per-move time limit and appends it to a PGN file. Drawn rounds are
//! replayed a bounded number of times so that most rounds end decisively.
//!
//! - [`engine`]: engine subprocesses and the UCI dialogue
//! - [`rules`]: legality and game termination
//! - [`session`]: a single game
//! - [`controller`]: a match of many games
//! - [`pgn`]: the game record file
//! - [`config`]: `duel.toml`

pub mod config;
pub mod controller;
pub mod engine;
pub mod pgn;
pub mod record;
pub mod rules;
pub mod session;

#[cfg(test)]
mod test_support;
