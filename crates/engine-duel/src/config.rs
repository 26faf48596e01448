//! Configuration file loading for engine duels.
//!
//! Engines and match defaults live in `duel.toml`:
//!
//! ```toml
//! output = "games.pgn"
//! site = "raspberry Pi4"
//!
//! [engines.leela]
//! path = "/home/pi/chess/lc0/build/release/lc0"
//! name = "LEELA"
//!
//! [match]
//! games = 4
//! movetime_ms = 1000
//! ```
//!
//! Every key is optional; a missing file yields the defaults.

use crate::controller::{MatchSettings, DEFAULT_MAX_DRAW_REPLAYS};
use crate::engine::{EngineTimeouts, MoveLimit, PlayerSpec};
use crate::session::DEFAULT_MAX_PLIES;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Requested engine was not found in the configuration.
    #[error("Engine not found: {0}")]
    EngineNotFound(String),
    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// A UCI engine known by a short name.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to the engine executable.
    pub path: PathBuf,
    /// Player name for PGN. Defaults to the engine's `id name`.
    #[serde(default)]
    pub name: Option<String>,
    /// Extra command line arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl EngineConfig {
    /// Converts the entry into the player a match is started with.
    ///
    /// # Example
    ///
    /// ```
    /// use engine_duel::config::EngineConfig;
    ///
    /// let entry = EngineConfig {
    ///     path: "/usr/games/stockfish".into(),
    ///     name: Some("STOCKFISH".to_string()),
    ///     args: vec![],
    /// };
    /// assert_eq!(entry.to_player().label(), "STOCKFISH");
    /// ```
    pub fn to_player(&self) -> PlayerSpec {
        PlayerSpec {
            path: self.path.clone(),
            args: self.args.clone(),
            name: self.name.clone(),
        }
    }
}

/// Match defaults, overridable from the command line.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MatchConfig {
    /// Number of games. Defaults to 1.
    pub games: u32,
    /// Per-move time in milliseconds. Defaults to 1000.
    pub movetime_ms: u64,
    /// Replays allowed per drawn game. Defaults to 10.
    pub max_draw_replays: u32,
    /// Plies after which a game is cut off. Defaults to 500.
    pub max_plies: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            games: 1,
            movetime_ms: 1000,
            max_draw_replays: DEFAULT_MAX_DRAW_REPLAYS,
            max_plies: DEFAULT_MAX_PLIES,
        }
    }
}

/// Protocol timeouts in milliseconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub handshake_ms: u64,
    /// Added to the move time before a silent engine is given up on.
    /// Must be positive.
    pub move_margin_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_ms: 10_000,
            move_margin_ms: 5_000,
            shutdown_grace_ms: 1_000,
        }
    }
}

impl TimeoutConfig {
    /// Converts the millisecond settings into engine timeouts.
    pub fn to_timeouts(&self) -> EngineTimeouts {
        EngineTimeouts {
            handshake: Duration::from_millis(self.handshake_ms),
            move_margin: Duration::from_millis(self.move_margin_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

/// Main configuration structure.
///
/// Uses `duel.toml` in the current directory by default.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct DuelConfig {
    /// PGN output file. Defaults to a timestamped name.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// PGN `Event` tag. Defaults to a description of the move time.
    #[serde(default)]
    pub event: Option<String>,
    /// PGN `Site` tag.
    #[serde(default)]
    pub site: Option<String>,
    /// Map of engine names to their configurations.
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,
    #[serde(default, rename = "match")]
    pub match_: MatchConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl DuelConfig {
    /// Loads the configuration from `path`, or the defaults if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default path of the configuration file.
    pub fn config_path() -> PathBuf {
        PathBuf::from("duel.toml")
    }

    /// Retrieves an engine configuration by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EngineNotFound`] if no engine has that name.
    pub fn engine(&self, name: &str) -> Result<&EngineConfig, ConfigError> {
        self.engines
            .get(name)
            .ok_or_else(|| ConfigError::EngineNotFound(name.to_string()))
    }

    /// Resolves a player: a configured engine name, else an executable path.
    pub fn player(&self, name_or_path: &str) -> PlayerSpec {
        self.engine(name_or_path)
            .map(EngineConfig::to_player)
            .unwrap_or_else(|_| PlayerSpec::new(name_or_path))
    }

    /// Rejects values that would make a match meaningless or unbounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_.games == 0 {
            return Err(ConfigError::Invalid("match.games must be at least 1".into()));
        }
        if self.match_.movetime_ms == 0 {
            return Err(ConfigError::Invalid(
                "match.movetime_ms must be positive".into(),
            ));
        }
        if self.match_.max_plies == 0 {
            return Err(ConfigError::Invalid(
                "match.max_plies must be at least 1".into(),
            ));
        }
        if self.timeouts.move_margin_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.move_margin_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Builds the settings for a match between two players.
    pub fn match_settings(&self, white: PlayerSpec, black: PlayerSpec) -> MatchSettings {
        let limit = MoveLimit::from_millis(self.match_.movetime_ms);
        let output = self.output.clone().unwrap_or_else(default_output);
        let event = self
            .event
            .clone()
            .unwrap_or_else(|| format!("chess engines playing with limit: {}", limit));

        MatchSettings {
            white,
            black,
            limit,
            total_games: self.match_.games,
            max_draw_replays: self.match_.max_draw_replays,
            max_plies: self.match_.max_plies,
            event: Some(event),
            site: self.site.clone(),
            output,
        }
    }
}

/// `chess_games_<YYYYmmddHHMMSS>.pgn` in the current directory.
pub fn default_output() -> PathBuf {
    PathBuf::from(format!(
        "chess_games_{}.pgn",
        Local::now().format("%Y%m%d%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
output = "games.pgn"
event = "Pi duel"
site = "raspberry Pi4"

[engines.leela]
path = "/home/pi/chess/lc0/build/release/lc0"
name = "LEELA"

[engines.stockfish]
path = "/usr/games/stockfish"
args = ["--threads", "2"]

[match]
games = 4
movetime_ms = 250
max_draw_replays = 3
max_plies = 300

[timeouts]
handshake_ms = 2000
move_margin_ms = 100
shutdown_grace_ms = 50
"#;

        let config: DuelConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.output, Some(PathBuf::from("games.pgn")));
        assert_eq!(config.engines.len(), 2);

        let leela = config.engine("leela").unwrap();
        assert_eq!(leela.name.as_deref(), Some("LEELA"));
        let stockfish = config.engine("stockfish").unwrap();
        assert_eq!(stockfish.name, None);
        assert_eq!(stockfish.args, vec!["--threads", "2"]);

        assert_eq!(config.match_.games, 4);
        assert_eq!(config.match_.max_plies, 300);
        assert_eq!(
            config.timeouts.to_timeouts(),
            EngineTimeouts {
                handshake: Duration::from_millis(2000),
                move_margin: Duration::from_millis(100),
                shutdown_grace: Duration::from_millis(50),
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: DuelConfig = toml::from_str("").unwrap();
        assert!(config.engines.is_empty());
        assert_eq!(config.match_, MatchConfig::default());
        assert_eq!(config.match_.games, 1);
        assert_eq!(config.match_.movetime_ms, 1000);
        assert_eq!(config.match_.max_draw_replays, 10);
        assert_eq!(config.timeouts.to_timeouts(), EngineTimeouts::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_match_table_keeps_other_defaults() {
        let config: DuelConfig = toml::from_str("[match]\ngames = 7\n").unwrap();
        assert_eq!(config.match_.games, 7);
        assert_eq!(config.match_.movetime_ms, 1000);
        assert_eq!(config.match_.max_plies, 500);
    }

    #[test]
    fn test_engine_not_found() {
        let config = DuelConfig::default();
        match config.engine("nonexistent") {
            Err(ConfigError::EngineNotFound(name)) => assert_eq!(name, "nonexistent"),
            other => panic!("Expected EngineNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_player_falls_back_to_path() {
        let config: DuelConfig = toml::from_str(
            r#"
[engines.sf]
path = "/usr/games/stockfish"
name = "STOCKFISH"
"#,
        )
        .unwrap();

        let sf = config.player("sf");
        assert_eq!(sf.path, PathBuf::from("/usr/games/stockfish"));
        assert_eq!(sf.name.as_deref(), Some("STOCKFISH"));

        let raw = config.player("./my-engine");
        assert_eq!(raw, PlayerSpec::new("./my-engine"));
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let mut config = DuelConfig::default();
        config.match_.games = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DuelConfig::default();
        config.match_.movetime_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: DuelConfig = toml::from_str("[match]\nmax_plies = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_plies"));

        let mut config = DuelConfig::default();
        config.timeouts.move_margin_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("move_margin_ms"));
    }

    #[test]
    fn test_match_settings_defaults() {
        let config = DuelConfig::default();
        let settings =
            config.match_settings(PlayerSpec::new("/a"), PlayerSpec::new("/b"));

        assert_eq!(settings.total_games, 1);
        assert_eq!(settings.limit, MoveLimit::from_millis(1000));
        assert_eq!(
            settings.event.as_deref(),
            Some("chess engines playing with limit: 1")
        );
        assert_eq!(settings.site, None);
        let name = settings.output.display().to_string();
        assert!(name.starts_with("chess_games_") && name.ends_with(".pgn"));
        assert_eq!(name.len(), "chess_games_".len() + 14 + ".pgn".len());
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DuelConfig::load(dir.path().join("duel.toml")).unwrap();
        assert_eq!(config, DuelConfig::default());
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.toml");
        std::fs::write(&path, "[match]\ngames = \"many\"\n").unwrap();
        assert!(matches!(
            DuelConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = DuelConfig::default();
        config.engines.insert(
            "leela".to_string(),
            EngineConfig {
                path: PathBuf::from("/opt/lc0"),
                name: Some("LEELA".to_string()),
                args: vec![],
            },
        );
        config.match_.games = 3;

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: DuelConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_path() {
        assert_eq!(DuelConfig::config_path(), PathBuf::from("duel.toml"));
    }
}
