use anyhow::Context;
use clap::{Parser, Subcommand};
use engine_duel::config::DuelConfig;
use engine_duel::controller::{MatchController, MatchReport};
use engine_duel::engine::{MoveLimit, ProcessLauncher};
use engine_duel::rules::StandardRules;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "engine-duel")]
#[command(about = "Plays chess games between two UCI engines and records them as PGN")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value_os_t = DuelConfig::config_path())]
    config: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a match between two engines
    Match {
        /// White engine: configured name or executable path
        white: String,
        /// Black engine: configured name or executable path
        black: String,
        /// Number of games to play
        #[arg(short, long)]
        games: Option<u32>,
        /// Time per move in milliseconds
        #[arg(short = 't', long)]
        movetime: Option<u64>,
        /// PGN file to append games to
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replays allowed per drawn game
        #[arg(long)]
        max_draw_replays: Option<u32>,
    },
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn print_summary(report: &MatchReport) {
    for game in &report.games {
        println!(
            "Game {}: {} ({} moves, {} draw replays){}",
            game.round,
            game.record.result,
            game.record.ply_count(),
            game.draw_replays,
            if game.saved { "" } else { " [not saved]" }
        );
    }
    println!(
        "\nSession Results: W:{} D:{} L:{} A:{}",
        report.white_wins, report.draws, report.black_wins, report.aborted
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut config = DuelConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Match {
            white,
            black,
            games,
            movetime,
            output,
            max_draw_replays,
        } => {
            if let Some(games) = games {
                config.match_.games = games;
            }
            if let Some(movetime) = movetime {
                config.match_.movetime_ms = movetime;
            }
            if let Some(replays) = max_draw_replays {
                config.match_.max_draw_replays = replays;
            }
            if output.is_some() {
                config.output = output;
            }
            config.validate()?;

            let settings = config.match_settings(config.player(&white), config.player(&black));
            println!(
                "Running {} games: {} vs {} at {}s per move -> {}",
                settings.total_games,
                settings.white.label(),
                settings.black.label(),
                MoveLimit::from_millis(config.match_.movetime_ms),
                settings.output.display()
            );

            let launcher = ProcessLauncher::new(config.timeouts.to_timeouts());
            let span = tracing::info_span!("match", white = %white, black = %black);
            let report = MatchController::new(&StandardRules, &launcher)
                .in_span(span)
                .run_match(&settings);

            print_summary(&report);
            if report.unsaved() > 0 {
                eprintln!(
                    "Warning: {} game(s) could not be written to {}",
                    report.unsaved(),
                    settings.output.display()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_parses_match_command_with_defaults() {
        let cli = parse(&["engine-duel", "match", "leela", "stockfish"]);
        assert_eq!(cli.config, DuelConfig::config_path());
        assert!(cli.log_file.is_none());

        match cli.command {
            Commands::Match {
                white,
                black,
                games,
                movetime,
                output,
                max_draw_replays,
            } => {
                assert_eq!(white, "leela");
                assert_eq!(black, "stockfish");
                assert!(games.is_none());
                assert!(movetime.is_none());
                assert!(output.is_none());
                assert!(max_draw_replays.is_none());
            }
        }
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = parse(&[
            "engine-duel",
            "match",
            "/usr/games/stockfish",
            "./lc0",
            "-g",
            "6",
            "-t",
            "250",
            "-o",
            "out.pgn",
            "--max-draw-replays",
            "2",
            "--log-file",
            "chess.log",
        ]);
        assert_eq!(cli.log_file, Some(PathBuf::from("chess.log")));

        match cli.command {
            Commands::Match {
                games,
                movetime,
                output,
                max_draw_replays,
                ..
            } => {
                assert_eq!(games, Some(6));
                assert_eq!(movetime, Some(250));
                assert_eq!(output, Some(PathBuf::from("out.pgn")));
                assert_eq!(max_draw_replays, Some(2));
            }
        }
    }

    #[test]
    fn test_cli_requires_both_engines() {
        assert!(Cli::try_parse_from(["engine-duel", "match", "leela"]).is_err());
    }

    #[test]
    fn test_cli_rejects_non_numeric_games() {
        assert!(Cli::try_parse_from(["engine-duel", "match", "a", "b", "-g", "many"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
