//! Arcade CLI
//!
//! Headless front-end for the outcome engines: run seeded simulations and
//! check configuration files.

use arcade::{
    config::ConfigLoader,
    errors::ArcadeResult,
    simulation::{SimulationOptions, Simulator},
    ArcadeConfig, GameType,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "arcade")]
#[command(about = "Game outcome simulation engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play N rounds of a game on a virtual clock and report the results
    Simulate {
        /// crash, color or tictactoe
        #[arg(short, long)]
        game: GameType,

        /// Rounds to play
        #[arg(short, long, default_value = "1000")]
        rounds: usize,

        /// Seed for the engine and the simulated player
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Stake per round (defaults to the configured default wager)
        #[arg(short, long)]
        wager: Option<f64>,

        /// Auto-cashout target for crash
        #[arg(long, default_value = "2.0")]
        crash_target: f64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load, override and validate a configuration, then print it
    CheckConfig,
}

fn main() -> ArcadeResult<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Simulate {
            game,
            rounds,
            seed,
            wager,
            crash_target,
            json,
        } => {
            let options = SimulationOptions {
                wager: wager.unwrap_or(config.wager.default_amount),
                crash_target,
                ..SimulationOptions::new(game, rounds, seed)
            };
            let report = Simulator::new(config).run(&options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Commands::CheckConfig => {
            info!("Configuration is valid");
            print!("{}", toml::to_string_pretty(&config).map_err(|e| {
                arcade::errors::ConfigurationError::LoadFailed(e.to_string())
            })?);
        }
    }

    Ok(())
}

fn init_tracing(config: &ArcadeConfig, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else {
        config.monitoring.log_level.as_filter()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("arcade={}", default_level).into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
