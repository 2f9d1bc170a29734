//! CLI interface for predictor-engine
//!
//! Provides subcommands for:
//! - `run`: Run prediction rounds on the live feed
//! - `leaderboard`: Show top persisted players
//! - `compact`: Compact the session ledger
//! - `config`: Show the effective configuration

mod compact;
mod leaderboard;
mod run;

pub use compact::CompactArgs;
pub use leaderboard::{shorten_wallet, LeaderboardArgs};
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "predictor")]
#[command(about = "Timed up/down prediction rounds on a live BTC price feed")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run rounds until interrupted
    Run(RunArgs),
    /// Show top players from the ledger
    Leaderboard(LeaderboardArgs),
    /// Drop session records past retention
    Compact(CompactArgs),
    /// Show the effective configuration
    Config,
}
