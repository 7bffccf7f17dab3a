//! CLI interface for trend-pullback
//!
//! Provides subcommands for:
//! - `run`: Start the paper-trading loop
//! - `replay`: Replay stored candles through the engine
//! - `config`: Show the effective configuration

mod replay;
mod run;

pub use replay::ReplayArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "trend-pullback")]
#[command(about = "Paper-trading decision engine for a long-only trend-pullback strategy")]
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
    /// Start paper trading
    Run(RunArgs),
    /// Replay candle files and report results
    Replay(ReplayArgs),
    /// Show the effective configuration
    Config,
}
