//! CLI interface for parley

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Real-time conversational language-practice server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file (defaults to $PARLEY_CONFIG or the
    /// platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the practice server (the default)
    Serve {
        /// Listen host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the scenario catalog
    Scenarios,
    /// Print the supported languages
    Languages,
}
