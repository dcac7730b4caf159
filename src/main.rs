//! Parley - language practice server
//!
//! Mediates between a browser client and a live multimodal model, producing
//! transcriptions, translations, and reply hints alongside the conversation.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley::cli::{Cli, Command};
use parley::config::Config;
use parley::scenarios::list_chapters;
use parley::types::LANGUAGES;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        None | Some(Command::Serve { host: None, port: None }) => {
            parley::server::start(config).await
        }
        Some(Command::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            parley::server::start(config).await
        }
        Some(Command::Scenarios) => {
            for chapter in list_chapters() {
                println!("{} - {}", chapter.title, chapter.description);
                for scenario in &chapter.conversations {
                    println!("  {:<24} {}", scenario.id, scenario.title);
                }
            }
            Ok(())
        }
        Some(Command::Languages) => {
            for language in LANGUAGES.values() {
                let tts = if language.tts_voice_name.is_some() {
                    "tts"
                } else {
                    "no tts"
                };
                println!("{:<4} {:<12} ({})", language.abbreviation, language.name, tts);
            }
            Ok(())
        }
    }
}
