//! Configuration management
//!
//! Loads server settings from an optional TOML file plus environment
//! overrides. No process-global state: the loaded `Config` is passed by
//! `Arc` through the server state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::SessionMode;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Model assignments for the upstream and enrichment calls
    #[serde(default)]
    pub models: ModelsConfig,
    /// Session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,
    /// API credentials (environment variables override file values)
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Enrichment response cache directory; disabled when unset and no
    /// default cache dir is available
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the built client bundle; served with an index
    /// fallback when present
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

/// Model assignments for the upstream and enrichment calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Bidirectional live-session model
    #[serde(default = "default_live_model")]
    pub live: String,
    /// Audio transcription model
    #[serde(default = "default_transcription_model")]
    pub transcription: String,
    /// Text translation model
    #[serde(default = "default_translation_model")]
    pub translation: String,
    /// Hint generation model
    #[serde(default = "default_hint_model")]
    pub hint: String,
    /// Combined transcribe-and-respond model (step-by-step mode)
    #[serde(default = "default_step_model")]
    pub step: String,
}

fn default_live_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_transcription_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_translation_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_hint_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_step_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            live: default_live_model(),
            transcription: default_transcription_model(),
            translation: default_translation_model(),
            hint: default_hint_model(),
            step: default_step_model(),
        }
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upstream live-session connect budget
    #[serde(default = "default_upstream_connect_ms")]
    pub upstream_connect_ms: u64,
    /// Budget for closing the upstream session during teardown
    #[serde(default = "default_upstream_close_ms")]
    pub upstream_close_ms: u64,
    /// Budget for draining child tasks during teardown
    #[serde(default = "default_task_drain_ms")]
    pub task_drain_ms: u64,
    /// Whether the live-mode enrichment task also transcribes completed
    /// user turns. Off by default: the upstream transcript covers the
    /// user's own audio.
    #[serde(default)]
    pub transcribe_user_audio: bool,
    /// Mode used when the client does not pass one
    #[serde(default = "default_mode")]
    pub default_mode: SessionMode,
    /// Default TTS voice for the live session
    #[serde(default = "default_live_voice")]
    pub live_voice: String,
}

fn default_upstream_connect_ms() -> u64 {
    5_000
}

fn default_upstream_close_ms() -> u64 {
    1_000
}

fn default_task_drain_ms() -> u64 {
    1_000
}

fn default_mode() -> SessionMode {
    SessionMode::Live
}

fn default_live_voice() -> String {
    "Fenrir".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            upstream_connect_ms: default_upstream_connect_ms(),
            upstream_close_ms: default_upstream_close_ms(),
            task_drain_ms: default_task_drain_ms(),
            transcribe_user_audio: false,
            default_mode: default_mode(),
            live_voice: default_live_voice(),
        }
    }
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Generative Language API key (`GEMINI_API_KEY` overrides)
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Cloud TTS API key (`TTS_API_KEY` overrides; falls back to the
    /// Gemini key when unset)
    #[serde(default)]
    pub tts_api_key: Option<String>,
}

impl Config {
    /// Load configuration from the given path, or from
    /// `$PARLEY_CONFIG` / `~/.config/parley/config.toml` when present.
    /// Environment credentials always win over file values.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var("PARLEY_CONFIG")
                .ok()
                .map(PathBuf::from)
                .or_else(|| dirs::config_dir().map(|d| d.join("parley").join("config.toml"))),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", p.display()))?
            }
            _ => Config::default(),
        };

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.credentials.gemini_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("TTS_API_KEY") {
            if !key.is_empty() {
                config.credentials.tts_api_key = Some(key);
            }
        }
        if config.tts_api_key().is_none() {
            config.credentials.tts_api_key = config.credentials.gemini_api_key.clone();
        }

        if config.cache_dir.is_none() {
            config.cache_dir = dirs::cache_dir().map(|d| d.join("parley"));
        }

        Ok(config)
    }

    pub fn gemini_api_key(&self) -> Option<&str> {
        self.credentials.gemini_api_key.as_deref()
    }

    pub fn tts_api_key(&self) -> Option<&str> {
        self.credentials.tts_api_key.as_deref()
    }
}
