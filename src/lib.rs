//! Parley - Language Practice Mediator Library
//!
//! A real-time, bidirectional conversational language-practice server:
//! - WebSocket session orchestration over a publish/subscribe message bus
//! - Live pass-through to a bidirectional audio model, or step-by-step
//!   combined transcribe-and-respond calls
//! - Derived enrichment per turn: transcription, translation, vocabulary
//!   dictionary, phrase chunking, reply hints, and synthesized speech
//! - Voice-activity-based turn detection for unflagged audio streams
//!
//! # Example
//!
//! ```ignore
//! use parley::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     parley::server::start(config).await
//! }
//! ```

// Core modules
pub mod audio;
pub mod cache;
pub mod cli;
pub mod config;
pub mod prompts;
pub mod scenarios;
pub mod types;
pub mod vad;

// Capabilities consumed by the session core
pub mod enrich;
pub mod live;

// The concurrency core and its HTTP surface
pub mod server;
pub mod session;

// Re-export commonly used types for convenience
pub use config::Config;

pub use types::{
    Annotation, Body, DictionaryEntry, Envelope, HintOption, Language, MessageKind, Modality,
    Role, SessionMode,
};

pub use session::{run_session, ChatBus, SessionParams, Subscriber, TypedSocket};

pub use server::{router, ServerState};
