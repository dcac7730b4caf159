//! Upstream live-session capability
//!
//! The session core talks to the bidirectional streaming model through the
//! narrow seams in this module: a connector that opens sessions, a sender
//! half for forwarding user input, and a receiver half yielding the
//! assistant's streamed audio/text with a turn-complete indicator. The
//! production implementation lives in [`gemini`].

pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Modality;

pub use gemini::GeminiLive;

/// Parameters for opening a live session
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub model: String,
    /// Scenario / system prompt injected at connect time, when any
    pub system_instruction: Option<String>,
    pub response_modality: Modality,
    /// Prebuilt voice for audio responses
    pub voice: Option<String>,
}

/// One item from the upstream stream: audio and/or text, plus whether the
/// assistant's turn is complete
#[derive(Debug, Clone, Default)]
pub struct LiveEvent {
    pub audio: Option<Vec<u8>>,
    pub text: Option<String>,
    pub turn_complete: bool,
}

/// Write half of a live session; shared by the upstream writer subscriber
/// and the orchestrator (which owns close)
#[async_trait]
pub trait LiveSender: Send + Sync {
    /// Send a text input, optionally completing the user's turn
    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<()>;

    /// Stream a realtime audio chunk
    async fn send_audio(&self, data: &[u8], mime_type: &str) -> Result<()>;

    /// Close the session; idempotent
    async fn close(&self) -> Result<()>;
}

/// Read half of a live session; owned by the upstream reader subscriber
#[async_trait]
pub trait LiveReceiver: Send {
    /// Next stream item; `None` when the upstream closed
    async fn receive(&mut self) -> Result<Option<LiveEvent>>;
}

/// An open live session, split into its two halves
pub struct LiveSession {
    pub sender: std::sync::Arc<dyn LiveSender>,
    pub receiver: Box<dyn LiveReceiver>,
}

/// Opens live sessions; the orchestrator applies the connect budget
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, config: LiveConfig) -> Result<LiveSession>;
}
