//! Enrichment services
//!
//! Thin async callers for the derived-artifact services: transcription,
//! translation, hint generation, the combined transcribe-and-respond call,
//! and speech synthesis. The session core depends only on the [`Enricher`]
//! trait; the production implementation talks to the Generative Language
//! and Cloud TTS REST APIs.

pub mod gemini;
pub mod tts;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Annotation, HintResponse, Language, TranscribeAndHintResponse, TtsAudio};

pub use gemini::GeminiEnricher;

/// A raw audio payload handed to an enrichment call
#[derive(Debug, Clone, Copy)]
pub struct AudioBlob<'a> {
    pub data: &'a [u8],
    pub mime_type: &'a str,
}

/// The enrichment capability consumed by the session core
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Transcribe an audio turn and annotate it with a translation,
    /// phrase chunking, and term dictionary
    async fn transcribe(
        &self,
        audio: AudioBlob<'_>,
        source: &Language,
        target: &Language,
    ) -> Result<Annotation>;

    /// Translate a text turn into the same annotation shape
    async fn translate(
        &self,
        text: &str,
        source: &Language,
        target: &Language,
    ) -> Result<Annotation>;

    /// Generate suggested learner replies from the conversation so far
    async fn hints(
        &self,
        history: &str,
        scenario: &str,
        source: &Language,
        target: &Language,
    ) -> Result<HintResponse>;

    /// One combined call per user turn: transcription, assistant reply,
    /// its annotation, and hints (step-by-step mode)
    async fn transcribe_and_hint(
        &self,
        scenario: &str,
        history: &str,
        audio: Option<AudioBlob<'_>>,
        source: &Language,
        target: &Language,
    ) -> Result<TranscribeAndHintResponse>;

    /// Synthesize speech; `None` when the language has no configured voice
    async fn tts(&self, text: &str, language: &Language) -> Result<Option<TtsAudio>>;
}
