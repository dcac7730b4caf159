//! Shared types used across modules
//!
//! The wire message model (roles, message kinds, the tagged envelope), the
//! closed language table, and the typed request/response shapes returned by
//! the enrichment services.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Sample rate of audio produced by the client (16-bit mono PCM)
pub const CLIENT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio produced by the upstream model (16-bit mono PCM)
pub const SERVER_SAMPLE_RATE: u32 = 24_000;

// ============ Roles and kinds ============

/// Who a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Reserved for `processing` and `error` messages
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// The closed set of message kinds carried on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Initialize,
    Text,
    Audio,
    Transcription,
    Translation,
    Hint,
    Error,
    Processing,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Initialize => "initialize",
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
            MessageKind::Transcription => "transcription",
            MessageKind::Translation => "translation",
            MessageKind::Hint => "hint",
            MessageKind::Error => "error",
            MessageKind::Processing => "processing",
        };
        write!(f, "{}", s)
    }
}

// ============ Envelope ============

/// Base64 (de)serialization for binary audio payloads
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A dictionary entry attached to a transcription or translation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub source_text: String,
    pub translated_text: String,
    #[serde(default)]
    pub reading: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A suggested learner reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintOption {
    pub source_text: String,
    pub translated_text: String,
}

/// The shared shape of transcriptions and translations: source text, its
/// translation, a phrase chunking, and a term dictionary aligned with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub source_text: String,
    pub translated_text: String,
    #[serde(default)]
    pub chunked: Vec<String>,
    #[serde(default)]
    pub dictionary: BTreeMap<String, DictionaryEntry>,
}

impl Annotation {
    /// Annotation carrying only a source text (used for user transcriptions
    /// in step-by-step mode where no breakdown is produced)
    pub fn source_only(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            ..Default::default()
        }
    }
}

/// Kind-specific payload of a wire message, discriminated by `"type"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    /// First message of a session; carries the scenario / system prompt
    Initialize { text: String },
    Text { text: String },
    Audio {
        #[serde(with = "base64_bytes")]
        audio: Vec<u8>,
        mime_type: String,
    },
    Transcription(Annotation),
    Translation(Annotation),
    Hint { hints: Vec<HintOption> },
    Error { text: String },
    Processing { status: String },
}

impl Body {
    pub fn kind(&self) -> MessageKind {
        match self {
            Body::Initialize { .. } => MessageKind::Initialize,
            Body::Text { .. } => MessageKind::Text,
            Body::Audio { .. } => MessageKind::Audio,
            Body::Transcription(_) => MessageKind::Transcription,
            Body::Translation(_) => MessageKind::Translation,
            Body::Hint { .. } => MessageKind::Hint,
            Body::Error { .. } => MessageKind::Error,
            Body::Processing { .. } => MessageKind::Processing,
        }
    }
}

/// Every message on the bus: common fields plus the tagged payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub role: Role,
    /// Wall-clock seconds since the epoch; messages arriving with 0 are
    /// re-stamped when the bus accepts them
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub end_of_turn: bool,
    #[serde(flatten)]
    pub body: Body,
}

pub(crate) fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

impl Envelope {
    pub fn new(role: Role, body: Body) -> Self {
        Self {
            role,
            timestamp: now_secs(),
            end_of_turn: false,
            body,
        }
    }

    pub fn with_end_of_turn(mut self, end_of_turn: bool) -> Self {
        self.end_of_turn = end_of_turn;
        self
    }

    pub fn initialize(text: impl Into<String>) -> Self {
        Self::new(Role::User, Body::Initialize { text: text.into() }).with_end_of_turn(true)
    }

    pub fn text(role: Role, text: impl Into<String>, end_of_turn: bool) -> Self {
        Self::new(role, Body::Text { text: text.into() }).with_end_of_turn(end_of_turn)
    }

    pub fn audio(role: Role, audio: Vec<u8>, mime_type: impl Into<String>, end_of_turn: bool) -> Self {
        Self::new(
            role,
            Body::Audio {
                audio,
                mime_type: mime_type.into(),
            },
        )
        .with_end_of_turn(end_of_turn)
    }

    pub fn transcription(role: Role, annotation: Annotation) -> Self {
        Self::new(role, Body::Transcription(annotation)).with_end_of_turn(true)
    }

    pub fn translation(role: Role, annotation: Annotation) -> Self {
        Self::new(role, Body::Translation(annotation)).with_end_of_turn(true)
    }

    pub fn hint(role: Role, hints: Vec<HintOption>) -> Self {
        Self::new(role, Body::Hint { hints }).with_end_of_turn(true)
    }

    pub fn error(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, Body::Error { text: text.into() }).with_end_of_turn(true)
    }

    pub fn processing(status: impl Into<String>) -> Self {
        Self::new(
            Role::System,
            Body::Processing {
                status: status.into(),
            },
        )
        .with_end_of_turn(true)
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Derived messages are produced by enrichment, never by a peer
    pub fn is_derived(&self) -> bool {
        matches!(
            self.kind(),
            MessageKind::Transcription
                | MessageKind::Translation
                | MessageKind::Hint
                | MessageKind::Error
                | MessageKind::Processing
        )
    }
}

// ============ Languages ============

/// A practice or native language; the set is closed at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// ISO-639-1 abbreviation
    pub abbreviation: String,
    pub name: String,
    /// Locale for the TTS voice, when the language has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_voice_name: Option<String>,
}

impl Language {
    fn with_voice(abbreviation: &str, name: &str, tts_code: &str, tts_voice: &str) -> Self {
        Self {
            abbreviation: abbreviation.to_string(),
            name: name.to_string(),
            tts_language_code: Some(tts_code.to_string()),
            tts_voice_name: Some(tts_voice.to_string()),
        }
    }
}

/// The closed language table, keyed by ISO-639-1 abbreviation
pub static LANGUAGES: Lazy<BTreeMap<&'static str, Language>> = Lazy::new(|| {
    [
        Language::with_voice("en", "English", "en-US", "en-US-Neural2-C"),
        Language::with_voice("ja", "Japanese", "ja-JP", "ja-JP-Neural2-B"),
        Language::with_voice("es", "Spanish", "es-ES", "es-ES-Neural2-A"),
        Language::with_voice("fr", "French", "fr-FR", "fr-FR-Neural2-A"),
        Language::with_voice("de", "German", "de-DE", "de-DE-Neural2-A"),
        Language::with_voice("it", "Italian", "it-IT", "it-IT-Neural2-A"),
        Language::with_voice("zh", "Chinese", "cmn-CN", "cmn-CN-Neural2-A"),
        Language::with_voice("ko", "Korean", "ko-KR", "ko-KR-Neural2-A"),
        Language::with_voice("ru", "Russian", "ru-RU", "ru-RU-Neural2-A"),
        Language::with_voice("pt", "Portuguese", "pt-BR", "pt-BR-Neural2-A"),
        Language::with_voice("ar", "Arabic", "ar-XA", "ar-XA-Neural2-A"),
        Language::with_voice("hi", "Hindi", "hi-IN", "hi-IN-Neural2-A"),
        Language::with_voice("nl", "Dutch", "nl-NL", "nl-NL-Neural2-A"),
        Language::with_voice("pl", "Polish", "pl-PL", "pl-PL-Wavenet-A"),
        Language::with_voice("tr", "Turkish", "tr-TR", "tr-TR-Neural2-A"),
        Language::with_voice("vi", "Vietnamese", "vi-VN", "vi-VN-Neural2-A"),
    ]
    .into_iter()
    .map(|lang| {
        let key: &'static str = Box::leak(lang.abbreviation.clone().into_boxed_str());
        (key, lang)
    })
    .collect()
});

/// Look up a language by its ISO-639-1 abbreviation
pub fn lookup_language(abbreviation: &str) -> Option<&'static Language> {
    LANGUAGES.get(abbreviation)
}

// ============ Session parameters ============

/// Response modality requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Modality::Audio),
            "text" => Ok(Modality::Text),
            other => Err(format!("unsupported modality: {}", other)),
        }
    }
}

/// How the session talks to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Pass-through to a bidirectional live session
    Live,
    /// One combined transcribe-and-respond call per user turn
    Step,
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(SessionMode::Live),
            "step" | "step-by-step" => Ok(SessionMode::Step),
            other => Err(format!("unsupported mode: {}", other)),
        }
    }
}

// ============ Enrichment responses ============

/// Response of the hint service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintResponse {
    pub hints: Vec<HintOption>,
}

/// Response of the combined transcribe-and-respond call (step-by-step mode).
/// `translated_text`, `chunked` and `dictionary` describe `response_text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscribeAndHintResponse {
    #[serde(default)]
    pub transcription: String,
    pub response_text: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub chunked: Vec<String>,
    #[serde(default)]
    pub dictionary: BTreeMap<String, DictionaryEntry>,
    #[serde(default)]
    pub hints: Vec<HintOption>,
}

/// Synthesized speech
#[derive(Debug, Clone, PartialEq)]
pub struct TtsAudio {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Request body of the `/api/translate` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    pub target_language: String,
}

fn default_source_language() -> String {
    "en".to_string()
}
