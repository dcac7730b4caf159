//! Generative Language API client
//!
//! Request/response enrichment calls against `models/{model}:generateContent`
//! with a JSON response mime, plus the typed wire structs. Translation
//! responses are cached on disk; audio transcription is not (turn audio is
//! never identical).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::pcm_to_wav;
use crate::cache::FileCache;
use crate::config::ModelsConfig;
use crate::prompts;
use crate::types::{Annotation, HintResponse, Language, TranscribeAndHintResponse, TtsAudio};

use super::{tts, AudioBlob, Enricher};

const GENERATE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Enricher backed by the Generative Language and Cloud TTS REST APIs
pub struct GeminiEnricher {
    http: Client,
    api_key: String,
    tts_api_key: String,
    models: ModelsConfig,
    cache: Option<FileCache>,
}

impl GeminiEnricher {
    pub fn new(
        api_key: impl Into<String>,
        tts_api_key: impl Into<String>,
        models: ModelsConfig,
        cache: Option<FileCache>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            tts_api_key: tts_api_key.into(),
            models,
            cache,
        }
    }

    /// Issue a `generateContent` call and parse the JSON text of the first
    /// candidate into `T`
    async fn generate_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system_instruction: Option<String>,
        parts: Vec<Part>,
    ) -> Result<T> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: system_instruction.map(|text| Content {
                role: None,
                parts: vec![Part::text(text)],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!("{}/models/{}:generateContent", GENERATE_BASE_URL, model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("sending generateContent request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("generateContent failed ({}): {}", status, body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("decoding generateContent response")?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("generateContent returned no text candidate"))?;

        serde_json::from_str(&text)
            .with_context(|| format!("model returned malformed JSON: {}", text))
    }
}

#[async_trait]
impl Enricher for GeminiEnricher {
    async fn transcribe(
        &self,
        audio: AudioBlob<'_>,
        source: &Language,
        target: &Language,
    ) -> Result<Annotation> {
        let wav = pcm_to_wav(audio.data, audio.mime_type).context("containering turn audio")?;
        debug!(
            bytes = wav.len(),
            model = %self.models.transcription,
            "transcribing audio turn"
        );
        self.generate_json(
            &self.models.transcription,
            None,
            vec![
                Part::text(prompts::transcription_prompt(source, target)),
                Part::inline_data("audio/wav", &wav),
            ],
        )
        .await
    }

    async fn translate(
        &self,
        text: &str,
        source: &Language,
        target: &Language,
    ) -> Result<Annotation> {
        let cache_key = format!(
            "translate:{}:{}:{}:{}",
            self.models.translation, source.abbreviation, target.abbreviation, text
        );
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            return Ok(cached);
        }

        let annotation: Annotation = self
            .generate_json(
                &self.models.translation,
                Some(prompts::translation_system_prompt(target)),
                vec![Part::text(prompts::translation_prompt(source, target, text))],
            )
            .await?;

        if let Some(cache) = &self.cache {
            cache.put(&cache_key, &annotation);
        }
        Ok(annotation)
    }

    async fn hints(
        &self,
        history: &str,
        scenario: &str,
        source: &Language,
        target: &Language,
    ) -> Result<HintResponse> {
        self.generate_json(
            &self.models.hint,
            None,
            vec![Part::text(prompts::hint_prompt(scenario, history, source, target))],
        )
        .await
    }

    async fn transcribe_and_hint(
        &self,
        scenario: &str,
        history: &str,
        audio: Option<AudioBlob<'_>>,
        source: &Language,
        target: &Language,
    ) -> Result<TranscribeAndHintResponse> {
        let mut parts = vec![
            Part::text(format!("<SCENARIO>\n{}\n</SCENARIO>", scenario)),
            Part::text(format!("<HISTORY>\n{}\n</HISTORY>", history)),
        ];
        if let Some(blob) = audio {
            let wav = pcm_to_wav(blob.data, blob.mime_type).context("containering turn audio")?;
            parts.push(Part::inline_data("audio/wav", &wav));
        }

        self.generate_json(
            &self.models.step,
            Some(prompts::transcribe_and_hint_prompt(source, target)),
            parts,
        )
        .await
    }

    async fn tts(&self, text: &str, language: &Language) -> Result<Option<TtsAudio>> {
        tts::synthesize(
            &self.http,
            &self.tts_api_key,
            text,
            language,
            self.cache.as_ref(),
        )
        .await
        .map_err(|err| {
            warn!(%err, language = %language.abbreviation, "speech synthesis failed");
            err
        })
    }
}

// ============ Wire structs ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn inline_data(mime_type: &str, data: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(data),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    /// Base64-encoded payload
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}
