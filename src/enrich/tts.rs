//! Cloud Text-to-Speech client
//!
//! Synthesizes assistant replies to MP3 via the `text:synthesize` REST
//! endpoint. Languages without a configured voice return `None`. Results
//! are cached: the same reply text for the same voice always produces the
//! same audio.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::FileCache;
use crate::types::{Language, TtsAudio};

const TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Learner-friendly speaking rate
const SPEAKING_RATE: f64 = 0.8;

pub async fn synthesize(
    http: &Client,
    api_key: &str,
    text: &str,
    language: &Language,
    cache: Option<&FileCache>,
) -> Result<Option<TtsAudio>> {
    let (language_code, voice_name) = match (&language.tts_language_code, &language.tts_voice_name)
    {
        (Some(code), Some(voice)) => (code.as_str(), voice.as_str()),
        _ => {
            debug!(language = %language.abbreviation, "no TTS voice configured");
            return Ok(None);
        }
    };

    let cache_key = format!("tts:{}:{}:{}", language_code, voice_name, text);
    if let Some(encoded) = cache.and_then(|c| c.get::<String>(&cache_key)) {
        if let Ok(data) = BASE64.decode(encoded.as_bytes()) {
            return Ok(Some(TtsAudio {
                data,
                mime_type: "audio/mp3".to_string(),
            }));
        }
    }

    let request = SynthesizeRequest {
        input: SynthesisInput { text },
        voice: VoiceSelectionParams {
            language_code,
            name: voice_name,
        },
        audio_config: AudioConfig {
            audio_encoding: "MP3",
            speaking_rate: SPEAKING_RATE,
            pitch: 0.0,
        },
    };

    let response = http
        .post(TTS_URL)
        .header("x-goog-api-key", api_key)
        .json(&request)
        .send()
        .await
        .context("sending synthesize request")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("synthesize failed ({}): {}", status, body));
    }

    let parsed: SynthesizeResponse = response
        .json()
        .await
        .context("decoding synthesize response")?;
    let data = BASE64
        .decode(parsed.audio_content.as_bytes())
        .context("decoding synthesized audio")?;

    if let Some(cache) = cache {
        cache.put(&cache_key, &parsed.audio_content);
    }

    Ok(Some(TtsAudio {
        data,
        mime_type: "audio/mp3".to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelectionParams<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelectionParams<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f64,
    pitch: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}
