//! Gemini bidirectional live session
//!
//! Implements the live-session capability over the `BidiGenerateContent`
//! WebSocket API: a setup handshake, then client text/realtime-audio frames
//! out and streamed model turns (inline audio and/or text, with a
//! turn-complete marker) back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::types::Modality;

use super::{LiveConfig, LiveConnector, LiveEvent, LiveReceiver, LiveSender, LiveSession};

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for Gemini live sessions
pub struct GeminiLive {
    api_key: String,
    endpoint: String,
}

impl GeminiLive {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: LIVE_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl LiveConnector for GeminiLive {
    async fn connect(&self, config: LiveConfig) -> Result<LiveSession> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let (mut ws, _) = connect_async(url)
            .await
            .context("opening live-session socket")?;

        let setup = ClientMessage::Setup {
            setup: Setup {
                model: format!("models/{}", config.model),
                generation_config: SetupGenerationConfig {
                    response_modalities: vec![match config.response_modality {
                        Modality::Audio => "AUDIO".to_string(),
                        Modality::Text => "TEXT".to_string(),
                    }],
                    speech_config: config.voice.map(|voice| SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                        },
                    }),
                },
                system_instruction: config.system_instruction.map(|text| SetupContent {
                    parts: vec![SetupPart { text }],
                }),
            },
        };
        let payload = serde_json::to_string(&setup).context("encoding setup message")?;
        ws.send(Message::Text(payload.into()))
            .await
            .context("sending setup message")?;

        // The server acknowledges setup before streaming anything else
        loop {
            match ws.next().await {
                Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                    let raw = msg.into_data();
                    let parsed: ServerMessage =
                        serde_json::from_slice(&raw).context("decoding setup response")?;
                    if parsed.setup_complete.is_some() {
                        break;
                    }
                    debug!("ignoring pre-setup message");
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(anyhow!("live session closed during setup: {:?}", frame));
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err).context("reading setup response"),
                None => return Err(anyhow!("live session ended during setup")),
            }
        }

        let (sink, stream) = ws.split();
        Ok(LiveSession {
            sender: Arc::new(GeminiLiveSender {
                sink: Mutex::new(sink),
                closed: AtomicBool::new(false),
            }),
            receiver: Box::new(GeminiLiveReceiver { stream }),
        })
    }
}

struct GeminiLiveSender {
    sink: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
}

impl GeminiLiveSender {
    async fn send_json(&self, message: &ClientMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("live session is closed"));
        }
        let payload = serde_json::to_string(message).context("encoding live message")?;
        self.sink
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .context("sending live message")
    }
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<()> {
        self.send_json(&ClientMessage::Content {
            client_content: ClientContent {
                turns: vec![ContentTurn {
                    role: "user".to_string(),
                    parts: vec![SetupPart {
                        text: text.to_string(),
                    }],
                }],
                turn_complete: end_of_turn,
            },
        })
        .await
    }

    async fn send_audio(&self, data: &[u8], mime_type: &str) -> Result<()> {
        self.send_json(&ClientMessage::Realtime {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: mime_type.to_string(),
                    data: BASE64.encode(data),
                }],
            },
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        if let Err(err) = sink.send(Message::Close(None)).await {
            debug!(%err, "live session close frame not delivered");
        }
        Ok(())
    }
}

struct GeminiLiveReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl LiveReceiver for GeminiLiveReceiver {
    async fn receive(&mut self) -> Result<Option<LiveEvent>> {
        loop {
            match self.stream.next().await {
                Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                    let raw = msg.into_data();
                    let parsed: ServerMessage = match serde_json::from_slice(&raw) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            warn!(%err, "skipping undecodable live message");
                            continue;
                        }
                    };
                    if let Some(content) = parsed.server_content {
                        return Ok(Some(content.into_event()));
                    }
                    debug!("ignoring non-content live message");
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err).context("reading live stream"),
            }
        }
    }
}

// ============ Wire structs ============

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ClientMessage {
    Setup {
        setup: Setup,
    },
    Content {
        #[serde(rename = "clientContent")]
        client_content: ClientContent,
    },
    Realtime {
        #[serde(rename = "realtimeInput")]
        realtime_input: RealtimeInput,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: SetupGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SetupContent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupGenerationConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct SetupContent {
    parts: Vec<SetupPart>,
}

#[derive(Debug, Serialize)]
struct SetupPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContent {
    turns: Vec<ContentTurn>,
    turn_complete: bool,
}

#[derive(Debug, Serialize)]
struct ContentTurn {
    role: String,
    parts: Vec<SetupPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    /// Base64-encoded PCM
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
}

impl ServerContent {
    fn into_event(self) -> LiveEvent {
        let mut event = LiveEvent {
            turn_complete: self.turn_complete,
            ..Default::default()
        };
        for part in self.model_turn.map(|turn| turn.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                event.text.get_or_insert_with(String::new).push_str(&text);
            }
            if let Some(inline) = part.inline_data {
                if let Ok(bytes) = BASE64.decode(inline.data.as_bytes()) {
                    event.audio.get_or_insert_with(Vec::new).extend(bytes);
                }
            }
        }
        event
    }
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<ServerPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<ServerInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInlineData {
    #[allow(dead_code)]
    #[serde(default)]
    mime_type: String,
    data: String,
}
