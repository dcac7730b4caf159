//! End-to-end session tests
//!
//! Serve the real router on an ephemeral port with deterministic capability
//! backends, then drive it through a WebSocket client exactly as the
//! browser would: initialize handshake, text and audio turns, disconnects,
//! and protocol violations.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley::enrich::{AudioBlob, Enricher};
use parley::live::{LiveConfig, LiveConnector, LiveEvent, LiveReceiver, LiveSender, LiveSession};
use parley::types::{
    Annotation, Body, Envelope, HintOption, HintResponse, Language, MessageKind, Role,
    TranscribeAndHintResponse, TtsAudio, CLIENT_SAMPLE_RATE,
};
use parley::{Config, ServerState};

// ============ Capability doubles ============

struct FakeEnricher;

#[async_trait]
impl Enricher for FakeEnricher {
    async fn transcribe(
        &self,
        _audio: AudioBlob<'_>,
        _source: &Language,
        _target: &Language,
    ) -> Result<Annotation> {
        Ok(Annotation {
            source_text: "いらっしゃいませ。".to_string(),
            translated_text: "Welcome.".to_string(),
            chunked: vec!["いらっしゃいませ。".to_string()],
            ..Default::default()
        })
    }

    async fn translate(
        &self,
        text: &str,
        _source: &Language,
        _target: &Language,
    ) -> Result<Annotation> {
        Ok(Annotation {
            source_text: text.to_string(),
            translated_text: format!("{text} (translated)"),
            chunked: vec![text.to_string()],
            ..Default::default()
        })
    }

    async fn hints(
        &self,
        _history: &str,
        _scenario: &str,
        _source: &Language,
        _target: &Language,
    ) -> Result<HintResponse> {
        Ok(HintResponse {
            hints: vec![HintOption {
                source_text: "チェックインをお願いします。".to_string(),
                translated_text: "I'd like to check in, please.".to_string(),
            }],
        })
    }

    async fn transcribe_and_hint(
        &self,
        _scenario: &str,
        _history: &str,
        audio: Option<AudioBlob<'_>>,
        _source: &Language,
        _target: &Language,
    ) -> Result<TranscribeAndHintResponse> {
        Ok(TranscribeAndHintResponse {
            transcription: if audio.is_some() {
                "こんにちは。チェックインをお願いします。".to_string()
            } else {
                String::new()
            },
            response_text: "かしこまりました。お名前をお願いします。".to_string(),
            translated_text: "Certainly. May I have your name?".to_string(),
            hints: vec![HintOption {
                source_text: "山田太郎です。".to_string(),
                translated_text: "I'm Taro Yamada.".to_string(),
            }],
            ..Default::default()
        })
    }

    async fn tts(&self, _text: &str, _language: &Language) -> Result<Option<TtsAudio>> {
        Ok(Some(TtsAudio {
            data: vec![0xff, 0xfb, 0x90, 0x00],
            mime_type: "audio/mp3".to_string(),
        }))
    }
}

/// Scripted live session: every user text input produces one streamed
/// assistant reply split over two events, the second carrying the
/// turn-complete marker.
struct FakeLive {
    closed: Arc<AtomicBool>,
}

impl FakeLive {
    fn new() -> (Arc<Self>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            Arc::new(Self {
                closed: closed.clone(),
            }),
            closed,
        )
    }
}

#[async_trait]
impl LiveConnector for FakeLive {
    async fn connect(&self, _config: LiveConfig) -> Result<LiveSession> {
        let (events, receiver) = mpsc::unbounded_channel();
        Ok(LiveSession {
            sender: Arc::new(FakeLiveSender {
                events,
                closed: self.closed.clone(),
            }),
            receiver: Box::new(FakeLiveReceiver { receiver }),
        })
    }
}

struct FakeLiveSender {
    events: mpsc::UnboundedSender<LiveEvent>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LiveSender for FakeLiveSender {
    async fn send_text(&self, _text: &str, _end_of_turn: bool) -> Result<()> {
        let _ = self.events.send(LiveEvent {
            text: Some("いらっしゃいませ。".to_string()),
            ..Default::default()
        });
        let _ = self.events.send(LiveEvent {
            text: Some(String::new()),
            turn_complete: true,
            ..Default::default()
        });
        Ok(())
    }

    async fn send_audio(&self, _data: &[u8], _mime_type: &str) -> Result<()> {
        // Reply to user audio with a short streamed audio turn
        let _ = self.events.send(LiveEvent {
            audio: Some(vec![0u8; 4800]),
            ..Default::default()
        });
        let _ = self.events.send(LiveEvent {
            turn_complete: true,
            ..Default::default()
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeLiveReceiver {
    receiver: mpsc::UnboundedReceiver<LiveEvent>,
}

#[async_trait]
impl LiveReceiver for FakeLiveReceiver {
    async fn receive(&mut self) -> Result<Option<LiveEvent>> {
        Ok(self.receiver.recv().await)
    }
}

/// Connector that never completes within the session's connect budget
struct HangingLive;

#[async_trait]
impl LiveConnector for HangingLive {
    async fn connect(&self, _config: LiveConfig) -> Result<LiveSession> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        anyhow::bail!("unreachable")
    }
}

// ============ Harness ============

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(live: Arc<dyn LiveConnector>, config: Config) -> SocketAddr {
    let state = ServerState {
        config: Arc::new(config),
        enricher: Arc::new(FakeEnricher),
        live,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = parley::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, query: &str) -> ClientSocket {
    let url = format!("ws://{addr}/api/practice?{query}");
    let (socket, _) = connect_async(url).await.expect("websocket connect");
    socket
}

async fn send(socket: &mut ClientSocket, message: &Envelope) {
    let payload = serde_json::to_string(message).unwrap();
    socket.send(Message::Text(payload.into())).await.unwrap();
}

#[derive(Debug)]
enum Incoming {
    Message(Envelope),
    Closed(Option<CloseFrame>),
}

async fn next_incoming(socket: &mut ClientSocket) -> Option<Incoming> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                let parsed: Envelope = serde_json::from_str(&text).expect("valid server frame");
                return Some(Incoming::Message(parsed));
            }
            Some(Ok(Message::Close(frame))) => return Some(Incoming::Closed(frame)),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Collect messages until the predicate holds over everything received
async fn collect_until(
    socket: &mut ClientSocket,
    budget: Duration,
    predicate: impl Fn(&[Envelope]) -> bool,
) -> Vec<Envelope> {
    let mut messages = Vec::new();
    let result = timeout(budget, async {
        while !predicate(&messages) {
            match next_incoming(socket).await {
                Some(Incoming::Message(message)) => messages.push(message),
                Some(Incoming::Closed(_)) | None => break,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out; received: {messages:?}");
    messages
}

async fn expect_close(socket: &mut ClientSocket, budget: Duration) -> CloseFrame {
    timeout(budget, async {
        loop {
            match next_incoming(socket).await {
                Some(Incoming::Closed(Some(frame))) => return frame,
                Some(Incoming::Closed(None)) | None => panic!("closed without a frame"),
                Some(Incoming::Message(_)) => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for close frame")
}

fn speech_pcm(secs: f64) -> Vec<u8> {
    (0..(secs * CLIENT_SAMPLE_RATE as f64) as usize)
        .map(|i| if i % 2 == 0 { 3000i16 } else { -3000 })
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

fn silence_pcm(secs: f64) -> Vec<u8> {
    vec![0u8; (secs * CLIENT_SAMPLE_RATE as f64) as usize * 2]
}

fn kind_of(message: &Envelope) -> (MessageKind, Role) {
    (message.kind(), message.role)
}

// ============ Scenarios ============

#[tokio::test]
async fn live_text_session_enriches_assistant_turn() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&modality=text&mode=live",
    )
    .await;

    send(&mut socket, &Envelope::initialize("You are a hotel clerk.")).await;

    let messages = collect_until(&mut socket, Duration::from_secs(10), |seen| {
        seen.iter().any(|m| m.kind() == MessageKind::Transcription)
            && seen.iter().any(|m| m.kind() == MessageKind::Hint)
    })
    .await;

    // The streamed assistant text arrived before its enrichment
    let text_index = messages
        .iter()
        .position(|m| m.kind() == MessageKind::Text && m.role == Role::Assistant)
        .expect("assistant text was forwarded");
    let transcription_index = messages
        .iter()
        .position(|m| m.kind() == MessageKind::Transcription)
        .unwrap();
    assert!(text_index < transcription_index);

    match &messages[transcription_index].body {
        Body::Transcription(annotation) => {
            assert_eq!(annotation.source_text, "いらっしゃいませ。");
            assert_eq!(annotation.translated_text, "いらっしゃいませ。 (translated)");
        }
        other => panic!("unexpected body: {other:?}"),
    }
    let hint = messages.iter().find(|m| m.kind() == MessageKind::Hint).unwrap();
    assert_eq!(hint.role, Role::Assistant);
}

#[tokio::test]
async fn live_audio_turn_streams_then_transcribes() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&modality=audio&mode=live",
    )
    .await;

    // Initialize produces the first assistant turn and its enrichment
    send(&mut socket, &Envelope::initialize("You are a hotel clerk.")).await;
    collect_until(&mut socket, Duration::from_secs(10), |seen| {
        seen.iter().any(|m| m.kind() == MessageKind::Hint)
    })
    .await;

    // A user audio turn: the model streams audio back, then completes the
    // turn, which triggers transcription and fresh hints
    send(
        &mut socket,
        &Envelope::audio(Role::User, speech_pcm(0.5), "audio/pcm;rate=16000", true),
    )
    .await;

    let messages = collect_until(&mut socket, Duration::from_secs(10), |seen| {
        seen.iter().any(|m| m.kind() == MessageKind::Transcription)
            && seen.iter().any(|m| m.kind() == MessageKind::Hint)
    })
    .await;

    let audio_index = messages
        .iter()
        .position(|m| m.kind() == MessageKind::Audio && m.role == Role::Assistant)
        .expect("assistant audio was streamed to the client");
    let transcription_index = messages
        .iter()
        .position(|m| m.kind() == MessageKind::Transcription)
        .unwrap();
    assert!(audio_index < transcription_index);

    match &messages[transcription_index].body {
        Body::Transcription(annotation) => {
            assert_eq!(annotation.source_text, "いらっしゃいませ。")
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[tokio::test]
async fn step_vad_turn_emits_messages_in_order() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&modality=audio&mode=step",
    )
    .await;

    // The scenario prompt produces the assistant's opening; drain it
    send(&mut socket, &Envelope::initialize("You are a hotel clerk.")).await;
    collect_until(&mut socket, Duration::from_secs(10), |seen| {
        seen.iter()
            .any(|m| matches!(&m.body, Body::Processing { status } if status == "done"))
    })
    .await;

    // 3s of speech then 1.5s of silence in half-second frames, with no
    // explicit end-of-turn flag: trailing silence must close the turn
    for chunk in speech_pcm(3.0).chunks(CLIENT_SAMPLE_RATE as usize) {
        send(
            &mut socket,
            &Envelope::audio(Role::User, chunk.to_vec(), "audio/pcm;rate=16000", false),
        )
        .await;
    }
    for chunk in silence_pcm(1.5).chunks(CLIENT_SAMPLE_RATE as usize) {
        send(
            &mut socket,
            &Envelope::audio(Role::User, chunk.to_vec(), "audio/pcm;rate=16000", false),
        )
        .await;
    }

    let messages = collect_until(&mut socket, Duration::from_secs(10), |seen| {
        seen.iter()
            .any(|m| matches!(&m.body, Body::Processing { status } if status == "done"))
    })
    .await;

    let ordered: Vec<(MessageKind, Role)> = messages
        .iter()
        .filter(|m| m.kind() != MessageKind::Processing)
        .map(kind_of)
        .collect();
    assert_eq!(
        ordered,
        vec![
            (MessageKind::Transcription, Role::User),
            (MessageKind::Transcription, Role::Assistant),
            (MessageKind::Hint, Role::Assistant),
            (MessageKind::Audio, Role::Assistant),
        ],
        "full sequence: {messages:?}"
    );

    match &messages
        .iter()
        .find(|m| m.kind() == MessageKind::Audio)
        .unwrap()
        .body
    {
        Body::Audio { mime_type, audio } => {
            assert_eq!(mime_type, "audio/mp3");
            assert!(!audio.is_empty());
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[tokio::test]
async fn upstream_connect_timeout_closes_with_1011() {
    let mut config = Config::default();
    config.session.upstream_connect_ms = 200;
    let addr = spawn_server(Arc::new(HangingLive), config).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&modality=text&mode=live",
    )
    .await;

    let frame = expect_close(&mut socket, Duration::from_secs(3)).await;
    assert_eq!(frame.code, CloseCode::Error);
}

#[tokio::test]
async fn unknown_message_type_closes_with_1008() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&mode=step",
    )
    .await;

    socket
        .send(Message::Text(
            r#"{"type":"unknown","role":"user"}"#.to_string().into(),
        ))
        .await
        .unwrap();

    let frame = expect_close(&mut socket, Duration::from_secs(3)).await;
    assert_eq!(frame.code, CloseCode::Policy);
    assert!(frame.reason.contains("protocol"), "reason: {}", frame.reason);
}

#[tokio::test]
async fn unsupported_language_closes_with_1008() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(addr, "practice_language=xx&native_language=en").await;

    let frame = expect_close(&mut socket, Duration::from_secs(3)).await;
    assert_eq!(frame.code, CloseCode::Policy);
}

#[tokio::test]
async fn duplicate_initialize_closes_with_1008() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&mode=step",
    )
    .await;

    send(&mut socket, &Envelope::initialize("first")).await;
    send(&mut socket, &Envelope::initialize("second")).await;

    let frame = expect_close(&mut socket, Duration::from_secs(5)).await;
    assert_eq!(frame.code, CloseCode::Policy);
}

#[tokio::test]
async fn message_before_initialize_closes_with_1008() {
    let (live, _closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&mode=step",
    )
    .await;

    send(&mut socket, &Envelope::text(Role::User, "hello", true)).await;

    let frame = expect_close(&mut socket, Duration::from_secs(3)).await;
    assert_eq!(frame.code, CloseCode::Policy);
}

#[tokio::test]
async fn client_disconnect_closes_upstream_within_budget() {
    let (live, closed) = FakeLive::new();
    let addr = spawn_server(live, Config::default()).await;
    let mut socket = connect(
        addr,
        "practice_language=ja&native_language=en&modality=text&mode=live",
    )
    .await;

    send(&mut socket, &Envelope::initialize("You are a hotel clerk.")).await;
    // Wait for the session to be fully running before dropping the client
    collect_until(&mut socket, Duration::from_secs(10), |seen| {
        seen.iter().any(|m| m.kind() == MessageKind::Text)
    })
    .await;

    drop(socket);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !closed.load(Ordering::SeqCst) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "upstream session not closed within the teardown budget"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
