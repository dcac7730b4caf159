//! Upstream subscribers (live mode)
//!
//! `UpstreamReader` pumps the live session's stream onto the bus as
//! assistant audio/text envelopes, carrying the model's turn-complete
//! indicator. `UpstreamWriter` forwards the user's input to the live
//! session: `initialize` and `text` as end-of-turn text, `audio` as
//! realtime chunks. Derived messages never go back upstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::live::{LiveReceiver, LiveSender};
use crate::types::{Body, Envelope, Role};

use super::bus::{ChatBus, Subscriber};

pub struct UpstreamReader {
    receiver: Mutex<Option<Box<dyn LiveReceiver>>>,
    bus: Arc<ChatBus>,
    stopped: Arc<AtomicBool>,
}

impl UpstreamReader {
    pub fn new(receiver: Box<dyn LiveReceiver>, bus: Arc<ChatBus>) -> Arc<Self> {
        Arc::new(Self {
            receiver: Mutex::new(Some(receiver)),
            bus,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn pump(self: Arc<Self>) {
        let Some(mut receiver) = self.receiver.lock().await.take() else {
            return;
        };
        while !self.stopped.load(Ordering::SeqCst) {
            match receiver.receive().await {
                Ok(Some(event)) => {
                    let end_of_turn = event.turn_complete;
                    let message = if let Some(audio) = event.audio {
                        debug!(bytes = audio.len(), end_of_turn, "upstream audio chunk");
                        Envelope::audio(
                            Role::Assistant,
                            audio,
                            format!("audio/pcm;rate={}", crate::types::SERVER_SAMPLE_RATE),
                            end_of_turn,
                        )
                    } else {
                        let text = event.text.unwrap_or_default();
                        debug!(chars = text.len(), end_of_turn, "upstream text chunk");
                        Envelope::text(Role::Assistant, text, end_of_turn)
                    };
                    if self.bus.publish(message).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("upstream session closed");
                    break;
                }
                Err(err) => {
                    warn!(%err, "upstream stream failed");
                    let _ = self
                        .bus
                        .publish(Envelope::error(Role::System, format!("upstream error: {err}")));
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Subscriber for UpstreamReader {
    fn name(&self) -> &'static str {
        "upstream-reader"
    }

    async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.pump())]
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn handle(&self, _message: &Envelope) -> Result<()> {
        Ok(())
    }
}

pub struct UpstreamWriter {
    sender: Arc<dyn LiveSender>,
    stopped: AtomicBool,
}

impl UpstreamWriter {
    pub fn new(sender: Arc<dyn LiveSender>) -> Arc<Self> {
        Arc::new(Self {
            sender,
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Subscriber for UpstreamWriter {
    fn name(&self) -> &'static str {
        "upstream-writer"
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn handle(&self, message: &Envelope) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) || message.role != Role::User {
            return Ok(());
        }
        match &message.body {
            Body::Initialize { text } | Body::Text { text } => {
                // The live API rejects empty turns; a bare end-of-turn
                // becomes a single space
                let text = if text.is_empty() { " " } else { text.as_str() };
                self.sender.send_text(text, true).await?;
            }
            Body::Audio { audio, mime_type } => {
                self.sender.send_audio(audio, mime_type).await?;
            }
            _ => {}
        }
        Ok(())
    }
}
