//! Live-mode turn enrichment
//!
//! Accumulates each role's audio and text into per-role buffers and, when
//! an assistant turn completes, produces the pedagogical breakdown: a
//! transcription (audio turns) or translation (text turns), followed by
//! suggested learner replies built from the conversation history. The model
//! work runs in detached child tasks so the bus keeps flowing; buffers are
//! drained before spawning, which keeps enrichment at-most-once per turn.
//!
//! User turns are not enriched by default; the upstream live transcript
//! already covers them. `transcribe_user_audio` opts user turns in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::enrich::{AudioBlob, Enricher};
use crate::types::{
    Body, Envelope, Language, Role, CLIENT_SAMPLE_RATE, SERVER_SAMPLE_RATE,
};

use super::buffer::MessageBuffer;
use super::bus::{ChatBus, Subscriber};

/// Scenario text and history prompt assembled from the append-only log
pub fn build_history_prompt(history: &[Arc<Envelope>]) -> (String, String) {
    let mut scenario = String::new();
    let mut items = Vec::new();
    for message in history {
        match &message.body {
            Body::Initialize { text } => scenario = text.clone(),
            Body::Transcription(annotation) => {
                items.push(format!("> {}: {}", message.role, annotation.source_text));
            }
            Body::Text { text } => items.push(format!("> {}: {}", message.role, text)),
            _ => {}
        }
    }
    (scenario, items.join("\n"))
}

pub struct BulkEnrichmentTask {
    bus: Arc<ChatBus>,
    enricher: Arc<dyn Enricher>,
    practice: &'static Language,
    native: &'static Language,
    transcribe_user_audio: bool,
    buffers: Mutex<HashMap<Role, MessageBuffer>>,
    stopped: AtomicBool,
    children: Mutex<Vec<JoinHandle<()>>>,
}

impl BulkEnrichmentTask {
    pub fn new(
        bus: Arc<ChatBus>,
        enricher: Arc<dyn Enricher>,
        practice: &'static Language,
        native: &'static Language,
        transcribe_user_audio: bool,
    ) -> Arc<Self> {
        let buffers = HashMap::from([
            (Role::User, MessageBuffer::new(Role::User)),
            (Role::Assistant, MessageBuffer::new(Role::Assistant)),
        ]);
        Arc::new(Self {
            bus,
            enricher,
            practice,
            native,
            transcribe_user_audio,
            buffers: Mutex::new(buffers),
            stopped: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
        })
    }

    fn enriches(&self, role: Role) -> bool {
        role == Role::Assistant || (role == Role::User && self.transcribe_user_audio)
    }

    /// Transcribe or translate a completed turn, publish the result, then
    /// generate hints from the updated history. Failures become error
    /// messages attributed to the same role; nothing propagates to the bus
    /// loop.
    async fn enrich_turn(
        bus: Arc<ChatBus>,
        enricher: Arc<dyn Enricher>,
        practice: &'static Language,
        native: &'static Language,
        role: Role,
        audio: Vec<u8>,
        text: String,
    ) {
        let sample_rate = match role {
            Role::Assistant => SERVER_SAMPLE_RATE,
            _ => CLIENT_SAMPLE_RATE,
        };
        let mime_type = format!("audio/pcm;rate={}", sample_rate);

        let annotation = if !audio.is_empty() {
            enricher
                .transcribe(
                    AudioBlob {
                        data: &audio,
                        mime_type: &mime_type,
                    },
                    practice,
                    native,
                )
                .await
        } else {
            enricher.translate(&text, practice, native).await
        };

        let message = match annotation {
            Ok(annotation) => Envelope::transcription(role, annotation),
            Err(err) => {
                error!(%err, %role, "turn enrichment failed");
                Envelope::error(role, format!("Sorry, I couldn't transcribe that: {err}"))
            }
        };
        if bus.publish(message).is_err() {
            return;
        }

        if role != Role::Assistant {
            return;
        }
        let (scenario, history) = build_history_prompt(&bus.snapshot());
        let message = match enricher.hints(&history, &scenario, practice, native).await {
            Ok(response) => Envelope::hint(Role::Assistant, response.hints),
            Err(err) => {
                error!(%err, "hint generation failed");
                Envelope::error(
                    Role::Assistant,
                    format!("Sorry, I couldn't generate hints: {err}"),
                )
            }
        };
        let _ = bus.publish(message);
    }
}

#[async_trait]
impl Subscriber for BulkEnrichmentTask {
    fn name(&self) -> &'static str {
        "bulk-enrichment"
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for child in self.children.lock().expect("children lock poisoned").drain(..) {
            child.abort();
        }
    }

    async fn handle(&self, message: &Envelope) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        let role = message.role;
        let (audio, text) = {
            let mut buffers = self.buffers.lock().expect("buffer lock poisoned");
            let Some(buffer) = buffers.get_mut(&role) else {
                return Ok(()); // system messages carry no turn content
            };
            match &message.body {
                Body::Audio { audio, .. } => buffer.add_audio(audio),
                Body::Text { text } => buffer.add_text(text, message.end_of_turn),
                _ => return Ok(()), // derived kinds and initialize are skipped
            }
            if !message.end_of_turn {
                return Ok(());
            }
            // Drained under the lock: at most one enrichment per turn
            buffer.end_turn()
        };

        if audio.is_empty() && text.is_empty() {
            return Ok(());
        }
        if !self.enriches(role) {
            return Ok(());
        }

        info!(
            %role,
            audio_bytes = audio.len(),
            text_chars = text.len(),
            "assistant turn complete, scheduling enrichment"
        );
        let task = tokio::spawn(Self::enrich_turn(
            self.bus.clone(),
            self.enricher.clone(),
            self.practice,
            self.native,
            role,
            audio,
            text,
        ));
        self.children
            .lock()
            .expect("children lock poisoned")
            .push(task);
        Ok(())
    }
}
