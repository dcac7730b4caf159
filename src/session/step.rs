//! Step-by-step enrichment
//!
//! No upstream live session: each user turn runs one combined
//! transcribe-and-respond call that returns the user's transcription, the
//! assistant's reply with its pedagogical breakdown, and suggested replies.
//! Turns close on an explicit flag or on trailing silence detected over the
//! accumulated audio. Emission order per turn: user transcription, then
//! assistant transcription, then hints, then synthesized audio (audio
//! modality only), bracketed by `processing` status markers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::enrich::{AudioBlob, Enricher};
use crate::types::{
    Annotation, Body, Envelope, Language, Modality, Role, CLIENT_SAMPLE_RATE,
};

use super::buffer::MessageBuffer;
use super::bus::{ChatBus, Subscriber};
use super::enrichment::build_history_prompt;
use super::turn::TurnDetector;

pub struct StepByStepEnrichmentTask {
    bus: Arc<ChatBus>,
    enricher: Arc<dyn Enricher>,
    practice: &'static Language,
    native: &'static Language,
    modality: Modality,
    detector: TurnDetector,
    buffer: Mutex<MessageBuffer>,
    stopped: AtomicBool,
    children: Mutex<Vec<JoinHandle<()>>>,
}

impl StepByStepEnrichmentTask {
    pub fn new(
        bus: Arc<ChatBus>,
        enricher: Arc<dyn Enricher>,
        practice: &'static Language,
        native: &'static Language,
        modality: Modality,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            enricher,
            practice,
            native,
            modality,
            detector: TurnDetector::new(CLIENT_SAMPLE_RATE),
            buffer: Mutex::new(MessageBuffer::new(Role::User)),
            stopped: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
        })
    }

    /// One combined call per closed turn, with results re-injected in the
    /// fixed order the client renders them
    async fn process_turn(
        bus: Arc<ChatBus>,
        enricher: Arc<dyn Enricher>,
        practice: &'static Language,
        native: &'static Language,
        modality: Modality,
        audio: Option<Vec<u8>>,
    ) {
        let _ = bus.publish(Envelope::processing("thinking"));
        let (scenario, history) = build_history_prompt(&bus.snapshot());
        let mime_type = format!("audio/pcm;rate={}", CLIENT_SAMPLE_RATE);
        let blob = audio.as_deref().map(|data| AudioBlob {
            data,
            mime_type: &mime_type,
        });

        let response = match enricher
            .transcribe_and_hint(&scenario, &history, blob, practice, native)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(%err, "combined turn call failed");
                let _ = bus.publish(Envelope::error(
                    Role::Assistant,
                    format!("Sorry, I couldn't process that turn: {err}"),
                ));
                let _ = bus.publish(Envelope::processing("done"));
                return;
            }
        };

        if audio.is_some() && !response.transcription.is_empty() {
            let message = Envelope::transcription(
                Role::User,
                Annotation::source_only(response.transcription.clone()),
            );
            if bus.publish(message).is_err() {
                return;
            }
        }

        // Synthesis overlaps the remaining publishes; its audio is emitted
        // after the hint message
        let synthesis = (modality == Modality::Audio).then(|| {
            let enricher = enricher.clone();
            let text = response.response_text.clone();
            tokio::spawn(async move { enricher.tts(&text, practice).await })
        });

        let annotation = Annotation {
            source_text: response.response_text,
            translated_text: response.translated_text,
            chunked: response.chunked,
            dictionary: response.dictionary,
        };
        if bus
            .publish(Envelope::transcription(Role::Assistant, annotation))
            .is_err()
        {
            return;
        }
        let _ = bus.publish(Envelope::hint(Role::Assistant, response.hints));

        if let Some(task) = synthesis {
            match task.await {
                Ok(Ok(Some(tts))) => {
                    let _ = bus.publish(Envelope::audio(
                        Role::Assistant,
                        tts.data,
                        tts.mime_type,
                        true,
                    ));
                }
                Ok(Ok(None)) => debug!("practice language has no TTS voice"),
                Ok(Err(err)) => {
                    let _ = bus.publish(Envelope::error(
                        Role::Assistant,
                        format!("Sorry, I couldn't synthesize audio: {err}"),
                    ));
                }
                Err(err) => warn!(%err, "speech synthesis task aborted"),
            }
        }

        let _ = bus.publish(Envelope::processing("done"));
    }
}

#[async_trait]
impl Subscriber for StepByStepEnrichmentTask {
    fn name(&self) -> &'static str {
        "step-enrichment"
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for child in self.children.lock().expect("children lock poisoned").drain(..) {
            child.abort();
        }
    }

    async fn handle(&self, message: &Envelope) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) || message.role != Role::User {
            return Ok(());
        }

        let turn_audio = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            let close = match &message.body {
                // The scenario prompt itself closes a turn: the combined
                // call produces the assistant's opening line
                Body::Initialize { .. } => message.end_of_turn,
                Body::Text { text } => {
                    buffer.add_text(text, message.end_of_turn);
                    message.end_of_turn
                }
                Body::Audio { audio, .. } => {
                    buffer.add_audio(audio);
                    message.end_of_turn || self.detector.should_close(buffer.audio())
                }
                _ => return Ok(()),
            };
            if !close {
                return Ok(());
            }
            let (audio, _text) = buffer.end_turn();
            // User text already reached the history via the bus; only the
            // audio needs to travel with the call
            (!audio.is_empty()).then_some(audio)
        };

        info!(
            audio_bytes = turn_audio.as_ref().map(|a| a.len()).unwrap_or(0),
            "user turn closed, scheduling combined call"
        );
        let task = tokio::spawn(Self::process_turn(
            self.bus.clone(),
            self.enricher.clone(),
            self.practice,
            self.native,
            self.modality,
            turn_audio,
        ));
        self.children
            .lock()
            .expect("children lock poisoned")
            .push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        lookup_language, HintOption, MessageKind, TranscribeAndHintResponse, TtsAudio,
    };
    use std::time::Duration;

    struct StubEnricher;

    #[async_trait]
    impl Enricher for StubEnricher {
        async fn transcribe(
            &self,
            _audio: AudioBlob<'_>,
            _source: &Language,
            _target: &Language,
        ) -> Result<Annotation> {
            unimplemented!("not used in step mode")
        }

        async fn translate(
            &self,
            _text: &str,
            _source: &Language,
            _target: &Language,
        ) -> Result<Annotation> {
            unimplemented!("not used in step mode")
        }

        async fn hints(
            &self,
            _history: &str,
            _scenario: &str,
            _source: &Language,
            _target: &Language,
        ) -> Result<crate::types::HintResponse> {
            unimplemented!("not used in step mode")
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
                    "こんにちは".to_string()
                } else {
                    String::new()
                },
                response_text: "いらっしゃいませ".to_string(),
                translated_text: "Welcome".to_string(),
                hints: vec![HintOption {
                    source_text: "チェックインをお願いします".to_string(),
                    translated_text: "I'd like to check in".to_string(),
                }],
                ..Default::default()
            })
        }

        async fn tts(&self, _text: &str, _language: &Language) -> Result<Option<TtsAudio>> {
            Ok(Some(TtsAudio {
                data: vec![0xff, 0xfb],
                mime_type: "audio/mp3".to_string(),
            }))
        }
    }

    fn task_under_test(bus: Arc<ChatBus>, modality: Modality) -> Arc<StepByStepEnrichmentTask> {
        StepByStepEnrichmentTask::new(
            bus,
            Arc::new(StubEnricher),
            lookup_language("ja").unwrap(),
            lookup_language("en").unwrap(),
            modality,
        )
    }

    async fn wait_for_done(bus: &ChatBus) {
        for _ in 0..200 {
            let done = bus.snapshot().iter().any(|m| {
                matches!(&m.body, Body::Processing { status } if status == "done")
            });
            if done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pipeline never finished");
    }

    fn speech_pcm(secs: f64) -> Vec<u8> {
        (0..(secs * CLIENT_SAMPLE_RATE as f64) as usize)
            .map(|i| if i % 2 == 0 { 3000i16 } else { -3000 })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    fn silence_pcm(secs: f64) -> Vec<u8> {
        vec![0; (secs * CLIENT_SAMPLE_RATE as f64) as usize * 2]
    }

    #[tokio::test]
    async fn test_vad_turn_emits_in_order() {
        let (bus, _receiver) = ChatBus::new();
        let task = task_under_test(bus.clone(), Modality::Audio);

        // 3s of speech then 1.5s of silence, in half-second frames, never
        // setting end_of_turn
        for chunk in speech_pcm(3.0).chunks(CLIENT_SAMPLE_RATE as usize) {
            let msg = Envelope::audio(Role::User, chunk.to_vec(), "audio/pcm;rate=16000", false);
            task.handle(&msg).await.unwrap();
        }
        for chunk in silence_pcm(1.5).chunks(CLIENT_SAMPLE_RATE as usize) {
            let msg = Envelope::audio(Role::User, chunk.to_vec(), "audio/pcm;rate=16000", false);
            task.handle(&msg).await.unwrap();
        }

        wait_for_done(&bus).await;
        let kinds: Vec<(MessageKind, Role)> = bus
            .snapshot()
            .iter()
            .filter(|m| m.kind() != MessageKind::Processing)
            .map(|m| (m.kind(), m.role))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (MessageKind::Transcription, Role::User),
                (MessageKind::Transcription, Role::Assistant),
                (MessageKind::Hint, Role::Assistant),
                (MessageKind::Audio, Role::Assistant),
            ]
        );

        // Exactly one turn was processed: further silence changes nothing
        let before = bus.history_len();
        let msg = Envelope::audio(Role::User, silence_pcm(0.5), "audio/pcm;rate=16000", false);
        task.handle(&msg).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.history_len(), before);
    }

    #[tokio::test]
    async fn test_initialize_produces_opening_without_user_transcription() {
        let (bus, _receiver) = ChatBus::new();
        let task = task_under_test(bus.clone(), Modality::Text);

        bus.publish(Envelope::initialize("You are a hotel clerk."))
            .unwrap();
        let initialize = Envelope::initialize("You are a hotel clerk.");
        task.handle(&initialize).await.unwrap();

        wait_for_done(&bus).await;
        let history = bus.snapshot();
        assert!(!history
            .iter()
            .any(|m| m.kind() == MessageKind::Transcription && m.role == Role::User));
        assert!(history
            .iter()
            .any(|m| m.kind() == MessageKind::Transcription && m.role == Role::Assistant));
        assert!(history.iter().any(|m| m.kind() == MessageKind::Hint));
        // Text modality: no synthesized audio
        assert!(!history.iter().any(|m| m.kind() == MessageKind::Audio));
    }

    #[tokio::test]
    async fn test_explicit_flag_closes_audio_turn() {
        let (bus, _receiver) = ChatBus::new();
        let task = task_under_test(bus.clone(), Modality::Text);

        let msg = Envelope::audio(Role::User, speech_pcm(0.4), "audio/pcm;rate=16000", true);
        task.handle(&msg).await.unwrap();

        wait_for_done(&bus).await;
        let history = bus.snapshot();
        assert!(history
            .iter()
            .any(|m| m.kind() == MessageKind::Transcription && m.role == Role::User));
    }
}
