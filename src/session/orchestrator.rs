//! Session orchestrator
//!
//! Owns one practice session end to end: validates parameters, connects the
//! upstream (live mode) under its budget, assembles the subscribers in a
//! deterministic order, starts their reader tasks, and waits for the first
//! of them to finish. Teardown then runs exactly once: stop flags, a
//! bounded upstream close, a bounded drain of remaining tasks, and the
//! client close frame.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use futures::future::{join_all, select_all};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::enrich::Enricher;
use crate::live::{LiveConfig, LiveConnector, LiveSender};
use crate::types::{Language, Modality, SessionMode};

use super::bus::{dispatch, ChatBus, Subscriber};
use super::enrichment::BulkEnrichmentTask;
use super::reader::UserReader;
use super::socket::{TypedSocket, CLOSE_INTERNAL, CLOSE_NORMAL};
use super::step::StepByStepEnrichmentTask;
use super::upstream::{UpstreamReader, UpstreamWriter};
use super::writer::UserWriter;

/// Validated parameters of one practice session
#[derive(Debug, Clone, Copy)]
pub struct SessionParams {
    pub practice: &'static Language,
    pub native: &'static Language,
    pub modality: Modality,
    pub mode: SessionMode,
}

/// Run a practice session to completion. Consumes the socket; every exit
/// path closes it and releases the upstream session.
pub async fn run_session(
    socket: WebSocket,
    config: Arc<Config>,
    enricher: Arc<dyn Enricher>,
    live: Arc<dyn LiveConnector>,
    params: SessionParams,
) {
    let session_id = Uuid::new_v4();
    let span = info_span!(
        "practice_session",
        %session_id,
        practice = %params.practice.abbreviation,
        native = %params.native.abbreviation,
        mode = ?params.mode,
    );
    run_session_inner(socket, config, enricher, live, params)
        .instrument(span)
        .await;
}

async fn run_session_inner(
    socket: WebSocket,
    config: Arc<Config>,
    enricher: Arc<dyn Enricher>,
    live: Arc<dyn LiveConnector>,
    params: SessionParams,
) {
    let socket = Arc::new(TypedSocket::new(socket));
    info!("session accepted");

    // Upstream first: a session that cannot reach its model is useless
    let upstream = match params.mode {
        SessionMode::Step => None,
        SessionMode::Live => {
            let live_config = LiveConfig {
                model: config.models.live.clone(),
                system_instruction: None,
                response_modality: params.modality,
                voice: Some(config.session.live_voice.clone()),
            };
            let budget = Duration::from_millis(config.session.upstream_connect_ms);
            match timeout(budget, live.connect(live_config)).await {
                Ok(Ok(session)) => Some(session),
                Ok(Err(err)) => {
                    error!(%err, "upstream connect failed");
                    socket.close(CLOSE_INTERNAL, "upstream connect failed").await;
                    return;
                }
                Err(_) => {
                    error!(budget_ms = config.session.upstream_connect_ms, "upstream connect timed out");
                    socket.close(CLOSE_INTERNAL, "upstream connect timed out").await;
                    return;
                }
            }
        }
    };

    let (bus, queue) = ChatBus::new();

    // Deterministic registration order per mode
    let mut upstream_sender: Option<Arc<dyn LiveSender>> = None;
    let subscribers: Vec<Arc<dyn Subscriber>> = match upstream {
        Some(session) => {
            upstream_sender = Some(session.sender.clone());
            vec![
                UserReader::new(socket.clone(), bus.clone()),
                UserWriter::new(socket.clone()),
                UpstreamReader::new(session.receiver, bus.clone()),
                UpstreamWriter::new(session.sender),
                BulkEnrichmentTask::new(
                    bus.clone(),
                    enricher,
                    params.practice,
                    params.native,
                    config.session.transcribe_user_audio,
                ),
            ]
        }
        None => vec![
            UserReader::new(socket.clone(), bus.clone()),
            UserWriter::new(socket.clone()),
            StepByStepEnrichmentTask::new(
                bus.clone(),
                enricher,
                params.practice,
                params.native,
                params.modality,
            ),
        ],
    };

    let dispatcher = tokio::spawn(dispatch(queue, subscribers.clone()));

    let mut children: Vec<JoinHandle<()>> = Vec::new();
    for subscriber in &subscribers {
        children.extend(subscriber.clone().start().await);
    }

    // The session lives until any reader task finishes: client disconnect,
    // upstream close, or a task failure
    let internal_error = if children.is_empty() {
        error!("no subscriber tasks started");
        true
    } else {
        let (first, _index, rest) = select_all(children).await;
        children = rest;
        match first {
            Ok(()) => false,
            Err(err) => {
                error!(%err, "subscriber task failed");
                true
            }
        }
    };

    info!("session ending, starting teardown");
    for subscriber in &subscribers {
        subscriber.stop();
    }

    if let Some(sender) = upstream_sender {
        let budget = Duration::from_millis(config.session.upstream_close_ms);
        match timeout(budget, sender.close()).await {
            Ok(Err(err)) => warn!(%err, "upstream close failed"),
            Err(_) => warn!(budget_ms = config.session.upstream_close_ms, "upstream close timed out"),
            Ok(Ok(())) => {}
        }
    }

    children.push(dispatcher);
    for child in &children {
        child.abort();
    }
    let budget = Duration::from_millis(config.session.task_drain_ms);
    if timeout(budget, join_all(children)).await.is_err() {
        warn!(budget_ms = config.session.task_drain_ms, "task drain timed out");
    }

    if internal_error {
        socket.close(CLOSE_INTERNAL, "internal error").await;
    } else {
        socket.close(CLOSE_NORMAL, "session complete").await;
    }
    info!("session torn down");
}
