//! Practice session WebSocket endpoint
//!
//! `GET /api/practice?practice_language=ja&native_language=en` upgrades to
//! the wire protocol and hands the socket to the session orchestrator.
//! Parameter validation happens after the upgrade so rejections reach the
//! client as a 1008 close frame rather than an opaque HTTP failure.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::warn;

use crate::session::socket::CLOSE_POLICY;
use crate::session::{run_session, SessionParams, TypedSocket};
use crate::types::{lookup_language, Modality, SessionMode};

use super::ServerState;

#[derive(Debug, Deserialize)]
pub struct PracticeQuery {
    pub practice_language: String,
    pub native_language: String,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

pub async fn practice_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    Query(query): Query<PracticeQuery>,
) -> Response {
    ws.on_upgrade(move |socket| accept_session(socket, state, query))
}

async fn accept_session(socket: WebSocket, state: ServerState, query: PracticeQuery) {
    let params = match validate(&state, &query) {
        Ok(params) => params,
        Err(reason) => {
            warn!(%reason, "rejecting practice session");
            TypedSocket::new(socket).close(CLOSE_POLICY, &reason).await;
            return;
        }
    };

    run_session(
        socket,
        state.config.clone(),
        state.enricher.clone(),
        state.live.clone(),
        params,
    )
    .await;
}

fn validate(state: &ServerState, query: &PracticeQuery) -> Result<SessionParams, String> {
    let practice = lookup_language(&query.practice_language)
        .ok_or_else(|| format!("unsupported practice language: {}", query.practice_language))?;
    let native = lookup_language(&query.native_language)
        .ok_or_else(|| format!("unsupported native language: {}", query.native_language))?;
    let modality = match &query.modality {
        Some(raw) => raw.parse::<Modality>()?,
        None => Modality::Audio,
    };
    let mode = match &query.mode {
        Some(raw) => raw.parse::<SessionMode>()?,
        None => state.config.session.default_mode,
    };
    Ok(SessionParams {
        practice,
        native,
        modality,
        mode,
    })
}
