//! Typed client socket
//!
//! Wraps the raw WebSocket in the wire envelope: JSON text frames in, JSON
//! text frames out. Parsing failures surface as protocol errors so the
//! reader can close with 1008; transport failures and close frames surface
//! as disconnects. `close` is idempotent and safe to call from both the
//! reader and the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::Envelope;

/// Normal session end
pub const CLOSE_NORMAL: u16 = 1000;
/// Protocol violation or unsupported parameters
pub const CLOSE_POLICY: u16 = 1008;
/// Internal or upstream failure
pub const CLOSE_INTERNAL: u16 = 1011;

/// Socket-layer errors callers branch on
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer sent something that is not a valid envelope
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The socket was closed locally
    #[error("socket closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// Bidirectional framed channel carrying [`Envelope`]s
pub struct TypedSocket {
    sender: Mutex<SplitSink<WebSocket, Message>>,
    receiver: Mutex<SplitStream<WebSocket>>,
    closed: AtomicBool,
}

impl TypedSocket {
    pub fn new(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        Self {
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
        }
    }

    /// Receive the next envelope. `Ok(None)` means the peer disconnected.
    pub async fn receive(&self) -> Result<Option<Envelope>, SocketError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Envelope>(&text)
                        .map(Some)
                        .map_err(|err| SocketError::Protocol(format!("invalid message: {err}")));
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!("ignoring binary frame; the wire protocol is JSON text");
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {} // ping/pong
                Some(Err(err)) => return Err(SocketError::Transport(err)),
            }
        }
    }

    /// Serialize and send one envelope
    pub async fn send(&self, message: &Envelope) -> Result<(), SocketError> {
        if self.is_closed() {
            return Err(SocketError::Closed);
        }
        let payload = serde_json::to_string(message)
            .map_err(|err| SocketError::Protocol(format!("unserializable message: {err}")))?;
        self.sender
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(SocketError::from)
    }

    /// Close with a code and reason; only the first call sends a frame
    pub async fn close(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(code, reason, "closing client socket");
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        let _ = self
            .sender
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
