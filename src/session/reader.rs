//! Client reader
//!
//! Pumps envelopes from the client socket onto the bus and enforces the
//! initialize handshake: the first message of a session must be
//! `initialize`, and there is exactly one. Violations and malformed frames
//! close the socket with 1008; the loop exiting is what triggers session
//! teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::types::{Envelope, MessageKind};

use super::bus::{ChatBus, Subscriber};
use super::socket::{SocketError, TypedSocket, CLOSE_POLICY};

pub struct UserReader {
    socket: Arc<TypedSocket>,
    bus: Arc<ChatBus>,
    stopped: AtomicBool,
    initialized: AtomicBool,
}

impl UserReader {
    pub fn new(socket: Arc<TypedSocket>, bus: Arc<ChatBus>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            bus,
            stopped: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        })
    }

    /// Enforce spec invariant: exactly one `initialize`, and it is first
    fn check_handshake(&self, message: &Envelope) -> Result<(), String> {
        let is_initialize = message.kind() == MessageKind::Initialize;
        let initialized = self.initialized.load(Ordering::SeqCst);
        match (is_initialize, initialized) {
            (true, true) => Err("duplicate initialize message".to_string()),
            (false, false) => Err(format!(
                "expected initialize as the first message, got {}",
                message.kind()
            )),
            (true, false) => {
                self.initialized.store(true, Ordering::SeqCst);
                Ok(())
            }
            (false, true) => Ok(()),
        }
    }

    async fn pump(self: Arc<Self>) {
        while !self.stopped.load(Ordering::SeqCst) {
            match self.socket.receive().await {
                Ok(Some(message)) => {
                    if let Err(reason) = self.check_handshake(&message) {
                        warn!(%reason, "protocol violation from client");
                        self.socket
                            .close(CLOSE_POLICY, &format!("protocol error: {reason}"))
                            .await;
                        break;
                    }
                    if self.bus.publish(message).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("client disconnected");
                    break;
                }
                Err(SocketError::Protocol(reason)) => {
                    warn!(%reason, "malformed client frame");
                    self.socket
                        .close(CLOSE_POLICY, &format!("protocol error: {reason}"))
                        .await;
                    break;
                }
                Err(err) => {
                    warn!(%err, "client socket failed");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Subscriber for UserReader {
    fn name(&self) -> &'static str {
        "user-reader"
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
