//! Client writer
//!
//! Forwards client-bound bus messages to the socket: everything except the
//! user's own input and the `initialize` handshake. Write failures downgrade
//! to logging; the reader's exit path owns teardown when the socket is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::types::{Envelope, MessageKind, Role};

use super::bus::Subscriber;
use super::socket::TypedSocket;

pub struct UserWriter {
    socket: Arc<TypedSocket>,
    stopped: AtomicBool,
}

impl UserWriter {
    pub fn new(socket: Arc<TypedSocket>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Subscriber for UserWriter {
    fn name(&self) -> &'static str {
        "user-writer"
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn handle(&self, message: &Envelope) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        // The user's own input and the handshake are not client-bound
        if message.role == Role::User || message.kind() == MessageKind::Initialize {
            return Ok(());
        }
        if let Err(err) = self.socket.send(message).await {
            debug!(%err, kind = %message.kind(), "dropping client-bound message");
        }
        Ok(())
    }
}
