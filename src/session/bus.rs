//! Chat bus
//!
//! The synchronization point of a session: an append-only history plus
//! ordered fan-out to subscribers. `publish` appends to history and
//! enqueues; a single dispatcher task delivers each message to every
//! subscriber in registration order, awaiting each handler before moving
//! on. Handlers may publish new messages re-entrantly (they only enqueue),
//! and a failing handler is logged without stopping delivery to later
//! subscribers.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::types::{now_secs, Envelope};

/// A long-running message consumer registered on the bus
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawn any long-running reader tasks; the orchestrator owns the
    /// returned handles
    async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        Vec::new()
    }

    /// Request cooperative shutdown; idempotent
    fn stop(&self);

    /// Observe one published message; invocations are serialized per
    /// subscriber in bus order
    async fn handle(&self, message: &Envelope) -> Result<()>;
}

/// Append-only history plus the publish side of the dispatch queue
pub struct ChatBus {
    history: Mutex<Vec<Arc<Envelope>>>,
    queue: mpsc::UnboundedSender<Arc<Envelope>>,
}

impl ChatBus {
    /// Create the bus and the receive side its dispatcher consumes
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<Envelope>>) {
        let (queue, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                history: Mutex::new(Vec::new()),
                queue,
            }),
            receiver,
        )
    }

    /// Append to history and enqueue for delivery. Fails only after the
    /// dispatcher has shut down.
    pub fn publish(&self, mut message: Envelope) -> Result<()> {
        if message.timestamp == 0.0 {
            message.timestamp = now_secs();
        }
        debug!(
            kind = %message.kind(),
            role = %message.role,
            end_of_turn = message.end_of_turn,
            "publishing message"
        );
        let message = Arc::new(message);
        self.history
            .lock()
            .expect("history lock poisoned")
            .push(message.clone());
        self.queue
            .send(message)
            .map_err(|_| anyhow!("bus dispatcher has shut down"))
    }

    /// Read-only snapshot of the history in publish order
    pub fn snapshot(&self) -> Vec<Arc<Envelope>> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().expect("history lock poisoned").len()
    }
}

/// Deliver queued messages to every subscriber in registration order.
/// Runs until the queue closes (all publishers dropped) or the task is
/// aborted by the orchestrator.
pub async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Arc<Envelope>>,
    subscribers: Vec<Arc<dyn Subscriber>>,
) {
    while let Some(message) = receiver.recv().await {
        for subscriber in &subscribers {
            if let Err(err) = subscriber.handle(&message).await {
                warn!(
                    subscriber = subscriber.name(),
                    kind = %message.kind(),
                    %err,
                    "subscriber handler failed"
                );
            }
        }
    }
    debug!("bus dispatcher drained");
}
