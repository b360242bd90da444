//! Control channel: document → worker messaging.
//!
//! One-directional and fire-and-forget. Exactly one payload is recognized,
//! the skip-waiting sentinel; everything else is ignored silently. There is
//! no acknowledgment and no delivery guarantee beyond the queue existing
//! while the target worker is alive.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tracing::trace;

/// The single recognized control payload: activate now instead of waiting
/// for every open tab to close.
pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// A message posted from the document context to a worker generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Arbitrary JSON payload.
    pub data: JsonValue,
}

impl ControlMessage {
    /// Wrap a raw payload.
    pub fn new(data: JsonValue) -> Self {
        Self { data }
    }

    /// The skip-waiting sentinel message.
    pub fn skip_waiting() -> Self {
        Self {
            data: json!({ "type": SKIP_WAITING }),
        }
    }

    /// Check whether this is the skip-waiting sentinel.
    pub fn is_skip_waiting(&self) -> bool {
        self.data.get("type").and_then(JsonValue::as_str) == Some(SKIP_WAITING)
    }
}

/// Sender half held by the document context.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlChannel {
    /// Create a channel pair.
    pub fn new() -> (Self, ControlReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ControlReceiver { rx })
    }

    /// Post a message. Fire-and-forget: if the worker is gone, the message
    /// is dropped.
    pub fn post(&self, message: ControlMessage) {
        if self.tx.send(message).is_err() {
            trace!("control message dropped, worker gone");
        }
    }
}

/// Receiver half held by the worker generation.
#[derive(Debug)]
pub struct ControlReceiver {
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl ControlReceiver {
    /// Wait for the next message. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<ControlMessage> {
        self.rx.try_recv().ok()
    }
}
