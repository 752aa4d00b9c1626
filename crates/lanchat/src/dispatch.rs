//! Delivery of wait-loop output to the outside world.
//!
//! The dispatcher owns a single delivery task. Everything handed to it is
//! queued FIFO and passed to the [`EventSink`] one call at a time, so a sink
//! sees notifications in exactly the order one wait loop produced them.

use crate::protocol::InboundEvent;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Receiver of inbound events and connection notifications.
///
/// Called from the dispatcher's delivery task. Marshalling onto a UI thread,
/// if one is involved, is up to the implementation.
pub trait EventSink: Send + 'static {
    fn on_event(&self, event: InboundEvent);

    /// Informational: the wait loop hit a network error and will retry.
    fn on_transport_error(&self, message: String);

    /// The wait loop has exited.
    fn on_disconnected(&self) {}
}

/// Everything the dispatcher can deliver, as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Inbound { event: InboundEvent },
    TransportError { message: String },
    Disconnected,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Inbound { event } => write!(f, "{event}"),
            SessionEvent::TransportError { message } => write!(f, "[Error] {message}"),
            SessionEvent::Disconnected => write!(f, "[Disconnected]"),
        }
    }
}

/// [`EventSink`] that forwards into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: InboundEvent) {
        self.forward(SessionEvent::Inbound { event });
    }

    fn on_transport_error(&self, message: String) {
        self.forward(SessionEvent::TransportError { message });
    }

    fn on_disconnected(&self) {
        self.forward(SessionEvent::Disconnected);
    }
}

/// Handle for queueing notifications to the delivery task.
///
/// Cheap to clone. The delivery task ends once every handle is dropped and
/// the queue has drained.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Dispatcher {
    /// Spawn the delivery task for `sink`. Must be called inside a tokio runtime.
    pub fn spawn(sink: impl EventSink) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    SessionEvent::Inbound { event } => sink.on_event(event),
                    SessionEvent::TransportError { message } => sink.on_transport_error(message),
                    SessionEvent::Disconnected => sink.on_disconnected(),
                }
            }
            tracing::debug!("event dispatcher drained");
        });
        Self { tx }
    }

    pub fn dispatch(&self, event: InboundEvent) {
        self.push(SessionEvent::Inbound { event });
    }

    pub fn notify_transport_error(&self, message: impl Into<String>) {
        self.push(SessionEvent::TransportError {
            message: message.into(),
        });
    }

    pub fn notify_disconnected(&self) {
        self.push(SessionEvent::Disconnected);
    }

    fn push(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("dispatcher task gone, dropping notification");
        }
    }
}
