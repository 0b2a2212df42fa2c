//! Side channel for notices and session signals.
//!
//! The core emits `ClientEvent`s without knowing whether anyone listens.
//! A front end subscribes and decides how (or whether) to render them.

use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A user-visible, fire-and-forget message
    Notice { level: NoticeLevel, message: String },
    /// The session could not be renewed; the user must log in again
    LoginRequired,
}

/// Cloneable broadcast handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Send an event; never fails, even with no subscribers
    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(ClientEvent::Notice {
            level,
            message: message.into(),
        });
    }
}

/// Drain everything currently buffered on a receiver without waiting.
pub fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    use broadcast::error::TryRecvError;

    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Event receiver lagged");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    events
}
