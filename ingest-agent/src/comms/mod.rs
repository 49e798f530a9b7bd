//! Message-bus side of the agent: listeners that turn a transport into a
//! stream of [`BusEvent`]s, and the worker that persists them.

pub mod listeners;
pub mod mqtt;
pub mod worker;

use std::fmt;

pub use listeners::{ChannelListener, Listener};
pub use mqtt::MqttListener;
pub use worker::{IngestStats, IngestionWorker};

/// One delivered message, exactly as the transport handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic:       String,
    pub payload:     Vec<u8>,
    /// Milliseconds since the Unix epoch at which the listener took the
    /// message off the transport.
    pub received_at: i64,
}

impl BusMessage {
    /// Stamped with the current wall clock; listeners re-stamp through
    /// their own [`ReceiptClock`].
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic:       topic.into(),
            payload:     payload.into(),
            received_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Receipt stamps for one listener. Never steps back, even if the wall
/// clock does.
#[derive(Debug, Default)]
pub struct ReceiptClock {
    last: i64,
}

impl ReceiptClock {
    pub fn stamp(&mut self) -> i64 {
        self.observe(chrono::Utc::now().timestamp_millis())
    }

    fn observe(&mut self, now: i64) -> i64 {
        self.last = self.last.max(now);
        self.last
    }
}

/// What a listener reports to the ingestion worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Subscribed { topic: String },
    Message(BusMessage),
    Disconnected { reason: String },
}

/// Link state of the bus subscription as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Subscribed,
}

impl LinkState {
    /// Messages never change the state; only subscription events do.
    pub fn on_event(self, ev: &BusEvent) -> LinkState {
        match ev {
            BusEvent::Subscribed { .. }   => LinkState::Subscribed,
            BusEvent::Disconnected { .. } => LinkState::Disconnected,
            BusEvent::Message(_)          => self,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Subscribed   => "subscribed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
