//! Broker messages entering the bridge.

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// A raw message received from the broker.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Undecoded payload.
    pub payload: Bytes,
    /// Receive timestamp in milliseconds since the Unix epoch.
    pub received_at: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl BrokerMessage {
    /// Create a new message stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: now_millis(),
        }
    }

    /// Milliseconds spent queued since the message was received.
    #[must_use]
    pub fn queued_for_ms(&self) -> u64 {
        now_millis().saturating_sub(self.received_at)
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
