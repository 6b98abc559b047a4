//! Transport errors.

use thiserror::Error;

/// Broker link errors.
///
/// These never reach HTTP callers or viewers; the event loop logs them
/// and keeps going.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker session failed or was lost.
    #[error("Broker connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// A request could not be queued on the client.
    #[error("Broker client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The bridge stopped consuming broker messages.
    #[error("Ingress queue closed")]
    IngressClosed,

    /// Options are out of range.
    #[error("Invalid broker options: {0}")]
    InvalidOptions(String),
}
