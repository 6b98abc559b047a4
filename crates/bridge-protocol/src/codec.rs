//! JSON codec for broker payloads.
//!
//! Broker traffic is untrusted: every decode path returns a
//! [`ProtocolError`] instead of panicking so malformed messages can be
//! logged and dropped at the ingress boundary.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::payloads::{CapabilityEvent, DeviceSnapshot, OutboundCommand, PresenceEvent};

/// Maximum accepted payload size (256 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds maximum size.
    #[error("Payload size {0} exceeds maximum {MAX_PAYLOAD_SIZE}")]
    PayloadTooLarge(usize),

    /// Payload is not the expected JSON shape.
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload has an empty device identifier.
    #[error("Payload is missing client_id")]
    MissingClientId,
}

fn decode_json<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    Ok(serde_json::from_slice(data)?)
}

/// Decode a presence announcement.
///
/// # Errors
///
/// Returns an error if the payload is too large, not valid JSON, has an
/// unknown status, or carries an empty `client_id`.
pub fn decode_presence(data: &[u8]) -> Result<PresenceEvent, ProtocolError> {
    let event: PresenceEvent = decode_json(data)?;
    if event.client_id.is_empty() {
        return Err(ProtocolError::MissingClientId);
    }
    Ok(event)
}

/// Decode a capability announcement.
///
/// # Errors
///
/// Returns an error if the payload is too large, not valid JSON, or
/// carries an empty `client_id`.
pub fn decode_capabilities(data: &[u8]) -> Result<CapabilityEvent, ProtocolError> {
    let event: CapabilityEvent = decode_json(data)?;
    if event.client_id.is_empty() {
        return Err(ProtocolError::MissingClientId);
    }
    Ok(event)
}

/// Encode a command for publishing.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_command(command: &OutboundCommand) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(command)?))
}

/// Encode a device snapshot as a push-channel text message.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_snapshot(snapshot: &DeviceSnapshot) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(snapshot)?)
}
