//! # ledbridge-protocol
//!
//! Payload definitions for the LED bridge.
//!
//! The bridge speaks JSON on both sides:
//!
//! - **Broker** - presence and capability announcements from devices,
//!   effect commands to devices
//! - **Push channel** - the full set of online devices, sent to viewers
//!
//! ## Example
//!
//! ```rust
//! use ledbridge_protocol::{codec, PresenceStatus};
//!
//! let event = codec::decode_presence(br#"{"client_id":"tree","status":"connected"}"#).unwrap();
//! assert_eq!(event.status, PresenceStatus::Connected);
//! ```

pub mod codec;
pub mod payloads;

pub use codec::{decode_capabilities, decode_presence, encode_command, ProtocolError};
pub use payloads::{
    CapabilityEvent, DeviceSnapshot, EffectConfig, EffectDescriptor, OutboundCommand,
    PresenceEvent, PresenceStatus,
};
