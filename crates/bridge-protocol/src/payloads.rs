//! Payload types exchanged with the broker and the push channel.
//!
//! All payloads are JSON objects. Devices announce themselves with
//! [`PresenceEvent`] and [`CapabilityEvent`]; the bridge publishes
//! [`OutboundCommand`] and pushes [`DeviceSnapshot`] to viewers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A device-defined effect description, stored and relayed verbatim.
pub type EffectDescriptor = Value;

/// Free-form effect parameters attached to a command.
pub type EffectConfig = Map<String, Value>;

/// Presence status announced by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Device came online.
    Connected,
    /// Device went offline.
    Disconnected,
}

impl PresenceStatus {
    /// Get the wire name of this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Connected => "connected",
            PresenceStatus::Disconnected => "disconnected",
        }
    }
}

/// A device presence announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Device identifier.
    pub client_id: String,
    /// Announced status.
    pub status: PresenceStatus,
}

/// A device capability announcement.
///
/// A missing or `null` `effects` field decodes to an empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEvent {
    /// Device identifier.
    pub client_id: String,
    /// Effects the device supports, in announcement order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub effects: Vec<EffectDescriptor>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<EffectDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<EffectDescriptor>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A command published to a device.
///
/// The same shape is used for effect selection and for saving defaults;
/// only the destination topic differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    /// Target device.
    pub client_id: String,
    /// Effect to run or configure.
    pub effect_name: String,
    /// Effect parameters.
    #[serde(default)]
    pub config: EffectConfig,
}

impl OutboundCommand {
    /// Create a command with an empty config.
    #[must_use]
    pub fn new(client_id: impl Into<String>, effect_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            effect_name: effect_name.into(),
            config: EffectConfig::new(),
        }
    }

    /// Attach effect parameters.
    #[must_use]
    pub fn with_config(mut self, config: EffectConfig) -> Self {
        self.config = config;
        self
    }
}

/// The full set of online devices, as pushed to viewers.
///
/// Serializes as a plain JSON array of device identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSnapshot(pub Vec<String>);

impl DeviceSnapshot {
    /// Create a snapshot from device identifiers.
    #[must_use]
    pub fn new(devices: Vec<String>) -> Self {
        Self(devices)
    }

    /// Get the device identifiers.
    #[must_use]
    pub fn devices(&self) -> &[String] {
        &self.0
    }

    /// Get the number of online devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no device is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_status_wire_names() {
        let event = PresenceEvent {
            client_id: "tree-1".into(),
            status: PresenceStatus::Disconnected,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"client_id": "tree-1", "status": "disconnected"}));
        assert_eq!(PresenceStatus::Connected.as_str(), "connected");
    }

    #[test]
    fn test_capability_effects_default_to_empty() {
        let event: CapabilityEvent = serde_json::from_value(json!({"client_id": "tree-1"})).unwrap();
        assert!(event.effects.is_empty());

        let event: CapabilityEvent =
            serde_json::from_value(json!({"client_id": "tree-1", "effects": null})).unwrap();
        assert!(event.effects.is_empty());
    }

    #[test]
    fn test_command_config_defaults_to_empty_object() {
        let command = OutboundCommand::new("A", "rainbow");
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({"client_id": "A", "effect_name": "rainbow", "config": {}})
        );
    }

    #[test]
    fn test_snapshot_is_plain_array() {
        let snapshot = DeviceSnapshot::new(vec!["A".into(), "B".into()]);
        assert_eq!(serde_json::to_string(&snapshot).unwrap(), r#"["A","B"]"#);
    }
}
