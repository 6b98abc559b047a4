//! Device registry.
//!
//! Holds which devices are online and the effects each one last announced.
//! The registry itself is plain owned state; [`crate::Bridge`] wraps it in a
//! single lock so both maps are always read and written together.

use ledbridge_protocol::{DeviceSnapshot, EffectDescriptor};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// In-memory view of device presence and capabilities.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Online device identifiers, kept sorted for stable snapshots.
    online: BTreeSet<String>,
    /// Latest capability announcement per device.
    effects: HashMap<String, Vec<EffectDescriptor>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a device as online.
    ///
    /// Returns `true` if the device was not online before.
    pub fn set_online(&mut self, device_id: impl Into<String>) -> bool {
        let device_id = device_id.into();
        let added = self.online.insert(device_id.clone());
        if added {
            debug!(device = %device_id, "Registry: device online");
        }
        added
    }

    /// Mark a device as offline.
    ///
    /// Returns `true` if the device was online before.
    pub fn set_offline(&mut self, device_id: &str) -> bool {
        let removed = self.online.remove(device_id);
        if removed {
            debug!(device = %device_id, "Registry: device offline");
        }
        removed
    }

    /// Replace the effect list announced by a device.
    ///
    /// Returns the previous list, if the device had announced one.
    pub fn replace_effects(
        &mut self,
        device_id: impl Into<String>,
        effects: Vec<EffectDescriptor>,
    ) -> Option<Vec<EffectDescriptor>> {
        let device_id = device_id.into();
        debug!(device = %device_id, count = effects.len(), "Registry: effects replaced");
        self.effects.insert(device_id, effects)
    }

    /// Check if a device is online.
    #[must_use]
    pub fn is_online(&self, device_id: &str) -> bool {
        self.online.contains(device_id)
    }

    /// Get the effects a device announced, or `None` if it never did.
    #[must_use]
    pub fn effects(&self, device_id: &str) -> Option<&[EffectDescriptor]> {
        self.effects.get(device_id).map(Vec::as_slice)
    }

    /// Get the online set as a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot::new(self.online.iter().cloned().collect())
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            online_count: self.online.len(),
            announced_count: self.effects.len(),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of online devices.
    pub online_count: usize,
    /// Number of devices with a known effect list.
    pub announced_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_online_offline_idempotent() {
        let mut registry = DeviceRegistry::new();

        assert!(registry.set_online("A"));
        assert!(!registry.set_online("A"));
        assert!(registry.is_online("A"));

        assert!(registry.set_offline("A"));
        assert!(!registry.set_offline("A"));
        assert!(!registry.is_online("A"));
    }

    #[test]
    fn test_devices_can_cycle() {
        let mut registry = DeviceRegistry::new();

        for _ in 0..3 {
            registry.set_online("A");
            assert!(registry.is_online("A"));
            registry.set_offline("A");
            assert!(!registry.is_online("A"));
        }
    }

    #[test]
    fn test_effects_unknown_vs_empty() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.effects("A").is_none());

        registry.replace_effects("A", vec![]);
        assert_eq!(registry.effects("A"), Some(&[][..]));
    }

    #[test]
    fn test_effects_replaced_not_merged() {
        let mut registry = DeviceRegistry::new();
        registry.replace_effects("A", vec![json!("x"), json!("y")]);

        let previous = registry.replace_effects("A", vec![json!("z")]);

        assert_eq!(previous, Some(vec![json!("x"), json!("y")]));
        assert_eq!(registry.effects("A"), Some(&[json!("z")][..]));
    }

    #[test]
    fn test_snapshot_sorted() {
        let mut registry = DeviceRegistry::new();
        registry.set_online("B");
        registry.set_online("A");

        assert_eq!(registry.snapshot().devices(), ["A", "B"]);
        assert_eq!(
            registry.stats(),
            RegistryStats {
                online_count: 2,
                announced_count: 0
            }
        );
    }
}
