//! Broker ingress processing and viewer fan-out.
//!
//! The [`Bridge`] owns the device registry and the viewer hub. Broker
//! messages are fed through [`run_ingress`], a single task that applies
//! them in delivery order; HTTP handlers and viewers only read.

use ledbridge_protocol::{codec, DeviceSnapshot, EffectDescriptor, PresenceStatus, ProtocolError};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};

use crate::message::BrokerMessage;
use crate::registry::{DeviceRegistry, RegistryStats};
use crate::topics::{TopicKind, TopicMap};
use crate::viewers::{ViewerHub, ViewerId, ViewerUpdates};

/// What happened to a broker message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingress {
    /// Presence applied; `recipients` viewers were pushed the new set.
    Presence {
        /// Number of viewers that received the snapshot.
        recipients: usize,
    },
    /// Capability list stored.
    Capabilities,
    /// Payload could not be decoded; registry unchanged.
    Dropped,
    /// Topic is not one the bridge handles.
    Ignored,
}

impl Ingress {
    /// Get a short name for logging and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Ingress::Presence { .. } => "presence",
            Ingress::Capabilities => "capabilities",
            Ingress::Dropped => "dropped",
            Ingress::Ignored => "ignored",
        }
    }
}

/// A newly connected viewer.
#[derive(Debug)]
pub struct ViewerSession {
    /// Viewer identifier, used to disconnect.
    pub id: ViewerId,
    /// Snapshots pushed to this viewer, starting with the current set.
    pub updates: ViewerUpdates,
}

/// Authoritative device state plus the viewers watching it.
pub struct Bridge {
    registry: RwLock<DeviceRegistry>,
    viewers: ViewerHub,
    topics: TopicMap,
}

impl Bridge {
    /// Create a bridge with an empty registry.
    #[must_use]
    pub fn new(topics: TopicMap) -> Self {
        Self {
            registry: RwLock::new(DeviceRegistry::new()),
            viewers: ViewerHub::new(),
            topics,
        }
    }

    /// Dispatch one broker message by topic.
    ///
    /// Never fails: undecodable payloads are logged and dropped.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> Ingress {
        match self.topics.classify(topic) {
            Some(TopicKind::Presence) => self.apply_presence(payload).await,
            Some(TopicKind::Capabilities { suffix }) => {
                self.apply_capabilities(suffix, payload).await
            }
            None => {
                trace!(topic = %topic, "Ignoring message on unhandled topic");
                Ingress::Ignored
            }
        }
    }

    /// Apply a presence announcement and push the new set to every viewer.
    pub async fn apply_presence(&self, payload: &[u8]) -> Ingress {
        let event = match codec::decode_presence(payload) {
            Ok(event) => event,
            Err(e) => return dropped("presence", &e),
        };

        // Fan-out happens under the write lock so pushes leave in mutation order.
        let mut registry = self.registry.write().await;
        let changed = match event.status {
            PresenceStatus::Connected => registry.set_online(&event.client_id),
            PresenceStatus::Disconnected => registry.set_offline(&event.client_id),
        };
        let snapshot = registry.snapshot();
        let recipients = self.viewers.broadcast(&snapshot);
        drop(registry);

        info!(
            device = %event.client_id,
            status = event.status.as_str(),
            changed,
            online = snapshot.len(),
            recipients,
            "Presence updated"
        );
        Ingress::Presence { recipients }
    }

    /// Store a capability announcement, replacing any previous one.
    ///
    /// The device id is taken from the payload; `topic_suffix` is only
    /// checked for consistency.
    pub async fn apply_capabilities(&self, topic_suffix: &str, payload: &[u8]) -> Ingress {
        let event = match codec::decode_capabilities(payload) {
            Ok(event) => event,
            Err(e) => return dropped("capabilities", &e),
        };

        if !topic_suffix.is_empty() && topic_suffix != event.client_id {
            warn!(
                device = %event.client_id,
                topic_suffix = %topic_suffix,
                "Capability topic does not match payload client_id, using payload"
            );
        }

        let count = event.effects.len();
        self.registry
            .write()
            .await
            .replace_effects(&event.client_id, event.effects);

        info!(device = %event.client_id, effects = count, "Capabilities updated");
        Ingress::Capabilities
    }

    /// Register a viewer and queue the current online set for it alone.
    pub async fn connect_viewer(&self) -> ViewerSession {
        // Hold the read lock so no presence change slips between the
        // initial push and registration.
        let registry = self.registry.read().await;
        let (id, updates) = self.viewers.register();
        self.viewers.push_to(id, registry.snapshot());
        drop(registry);

        ViewerSession { id, updates }
    }

    /// Remove a viewer from the delivery set.
    pub fn disconnect_viewer(&self, id: ViewerId) {
        self.viewers.remove(id);
    }

    /// Get the number of connected viewers.
    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Get the current online set.
    pub async fn online_devices(&self) -> DeviceSnapshot {
        self.registry.read().await.snapshot()
    }

    /// Get a device's announced effects, empty if never announced.
    pub async fn device_effects(&self, device_id: &str) -> Vec<EffectDescriptor> {
        self.registry
            .read()
            .await
            .effects(device_id)
            .map(<[EffectDescriptor]>::to_vec)
            .unwrap_or_default()
    }

    /// Check if a device is online.
    pub async fn is_online(&self, device_id: &str) -> bool {
        self.registry.read().await.is_online(device_id)
    }

    /// Get registry statistics.
    pub async fn stats(&self) -> RegistryStats {
        self.registry.read().await.stats()
    }
}

fn dropped(kind: &'static str, error: &ProtocolError) -> Ingress {
    warn!(kind, error = %error, "Dropping malformed broker payload");
    Ingress::Dropped
}

/// Consume broker messages until the sending side closes.
///
/// This is the only task that mutates the registry; messages are applied
/// strictly in the order they were queued. `on_ingress` is called after
/// each message with its outcome.
pub async fn run_ingress<F>(
    bridge: Arc<Bridge>,
    mut rx: mpsc::Receiver<BrokerMessage>,
    mut on_ingress: F,
) where
    F: FnMut(&BrokerMessage, Ingress) + Send,
{
    info!("Ingress processing started");

    while let Some(message) = rx.recv().await {
        let queued_ms = message.queued_for_ms();
        let outcome = bridge.handle_message(&message.topic, &message.payload).await;
        debug!(
            topic = %message.topic,
            bytes = message.payload_size(),
            queued_ms,
            outcome = outcome.as_str(),
            "Processed broker message"
        );
        on_ingress(&message, outcome);
    }

    info!("Ingress queue closed, processing stopped");
}
