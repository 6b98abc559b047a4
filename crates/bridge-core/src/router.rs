//! Command routing from the HTTP boundary to the broker.
//!
//! The router validates a request, builds the [`OutboundCommand`] and
//! publishes it once. Success means the broker link accepted the publish,
//! not that a device applied it.

use async_trait::async_trait;
use bytes::Bytes;
use ledbridge_protocol::{codec, EffectConfig, OutboundCommand};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::topics::TopicMap;

/// A failed publish.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The broker link rejected the publish request.
    #[error("Broker rejected publish: {0}")]
    Rejected(String),

    /// No broker session is up.
    #[error("Broker not connected")]
    NotConnected,

    /// The payload could not be encoded.
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] ledbridge_protocol::ProtocolError),
}

/// Command errors reported to the caller.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A required request field is missing or empty.
    #[error("{0}")]
    Validation(&'static str),

    /// Publishing to the broker failed.
    #[error("Failed to send command to broker: {0}")]
    Publish(#[from] PublishError),
}

impl CommandError {
    /// Check if this is a caller error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, CommandError::Validation(_))
    }
}

/// Something that can publish a payload to a broker topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload once, without retry.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;
}

/// Which command a request maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Run an effect now.
    SendEffect,
    /// Store an effect's default config on the device.
    SaveDefault,
}

impl CommandKind {
    /// Get a short name for logging and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SendEffect => "send_effect",
            CommandKind::SaveDefault => "save_default",
        }
    }
}

/// Routes effect commands to the broker.
pub struct CommandRouter {
    publisher: Arc<dyn Publisher>,
    topics: TopicMap,
}

impl CommandRouter {
    /// Create a new router.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>, topics: TopicMap) -> Self {
        Self { publisher, topics }
    }

    /// Ask a device to run an effect.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] if `client_id` or `effect_name`
    /// is missing, or [`CommandError::Publish`] if the broker link fails.
    pub async fn send_effect(
        &self,
        client_id: Option<&str>,
        effect_name: Option<&str>,
        config: Option<EffectConfig>,
    ) -> Result<OutboundCommand, CommandError> {
        self.dispatch(CommandKind::SendEffect, client_id, effect_name, config)
            .await
    }

    /// Ask a device to store an effect's default config.
    ///
    /// # Errors
    ///
    /// Same as [`CommandRouter::send_effect`].
    pub async fn save_default(
        &self,
        client_id: Option<&str>,
        effect_name: Option<&str>,
        config: Option<EffectConfig>,
    ) -> Result<OutboundCommand, CommandError> {
        self.dispatch(CommandKind::SaveDefault, client_id, effect_name, config)
            .await
    }

    /// Validate, build and publish a command.
    ///
    /// # Errors
    ///
    /// See [`CommandRouter::send_effect`].
    pub async fn dispatch(
        &self,
        kind: CommandKind,
        client_id: Option<&str>,
        effect_name: Option<&str>,
        config: Option<EffectConfig>,
    ) -> Result<OutboundCommand, CommandError> {
        let command = build_command(client_id, effect_name, config)?;
        let topic = match kind {
            CommandKind::SendEffect => self.topics.effect(),
            CommandKind::SaveDefault => self.topics.save_default(),
        };

        let payload = codec::encode_command(&command).map_err(PublishError::from)?;
        debug!(
            command = kind.as_str(),
            device = %command.client_id,
            topic = %topic,
            "Publishing command"
        );

        if let Err(e) = self.publisher.publish(topic, payload).await {
            warn!(command = kind.as_str(), device = %command.client_id, error = %e, "Publish failed");
            return Err(e.into());
        }

        info!(
            command = kind.as_str(),
            device = %command.client_id,
            effect = %command.effect_name,
            "Command sent"
        );
        Ok(command)
    }
}

/// Check required fields and build the command.
///
/// # Errors
///
/// Returns [`CommandError::Validation`] naming the first missing field.
pub fn build_command(
    client_id: Option<&str>,
    effect_name: Option<&str>,
    config: Option<EffectConfig>,
) -> Result<OutboundCommand, CommandError> {
    let client_id = client_id
        .filter(|s| !s.is_empty())
        .ok_or(CommandError::Validation("client_id is required."))?;
    let effect_name = effect_name
        .filter(|s| !s.is_empty())
        .ok_or(CommandError::Validation("effect_name is required."))?;

    Ok(OutboundCommand::new(client_id, effect_name).with_config(config.unwrap_or_default()))
}
