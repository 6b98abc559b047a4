//! Broker topic names and ingress dispatch.
//!
//! Topic names are configuration; their meaning is fixed. Incoming topics
//! are classified by exact match against the presence topic first, then by
//! prefix match against the capability namespace.

use thiserror::Error;

/// Maximum topic name length.
pub const MAX_TOPIC_LENGTH: usize = 256;

/// Multi-level wildcard suffix used for the capability subscription.
const MULTI_LEVEL_WILDCARD: &str = "#";

/// Invalid topic configuration.
#[derive(Debug, Error)]
#[error("Invalid topic {topic:?}: {reason}")]
pub struct TopicError {
    /// Offending topic name.
    pub topic: String,
    /// What is wrong with it.
    pub reason: &'static str,
}

/// Validate a concrete topic name.
///
/// # Errors
///
/// Returns an error message if the topic name is invalid.
pub fn validate_topic(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Topic name cannot be empty");
    }
    if name.len() > MAX_TOPIC_LENGTH {
        return Err("Topic name too long");
    }
    if name.contains(['#', '+']) {
        return Err("Topic name cannot contain wildcards");
    }
    if name.ends_with('/') {
        return Err("Topic name cannot end with '/'");
    }
    if name.chars().any(char::is_control) {
        return Err("Topic name contains invalid characters");
    }
    Ok(())
}

/// What an incoming topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind<'a> {
    /// Device presence announcements.
    Presence,
    /// Device capability announcements; `suffix` is the topic part after
    /// the namespace prefix (by convention the device id).
    Capabilities {
        /// Topic suffix after the capability prefix.
        suffix: &'a str,
    },
}

/// The broker topics the bridge subscribes and publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    presence: String,
    capability_prefix: String,
    effect: String,
    save_default: String,
}

impl Default for TopicMap {
    fn default() -> Self {
        Self {
            presence: "led/clients".to_string(),
            capability_prefix: "led/effects".to_string(),
            effect: "led/effect".to_string(),
            save_default: "led/effect/save-default".to_string(),
        }
    }
}

impl TopicMap {
    /// Create a topic map, validating every name.
    ///
    /// # Errors
    ///
    /// Returns an error if any topic name is invalid.
    pub fn new(
        presence: impl Into<String>,
        capability_prefix: impl Into<String>,
        effect: impl Into<String>,
        save_default: impl Into<String>,
    ) -> Result<Self, TopicError> {
        let map = Self {
            presence: presence.into(),
            capability_prefix: capability_prefix.into(),
            effect: effect.into(),
            save_default: save_default.into(),
        };

        for topic in [
            &map.presence,
            &map.capability_prefix,
            &map.effect,
            &map.save_default,
        ] {
            validate_topic(topic).map_err(|reason| TopicError {
                topic: topic.clone(),
                reason,
            })?;
        }

        Ok(map)
    }

    /// Presence topic (subscribed).
    #[must_use]
    pub fn presence(&self) -> &str {
        &self.presence
    }

    /// Capability namespace prefix.
    #[must_use]
    pub fn capability_prefix(&self) -> &str {
        &self.capability_prefix
    }

    /// Subscription filter matching every topic under the capability prefix.
    #[must_use]
    pub fn capability_filter(&self) -> String {
        format!("{}/{}", self.capability_prefix, MULTI_LEVEL_WILDCARD)
    }

    /// Effect command topic (published).
    #[must_use]
    pub fn effect(&self) -> &str {
        &self.effect
    }

    /// Save-default topic (published).
    #[must_use]
    pub fn save_default(&self) -> &str {
        &self.save_default
    }

    /// Subscription filters the broker link must register.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        vec![self.presence.clone(), self.capability_filter()]
    }

    /// Classify an incoming topic.
    ///
    /// Exact presence match wins over the capability prefix.
    #[must_use]
    pub fn classify<'a>(&self, topic: &'a str) -> Option<TopicKind<'a>> {
        if topic == self.presence {
            return Some(TopicKind::Presence);
        }

        topic
            .strip_prefix(self.capability_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|suffix| TopicKind::Capabilities { suffix })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("led/clients").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("led/#").is_err());
        assert!(validate_topic("led/+/x").is_err());
        assert!(validate_topic("led/").is_err());

        let long_name = "a".repeat(MAX_TOPIC_LENGTH + 1);
        assert!(validate_topic(&long_name).is_err());
    }

    #[test]
    fn test_classify_default_topics() {
        let topics = TopicMap::default();

        assert_eq!(topics.classify("led/clients"), Some(TopicKind::Presence));
        assert_eq!(
            topics.classify("led/effects/tree-1"),
            Some(TopicKind::Capabilities { suffix: "tree-1" })
        );
        assert_eq!(topics.classify("led/effect"), None);
        assert_eq!(topics.classify("led/effectsX/tree"), None);
        assert_eq!(topics.classify("led/effects"), None);
    }

    #[test]
    fn test_exact_match_takes_precedence() {
        // Presence topic lives inside the capability namespace.
        let topics = TopicMap::new("led/effects/presence", "led/effects", "a", "b").unwrap();

        assert_eq!(
            topics.classify("led/effects/presence"),
            Some(TopicKind::Presence)
        );
        assert_eq!(
            topics.classify("led/effects/tree"),
            Some(TopicKind::Capabilities { suffix: "tree" })
        );
    }

    #[test]
    fn test_subscriptions() {
        let topics = TopicMap::default();
        assert_eq!(
            topics.subscriptions(),
            vec!["led/clients".to_string(), "led/effects/#".to_string()]
        );
    }

    #[test]
    fn test_invalid_topic_map() {
        let err = TopicMap::new("led/clients", "led/effects/#", "a", "b").unwrap_err();
        assert_eq!(err.topic, "led/effects/#");
    }
}
