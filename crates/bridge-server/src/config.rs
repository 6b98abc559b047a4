//! Server configuration.
//!
//! Configuration is layered:
//! - Built-in defaults
//! - TOML configuration file (`LEDBRIDGE_CONFIG`, or the first of the default paths)
//! - Environment variables (`LEDBRIDGE_*`, `__` between section and key,
//!   e.g. `LEDBRIDGE_BROKER__HOST`)

use anyhow::{Context, Result};
use ledbridge_core::TopicMap;
use ledbridge_transport::BrokerOptions;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
const CONFIG_PATH_ENV: &str = "LEDBRIDGE_CONFIG";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "LEDBRIDGE";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of the web frontend, served for unmatched paths.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Path of the viewer push channel.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Broker topic names.
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker host.
    #[serde(default = "default_broker_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// MQTT client id of the bridge.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Username, if the broker requires one.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `username`.
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Delay before reconnecting after a transport error, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// QoS level for subscriptions and publishes.
    #[serde(default)]
    pub qos: u8,

    /// Capacity of the ingress queue.
    #[serde(default = "default_ingress_capacity")]
    pub ingress_capacity: usize,
}

/// Broker topic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Presence announcements.
    #[serde(default = "default_presence_topic")]
    pub presence: String,

    /// Capability announcements namespace (`<prefix>/<device id>`).
    #[serde(default = "default_capability_prefix")]
    pub capability_prefix: String,

    /// Effect commands.
    #[serde(default = "default_effect_topic")]
    pub effect: String,

    /// Save-default commands.
    #[serde(default = "default_save_default_topic")]
    pub save_default: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "ledbridge".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    2_000
}

fn default_ingress_capacity() -> usize {
    1024
}

fn default_presence_topic() -> String {
    "led/clients".to_string()
}

fn default_capability_prefix() -> String {
    "led/effects".to_string()
}

fn default_effect_topic() -> String {
    "led/effect".to_string()
}

fn default_save_default_topic() -> String {
    "led/effect/save-default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            websocket_path: default_ws_path(),
            broker: BrokerConfig::default(),
            topics: TopicsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            reconnect_delay_ms: default_reconnect_delay(),
            qos: 0,
            ingress_capacity: default_ingress_capacity(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            presence: default_presence_topic(),
            capability_prefix: default_capability_prefix(),
            effect: default_effect_topic(),
            save_default: default_save_default_topic(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl BrokerConfig {
    /// Build the broker link options.
    #[must_use]
    pub fn to_options(&self) -> BrokerOptions {
        let credentials = match (&self.username, &self.password) {
            (Some(user), password) => Some((user.clone(), password.clone().unwrap_or_default())),
            (None, _) => None,
        };

        BrokerOptions {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            credentials,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            ingress_capacity: self.ingress_capacity,
            qos: self.qos,
            ..BrokerOptions::default()
        }
    }
}

impl TopicsConfig {
    /// Build and validate the topic map.
    ///
    /// # Errors
    ///
    /// Returns an error if a topic name is invalid.
    pub fn to_topic_map(&self) -> Result<TopicMap> {
        let topics = TopicMap::new(
            self.presence.as_str(),
            self.capability_prefix.as_str(),
            self.effect.as_str(),
            self.save_default.as_str(),
        )?;
        Ok(topics)
    }
}

impl Config {
    /// Load configuration from file, environment and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or
    /// an environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Some(PathBuf::from(shellexpand::tilde(&path).as_ref())),
            Err(_) => Self::find_config_file(),
        };

        Self::load_layered(path.as_deref())
    }

    /// Find the first existing config file among the default paths.
    fn find_config_file() -> Option<PathBuf> {
        let config_paths = [
            "ledbridge.toml",
            "/etc/ledbridge/ledbridge.toml",
            "~/.config/ledbridge/ledbridge.toml",
        ];

        config_paths
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Layer an optional TOML file and `LEDBRIDGE_*` variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong type.
    pub fn load_layered(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            tracing::info!("Loading configuration from {}", path.display());
            builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Toml));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize::<Config>()
            .context("Failed to parse configuration")?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.topics.presence, "led/clients");
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 3000);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 8000

            [broker]
            host = "broker.local"
            username = "bridge"

            [topics]
            presence = "house/clients"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.topics.presence, "house/clients");
        assert_eq!(config.topics.effect, "led/effect");

        let options = config.broker.to_options();
        assert_eq!(options.credentials, Some(("bridge".into(), String::new())));
    }

    #[test]
    fn test_load_layered_file() {
        let path = std::env::temp_dir().join(format!("ledbridge-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port = 4100\n[metrics]\nenabled = false").unwrap();
        drop(file);

        let config = Config::load_layered(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 4100);
        assert!(!config.metrics.enabled);
        assert_eq!(config.websocket_path, "/ws");
    }

    #[test]
    fn test_topic_map_validation() {
        let mut topics = TopicsConfig::default();
        assert!(topics.to_topic_map().is_ok());

        topics.capability_prefix = "led/effects/#".into();
        assert!(topics.to_topic_map().is_err());
    }
}
