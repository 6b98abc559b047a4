//! Broker connection options.

use rumqttc::{MqttOptions, QoS};
use std::time::Duration;

use crate::error::TransportError;

/// Smallest keep-alive the MQTT client accepts.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Options for the broker session.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier of the bridge.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Start every session without stored state.
    pub clean_session: bool,
    /// Optional username and password.
    pub credentials: Option<(String, String)>,
    /// Pause after a transport error before the client reconnects.
    pub reconnect_delay: Duration,
    /// Capacity of the client request queue.
    pub request_capacity: usize,
    /// Capacity of the ingress queue towards the bridge.
    pub ingress_capacity: usize,
    /// QoS level (0, 1 or 2) for subscriptions and publishes.
    pub qos: u8,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "ledbridge".to_string(),
            keep_alive: Duration::from_secs(30),
            clean_session: true,
            credentials: None,
            reconnect_delay: Duration::from_secs(2),
            request_capacity: 64,
            ingress_capacity: 1024,
            qos: 0,
        }
    }
}

impl BrokerOptions {
    /// Create options for a broker address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Check the options before connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if a field is out of range.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::InvalidOptions("broker host is empty".into()));
        }
        if self.client_id.is_empty() {
            return Err(TransportError::InvalidOptions("client id is empty".into()));
        }
        if self.qos > 2 {
            return Err(TransportError::InvalidOptions(format!(
                "QoS must be 0, 1 or 2, got {}",
                self.qos
            )));
        }
        if self.request_capacity == 0 || self.ingress_capacity == 0 {
            return Err(TransportError::InvalidOptions(
                "queue capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the QoS level.
    #[must_use]
    pub fn qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }

    /// Build the MQTT client options.
    #[must_use]
    pub fn to_mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive.max(MIN_KEEP_ALIVE));
        options.set_clean_session(self.clean_session);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}
