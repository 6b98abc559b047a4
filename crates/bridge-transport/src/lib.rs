//! # ledbridge-transport
//!
//! Broker link for the LED bridge.
//!
//! The bridge keeps exactly one MQTT session. It is split in two halves:
//!
//! - **`MqttLink`** - cheap to clone, implements `Publisher` for commands
//! - **`BrokerEventLoop`** - owns the socket, subscribes on every connect
//!   and feeds incoming messages to the ingress queue
//!
//! ```rust,ignore
//! use ledbridge_transport::{BrokerOptions, MqttLink};
//!
//! let (link, event_loop) = MqttLink::new(&BrokerOptions::default(), &topics)?;
//! let (tx, rx) = tokio::sync::mpsc::channel(1024);
//! tokio::spawn(event_loop.run(tx));
//! ```

pub mod error;
pub mod mqtt;
pub mod options;

pub use error::TransportError;
pub use mqtt::{BrokerEventLoop, MqttLink};
pub use options::BrokerOptions;
