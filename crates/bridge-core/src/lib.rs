//! # ledbridge-core
//!
//! State synchronization and routing for the LED bridge.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Which devices are online and what effects they support
//! - **Topics** - Broker topic names and ingress dispatch
//! - **Bridge** - Presence/capability processing and viewer fan-out
//! - **Viewers** - Push queues for connected viewers
//! - **Router** - Effect commands from HTTP callers to the broker
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Broker    │────▶│   Bridge    │────▶│   Viewers   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │
//!        │                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │   Router    │     │  Registry   │
//! └─────────────┘     └─────────────┘
//! ```

pub mod bridge;
pub mod message;
pub mod registry;
pub mod router;
pub mod topics;
pub mod viewers;

pub use bridge::{run_ingress, Bridge, Ingress, ViewerSession};
pub use message::BrokerMessage;
pub use registry::{DeviceRegistry, RegistryStats};
pub use router::{CommandError, CommandKind, CommandRouter, PublishError, Publisher};
pub use topics::{TopicError, TopicKind, TopicMap};
pub use viewers::{ViewerHub, ViewerId, ViewerUpdates};
