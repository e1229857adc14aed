//! # MQTT Integration Module
//!
//! Broker connection, topic layout and outbound publishing for the
//! controller. Telemetry, actuator status and the liveness topic go out
//! through a [`publisher::Publisher`]; inbound `cmnd/<device>/+` messages
//! are handed to the [`crate::command::CommandRouter`] from the event loop.
//!
//! ```text
//! mqtt/
//! ├── connection.rs  - options, last will, event loop task
//! ├── publisher.rs   - Publisher trait with a bounded wait
//! └── topics.rs      - tele/stat/cmnd topic names
//! ```

pub mod connection;
pub mod publisher;
pub mod topics;

pub use connection::{announce_offline, ConnectionState, MqttConnection};
pub use publisher::{MqttPublisher, PublishError, Publisher};
pub use topics::Topics;
