//! MQTT client plumbing.
//!
//! The bridge keeps four independent broker connections, one per
//! functional area (sensor state, device state, command/discovery,
//! inbound subscription). They share nothing but configuration and the
//! publish serialization lock.
//!
//! ```text
//! mqtt/
//! ├── config.rs    - broker settings and client-id generation
//! ├── message.rs   - inbound message representation
//! ├── link.rs      - per-connection lifecycle and event loop driving
//! └── publisher.rs - retained publishing under the shared lock
//! ```

pub mod config;
pub mod link;
pub mod message;
pub mod publisher;

pub use config::MqttConfig;
pub use link::{LinkError, MqttLink};
pub use message::InboundMessage;
pub use publisher::{PublishSink, Publisher};
