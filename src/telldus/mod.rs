//! Integration with the telldus-core daemon.
//!
//! telldusd exposes two local sockets: a request/response service socket
//! for commands and enumeration, and an event socket broadcasting every
//! native event. Both speak the same token encoding implemented in
//! [`proto`].
//!
//! ```text
//! telldus/
//! ├── codes.rs  - protocol method and sensor-type codes
//! ├── proto.rs  - wire token encoding
//! ├── client.rs - service socket client (commands, enumeration)
//! └── events.rs - event socket listener feeding typed channels
//! ```

pub mod client;
pub mod codes;
pub mod error;
pub mod events;
pub mod proto;

pub use client::{Device, DeviceCommands, EntityDirectory, Sensor, TelldusClient};
pub use codes::{method_name, sensor_type_name, Method, SensorKind};
pub use error::TelldusError;
pub use events::{DeviceEvent, EventStream, RawEvent, SensorEvent};
