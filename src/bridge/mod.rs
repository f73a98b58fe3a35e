//! Event translation and command routing between telldusd and MQTT.
//!
//! ```text
//! bridge/
//! ├── handlers.rs - native event -> topic publication translators
//! └── router.rs   - inbound command topic -> device command routing
//! ```
//!
//! This module also owns the startup sweep that publishes discovery and
//! current state for everything the daemon already knows, so a freshly
//! started Home Assistant sees the full picture before any event fires.

pub mod handlers;
pub mod router;

use std::collections::HashSet;

use tracing::{debug, info, warn};

pub use handlers::{DeviceTranslator, RawTranslator, SensorTranslator};
pub use router::run_router;

use crate::hass::{self, Announced, Suffix};
use crate::mqtt::{PublishSink, Publisher};
use crate::telldus::{
    method_name, Device, EntityDirectory, Method, Sensor, TelldusError,
};

/// Publishes discovery and the last reported value for every known
/// sensor. Returns the enumerated ids so the sensor translator starts
/// with a warm roster.
pub async fn publish_initial_sensors<S: PublishSink, D: EntityDirectory>(
    directory: &D,
    publisher: &Publisher<S>,
    prefix: &str,
    announced: &mut Announced,
) -> Result<HashSet<i32>, TelldusError> {
    let sensors: Vec<Sensor> = directory.sensors().await?;
    info!("Publishing initial state for {} sensors", sensors.len());

    for sensor in &sensors {
        for kind in sensor.kinds() {
            let (config, payload) = hass::sensor_discovery(prefix, sensor.id, kind);
            if announced.first(config.clone()) {
                publisher.publish(&config, payload.to_string()).await;
            }
            match directory.sensor_value(sensor, kind).await {
                Ok(reading) => {
                    let topic = hass::topic(prefix, sensor.id, kind.name(), Suffix::State);
                    publisher.publish(&topic, reading.value).await;
                }
                Err(e) => warn!(
                    "no initial value for sensor {} {}: {e}",
                    sensor.id,
                    kind.name()
                ),
            }
        }
    }

    Ok(sensors.iter().map(|s| s.id).collect())
}

/// Publishes discovery and the last sent command for every known
/// device. Returns the enumeration for the device translator's roster.
pub async fn publish_initial_devices<S: PublishSink, D: EntityDirectory>(
    directory: &D,
    publisher: &Publisher<S>,
    prefix: &str,
    announced: &mut Announced,
) -> Result<Vec<Device>, TelldusError> {
    let devices = directory.devices().await?;
    info!("Publishing initial state for {} devices", devices.len());

    for device in &devices {
        let (config, payload) =
            hass::device_discovery(prefix, device, Method::TurnOn.code(), Method::TurnOff.code());
        if announced.first(config.clone()) {
            publisher.publish(&config, payload.to_string()).await;
        }

        let code = match directory.last_sent_command(device.id).await {
            Ok(code) => code,
            Err(e) => {
                warn!("no last command for device {}: {e}", device.id);
                continue;
            }
        };
        let Some(method) = Method::from_code(code) else {
            debug!(
                "device {} has no usable last command: {}",
                device.id,
                method_name(code)
            );
            continue;
        };

        let data = if method == Method::Dim {
            directory.last_sent_value(device.id).await.unwrap_or_default()
        } else {
            String::new()
        };

        if let Some((capability, state)) = handlers::device_state(device.supports_dim, method, &data)
        {
            let topic = hass::topic(prefix, device.id, capability, Suffix::State);
            publisher.publish(&topic, state).await;
        }
    }

    Ok(devices)
}
