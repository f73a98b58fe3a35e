//! Topic construction and Home Assistant discovery payloads.
//!
//! Topics are `<prefix>/<entity id>/<capability>/<suffix>`. The broker's
//! retained messages are the only state store, so discovery and state
//! payloads are always published with retain and may be republished at
//! any time without harm.

use std::collections::HashSet;
use std::fmt::Display;

use serde::Serialize;
use serde_json::Value;

use crate::telldus::{Device, SensorKind};

pub const CAP_LIGHT: &str = "light";
pub const CAP_BRIGHTNESS: &str = "brightness";
pub const CAP_SWITCH: &str = "switch";
pub const CAP_BINARY_SENSOR: &str = "binary_sensor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    State,
    Set,
    Config,
}

impl Suffix {
    pub const fn as_str(self) -> &'static str {
        match self {
            Suffix::State => "state",
            Suffix::Set => "set",
            Suffix::Config => "config",
        }
    }
}

/// Joins the four topic segments. Segment values must not contain `/`;
/// ids and capabilities are bridge-generated so this holds by
/// construction.
pub fn topic(prefix: &str, id: impl Display, capability: &str, suffix: Suffix) -> String {
    format!("{prefix}/{id}/{capability}/{}", suffix.as_str())
}

/// Tracks which config topics were already published this process
/// lifetime. Purely an optimization: retained discovery messages make
/// republishing harmless.
#[derive(Debug, Default)]
pub struct Announced {
    seen: HashSet<String>,
}

impl Announced {
    /// True exactly once per key.
    pub fn first(&mut self, key: impl Into<String>) -> bool {
        self.seen.insert(key.into())
    }
}

#[derive(Debug, Serialize)]
struct SensorDiscovery<'a> {
    name: String,
    unique_id: String,
    state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct LightDiscovery {
    name: String,
    unique_id: String,
    state_topic: String,
    command_topic: String,
    brightness_state_topic: String,
    brightness_command_topic: String,
    brightness_scale: u16,
    payload_on: &'static str,
    payload_off: &'static str,
}

#[derive(Debug, Serialize)]
struct SwitchDiscovery {
    name: String,
    unique_id: String,
    state_topic: String,
    command_topic: String,
    payload_on: String,
    payload_off: String,
}

#[derive(Debug, Serialize)]
struct BinarySensorDiscovery {
    name: String,
    unique_id: String,
    state_topic: String,
    payload_on: &'static str,
    payload_off: &'static str,
}

/// Discovery message for one measurement kind of a sensor.
pub fn sensor_discovery(prefix: &str, sensor_id: i32, kind: SensorKind) -> (String, Value) {
    let payload = SensorDiscovery {
        name: format!("Sensor {} {}", sensor_id, kind.name()),
        unique_id: format!("telldus_{}_{}", sensor_id, kind.name()),
        state_topic: topic(prefix, sensor_id, kind.name(), Suffix::State),
        unit_of_measurement: kind.unit(),
        device_class: kind.device_class(),
    };
    let config = topic(prefix, sensor_id, kind.name(), Suffix::Config);
    (config, to_value(payload))
}

/// Discovery message for a device: a dimmable light when the device
/// supports DIM, a plain switch otherwise.
pub fn device_discovery(
    prefix: &str,
    device: &Device,
    on_code: i32,
    off_code: i32,
) -> (String, Value) {
    if device.supports_dim {
        let payload = LightDiscovery {
            name: device.name.clone(),
            unique_id: format!("telldus_{}_light", device.id),
            state_topic: topic(prefix, device.id, CAP_LIGHT, Suffix::State),
            command_topic: topic(prefix, device.id, CAP_LIGHT, Suffix::Set),
            brightness_state_topic: topic(prefix, device.id, CAP_BRIGHTNESS, Suffix::State),
            brightness_command_topic: topic(prefix, device.id, CAP_BRIGHTNESS, Suffix::Set),
            brightness_scale: 255,
            // ON state is published as full brightness
            payload_on: "255",
            payload_off: "0",
        };
        let config = topic(prefix, device.id, CAP_LIGHT, Suffix::Config);
        (config, to_value(payload))
    } else {
        let payload = SwitchDiscovery {
            name: device.name.clone(),
            unique_id: format!("telldus_{}_switch", device.id),
            state_topic: topic(prefix, device.id, CAP_SWITCH, Suffix::State),
            command_topic: topic(prefix, device.id, CAP_SWITCH, Suffix::Set),
            payload_on: on_code.to_string(),
            payload_off: off_code.to_string(),
        };
        let config = topic(prefix, device.id, CAP_SWITCH, Suffix::Config);
        (config, to_value(payload))
    }
}

/// Discovery message for a raw-event binary sensor.
pub fn binary_sensor_discovery(prefix: &str, raw_id: &str) -> (String, Value) {
    let payload = BinarySensorDiscovery {
        name: format!("Raw sensor {raw_id}"),
        unique_id: format!("telldus_raw_{raw_id}"),
        state_topic: topic(prefix, raw_id, CAP_BINARY_SENSOR, Suffix::State),
        payload_on: "turnon",
        payload_off: "turnoff",
    };
    let config = topic(prefix, raw_id, CAP_BINARY_SENSOR, Suffix::Config);
    (config, to_value(payload))
}

fn to_value(payload: impl Serialize) -> Value {
    // Plain structs of strings and options cannot fail to serialize.
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telldus::Method;

    #[test]
    fn topic_shape() {
        assert_eq!(
            topic("telldus", 8, CAP_LIGHT, Suffix::State),
            "telldus/8/light/state"
        );
        assert_eq!(
            topic("telldus", "1234_1", CAP_BINARY_SENSOR, Suffix::Config),
            "telldus/1234_1/binary_sensor/config"
        );
    }

    #[test]
    fn topics_are_injective() {
        let mut seen = HashSet::new();
        for id in [1, 8, 12, 81] {
            for capability in [CAP_LIGHT, CAP_BRIGHTNESS, CAP_SWITCH, "temperature"] {
                for suffix in [Suffix::State, Suffix::Set, Suffix::Config] {
                    assert!(seen.insert(topic("telldus", id, capability, suffix)));
                }
            }
        }
    }

    #[test]
    fn sensor_discovery_payload() {
        let (config, payload) = sensor_discovery("telldus", 135, SensorKind::Temperature);
        assert_eq!(config, "telldus/135/temperature/config");
        assert_eq!(payload["state_topic"], "telldus/135/temperature/state");
        assert_eq!(payload["unit_of_measurement"], "°C");
        assert_eq!(payload["device_class"], "temperature");
    }

    #[test]
    fn wind_direction_has_no_device_class() {
        let (_, payload) = sensor_discovery("telldus", 1, SensorKind::WindDirection);
        assert!(payload.get("device_class").is_none());
    }

    #[test]
    fn dimmer_discovers_as_light() {
        let device = Device {
            id: 8,
            name: "Kitchen".into(),
            supports_dim: true,
        };
        let (config, payload) = device_discovery(
            "telldus",
            &device,
            Method::TurnOn.code(),
            Method::TurnOff.code(),
        );
        assert_eq!(config, "telldus/8/light/config");
        assert_eq!(payload["command_topic"], "telldus/8/light/set");
        assert_eq!(
            payload["brightness_command_topic"],
            "telldus/8/brightness/set"
        );

        // the declared payloads must match what the device translator
        // actually publishes, or the light never shows as ON
        let (_, on_state) =
            crate::bridge::handlers::device_state(true, Method::TurnOn, "").unwrap();
        assert_eq!(payload["payload_on"], on_state.as_str());
        let (_, off_state) =
            crate::bridge::handlers::device_state(true, Method::TurnOff, "").unwrap();
        assert_eq!(payload["payload_off"], off_state.as_str());
    }

    #[test]
    fn plain_device_discovers_as_switch() {
        let device = Device {
            id: 3,
            name: "Fan".into(),
            supports_dim: false,
        };
        let (config, payload) = device_discovery(
            "telldus",
            &device,
            Method::TurnOn.code(),
            Method::TurnOff.code(),
        );
        assert_eq!(config, "telldus/3/switch/config");
        assert_eq!(payload["payload_on"], "1");
        assert_eq!(payload["payload_off"], "2");
    }

    #[test]
    fn announced_is_once_per_key() {
        let mut announced = Announced::default();
        assert!(announced.first("telldus/8/light/config"));
        assert!(!announced.first("telldus/8/light/config"));
        assert!(announced.first("telldus/9/light/config"));
    }
}
