//! Translation of native telldus events into MQTT publications.
//!
//! One translator per event kind, each consuming its own bounded channel
//! on its own task. Translators hold no entity state beyond the
//! announced-topic set and a cached device roster; the broker's retained
//! messages are the canonical state.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::hass::{self, Announced, Suffix, CAP_BINARY_SENSOR};
use crate::mqtt::{PublishSink, Publisher};
use crate::telldus::{
    method_name, sensor_type_name, Device, DeviceEvent, EntityDirectory, Method, RawEvent,
    SensorEvent, SensorKind,
};

/// Topic capability and payload for a device state change.
///
/// Dim-capable devices are presented as lights: on/off become full and
/// zero brightness. Everything else is a switch carrying the raw method
/// code. Returns `None` when a dim level is not numeric.
pub fn device_state(
    supports_dim: bool,
    method: Method,
    data: &str,
) -> Option<(&'static str, String)> {
    match method {
        Method::TurnOff if supports_dim => Some((hass::CAP_LIGHT, "0".to_owned())),
        Method::TurnOn if supports_dim => Some((hass::CAP_LIGHT, "255".to_owned())),
        Method::Dim => data
            .trim()
            .parse::<i32>()
            .ok()
            .map(|level| (hass::CAP_BRIGHTNESS, level.to_string())),
        other => Some((hass::CAP_SWITCH, other.code().to_string())),
    }
}

/// Translates device events onto the device channel.
pub struct DeviceTranslator<S, D> {
    publisher: Publisher<S>,
    directory: D,
    prefix: String,
    roster: HashMap<i32, Device>,
    announced: Announced,
}

impl<S: PublishSink, D: EntityDirectory> DeviceTranslator<S, D> {
    pub fn new(
        publisher: Publisher<S>,
        directory: D,
        prefix: String,
        devices: Vec<Device>,
        announced: Announced,
    ) -> Self {
        let roster = devices.into_iter().map(|d| (d.id, d)).collect();
        DeviceTranslator {
            publisher,
            directory,
            prefix,
            roster,
            announced,
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<DeviceEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("device event channel closed, translator stopping");
    }

    async fn handle(&mut self, event: DeviceEvent) {
        let label = method_name(event.method);
        let mut line = format!("[DEVICE] {} -> {} ({})", event.device_id, label, event.method);
        if event.method == Method::Dim.code() {
            line.push_str(&format!(" [{}]", event.data));
        }

        // Devices can be added to telldusd without a restart; refresh the
        // roster when an unknown id shows up.
        if !self.roster.contains_key(&event.device_id) {
            match self.directory.devices().await {
                Ok(devices) => {
                    self.roster = devices.into_iter().map(|d| (d.id, d)).collect();
                }
                Err(e) => warn!("device enumeration failed: {e}"),
            }
        }

        let supports_dim = self
            .roster
            .get(&event.device_id)
            .map(|d| d.supports_dim)
            .unwrap_or(false);

        if supports_dim {
            debug!("[DEVICE EVENT DIMMER LIGHT] {line}");
        } else if event.method == Method::Dim.code() {
            debug!("[DEVICE EVENT LIGHT] {line}");
        } else {
            debug!("[DEVICE EVENT SWITCH] {line}");
        }

        if let Some(device) = self.roster.get(&event.device_id) {
            let (config, payload) = hass::device_discovery(
                &self.prefix,
                device,
                Method::TurnOn.code(),
                Method::TurnOff.code(),
            );
            if self.announced.first(config.clone()) {
                self.publisher.publish(&config, payload.to_string()).await;
            }
        }

        let Some(method) = Method::from_code(event.method) else {
            error!("[DEVICE] {label}");
            return;
        };
        let Some((capability, state)) = device_state(supports_dim, method, &event.data) else {
            error!("[DEVICE] Dim level is not numeric: \"{}\"", event.data);
            return;
        };

        let topic = hass::topic(&self.prefix, event.device_id, capability, Suffix::State);
        self.publisher.publish(&topic, state).await;
    }
}

/// Translates sensor events onto the sensor channel.
pub struct SensorTranslator<S, D> {
    publisher: Publisher<S>,
    directory: D,
    prefix: String,
    /// Sensor ids whose full kind set was already announced.
    known: HashSet<i32>,
    announced: Announced,
}

impl<S: PublishSink, D: EntityDirectory> SensorTranslator<S, D> {
    pub fn new(
        publisher: Publisher<S>,
        directory: D,
        prefix: String,
        known: HashSet<i32>,
        announced: Announced,
    ) -> Self {
        SensorTranslator {
            publisher,
            directory,
            prefix,
            known,
            announced,
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<SensorEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("sensor event channel closed, translator stopping");
    }

    async fn handle(&mut self, event: SensorEvent) {
        let Some(kind) = SensorKind::from_code(event.data_type) else {
            error!("[SENSOR] {}", sensor_type_name(event.data_type));
            return;
        };
        debug!(
            "[SENSOR] {} {} ({}) = {}",
            event.sensor_id,
            event.model,
            kind.name(),
            event.value
        );

        // Sensors can be added or discovered in telldus-core without a
        // restart; announce every kind the daemon reports for a new id.
        if self.known.insert(event.sensor_id) {
            match self.directory.sensors().await {
                Ok(sensors) => {
                    for sensor in sensors.iter().filter(|s| s.id == event.sensor_id) {
                        for kind in sensor.kinds() {
                            self.announce(sensor.id, kind).await;
                        }
                    }
                }
                Err(e) => warn!("sensor enumeration failed: {e}"),
            }
        }
        // Enumeration may lag behind the event stream; make sure at least
        // this measurement kind is announced.
        self.announce(event.sensor_id, kind).await;

        let topic = hass::topic(&self.prefix, event.sensor_id, kind.name(), Suffix::State);
        self.publisher.publish(&topic, event.value).await;
    }

    async fn announce(&mut self, sensor_id: i32, kind: SensorKind) {
        let (config, payload) = hass::sensor_discovery(&self.prefix, sensor_id, kind);
        if self.announced.first(config.clone()) {
            self.publisher.publish(&config, payload.to_string()).await;
        }
    }
}

/// Translates raw controller events into binary sensors on the command
/// channel.
pub struct RawTranslator<S> {
    publisher: Publisher<S>,
    prefix: String,
    announced: Announced,
}

impl<S: PublishSink> RawTranslator<S> {
    pub fn new(publisher: Publisher<S>, prefix: String) -> Self {
        RawTranslator {
            publisher,
            prefix,
            announced: Announced::default(),
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<RawEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("raw event channel closed, translator stopping");
    }

    async fn handle(&mut self, event: RawEvent) {
        // Only command-class events describe a device state.
        if !event.data.contains("command") {
            return;
        }

        let fields = event.fields();
        let Some(id) = raw_entity_id(&fields) else {
            debug!("raw event without usable id: {}", event.data);
            return;
        };
        let Some(method) = fields.get("method") else {
            debug!("raw event without method: {}", event.data);
            return;
        };

        let (config, payload) = hass::binary_sensor_discovery(&self.prefix, &id);
        if self.announced.first(config.clone()) {
            self.publisher.publish(&config, payload.to_string()).await;
        }

        let topic = hass::topic(&self.prefix, &id, CAP_BINARY_SENSOR, Suffix::State);
        self.publisher.publish(&topic, method.to_string()).await;
    }
}

/// Stable id for a raw-protocol entity: house code plus unit where
/// present, falling back to a bare `id` field.
fn raw_entity_id(fields: &HashMap<&str, &str>) -> Option<String> {
    if let Some(house) = fields.get("house") {
        match fields.get("unit") {
            Some(unit) => Some(format!("{house}_{unit}")),
            None => Some((*house).to_owned()),
        }
    } else {
        fields.get("id").map(|id| (*id).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::publisher::testing::{recording_publisher, Recorded};
    use crate::telldus::client::testing::StaticDirectory;
    use crate::telldus::Sensor;

    fn dimmer(id: i32) -> Device {
        Device {
            id,
            name: format!("Dimmer {id}"),
            supports_dim: true,
        }
    }

    fn switch(id: i32) -> Device {
        Device {
            id,
            name: format!("Switch {id}"),
            supports_dim: false,
        }
    }

    async fn run_device_event(devices: Vec<Device>, event: DeviceEvent) -> Vec<Recorded> {
        let (publisher, sink) = recording_publisher("device");
        let directory = StaticDirectory {
            devices: devices.clone(),
            ..Default::default()
        };
        let mut translator = DeviceTranslator::new(
            publisher,
            directory,
            "telldus".to_owned(),
            devices,
            Announced::default(),
        );
        translator.handle(event).await;
        sink.records()
    }

    fn state_records(records: &[Recorded]) -> Vec<&Recorded> {
        records
            .iter()
            .filter(|r| r.topic.ends_with("/state"))
            .collect()
    }

    #[tokio::test]
    async fn dimmer_turn_off_publishes_light_zero() {
        let records = run_device_event(
            vec![dimmer(8)],
            DeviceEvent {
                device_id: 8,
                method: Method::TurnOff.code(),
                data: String::new(),
            },
        )
        .await;
        let states = state_records(&records);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].topic, "telldus/8/light/state");
        assert_eq!(states[0].payload, "0");
    }

    #[tokio::test]
    async fn dimmer_turn_on_publishes_light_full() {
        let records = run_device_event(
            vec![dimmer(8)],
            DeviceEvent {
                device_id: 8,
                method: Method::TurnOn.code(),
                data: String::new(),
            },
        )
        .await;
        let states = state_records(&records);
        assert_eq!(states[0].topic, "telldus/8/light/state");
        assert_eq!(states[0].payload, "255");
    }

    #[tokio::test]
    async fn dim_on_plain_device_publishes_brightness() {
        let records = run_device_event(
            vec![switch(1)],
            DeviceEvent {
                device_id: 1,
                method: Method::Dim.code(),
                data: "128".to_owned(),
            },
        )
        .await;
        let states = state_records(&records);
        assert_eq!(states[0].topic, "telldus/1/brightness/state");
        assert_eq!(states[0].payload, "128");
    }

    #[tokio::test]
    async fn other_methods_publish_switch_code() {
        let records = run_device_event(
            vec![switch(3)],
            DeviceEvent {
                device_id: 3,
                method: Method::Bell.code(),
                data: String::new(),
            },
        )
        .await;
        let states = state_records(&records);
        assert_eq!(states[0].topic, "telldus/3/switch/state");
        assert_eq!(states[0].payload, "4");
    }

    #[tokio::test]
    async fn unknown_method_publishes_no_state() {
        let records = run_device_event(
            vec![switch(3)],
            DeviceEvent {
                device_id: 3,
                method: 3, // not a method code
                data: String::new(),
            },
        )
        .await;
        assert!(state_records(&records).is_empty());
    }

    #[tokio::test]
    async fn bad_dim_level_publishes_no_state() {
        let records = run_device_event(
            vec![dimmer(8)],
            DeviceEvent {
                device_id: 8,
                method: Method::Dim.code(),
                data: "bright".to_owned(),
            },
        )
        .await;
        assert!(state_records(&records).is_empty());
    }

    #[tokio::test]
    async fn first_event_announces_device_discovery() {
        let records = run_device_event(
            vec![dimmer(8)],
            DeviceEvent {
                device_id: 8,
                method: Method::TurnOn.code(),
                data: String::new(),
            },
        )
        .await;
        assert_eq!(records[0].topic, "telldus/8/light/config");
        assert!(records.iter().all(|r| r.retain));
    }

    #[tokio::test]
    async fn sensor_event_announces_then_publishes_value() {
        let (publisher, sink) = recording_publisher("sensor");
        let directory = StaticDirectory {
            sensors: vec![Sensor {
                protocol: "fineoffset".into(),
                model: "temphumi".into(),
                id: 135,
                data_types: SensorKind::Temperature.code() | SensorKind::Humidity.code(),
            }],
            ..Default::default()
        };
        let mut translator = SensorTranslator::new(
            publisher,
            directory,
            "telldus".to_owned(),
            HashSet::new(),
            Announced::default(),
        );
        translator
            .handle(SensorEvent {
                protocol: "fineoffset".into(),
                model: "temphumi".into(),
                sensor_id: 135,
                data_type: SensorKind::Temperature.code(),
                value: "21.5".into(),
                timestamp: 0,
            })
            .await;

        let records = sink.records();
        // both enumerated kinds announced, then the state value
        assert!(records
            .iter()
            .any(|r| r.topic == "telldus/135/temperature/config"));
        assert!(records
            .iter()
            .any(|r| r.topic == "telldus/135/humidity/config"));
        let last = records.last().unwrap();
        assert_eq!(last.topic, "telldus/135/temperature/state");
        assert_eq!(last.payload, "21.5");
    }

    #[tokio::test]
    async fn unknown_sensor_type_publishes_nothing() {
        let (publisher, sink) = recording_publisher("sensor");
        let mut translator = SensorTranslator::new(
            publisher,
            StaticDirectory::default(),
            "telldus".to_owned(),
            HashSet::new(),
            Announced::default(),
        );
        translator
            .handle(SensorEvent {
                protocol: "x".into(),
                model: "y".into(),
                sensor_id: 1,
                data_type: 128,
                value: "1".into(),
                timestamp: 0,
            })
            .await;
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn raw_event_without_command_is_ignored() {
        let (publisher, sink) = recording_publisher("command");
        let mut translator = RawTranslator::new(publisher, "telldus".to_owned());
        translator
            .handle(RawEvent {
                data: "class:sensor;protocol:fineoffset;id:135;".into(),
                controller_id: 1,
            })
            .await;
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn raw_command_event_publishes_binary_sensor() {
        let (publisher, sink) = recording_publisher("command");
        let mut translator = RawTranslator::new(publisher, "telldus".to_owned());
        let data = "class:command;protocol:arctech;house:1234;unit:1;method:turnon;";
        translator
            .handle(RawEvent {
                data: data.into(),
                controller_id: 1,
            })
            .await;
        translator
            .handle(RawEvent {
                data: data.into(),
                controller_id: 1,
            })
            .await;

        let records = sink.records();
        // discovery once, state twice
        assert_eq!(records[0].topic, "telldus/1234_1/binary_sensor/config");
        let states = state_records(&records);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].topic, "telldus/1234_1/binary_sensor/state");
        assert_eq!(states[0].payload, "turnon");
    }

    #[test]
    fn device_state_policy() {
        assert_eq!(
            device_state(true, Method::TurnOff, ""),
            Some((hass::CAP_LIGHT, "0".to_owned()))
        );
        assert_eq!(
            device_state(true, Method::TurnOn, ""),
            Some((hass::CAP_LIGHT, "255".to_owned()))
        );
        assert_eq!(
            device_state(false, Method::TurnOn, ""),
            Some((hass::CAP_SWITCH, "1".to_owned()))
        );
        assert_eq!(
            device_state(false, Method::Dim, "42"),
            Some((hass::CAP_BRIGHTNESS, "42".to_owned()))
        );
        assert_eq!(device_state(true, Method::Dim, "x"), None);
    }
}
