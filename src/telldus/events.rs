//! Listener for the telldusd event socket.
//!
//! A single long-lived connection delivers every native event the daemon
//! sees. The reader task decodes the token stream incrementally and fans
//! events out into one bounded channel per event kind, so translation
//! consumers are decoupled from socket timing.

use std::collections::HashMap;
use std::path::Path;

use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::error::TelldusError;
use super::proto::Cursor;

/// Queue depth per event kind. Translation is quick; this only has to
/// absorb bursts while an MQTT publish is in flight.
const EVENT_QUEUE_DEPTH: usize = 100;

/// Undecoded protocol data seen by a controller, e.g.
/// `class:command;protocol:arctech;method:turnon;...`.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub data: String,
    pub controller_id: i32,
}

impl RawEvent {
    /// Splits the `key:value;` payload into a lookup map. Malformed
    /// segments are skipped.
    pub fn fields(&self) -> HashMap<&str, &str> {
        self.data
            .split(';')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| segment.split_once(':'))
            .collect()
    }
}

/// A state change on a configured device.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub device_id: i32,
    pub method: i32,
    /// Method argument; the dim level for DIM events.
    pub data: String,
}

/// A measurement reported by a sensor.
#[derive(Debug, Clone)]
pub struct SensorEvent {
    pub protocol: String,
    pub model: String,
    pub sensor_id: i32,
    pub data_type: i32,
    pub value: String,
    pub timestamp: i64,
}

/// Receiving ends of the per-kind event queues.
pub struct EventStream {
    pub raw: mpsc::Receiver<RawEvent>,
    pub device: mpsc::Receiver<DeviceEvent>,
    pub sensor: mpsc::Receiver<SensorEvent>,
}

/// Spawns the event socket reader and returns the typed event stream.
pub async fn listen(
    socket_path: impl AsRef<Path>,
    cancel: CancellationToken,
) -> Result<EventStream, TelldusError> {
    let path = socket_path.as_ref();
    let stream = UnixStream::connect(path)
        .await
        .map_err(|e| TelldusError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
    info!("Listening for telldus events on {}", path.display());

    let (raw_tx, raw_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (device_tx, device_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (sensor_tx, sensor_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    tokio::spawn(read_events(stream, raw_tx, device_tx, sensor_tx, cancel));

    Ok(EventStream {
        raw: raw_rx,
        device: device_rx,
        sensor: sensor_rx,
    })
}

async fn read_events(
    mut stream: UnixStream,
    raw_tx: mpsc::Sender<RawEvent>,
    device_tx: mpsc::Sender<DeviceEvent>,
    sensor_tx: mpsc::Sender<SensorEvent>,
    cancel: CancellationToken,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("event listener stopped");
                break;
            }
            read = stream.read(&mut chunk) => match read {
                Ok(0) => {
                    error!("telldusd closed the event socket");
                    break;
                }
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    let mut lost = false;
                    loop {
                        match take_event(&buf) {
                            Ok(Some((event, consumed))) => {
                                buf.drain(..consumed);
                                dispatch(event, &raw_tx, &device_tx, &sensor_tx);
                            }
                            Ok(None) => break,
                            Err(e) => {
                                // The stream cannot be resynchronized once
                                // token framing is lost.
                                error!("unrecoverable event stream error: {e}");
                                lost = true;
                                break;
                            }
                        }
                    }
                    if lost {
                        break;
                    }
                }
                Err(e) => {
                    error!("event socket read failed: {e}");
                    break;
                }
            }
        }
    }

    // Without events the retained broker state goes stale while the MQTT
    // side still looks healthy. Tear the whole bridge down instead.
    cancel.cancel();
}

fn dispatch(
    event: TelldusEvent,
    raw_tx: &mpsc::Sender<RawEvent>,
    device_tx: &mpsc::Sender<DeviceEvent>,
    sensor_tx: &mpsc::Sender<SensorEvent>,
) {
    let result = match event {
        TelldusEvent::Raw(raw) => raw_tx.try_send(raw).map_err(|e| e.to_string()),
        TelldusEvent::Device(device) => device_tx.try_send(device).map_err(|e| e.to_string()),
        TelldusEvent::Sensor(sensor) => sensor_tx.try_send(sensor).map_err(|e| e.to_string()),
        TelldusEvent::Ignored(name) => {
            trace!("ignoring {name} event");
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("dropping telldus event: {e}");
    }
}

/// One decoded event from the daemon's event socket.
#[derive(Debug, Clone)]
enum TelldusEvent {
    Raw(RawEvent),
    Device(DeviceEvent),
    Sensor(SensorEvent),
    /// Recognized but unused event kinds; arguments already consumed.
    Ignored(&'static str),
}

/// Tries to decode one complete event from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer holds only part of an event, and
/// the number of consumed bytes alongside the event otherwise.
fn take_event(buf: &[u8]) -> Result<Option<(TelldusEvent, usize)>, TelldusError> {
    let mut cursor = Cursor::new(buf);
    let Some(name) = cursor.string()? else {
        return Ok(None);
    };

    macro_rules! arg {
        ($take:ident) => {
            match cursor.$take()? {
                Some(value) => value,
                None => return Ok(None),
            }
        };
    }

    let event = match name.as_str() {
        "TDRawDeviceEvent" => {
            let data = arg!(string);
            let controller_id = arg!(int);
            TelldusEvent::Raw(RawEvent {
                data,
                controller_id: controller_id as i32,
            })
        }
        "TDDeviceEvent" => {
            let device_id = arg!(int);
            let method = arg!(int);
            let data = arg!(string);
            TelldusEvent::Device(DeviceEvent {
                device_id: device_id as i32,
                method: method as i32,
                data,
            })
        }
        "TDSensorEvent" => {
            let protocol = arg!(string);
            let model = arg!(string);
            let sensor_id = arg!(int);
            let data_type = arg!(int);
            let value = arg!(string);
            let timestamp = arg!(int);
            TelldusEvent::Sensor(SensorEvent {
                protocol,
                model,
                sensor_id: sensor_id as i32,
                data_type: data_type as i32,
                value,
                timestamp,
            })
        }
        "TDDeviceChangeEvent" => {
            let _device_id = arg!(int);
            let _change_event = arg!(int);
            let _change_type = arg!(int);
            TelldusEvent::Ignored("TDDeviceChangeEvent")
        }
        "TDControllerEvent" => {
            let _controller_id = arg!(int);
            let _change_event = arg!(int);
            let _change_type = arg!(int);
            let _new_value = arg!(string);
            TelldusEvent::Ignored("TDControllerEvent")
        }
        other => return Err(TelldusError::UnknownEvent(other.to_owned())),
    };

    Ok(Some((event, cursor.consumed())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_device_event() {
        let wire = b"13:TDDeviceEventi8si16s3:128";
        let (event, consumed) = take_event(wire).unwrap().unwrap();
        assert_eq!(consumed, wire.len());
        match event {
            TelldusEvent::Device(device) => {
                assert_eq!(device.device_id, 8);
                assert_eq!(device.method, 16);
                assert_eq!(device.data, "128");
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn decodes_sensor_event() {
        let wire = b"13:TDSensorEvent10:fineoffset8:temphumii135si1s4:21.5i1700000000s";
        let (event, _) = take_event(wire).unwrap().unwrap();
        match event {
            TelldusEvent::Sensor(sensor) => {
                assert_eq!(sensor.protocol, "fineoffset");
                assert_eq!(sensor.model, "temphumi");
                assert_eq!(sensor.sensor_id, 135);
                assert_eq!(sensor.data_type, 1);
                assert_eq!(sensor.value, "21.5");
                assert_eq!(sensor.timestamp, 1_700_000_000);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn partial_event_waits_for_more_bytes() {
        let wire = b"13:TDDeviceEventi8si16s3:128";
        for cut in 1..wire.len() {
            assert!(take_event(&wire[..cut]).unwrap().is_none(), "cut {cut}");
        }
    }

    #[test]
    fn consecutive_events_consume_exactly_one() {
        let mut wire = b"16:TDRawDeviceEvent14:class:command;i1s".to_vec();
        wire.extend_from_slice(b"13:TDDeviceEventi3si2s0:");
        let (first, consumed) = take_event(&wire).unwrap().unwrap();
        assert!(matches!(first, TelldusEvent::Raw(_)));
        let (second, _) = take_event(&wire[consumed..]).unwrap().unwrap();
        assert!(matches!(second, TelldusEvent::Device(_)));
    }

    #[test]
    fn unknown_event_is_an_error() {
        let wire = b"7:TDBogusi1s";
        assert!(matches!(
            take_event(wire),
            Err(TelldusError::UnknownEvent(name)) if name == "TDBogus"
        ));
    }

    #[tokio::test]
    async fn closed_event_socket_cancels_the_bridge() {
        let (local, remote) = UnixStream::pair().unwrap();
        let cancel = CancellationToken::new();
        let (raw_tx, _raw_rx) = mpsc::channel(1);
        let (device_tx, _device_rx) = mpsc::channel(1);
        let (sensor_tx, _sensor_rx) = mpsc::channel(1);
        tokio::spawn(read_events(
            local,
            raw_tx,
            device_tx,
            sensor_tx,
            cancel.clone(),
        ));

        drop(remote);

        tokio::time::timeout(std::time::Duration::from_secs(1), cancel.cancelled())
            .await
            .expect("reader did not cancel after socket close");
    }

    #[tokio::test]
    async fn corrupted_framing_cancels_the_bridge() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let cancel = CancellationToken::new();
        let (raw_tx, _raw_rx) = mpsc::channel(1);
        let (device_tx, _device_rx) = mpsc::channel(1);
        let (sensor_tx, _sensor_rx) = mpsc::channel(1);
        tokio::spawn(read_events(
            local,
            raw_tx,
            device_tx,
            sensor_tx,
            cancel.clone(),
        ));

        tokio::io::AsyncWriteExt::write_all(&mut remote, b"garbage")
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), cancel.cancelled())
            .await
            .expect("reader did not cancel after framing loss");
    }

    #[test]
    fn raw_event_field_parsing() {
        let event = RawEvent {
            data: "class:command;protocol:arctech;house:1234;unit:1;method:turnon;".into(),
            controller_id: 1,
        };
        let fields = event.fields();
        assert_eq!(fields.get("house"), Some(&"1234"));
        assert_eq!(fields.get("method"), Some(&"turnon"));
        assert_eq!(fields.get("missing"), None);
    }
}
