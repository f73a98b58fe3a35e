//! Request/response client for the telldusd service socket.
//!
//! Every daemon call opens a fresh connection, writes one request message
//! and reads the response tokens, matching how telldusd handles its
//! clients. The [`DeviceCommands`] and [`EntityDirectory`] traits seam the
//! rest of the bridge off the concrete socket client so command routing
//! and event translation are testable without a running daemon.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use super::codes::{Method, SensorKind};
use super::error::TelldusError;
use super::proto::{Cursor, Message};

/// Daemon status for a successfully executed call.
const TELLSTICK_SUCCESS: i64 = 0;

/// A device known to telldusd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: i32,
    pub name: String,
    /// Whether the device's supported-methods bitmask includes DIM.
    /// Drives the light-vs-switch topic policy.
    pub supports_dim: bool,
}

/// A sensor known to telldusd. `data_types` is the daemon's bitmask of
/// reported measurement kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub protocol: String,
    pub model: String,
    pub id: i32,
    pub data_types: i32,
}

impl Sensor {
    pub fn kinds(&self) -> impl Iterator<Item = SensorKind> {
        SensorKind::in_mask(self.data_types)
    }
}

/// A single sensor measurement as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub value: String,
    pub timestamp: i64,
}

/// Commands the bridge can send to a device.
pub trait DeviceCommands {
    async fn turn_on(&self, device: i32) -> Result<(), TelldusError>;
    async fn turn_off(&self, device: i32) -> Result<(), TelldusError>;
    /// Turn on without touching a stored dim level. The daemon itself has
    /// no separate call for this; it is issued as a plain turn-on.
    async fn turn_on_once(&self, device: i32) -> Result<(), TelldusError>;
    async fn dim(&self, device: i32, level: i32) -> Result<(), TelldusError>;
}

/// Enumeration and last-known-state queries against the daemon.
pub trait EntityDirectory {
    async fn devices(&self) -> Result<Vec<Device>, TelldusError>;
    async fn sensors(&self) -> Result<Vec<Sensor>, TelldusError>;
    async fn sensor_value(
        &self,
        sensor: &Sensor,
        kind: SensorKind,
    ) -> Result<SensorReading, TelldusError>;
    async fn last_sent_command(&self, device: i32) -> Result<i32, TelldusError>;
    async fn last_sent_value(&self, device: i32) -> Result<String, TelldusError>;
}

#[derive(Debug, Clone)]
pub struct TelldusClient {
    socket_path: PathBuf,
}

impl TelldusClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        TelldusClient {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    async fn request(&self, message: Message) -> Result<Response, TelldusError> {
        let mut stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| TelldusError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;
        stream.write_all(message.as_bytes()).await?;
        Ok(Response {
            stream,
            buf: Vec::new(),
            pos: 0,
        })
    }

    /// Sends a command whose response is a single status integer.
    async fn command(&self, message: Message) -> Result<(), TelldusError> {
        let status = self.request(message).await?.int().await?;
        if status == TELLSTICK_SUCCESS {
            Ok(())
        } else {
            Err(TelldusError::Status(status as i32))
        }
    }
}

impl DeviceCommands for TelldusClient {
    async fn turn_on(&self, device: i32) -> Result<(), TelldusError> {
        debug!("tdTurnOn({device})");
        self.command(Message::new("tdTurnOn").arg_int(device.into()))
            .await
    }

    async fn turn_off(&self, device: i32) -> Result<(), TelldusError> {
        debug!("tdTurnOff({device})");
        self.command(Message::new("tdTurnOff").arg_int(device.into()))
            .await
    }

    async fn turn_on_once(&self, device: i32) -> Result<(), TelldusError> {
        debug!("tdTurnOn({device}) [once]");
        self.command(Message::new("tdTurnOn").arg_int(device.into()))
            .await
    }

    async fn dim(&self, device: i32, level: i32) -> Result<(), TelldusError> {
        debug!("tdDim({device}, {level})");
        self.command(
            Message::new("tdDim")
                .arg_int(device.into())
                .arg_int(level.into()),
        )
        .await
    }
}

impl EntityDirectory for TelldusClient {
    async fn devices(&self) -> Result<Vec<Device>, TelldusError> {
        let count = self
            .request(Message::new("tdGetNumberOfDevices"))
            .await?
            .int()
            .await?;
        if count < 0 {
            return Err(TelldusError::Status(count as i32));
        }

        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            let id = self
                .request(Message::new("tdGetDeviceId").arg_int(index))
                .await?
                .int()
                .await?;
            let name = self
                .request(Message::new("tdGetName").arg_int(id))
                .await?
                .string()
                .await?;
            let methods = self
                .request(
                    Message::new("tdMethods")
                        .arg_int(id)
                        .arg_int(Method::ALL_MASK.into()),
                )
                .await?
                .int()
                .await?;

            devices.push(Device {
                id: id as i32,
                name,
                supports_dim: methods as i32 & Method::Dim.code() != 0,
            });
        }
        debug!("enumerated {} devices", devices.len());
        Ok(devices)
    }

    async fn sensors(&self) -> Result<Vec<Sensor>, TelldusError> {
        // The daemon iterates: each tdSensor call yields the next sensor
        // until a non-success status marks the end of the list.
        let mut sensors = Vec::new();
        loop {
            let mut response = self.request(Message::new("tdSensor")).await?;
            if response.int().await? != TELLSTICK_SUCCESS {
                break;
            }
            let protocol = response.string().await?;
            let model = response.string().await?;
            let id = response.int().await?;
            let data_types = response.int().await?;
            sensors.push(Sensor {
                protocol,
                model,
                id: id as i32,
                data_types: data_types as i32,
            });
        }
        debug!("enumerated {} sensors", sensors.len());
        Ok(sensors)
    }

    async fn sensor_value(
        &self,
        sensor: &Sensor,
        kind: SensorKind,
    ) -> Result<SensorReading, TelldusError> {
        let mut response = self
            .request(
                Message::new("tdSensorValue")
                    .arg_str(&sensor.protocol)
                    .arg_str(&sensor.model)
                    .arg_int(sensor.id.into())
                    .arg_int(kind.code().into()),
            )
            .await?;
        let status = response.int().await?;
        if status != TELLSTICK_SUCCESS {
            return Err(TelldusError::Status(status as i32));
        }
        let value = response.string().await?;
        let timestamp = response.int().await?;
        Ok(SensorReading { value, timestamp })
    }

    async fn last_sent_command(&self, device: i32) -> Result<i32, TelldusError> {
        let method = self
            .request(
                Message::new("tdLastSentCommand")
                    .arg_int(device.into())
                    .arg_int(Method::ALL_MASK.into()),
            )
            .await?
            .int()
            .await?;
        Ok(method as i32)
    }

    async fn last_sent_value(&self, device: i32) -> Result<String, TelldusError> {
        self.request(Message::new("tdLastSentValue").arg_int(device.into()))
            .await?
            .string()
            .await
    }
}

/// Incremental reader over one response connection.
struct Response {
    stream: UnixStream,
    buf: Vec<u8>,
    pos: usize,
}

impl Response {
    async fn int(&mut self) -> Result<i64, TelldusError> {
        loop {
            let mut cursor = Cursor::new(&self.buf[self.pos..]);
            if let Some(value) = cursor.int()? {
                self.pos += cursor.consumed();
                return Ok(value);
            }
            self.fill().await?;
        }
    }

    async fn string(&mut self) -> Result<String, TelldusError> {
        loop {
            let mut cursor = Cursor::new(&self.buf[self.pos..]);
            if let Some(value) = cursor.string()? {
                self.pos += cursor.consumed();
                return Ok(value);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), TelldusError> {
        let mut chunk = [0u8; 1024];
        let n = self.stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(TelldusError::TruncatedResponse);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
