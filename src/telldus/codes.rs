//! Numeric codes defined by the telldus-core protocol.
//!
//! Device methods and sensor data types arrive on the wire as integers.
//! The typed enums here are the only values that ever reach a topic
//! segment; unknown codes stay numeric and only show up in log lines
//! via the sentinel formatting of [`method_name`] / [`sensor_type_name`].

use std::borrow::Cow;

/// Device command method, one bit each in the telldus methods bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    TurnOn,
    TurnOff,
    Bell,
    Toggle,
    Dim,
    Learn,
    Execute,
    Up,
    Down,
    Stop,
}

impl Method {
    pub const ALL: [Method; 10] = [
        Method::TurnOn,
        Method::TurnOff,
        Method::Bell,
        Method::Toggle,
        Method::Dim,
        Method::Learn,
        Method::Execute,
        Method::Up,
        Method::Down,
        Method::Stop,
    ];

    /// Bitmask covering every method, passed as `methodsSupported` to the
    /// daemon when querying device capabilities.
    pub const ALL_MASK: i32 = 1 | 2 | 4 | 8 | 16 | 32 | 64 | 128 | 256 | 512;

    pub const fn code(self) -> i32 {
        match self {
            Method::TurnOn => 1,
            Method::TurnOff => 2,
            Method::Bell => 4,
            Method::Toggle => 8,
            Method::Dim => 16,
            Method::Learn => 32,
            Method::Execute => 64,
            Method::Up => 128,
            Method::Down => 256,
            Method::Stop => 512,
        }
    }

    pub fn from_code(code: i32) -> Option<Method> {
        Method::ALL.into_iter().find(|m| m.code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Method::TurnOn => "turn on",
            Method::TurnOff => "turn off",
            Method::Bell => "bell",
            Method::Toggle => "toggle",
            Method::Dim => "dim",
            Method::Learn => "learn",
            Method::Execute => "execute",
            Method::Up => "up",
            Method::Down => "down",
            Method::Stop => "stop",
        }
    }
}

/// Human-readable method name for log output. Unknown codes get the
/// sentinel format; the sentinel is never used for topic construction.
pub fn method_name(code: i32) -> Cow<'static, str> {
    match Method::from_code(code) {
        Some(method) => Cow::Borrowed(method.name()),
        None => Cow::Owned(format!("UNKNOWN METHOD {code}")),
    }
}

/// Sensor measurement kind, one bit each in the telldus dataTypes bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    RainRate,
    RainTotal,
    WindDirection,
    WindAverage,
    WindGust,
}

impl SensorKind {
    pub const ALL: [SensorKind; 7] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::RainRate,
        SensorKind::RainTotal,
        SensorKind::WindDirection,
        SensorKind::WindAverage,
        SensorKind::WindGust,
    ];

    pub const fn code(self) -> i32 {
        match self {
            SensorKind::Temperature => 1,
            SensorKind::Humidity => 2,
            SensorKind::RainRate => 4,
            SensorKind::RainTotal => 8,
            SensorKind::WindDirection => 16,
            SensorKind::WindAverage => 32,
            SensorKind::WindGust => 64,
        }
    }

    pub fn from_code(code: i32) -> Option<SensorKind> {
        SensorKind::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Kinds present in a daemon-reported dataTypes bitmask.
    pub fn in_mask(mask: i32) -> impl Iterator<Item = SensorKind> {
        SensorKind::ALL
            .into_iter()
            .filter(move |k| mask & k.code() != 0)
    }

    /// Canonical lowercase name, used as the topic capability segment.
    pub const fn name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::RainRate => "rainrate",
            SensorKind::RainTotal => "raintotal",
            SensorKind::WindDirection => "winddirection",
            SensorKind::WindAverage => "windaverage",
            SensorKind::WindGust => "windgust",
        }
    }

    pub const fn unit(self) -> Option<&'static str> {
        match self {
            SensorKind::Temperature => Some("°C"),
            SensorKind::Humidity => Some("%"),
            SensorKind::RainRate => Some("mm/h"),
            SensorKind::RainTotal => Some("mm"),
            SensorKind::WindDirection => Some("°"),
            SensorKind::WindAverage => Some("m/s"),
            SensorKind::WindGust => Some("m/s"),
        }
    }

    /// Home Assistant device class, where one exists for the kind.
    pub const fn device_class(self) -> Option<&'static str> {
        match self {
            SensorKind::Temperature => Some("temperature"),
            SensorKind::Humidity => Some("humidity"),
            SensorKind::RainRate | SensorKind::RainTotal => Some("precipitation"),
            SensorKind::WindAverage | SensorKind::WindGust => Some("wind_speed"),
            SensorKind::WindDirection => None,
        }
    }
}

/// Sensor type name for log output, with the same sentinel convention
/// as [`method_name`].
pub fn sensor_type_name(code: i32) -> Cow<'static, str> {
    match SensorKind::from_code(code) {
        Some(kind) => Cow::Borrowed(kind.name()),
        None => Cow::Owned(format!("UNKNOWN METHOD {code}")),
    }
}
