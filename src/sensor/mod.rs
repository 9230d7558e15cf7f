//! Sensor acquisition.
//!
//! A [`SensorSource`] produces one [`SensorReading`] per poll. Two sources
//! exist: [`simulated::SimulatedSource`] for running without hardware and
//! [`serial::SerialSource`] for the real probe. The [`recorder`] drives a
//! source on an interval and appends readings to the [`history`] log.

pub mod history;
pub mod recorder;
pub mod serial;
pub mod settings;
pub mod simulated;

pub use recorder::SensorRecorder;
pub use settings::{SensorSettings, SettingsError, SettingsHandle};

use std::fmt;
use std::io;

/// One sample of the three probe channels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReading {
    /// Temperature (°C).
    pub temperature: f32,
    /// Conductivity.
    pub conductivity: f32,
    /// Pressure.
    pub pressure: f32,
}

impl SensorReading {
    /// All channels zero. Means "no data this cycle" and is never logged.
    pub const SENTINEL: Self = Self {
        temperature: 0.0,
        conductivity: 0.0,
        pressure: 0.0,
    };

    pub fn new(temperature: f32, conductivity: f32, pressure: f32) -> Self {
        Self {
            temperature,
            conductivity,
            pressure,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.temperature == 0.0 && self.conductivity == 0.0 && self.pressure == 0.0
    }
}

/// Produces readings. Owned by the recorder's worker thread.
pub trait SensorSource: Send {
    /// Take one reading. May block for the device's response time.
    fn poll(&mut self) -> Result<SensorReading, SensorError>;
}

/// Opens the hardware source when recording starts.
pub trait SourceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn SensorSource>, SensorError>;
}

/// Errors from a sensor source.
#[derive(Debug)]
pub enum SensorError {
    /// The device could not be found or opened.
    Unavailable(String),
    /// Transport error while talking to the device.
    Io(io::Error),
    /// The response did not contain three numbers.
    Malformed(String),
    /// The device sent nothing this cycle.
    NoData,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(why) => write!(f, "sensor unavailable: {}", why),
            Self::Io(e) => write!(f, "sensor I/O error: {}", e),
            Self::Malformed(raw) => write!(f, "malformed sensor response: {:?}", raw),
            Self::NoData => write!(f, "no data from sensor"),
        }
    }
}

impl std::error::Error for SensorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SensorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serialport::Error> for SensorError {
    fn from(e: serialport::Error) -> Self {
        Self::Io(e.into())
    }
}
