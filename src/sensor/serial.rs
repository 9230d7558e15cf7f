//! Serial probe transport.
//!
//! Request/response over a USB serial adapter at fixed 8N1 framing: the poll
//! command is written, the device is given a fixed time to answer, and the
//! answer must start with three whitespace-separated numbers.

use super::{SensorError, SensorReading, SensorSource, SourceOpener};
use crate::config::SerialSettings;
use log::{debug, info};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

/// Device patterns probed when no device is configured.
const PORT_PATTERNS: &[&str] = &["/dev/ttyUSB*", "/dev/ttyACM*"];

/// Read timeout once data is known to be waiting.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Upper bound on one response.
const MAX_RESPONSE: usize = 256;

/// First USB serial device present.
pub fn find_serial_port() -> Option<String> {
    for pattern in PORT_PATTERNS {
        if let Ok(paths) = glob::glob(pattern) {
            if let Some(path) = paths.flatten().next() {
                return Some(path.to_string_lossy().to_string());
            }
        }
    }
    None
}

/// Parse a device response into a reading.
///
/// Anything after the third number is ignored.
pub fn parse_response(text: &str) -> Result<SensorReading, SensorError> {
    let mut values = text.split_whitespace().map(str::parse::<f32>);
    match (values.next(), values.next(), values.next()) {
        (Some(Ok(t)), Some(Ok(c)), Some(Ok(p))) => Ok(SensorReading::new(t, c, p)),
        _ => Err(SensorError::Malformed(text.trim().to_string())),
    }
}

/// Open connection to the probe.
pub struct SerialSource {
    port: Box<dyn SerialPort>,
    poll_command: Vec<u8>,
    response_wait: Duration,
}

impl SerialSource {
    /// Open the configured device, or the first one found.
    pub fn open(settings: &SerialSettings) -> Result<Self, SensorError> {
        let device = if settings.device.is_empty() {
            find_serial_port()
                .ok_or_else(|| SensorError::Unavailable("no USB serial device found".into()))?
        } else {
            settings.device.clone()
        };

        let port = serialport::new(&device, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| SensorError::Unavailable(format!("{}: {}", device, e)))?;

        info!("Opened sensor on {} at {} baud", device, settings.baud_rate);
        Ok(Self {
            port,
            poll_command: settings.poll_command.as_bytes().to_vec(),
            response_wait: settings.response_wait(),
        })
    }
}

impl SensorSource for SerialSource {
    fn poll(&mut self) -> Result<SensorReading, SensorError> {
        // Stale bytes from a previous late answer would shift the fields.
        let _ = self.port.clear(ClearBuffer::Input);

        self.port.write_all(&self.poll_command)?;
        self.port.flush()?;
        thread::sleep(self.response_wait);

        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Err(SensorError::NoData);
        }
        let mut buf = vec![0u8; available.min(MAX_RESPONSE)];
        let n = self.port.read(&mut buf)?;
        let text = String::from_utf8_lossy(&buf[..n]);

        parse_response(&text).map_err(|e| {
            debug!("{}", e);
            e
        })
    }
}

/// Opens a [`SerialSource`] from the station's serial settings.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    settings: SerialSettings,
}

impl SerialOpener {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl SourceOpener for SerialOpener {
    fn open(&self) -> Result<Box<dyn SensorSource>, SensorError> {
        Ok(Box::new(SerialSource::open(&self.settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let r = parse_response("19.32 30.84 -0.000002\r\n").unwrap();
        assert_eq!(r, SensorReading::new(19.32, 30.84, -0.000002));
    }

    #[test]
    fn test_parse_response_extra_tokens_ignored() {
        let r = parse_response("  1.5\t2.5 3.5 OK\n").unwrap();
        assert_eq!(r, SensorReading::new(1.5, 2.5, 3.5));
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(matches!(parse_response("1.0 2.0"), Err(SensorError::Malformed(_))));
        assert!(matches!(parse_response("1.0 abc 3.0"), Err(SensorError::Malformed(_))));
        assert!(matches!(parse_response(""), Err(SensorError::Malformed(_))));
    }

    #[test]
    fn test_parse_all_zero_is_sentinel() {
        assert!(parse_response("0 0 0").unwrap().is_sentinel());
    }

    #[test]
    fn test_open_missing_device() {
        let settings = SerialSettings {
            device: "/dev/definitely-not-a-tty".to_string(),
            ..SerialSettings::default()
        };
        assert!(matches!(
            SerialOpener::new(settings).open(),
            Err(SensorError::Unavailable(_))
        ));
    }
}
