//! Sensor station connectivity and acquisition.
//!
//! The station joins Wi-Fi networks through the system's wireless tools,
//! reconnects unattended to networks it has joined before, and records probe
//! readings to a durable log in the background.
//!
//! - [`wifi`] - connection manager, known-networks store, connectivity monitor
//! - [`sensor`] - probe sources, settings, recorder, reading log
//! - [`station`] - context object owning all of the above
//! - [`status`] - status pushes for the UI header
//! - [`config`] - file locations, device settings, timings
//! - [`process`] - external command execution
//! - [`logging`] - application log

pub mod config;
pub mod logging;
pub mod process;
pub mod sensor;
pub mod station;
pub mod status;
pub mod wifi;

// Re-export commonly used items
pub use config::{ConfigError, StationConfig, WifiConfig};
pub use sensor::{SensorReading, SensorRecorder, SensorSettings, SettingsHandle};
pub use station::Station;
pub use status::{ChannelStatusSink, StatusEvent, StatusLevel, StatusSink};
pub use wifi::{AutoConnectOutcome, CredentialStore, WifiError, WifiManager};
