//! Station configuration.
//!
//! - [`wifi`] - Wi-Fi credential validation (host-testable)
//! - [`StationConfig`] - file locations, interface and serial port settings,
//!   and the Wi-Fi timing constants, loaded from a JSON file
//!
//! Every field has a default matching the production device, so a missing or
//! partial configuration file is never an error.

mod wifi;

pub use wifi::{ConfigError, WifiConfig, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};

use log::{info, warn};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "SENSOR_STATION_CONFIG";

/// Configuration files probed by [`StationConfig::load_or_default`], in order.
pub const CONFIG_SEARCH_PATHS: &[&str] = &["/etc/sensor-station.json", "sensor-station.json"];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub wifi: WifiSettings,
    pub sensor: SerialSettings,
    pub paths: PathSettings,
    pub timings: WifiTimings,
}

/// Wireless interface and supplicant files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WifiSettings {
    /// Wireless interface name.
    pub interface: String,
    /// Regulatory country code written into the supplicant config.
    pub country: String,
    /// Supplicant control socket directory.
    pub ctrl_interface: PathBuf,
    /// Transient supplicant config, removed after each start attempt.
    pub transient_config: PathBuf,
    /// Known-networks file (`ssid:password` per line).
    pub known_networks: PathBuf,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            country: "TR".to_string(),
            ctrl_interface: PathBuf::from("/var/run/wpa_supplicant"),
            transient_config: PathBuf::from("/tmp/wpa_dynamic.conf"),
            known_networks: PathBuf::from("/etc/known_networks.txt"),
        }
    }
}

/// Serial sensor transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path. Empty means "first USB serial adapter found".
    pub device: String,
    /// Line speed; framing is fixed at 8N1 without flow control.
    pub baud_rate: u32,
    /// Request that elicits one three-value response.
    pub poll_command: String,
    /// Wait between sending the request and reading the response.
    pub response_wait_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: 19_200,
            poll_command: "POLL\r\n".to_string(),
            response_wait_ms: 1_000,
        }
    }
}

impl SerialSettings {
    pub fn response_wait(&self) -> Duration {
        Duration::from_millis(self.response_wait_ms)
    }
}

/// Durable files owned by the station.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Append-only reading log.
    pub reading_log: PathBuf,
    /// Sensor settings (`KEY=VALUE`).
    pub settings: PathBuf,
    /// Application log.
    pub app_log: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            reading_log: PathBuf::from("/etc/sensor_data.txt"),
            settings: PathBuf::from("/etc/sensor_settings.txt"),
            app_log: PathBuf::from("/etc/logs.txt"),
        }
    }
}

/// Delays and retry limits used by the Wi-Fi manager and monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WifiTimings {
    /// Wait after bringing the interface up before scanning.
    pub link_settle_ms: u64,
    /// Wait after bringing the interface up before auto-connect probes.
    pub auto_settle_ms: u64,
    /// Wait after tearing down a previous supplicant.
    pub supplicant_settle_ms: u64,
    /// Wait between supplicant start attempts.
    pub retry_backoff_ms: u64,
    /// Supplicant start attempts before giving up.
    pub supplicant_attempts: u32,
    /// How long the auto-connect success indicator stays visible.
    pub success_clear_ms: u64,
    /// Connectivity monitor sampling period.
    pub monitor_interval_ms: u64,
    /// Delay before the one-shot auto-connect at startup.
    pub startup_delay_ms: u64,
}

impl Default for WifiTimings {
    fn default() -> Self {
        Self {
            link_settle_ms: 1_000,
            auto_settle_ms: 500,
            supplicant_settle_ms: 1_500,
            retry_backoff_ms: 1_000,
            supplicant_attempts: 3,
            success_clear_ms: 3_000,
            monitor_interval_ms: 15_000,
            startup_delay_ms: 10_000,
        }
    }
}

impl WifiTimings {
    /// All delays zero, same retry count. Used by tests.
    pub fn immediate() -> Self {
        Self {
            link_settle_ms: 0,
            auto_settle_ms: 0,
            supplicant_settle_ms: 0,
            retry_backoff_ms: 0,
            success_clear_ms: 0,
            monitor_interval_ms: 0,
            startup_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn link_settle(&self) -> Duration {
        Duration::from_millis(self.link_settle_ms)
    }

    pub fn auto_settle(&self) -> Duration {
        Duration::from_millis(self.auto_settle_ms)
    }

    pub fn supplicant_settle(&self) -> Duration {
        Duration::from_millis(self.supplicant_settle_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn success_clear(&self) -> Duration {
        Duration::from_millis(self.success_clear_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

impl StationConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, StationConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from `$SENSOR_STATION_CONFIG` or the search paths, falling back
    /// to defaults.
    ///
    /// Runs before the logger exists, so nothing is logged here; pass the
    /// report to [`LoadReport::log`] once logging is up.
    pub fn load_or_default() -> (Self, LoadReport) {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(explicit));
        }
        candidates.extend(CONFIG_SEARCH_PATHS.iter().map(PathBuf::from));
        Self::load_first(&candidates)
    }

    /// Load the first candidate that exists and parses.
    pub fn load_first(candidates: &[PathBuf]) -> (Self, LoadReport) {
        let mut report = LoadReport::default();
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => {
                    report.source = Some(path.clone());
                    return (config, report);
                }
                Err(e) => report.failures.push((path.clone(), e)),
            }
        }
        (Self::default(), report)
    }
}

/// How [`StationConfig::load_or_default`] arrived at its result.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// File the configuration came from; `None` means defaults.
    pub source: Option<PathBuf>,
    /// Candidates that exist but could not be loaded.
    pub failures: Vec<(PathBuf, StationConfigError)>,
}

impl LoadReport {
    pub fn log(&self) {
        for (path, e) in &self.failures {
            warn!("Failed to load {}: {}", path.display(), e);
        }
        match &self.source {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => warn!("No configuration file found - using defaults"),
        }
    }
}

/// Errors loading the station configuration file.
#[derive(Debug)]
pub enum StationConfigError {
    /// File could not be read.
    Io(io::Error),
    /// File is not valid configuration JSON.
    Parse(serde_json::Error),
}

impl fmt::Display for StationConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Parse(e) => write!(f, "failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for StationConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<io::Error> for StationConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StationConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
