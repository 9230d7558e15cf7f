//! Sensor settings persistence.
//!
//! Stored as `KEY=VALUE` lines (`SIM`, `INTERVAL`, `TEMP`, `COND`, `PRESS`,
//! booleans as `0`/`1`). A missing or unreadable file yields the defaults;
//! unknown keys and unparsable values are skipped line by line.

use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// User-editable acquisition settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    /// Use the simulated source instead of the serial probe.
    pub simulate: bool,
    /// Seconds between polls.
    pub interval_seconds: u32,
    /// Log the temperature channel.
    pub include_temperature: bool,
    /// Log the conductivity channel.
    pub include_conductivity: bool,
    /// Log the pressure channel.
    pub include_pressure: bool,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            simulate: false,
            interval_seconds: 10,
            include_temperature: false,
            include_conductivity: false,
            include_pressure: false,
        }
    }
}

impl SensorSettings {
    /// Parse the settings file format, starting from the defaults.
    pub fn parse(content: &str) -> Self {
        let mut settings = Self::default();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "SIM" => settings.simulate = value == "1",
                "INTERVAL" => match value.parse() {
                    Ok(secs) => settings.interval_seconds = secs,
                    Err(_) => debug!("Ignoring INTERVAL={:?}", value),
                },
                "TEMP" => settings.include_temperature = value == "1",
                "COND" => settings.include_conductivity = value == "1",
                "PRESS" => settings.include_pressure = value == "1",
                other => debug!("Ignoring unknown setting {:?}", other),
            }
        }
        settings
    }

    /// Render in the settings file format.
    pub fn to_file_string(&self) -> String {
        format!(
            "SIM={}\nINTERVAL={}\nTEMP={}\nCOND={}\nPRESS={}\n",
            flag(self.simulate),
            self.interval_seconds,
            flag(self.include_temperature),
            flag(self.include_conductivity),
            flag(self.include_pressure),
        )
    }

    /// Poll period, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds.max(1)))
    }

    /// Load from `path`, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => {
                info!("Loaded sensor settings from {}", path.display());
                Self::parse(&content)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No sensor settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write to `path` and verify by reading it back.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_file_string();
        fs::write(path, &content)?;

        let read_back = fs::read_to_string(path)?;
        if read_back != content {
            return Err(SettingsError::Verify {
                wrote: content.len(),
                read: read_back.len(),
            });
        }

        info!("Sensor settings saved to {}", path.display());
        Ok(())
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Settings shared between the UI and the recorder.
///
/// The recorder reads the channel flags on every line it writes, so edits
/// apply to the next logged reading without restarting.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<SensorSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: SensorSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings.
    pub fn get(&self) -> SensorSettings {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, settings: SensorSettings) {
        self.update(|s| *s = settings);
    }

    /// Modify the settings in place.
    pub fn update(&self, f: impl FnOnce(&mut SensorSettings)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    /// Persist the current settings.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        self.get().save(path)
    }
}

/// Errors saving the settings file.
#[derive(Debug)]
pub enum SettingsError {
    /// The file could not be written or read back.
    Io(io::Error),
    /// The file read back differs from what was written.
    Verify { wrote: usize, read: usize },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "settings I/O error: {}", e),
            Self::Verify { wrote, read } => write!(
                f,
                "settings verification failed: wrote {} bytes, read {} bytes",
                wrote, read
            ),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Verify { .. } => None,
        }
    }
}

impl From<io::Error> for SettingsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
