//! Reading log.
//!
//! One line per logged reading:
//!
//! ```text
//! 2025-06-24 16:33:46, Temp: 19.320000, Cond: 30.840000, Pres: -0.000002
//! ```
//!
//! Channels disabled in the settings at write time are left out, so a file
//! can mix lines with different channel sets. The queries here back the
//! averages and chart views.

use super::{SensorReading, SensorSettings};
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Timestamp layout at the start of every line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TEMP_LABEL: &str = "Temp";
const COND_LABEL: &str = "Cond";
const PRES_LABEL: &str = "Pres";

/// Render one log line (without the trailing newline).
pub fn format_line(
    timestamp: NaiveDateTime,
    reading: &SensorReading,
    settings: &SensorSettings,
) -> String {
    let mut line = timestamp.format(TIMESTAMP_FORMAT).to_string();
    let channels = [
        (settings.include_temperature, TEMP_LABEL, reading.temperature),
        (settings.include_conductivity, COND_LABEL, reading.conductivity),
        (settings.include_pressure, PRES_LABEL, reading.pressure),
    ];
    for (enabled, label, value) in channels {
        if enabled {
            line.push_str(&format!(", {}: {:.6}", label, value));
        }
    }
    line
}

/// One parsed log line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f32>,
    pub conductivity: Option<f32>,
    pub pressure: Option<f32>,
}

/// Parse one log line. Returns `None` for anything not written by
/// [`format_line`].
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let mut fields = line.trim_end().split(", ");
    let timestamp = NaiveDateTime::parse_from_str(fields.next()?, TIMESTAMP_FORMAT).ok()?;

    let mut entry = LogEntry {
        timestamp,
        temperature: None,
        conductivity: None,
        pressure: None,
    };
    for field in fields {
        let (label, value) = field.split_once(": ")?;
        let value: f32 = value.trim().parse().ok()?;
        match label {
            TEMP_LABEL => entry.temperature = Some(value),
            COND_LABEL => entry.conductivity = Some(value),
            PRES_LABEL => entry.pressure = Some(value),
            _ => return None,
        }
    }
    Some(entry)
}

/// All parseable entries in the log, oldest first.
pub fn load_entries(path: &Path) -> io::Result<Vec<LogEntry>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().filter_map(parse_line).collect())
}

/// The last `n` entries, for charting.
pub fn recent(entries: &[LogEntry], n: usize) -> &[LogEntry] {
    &entries[entries.len().saturating_sub(n)..]
}

/// Per-channel means over a set of entries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelAverages {
    pub temperature: Option<f32>,
    pub conductivity: Option<f32>,
    pub pressure: Option<f32>,
    /// Entries that went into the averages.
    pub samples: usize,
}

/// Means over the last `n` entries. `None` if there are no entries.
pub fn average_last(entries: &[LogEntry], n: usize) -> Option<ChannelAverages> {
    average(recent(entries, n).iter())
}

/// Means over entries at or after `cutoff`. `None` if none qualify.
pub fn average_since(entries: &[LogEntry], cutoff: NaiveDateTime) -> Option<ChannelAverages> {
    average(entries.iter().filter(|e| e.timestamp >= cutoff))
}

fn average<'a>(entries: impl Iterator<Item = &'a LogEntry>) -> Option<ChannelAverages> {
    #[derive(Default)]
    struct Sum {
        total: f64,
        count: usize,
    }

    impl Sum {
        fn add(&mut self, value: Option<f32>) {
            if let Some(v) = value {
                self.total += f64::from(v);
                self.count += 1;
            }
        }

        fn mean(&self) -> Option<f32> {
            (self.count > 0).then(|| (self.total / self.count as f64) as f32)
        }
    }

    let (mut t, mut c, mut p) = (Sum::default(), Sum::default(), Sum::default());
    let mut samples = 0;
    for entry in entries {
        t.add(entry.temperature);
        c.add(entry.conductivity);
        p.add(entry.pressure);
        samples += 1;
    }

    (samples > 0).then(|| ChannelAverages {
        temperature: t.mean(),
        conductivity: c.mean(),
        pressure: p.mean(),
        samples,
    })
}

/// Append handle on the reading log.
#[derive(Debug)]
pub struct ReadingLog {
    file: File,
    path: PathBuf,
}

impl ReadingLog {
    /// Open for appending, creating the file if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and flush it.
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }
}
