//! Known-networks persistence.
//!
//! Credentials that connected successfully are kept in a plain text file, one
//! `ssid:password` per line, so the station can reconnect unattended. An entry
//! matches an SSID when the line starts with `"<ssid>:"`; no escaping is done.
//!
//! Every read-modify-write cycle holds the store's lock, and removal rewrites
//! the file through a temporary sibling that is renamed over the original.

use crate::config::WifiConfig;
use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

/// Known networks loaded from the store, keyed by SSID.
///
/// When the file holds duplicate SSIDs the last line wins.
#[derive(Default)]
pub struct KnownNetworks {
    entries: HashMap<String, Zeroizing<String>>,
}

impl KnownNetworks {
    /// Parse the store's text format. Lines without a `:` are skipped.
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for line in content.lines() {
            if let Some((ssid, password)) = line.split_once(':') {
                entries.insert(ssid.to_string(), Zeroizing::new(password.to_string()));
            }
        }
        Self { entries }
    }

    /// Stored password for `ssid`.
    pub fn password(&self, ssid: &str) -> Option<&str> {
        self.entries.get(ssid).map(|p| p.as_str())
    }

    pub fn contains(&self, ssid: &str) -> bool {
        self.entries.contains_key(ssid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for KnownNetworks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// File-backed SSID to password table.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialStore {
    /// Create a store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all known networks.
    ///
    /// Returns [`StoreError::NotFound`] when the file does not exist.
    pub fn load(&self) -> Result<KnownNetworks, StoreError> {
        let _guard = self.guard();
        let content = self.read()?;
        Ok(KnownNetworks::parse(&content))
    }

    /// True if a line for `ssid` exists. A missing file holds nothing.
    pub fn contains(&self, ssid: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();
        Ok(self
            .read_or_empty()?
            .lines()
            .any(|line| matches_ssid(line, ssid)))
    }

    /// Append `config` unless its SSID is already present.
    ///
    /// Returns `true` if a line was appended. The SSID match is exact and
    /// case-sensitive; an existing entry is never rewritten.
    pub fn remember(&self, config: &WifiConfig) -> Result<bool, StoreError> {
        let _guard = self.guard();

        let existing = Zeroizing::new(self.read_or_empty()?);
        if existing.lines().any(|line| matches_ssid(line, &config.ssid)) {
            debug!("Network {} already known", config.ssid);
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // A hand-edited file may lack the final newline.
        let separator = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        let line = Zeroizing::new(format!("{}{}:{}\n", separator, config.ssid, config.password));
        file.write_all(line.as_bytes())?;
        file.flush()?;

        info!("Saved network {} to {}", config.ssid, self.path.display());
        Ok(true)
    }

    /// Remove every line for `ssid`, keeping all other lines in order.
    ///
    /// The filtered content is written to a temporary file, synced, and
    /// renamed over the original. Returns `true` if anything was removed;
    /// the file is left untouched otherwise.
    pub fn forget(&self, ssid: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();

        let content = Zeroizing::new(self.read_or_empty()?);
        let mut kept = Zeroizing::new(String::with_capacity(content.len()));
        let mut removed = false;
        for line in content.lines() {
            if matches_ssid(line, ssid) {
                removed = true;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if !removed {
            return Ok(false);
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(kept.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!("Removed network {} from {}", ssid, self.path.display());
        Ok(true)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> Result<String, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn read_or_empty(&self) -> Result<String, StoreError> {
        match self.read() {
            Err(StoreError::NotFound(_)) => Ok(String::new()),
            other => other,
        }
    }
}

fn matches_ssid(line: &str, ssid: &str) -> bool {
    line.strip_prefix(ssid)
        .map_or(false, |rest| rest.starts_with(':'))
}

/// Errors accessing the known-networks file.
#[derive(Debug)]
pub enum StoreError {
    /// The file does not exist.
    NotFound(PathBuf),
    /// The file could not be read or written.
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "{} not found", path.display()),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::NotFound(_) => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
