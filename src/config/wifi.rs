//! Wi-Fi credential validation.
//!
//! Platform-independent checks applied before any process is spawned for a
//! connection attempt.
//!
//! # Example
//!
//! ```
//! use sensor_station::config::{ConfigError, WifiConfig};
//!
//! let config = WifiConfig::new("MyNetwork", "MyPassword").unwrap();
//! assert_eq!(config.ssid, "MyNetwork");
//!
//! let err = WifiConfig::new("MyNetwork", "short").unwrap_err();
//! assert!(matches!(err, ConfigError::PasswordTooShort { .. }));
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum WPA passphrase length.
pub const MAX_PASSWORD_LEN: usize = 63;

/// Minimum WPA passphrase length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Validated WPA-PSK credentials for an access point.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiConfig {
    /// Network SSID, as printed by the scan tool.
    pub ssid: String,
    /// WPA passphrase (8-63 bytes).
    pub password: String,
}

impl WifiConfig {
    /// Create a validated configuration.
    ///
    /// Only the passphrase length is checked. SSIDs are taken as given, since
    /// scan output escapes non-printable bytes and may exceed 32 characters.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let len = self.password.len();
        if len < MIN_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooShort {
                len,
                min: MIN_PASSWORD_LEN,
            });
        }
        if len > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len,
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(())
    }

    /// Render the `wpa_supplicant` configuration for these credentials.
    pub fn supplicant_conf(&self, ctrl_interface: &str, country: &str) -> String {
        format!(
            "ctrl_interface={}\n\
             update_config=1\n\
             country={}\n\
             network={{\n    \
             ssid=\"{}\"\n    \
             psk=\"{}\"\n    \
             key_mgmt=WPA-PSK\n\
             }}\n",
            ctrl_interface, country, self.ssid, self.password
        )
    }
}

impl fmt::Debug for WifiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiConfig")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .finish()
    }
}

/// Credential validation errors.
///
/// Both variants display the same user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Password is too short for WPA.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PasswordTooShort { .. } | Self::PasswordTooLong { .. } => write!(
                f,
                "Password must be {}–{} characters",
                MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
