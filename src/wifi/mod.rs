//! Wi-Fi connectivity.
//!
//! - [`connection`] - scan, connect, disconnect, auto-connect
//! - [`storage`] - known-networks file
//! - [`monitor`] - periodic falling-edge reconnect trigger
//!
//! Credential validation lives in [`crate::config`].

mod connection;
mod monitor;
mod storage;

pub use connection::{
    association_completed, connect_message, parse_ipv4_address, parse_scan_output,
    AutoConnectOutcome, WifiError, WifiManager, STATUS_CONNECTING, STATUS_ERROR, STATUS_SUCCESS,
};
pub use monitor::{spawn_monitor, ConnectivityMonitor};
pub use storage::{CredentialStore, KnownNetworks, StoreError};
