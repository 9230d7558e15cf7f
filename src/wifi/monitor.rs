//! Periodic connectivity monitor.
//!
//! Samples real connectivity on a fixed period, keeps the manager's cached
//! flag current, and starts an auto-connect pass when the link goes from
//! connected to disconnected. A drop and recovery that both happen inside one
//! period are not seen.

use super::connection::WifiManager;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Falling-edge detector over connectivity samples.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    previous: bool,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// The first sample is compared against "connected", so starting up
    /// without a link counts as a drop.
    pub fn new() -> Self {
        Self { previous: true }
    }

    /// Record a sample. Returns `true` on a connected to disconnected edge.
    pub fn sample(&mut self, connected: bool) -> bool {
        let falling = self.previous && !connected;
        self.previous = connected;
        falling
    }
}

/// Run the monitor until `cancel` fires.
pub fn spawn_monitor(
    manager: WifiManager,
    tracker: &TaskTracker,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tracker.spawn(async move {
        let period = manager.timings().monitor_interval();
        let mut monitor = ConnectivityMonitor::new();
        info!("Connectivity monitor started ({:?} period)", period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connectivity monitor shutting down");
                    break;
                }
                _ = tokio::time::sleep(period) => {}
            }

            let connected = manager.refresh_connected().await;
            if monitor.sample(connected) {
                warn!("Wi-Fi connection lost, starting auto-connect");
                // Detached; shutdown waits for it through the tracker.
                let _ = manager.auto_connect_background();
            }
        }
    })
}
