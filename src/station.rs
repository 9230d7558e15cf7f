//! Station context.
//!
//! [`Station`] owns the Wi-Fi manager, credential store, recorder, sensor
//! settings and status sink, and the task tracker and cancellation token that
//! bound every background task. Whatever drives the UI holds one `Station`
//! and calls into it; nothing is reachable through globals.

use crate::config::StationConfig;
use crate::process::{CommandRunner, SystemRunner};
use crate::sensor::serial::SerialOpener;
use crate::sensor::{SensorRecorder, SensorSettings, SettingsError, SettingsHandle, SourceOpener};
use crate::status::StatusSink;
use crate::wifi::{spawn_monitor, CredentialStore, WifiManager};
use log::{debug, error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct Station {
    config: StationConfig,
    store: Arc<CredentialStore>,
    wifi: WifiManager,
    recorder: Arc<SensorRecorder>,
    settings: SettingsHandle,
    status: Arc<dyn StatusSink>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Station {
    /// Assemble a station from its collaborators.
    pub fn new(
        config: StationConfig,
        runner: Arc<dyn CommandRunner>,
        status: Arc<dyn StatusSink>,
        opener: Arc<dyn SourceOpener>,
        settings: SensorSettings,
    ) -> Self {
        let tracker = TaskTracker::new();
        let store = Arc::new(CredentialStore::new(&config.wifi.known_networks));
        let wifi = WifiManager::new(
            runner,
            Arc::clone(&store),
            Arc::clone(&status),
            config.wifi.clone(),
            config.timings.clone(),
            tracker.clone(),
        );
        let settings = SettingsHandle::new(settings);
        let recorder = Arc::new(SensorRecorder::new(
            opener,
            settings.clone(),
            &config.paths.reading_log,
        ));

        Self {
            config,
            store,
            wifi,
            recorder,
            settings,
            status,
            tracker,
            cancel: CancellationToken::new(),
        }
    }

    /// Station on real hardware: system tools, the configured serial probe,
    /// and sensor settings loaded from disk.
    pub fn system(config: StationConfig, status: Arc<dyn StatusSink>) -> Self {
        let settings = SensorSettings::load(&config.paths.settings);
        let opener = Arc::new(SerialOpener::new(config.sensor.clone()));
        Self::new(config, Arc::new(SystemRunner), status, opener, settings)
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn wifi(&self) -> &WifiManager {
        &self.wifi
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    pub fn recorder(&self) -> &SensorRecorder {
        &self.recorder
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn status(&self) -> &Arc<dyn StatusSink> {
        &self.status
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the connectivity monitor and the delayed startup auto-connect.
    pub fn spawn_background(&self) {
        spawn_monitor(self.wifi.clone(), &self.tracker, self.cancel.clone());

        let wifi = self.wifi.clone();
        let cancel = self.cancel.clone();
        let delay = self.config.timings.startup_delay();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Startup auto-connect cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let outcome = wifi.auto_connect().await;
                    info!("Startup auto-connect: {:?}", outcome);
                }
            }
        });
    }

    /// Start recording with the current settings.
    pub fn start_recording(&self) {
        let s = self.settings.get();
        self.recorder.start(s.simulate, s.interval_seconds);
    }

    /// Stop any running session and start a new one with the current
    /// settings. Blocks while the old worker exits.
    pub fn restart_recording(&self) {
        self.recorder.stop();
        self.start_recording();
    }

    /// Persist the current sensor settings.
    pub fn save_settings(&self) -> Result<(), SettingsError> {
        self.settings.save(&self.config.paths.settings)
    }

    /// Cancel background tasks, wait for in-flight Wi-Fi work, and stop the
    /// recorder.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let recorder = Arc::clone(&self.recorder);
        if tokio::task::spawn_blocking(move || recorder.stop())
            .await
            .is_err()
        {
            error!("Recorder shutdown panicked");
        }
        info!("Shutdown complete");
    }
}
