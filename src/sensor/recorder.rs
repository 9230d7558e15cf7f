//! Background sensor recording.
//!
//! [`SensorRecorder`] runs one worker thread per recording session. The worker
//! opens the source and the reading log, then polls on a fixed period until
//! recording is switched off. Serial I/O blocks, so the worker is a plain OS
//! thread rather than an async task.
//!
//! Two flags describe the lifecycle: *requested* (set by `start`, cleared by
//! `stop` or by a failed open) and *running* (set once the poll loop is
//! entered). Open failures are only visible through the log and through
//! [`SensorRecorder::is_recording`] turning false.

use super::history::{self, ReadingLog};
use super::simulated::SimulatedSource;
use super::{SensorReading, SensorSource, SettingsHandle, SourceOpener};
use chrono::Local;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Shared {
    requested: AtomicBool,
    running: AtomicBool,
    latest: Mutex<SensorReading>,
}

impl Shared {
    fn set_latest(&self, reading: SensorReading) {
        *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = reading;
    }

    fn latest(&self) -> SensorReading {
        *self.latest.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn abort(&self) {
        self.requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

struct Worker {
    handle: JoinHandle<()>,
    /// Cuts the worker's sleep short when recording stops.
    wake: mpsc::Sender<()>,
}

/// Starts and stops the acquisition loop and caches the latest reading.
pub struct SensorRecorder {
    shared: Arc<Shared>,
    opener: Arc<dyn SourceOpener>,
    settings: SettingsHandle,
    log_path: PathBuf,
    worker: Mutex<Option<Worker>>,
}

impl SensorRecorder {
    /// `opener` supplies the hardware source; the simulated source needs
    /// none. Channel flags are read from `settings` for every line written.
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        settings: SettingsHandle,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
                latest: Mutex::new(SensorReading::SENTINEL),
            }),
            opener,
            settings,
            log_path: log_path.into(),
            worker: Mutex::new(None),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Start recording every `interval_seconds` (at least one second).
    ///
    /// A no-op while already recording; the running session keeps its
    /// source and period.
    pub fn start(&self, simulate: bool, interval_seconds: u32) {
        let secs = u64::from(interval_seconds.max(1));
        self.start_with_period(simulate, Duration::from_secs(secs));
    }

    /// Start recording with an explicit poll period.
    pub fn start_with_period(&self, simulate: bool, period: Duration) {
        let mut worker = self.lock_worker();

        if self.shared.requested.load(Ordering::SeqCst) {
            debug!("Recorder already running");
            return;
        }

        // A previous session that failed to open has exited on its own.
        if let Some(old) = worker.take() {
            if old.handle.join().is_err() {
                error!("Previous recorder thread panicked");
            }
        }

        self.shared.requested.store(true, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);

        let (wake, wake_rx) = mpsc::channel();
        let session = Session {
            shared: Arc::clone(&self.shared),
            opener: (!simulate).then(|| Arc::clone(&self.opener)),
            settings: self.settings.clone(),
            log_path: self.log_path.clone(),
            period,
            wake: wake_rx,
        };

        match thread::Builder::new()
            .name("sensor-recorder".into())
            .spawn(move || session.run())
        {
            Ok(handle) => *worker = Some(Worker { handle, wake }),
            Err(e) => {
                error!("Failed to spawn recorder thread: {}", e);
                self.shared.abort();
            }
        }
    }

    /// Stop recording and wait for the worker to exit.
    ///
    /// Returns at once if recording is off. The wait is short: the worker's
    /// sleep is interrupted, so at most one in-flight poll is awaited.
    pub fn stop(&self) {
        let mut worker = self.lock_worker();

        if !self.shared.requested.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(w) = worker.take() {
            let _ = w.wake.send(());
            if w.handle.join().is_err() {
                error!("Recorder thread panicked");
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_latest(SensorReading::SENTINEL);
        info!("Recording stopped");
    }

    /// Whether recording is requested.
    pub fn is_recording(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }

    /// Whether the poll loop has been entered.
    pub fn is_sampling(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Most recent logged reading, or the sentinel if there is none.
    pub fn latest(&self) -> SensorReading {
        self.shared.latest()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for SensorRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread owns.
struct Session {
    shared: Arc<Shared>,
    /// `None` for the simulated source.
    opener: Option<Arc<dyn SourceOpener>>,
    settings: SettingsHandle,
    log_path: PathBuf,
    period: Duration,
    wake: mpsc::Receiver<()>,
}

impl Session {
    fn run(self) {
        let mut source: Box<dyn SensorSource> = match &self.opener {
            None => Box::new(SimulatedSource::new()),
            Some(opener) => match opener.open() {
                Ok(source) => source,
                Err(e) => {
                    warn!("Serial sensor not connected: {}", e);
                    self.shared.abort();
                    return;
                }
            },
        };

        let mut log = match ReadingLog::open(&self.log_path) {
            Ok(log) => log,
            Err(e) => {
                error!("Cannot open reading log {}: {}", self.log_path.display(), e);
                self.shared.abort();
                return;
            }
        };

        self.shared.running.store(true, Ordering::SeqCst);
        info!(
            "Recording started ({}, every {:?})",
            if self.opener.is_some() { "serial" } else { "simulated" },
            self.period
        );

        while self.shared.requested.load(Ordering::SeqCst) {
            self.sample(source.as_mut(), &mut log);

            match self.wake.recv_timeout(self.period) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(log);
        drop(source);
        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn sample(&self, source: &mut dyn SensorSource, log: &mut ReadingLog) {
        let reading = match source.poll() {
            Ok(reading) if !reading.is_sentinel() => reading,
            Ok(_) => {
                debug!("No data this cycle");
                return;
            }
            Err(e) => {
                debug!("No data this cycle: {}", e);
                return;
            }
        };

        let line = history::format_line(Local::now().naive_local(), &reading, &self.settings.get());
        if let Err(e) = log.append(&line) {
            error!("Failed to append to {}: {}", log.path().display(), e);
        }
        self.shared.set_latest(reading);
    }
}
