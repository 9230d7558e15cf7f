//! Wi-Fi connection management.
//!
//! [`WifiManager`] drives the station's wireless interface through external
//! tools (`ip`, `iw`, `wpa_supplicant`, `udhcpc`, `wpa_cli`). Every command
//! runs on a blocking thread so the async tasks that sequence a connection
//! never stall the runtime, and every background operation is spawned on the
//! shared [`TaskTracker`] so shutdown can wait for it.

use super::storage::{CredentialStore, KnownNetworks};
use crate::config::{ConfigError, WifiConfig, WifiSettings, WifiTimings};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::status::{StatusLevel, StatusSink};
use log::{debug, error, info, warn};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use zeroize::Zeroizing;

/// Status text shown while an auto-connect attempt is running.
pub const STATUS_CONNECTING: &str = "Connecting";
/// Status text shown after a successful auto-connect.
pub const STATUS_SUCCESS: &str = "✓";
/// Status text shown after a failed auto-connect.
pub const STATUS_ERROR: &str = "ERROR";

/// Result of one auto-connect pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoConnectOutcome {
    /// The supplicant already reported a completed association.
    AlreadyConnected,
    /// The known-networks file could not be read.
    StoreUnavailable,
    /// No scanned SSID is in the known-networks file.
    NoKnownNetwork,
    /// Connected to a known network.
    Connected { ssid: String, ip: String },
    /// The first known network failed and was forgotten.
    Failed { ssid: String, reason: String },
}

/// Wi-Fi connection manager.
///
/// Cheap to clone; clones share the cached connectivity flag.
#[derive(Clone)]
pub struct WifiManager {
    inner: Arc<Inner>,
}

struct Inner {
    runner: Arc<dyn CommandRunner>,
    store: Arc<CredentialStore>,
    status: Arc<dyn StatusSink>,
    settings: WifiSettings,
    timings: WifiTimings,
    connected: AtomicBool,
    tracker: TaskTracker,
}

impl WifiManager {
    /// Create a manager. Background work is spawned on `tracker`.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        store: Arc<CredentialStore>,
        status: Arc<dyn StatusSink>,
        settings: WifiSettings,
        timings: WifiTimings,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                store,
                status,
                settings,
                timings,
                connected: AtomicBool::new(false),
                tracker,
            }),
        }
    }

    /// Wireless interface name.
    pub fn interface(&self) -> &str {
        &self.inner.settings.interface
    }

    pub fn timings(&self) -> &WifiTimings {
        &self.inner.timings
    }

    /// Scan for networks.
    ///
    /// Brings the interface up first if needed. SSIDs are returned in the
    /// order the scan tool printed them, duplicates included.
    pub async fn scan(&self) -> Result<Vec<String>, WifiError> {
        if !self.interface_is_up().await {
            self.bring_up().await;
            tokio::time::sleep(self.inner.timings.link_settle()).await;
        }

        let output = self
            .exec(CommandSpec::new("iw").args(["dev", self.interface(), "scan"]))
            .await?;
        if !output.success() {
            debug!("Scan exited with {:?}", output.status);
        }

        let ssids = parse_scan_output(&output.stdout);
        debug!("Scan found {} SSIDs", ssids.len());
        Ok(ssids)
    }

    /// Connect in the background.
    ///
    /// The handle resolves to the assigned IP address, or the reason the
    /// attempt stopped. See [`connect_message`] for the UI text.
    pub fn connect(
        &self,
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> JoinHandle<Result<String, WifiError>> {
        let manager = self.clone();
        let ssid = ssid.into();
        let password = Zeroizing::new(password.into());
        self.inner
            .tracker
            .spawn(async move { manager.connect_now(&ssid, &password).await })
    }

    /// Connect in the background and report the outcome text to `on_done`.
    ///
    /// `on_done` runs exactly once, on the background task.
    pub fn connect_with<F>(
        &self,
        ssid: impl Into<String>,
        password: impl Into<String>,
        on_done: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        let manager = self.clone();
        let ssid = ssid.into();
        let password = Zeroizing::new(password.into());
        self.inner.tracker.spawn(async move {
            let result = manager.connect_now(&ssid, &password).await;
            on_done(connect_message(&result));
        })
    }

    /// Run the full connection sequence on the current task.
    ///
    /// Steps run strictly in order and the first failure ends the attempt.
    pub async fn connect_now(&self, ssid: &str, password: &str) -> Result<String, WifiError> {
        info!("Connecting to {}", ssid);

        let config = WifiConfig::new(ssid, password).map_err(|e| {
            warn!("Rejected credentials for {}: {}", ssid, e);
            WifiError::Validation(e)
        })?;

        let iface = self.interface().to_string();
        if !self.interface_exists().await {
            warn!("Interface {} not found", iface);
            return Err(WifiError::InterfaceMissing(iface));
        }

        self.bring_up().await;

        let settings = &self.inner.settings;
        let conf = Zeroizing::new(config.supplicant_conf(
            &settings.ctrl_interface.to_string_lossy(),
            &settings.country,
        ));
        let transient = settings.transient_config.clone();
        let write_path = transient.clone();
        blocking(move || write_private(&write_path, conf.as_bytes()))
            .await?
            .map_err(|e| {
                error!("Failed to write {}: {}", transient.display(), e);
                WifiError::ConfigWrite(e)
            })?;

        self.stop_supplicant().await;
        tokio::time::sleep(self.inner.timings.supplicant_settle()).await;

        let started = self.start_supplicant(&transient).await;
        if let Err(e) = fs::remove_file(&transient) {
            debug!("Could not remove {}: {}", transient.display(), e);
        }
        started?;

        self.exec_best_effort(
            CommandSpec::new("udhcpc")
                .args(["-i", iface.as_str()])
                .discard_output(),
        )
        .await;

        let ip = match self.ip_address().await {
            Some(ip) => ip,
            None => {
                warn!("No IPv4 address on {} after DHCP", iface);
                return Err(WifiError::NoAddress);
            }
        };

        let store = Arc::clone(&self.inner.store);
        match blocking(move || store.remember(&config)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Failed to save network {}: {}", ssid, e),
            Err(e) => warn!("Failed to save network {}: {}", ssid, e),
        }

        self.inner.connected.store(true, Ordering::Release);
        info!("Connected to {}, IP: {}", ssid, ip);
        Ok(ip)
    }

    /// Stop the supplicant and bring the interface down.
    ///
    /// Best-effort; the cached flag is cleared unconditionally.
    pub async fn disconnect(&self) {
        info!("Disconnecting from Wi-Fi");
        self.stop_supplicant().await;
        self.exec_best_effort(CommandSpec::new("ip").args(["link", "set", self.interface(), "down"]))
            .await;
        self.inner.connected.store(false, Ordering::Release);
    }

    /// Last known connectivity. Never performs I/O.
    pub fn is_connected_cached(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Ask the supplicant whether the association is complete.
    pub async fn is_connected_real(&self) -> bool {
        match self
            .exec(CommandSpec::new("wpa_cli").args(["-i", self.interface(), "status"]))
            .await
        {
            Ok(output) => association_completed(&output.stdout),
            Err(e) => {
                debug!("Supplicant status query failed: {}", e);
                false
            }
        }
    }

    /// Probe real connectivity and store it in the cache.
    pub async fn refresh_connected(&self) -> bool {
        let connected = self.is_connected_real().await;
        self.inner.connected.store(connected, Ordering::Release);
        connected
    }

    /// IPv4 address currently assigned to the interface.
    pub async fn ip_address(&self) -> Option<String> {
        match self
            .exec(CommandSpec::new("ip").args(["-4", "addr", "show", self.interface()]))
            .await
        {
            Ok(output) => parse_ipv4_address(&output.stdout),
            Err(e) => {
                debug!("Address query failed: {}", e);
                None
            }
        }
    }

    /// Start one unattended reconnect pass in the background.
    pub fn auto_connect_background(&self) -> JoinHandle<AutoConnectOutcome> {
        let manager = self.clone();
        self.inner
            .tracker
            .spawn(async move { manager.auto_connect().await })
    }

    /// Reconnect to the first scanned network that is in the known-networks
    /// file.
    ///
    /// Only that network is tried. If it fails its entry is forgotten and the
    /// next pass is left to the connectivity monitor.
    pub async fn auto_connect(&self) -> AutoConnectOutcome {
        info!("Auto-connect started");

        self.bring_up().await;
        tokio::time::sleep(self.inner.timings.auto_settle()).await;

        if self.is_connected_real().await {
            debug!("Auto-connect: already connected");
            return AutoConnectOutcome::AlreadyConnected;
        }

        let known = match self.load_known().await {
            Ok(known) => known,
            Err(e) => {
                warn!("Auto-connect: cannot read known networks: {}", e);
                return AutoConnectOutcome::StoreUnavailable;
            }
        };

        let scanned = self.scan().await.unwrap_or_else(|e| {
            warn!("Auto-connect: scan failed: {}", e);
            Vec::new()
        });

        let Some((ssid, password)) = scanned
            .into_iter()
            .find_map(|ssid| known.password(&ssid).map(|p| (ssid.clone(), Zeroizing::new(p.to_string()))))
        else {
            info!("Auto-connect: no known network in range");
            return AutoConnectOutcome::NoKnownNetwork;
        };
        drop(known);

        info!("Auto-connect attempt: {}", ssid);
        self.inner
            .status
            .show_status(STATUS_CONNECTING, StatusLevel::Connecting);

        match self.connect_now(&ssid, &password).await {
            Ok(ip) => {
                info!("Auto-connect SUCCESS: {}", ssid);
                self.inner
                    .status
                    .show_status(STATUS_SUCCESS, StatusLevel::Success);
                tokio::time::sleep(self.inner.timings.success_clear()).await;
                self.inner.status.clear_status();
                AutoConnectOutcome::Connected { ssid, ip }
            }
            Err(e) => {
                error!("Auto-connect FAILED: {} ({})", ssid, e);
                self.forget(&ssid).await;
                self.inner
                    .status
                    .show_status(STATUS_ERROR, StatusLevel::Error);
                AutoConnectOutcome::Failed {
                    ssid,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn load_known(&self) -> Result<KnownNetworks, String> {
        let store = Arc::clone(&self.inner.store);
        match blocking(move || store.load()).await {
            Ok(Ok(known)) => Ok(known),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn forget(&self, ssid: &str) {
        let store = Arc::clone(&self.inner.store);
        let owned = ssid.to_string();
        match blocking(move || store.forget(&owned)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Failed to forget {}: {}", ssid, e),
            Err(e) => warn!("Failed to forget {}: {}", ssid, e),
        }
    }

    async fn start_supplicant(&self, config_path: &Path) -> Result<(), WifiError> {
        let attempts = self.inner.timings.supplicant_attempts.max(1);
        let cmd = CommandSpec::new("wpa_supplicant")
            .args(["-B", "-i", self.interface(), "-c"])
            .arg(config_path.to_string_lossy())
            .discard_output();

        for attempt in 1..=attempts {
            match self.exec(cmd.clone()).await {
                Ok(output) if output.success() => {
                    debug!("Supplicant started on attempt {}", attempt);
                    return Ok(());
                }
                Ok(output) => debug!(
                    "Supplicant attempt {}/{} exited with {:?}",
                    attempt, attempts, output.status
                ),
                Err(e) => debug!("Supplicant attempt {}/{} failed: {}", attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.inner.timings.retry_backoff()).await;
            }
        }

        error!("Supplicant failed to start after {} attempts", attempts);
        Err(WifiError::SupplicantStart { attempts })
    }

    async fn stop_supplicant(&self) {
        self.exec_best_effort(
            CommandSpec::new("killall")
                .arg("wpa_supplicant")
                .discard_output(),
        )
        .await;

        let socket = self.inner.settings.ctrl_interface.join(self.interface());
        match fs::remove_file(&socket) {
            Ok(()) => debug!("Removed stale control socket {}", socket.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!("Could not remove {}: {}", socket.display(), e),
        }
    }

    async fn interface_exists(&self) -> bool {
        self.exec(CommandSpec::new("ip").args(["link", "show", self.interface()]))
            .await
            .map(|output| output.success())
            .unwrap_or(false)
    }

    async fn interface_is_up(&self) -> bool {
        self.exec(CommandSpec::new("ip").args(["link", "show", self.interface()]))
            .await
            .map(|output| output.stdout.contains("state UP"))
            .unwrap_or(false)
    }

    async fn bring_up(&self) {
        self.exec_best_effort(CommandSpec::new("ip").args(["link", "set", self.interface(), "up"]))
            .await;
    }

    async fn exec(&self, cmd: CommandSpec) -> Result<CommandOutput, WifiError> {
        let runner = Arc::clone(&self.inner.runner);
        Ok(blocking(move || runner.run(&cmd)).await??)
    }

    async fn exec_best_effort(&self, cmd: CommandSpec) {
        let line = cmd.command_line();
        match self.exec(cmd).await {
            Ok(output) if !output.success() => {
                debug!("`{}` exited with {:?}", line, output.status)
            }
            Ok(_) => {}
            Err(e) => debug!("`{}` failed: {}", line, e),
        }
    }
}

/// UI text for a connection result.
pub fn connect_message(result: &Result<String, WifiError>) -> String {
    match result {
        Ok(ip) => format!("Connected: IP = {}", ip),
        Err(e) => e.to_string(),
    }
}

/// Extract SSIDs from `iw dev <iface> scan` output.
pub fn parse_scan_output(output: &str) -> Vec<String> {
    const MARKER: &str = "SSID: ";
    output
        .lines()
        .filter_map(|line| line.find(MARKER).map(|idx| &line[idx + MARKER.len()..]))
        .filter(|ssid| !ssid.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `wpa_cli status` output reports `wpa_state=COMPLETED`.
///
/// Only the state field counts; other fields such as `ssid=` are free text.
pub fn association_completed(status: &str) -> bool {
    status
        .lines()
        .filter_map(|line| line.trim().strip_prefix("wpa_state="))
        .any(|state| state == "COMPLETED")
}

/// Extract the first address from `ip -4 addr show` output.
pub fn parse_ipv4_address(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("inet "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(|cidr| cidr.split('/').next().unwrap_or(cidr).to_string())
        .find(|ip| !ip.is_empty())
}

async fn blocking<T, F>(f: F) -> Result<T, WifiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WifiError::Command(io::Error::new(io::ErrorKind::Other, e)))
}

fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.flush()
}

/// Errors that end a connection attempt.
///
/// `Display` gives the text shown to the user.
#[derive(Debug)]
pub enum WifiError {
    /// Credentials rejected before any command ran.
    Validation(ConfigError),
    /// The wireless interface does not exist.
    InterfaceMissing(String),
    /// The transient supplicant config could not be written.
    ConfigWrite(io::Error),
    /// The supplicant did not start within the allowed attempts.
    SupplicantStart { attempts: u32 },
    /// DHCP finished without an address on the interface.
    NoAddress,
    /// A command could not be run.
    Command(io::Error),
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{}", e),
            Self::InterfaceMissing(iface) => write!(f, "{} not found!", iface),
            Self::ConfigWrite(_) => write!(f, "Failed to write temporary file!"),
            Self::SupplicantStart { .. } => write!(f, "Connection error (wpa_supplicant)"),
            Self::NoAddress => write!(f, "Failed to obtain IP!"),
            Self::Command(e) => write!(f, "Command failed: {}", e),
        }
    }
}

impl std::error::Error for WifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::ConfigWrite(e) | Self::Command(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WifiError {
    fn from(e: io::Error) -> Self {
        Self::Command(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use crate::status::testing::RecordingSink;
    use std::env;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::oneshot;

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    const SCAN_OUTPUT: &str = "BSS 00:11:22:33:44:55(on wlan0)\n\
                               \tsignal: -40.00 dBm\n\
                               \tSSID: HomeNet\n\
                               BSS 66:77:88:99:aa:bb(on wlan0)\n\
                               \tSSID: Other\n";

    const ADDR_OUTPUT: &str = "3: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 state UP\n    \
                               inet 192.168.1.20/24 brd 192.168.1.255 scope global wlan0\n       \
                               valid_lft forever preferred_lft forever\n";

    struct Fixture {
        dir: PathBuf,
        runner: Arc<ScriptedRunner>,
        sink: Arc<RecordingSink>,
        manager: WifiManager,
    }

    impl Fixture {
        fn new(runner: ScriptedRunner) -> Self {
            let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
            let dir = env::temp_dir().join(format!("wifi-test-{}-{}", std::process::id(), id));
            fs::create_dir_all(&dir).unwrap();

            let settings = WifiSettings {
                ctrl_interface: dir.join("ctrl"),
                transient_config: dir.join("wpa_dynamic.conf"),
                known_networks: dir.join("known_networks.txt"),
                ..WifiSettings::default()
            };
            let runner = Arc::new(runner);
            let sink = Arc::new(RecordingSink::default());
            let store = Arc::new(CredentialStore::new(&settings.known_networks));
            let manager = WifiManager::new(
                runner.clone(),
                store,
                sink.clone(),
                settings,
                WifiTimings::immediate(),
                TaskTracker::new(),
            );
            Self {
                dir,
                runner,
                sink,
                manager,
            }
        }

        fn known_path(&self) -> PathBuf {
            self.dir.join("known_networks.txt")
        }

        fn transient_path(&self) -> PathBuf {
            self.dir.join("wpa_dynamic.conf")
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn healthy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on("ip link show", CommandOutput::ok("3: wlan0: <UP> state UP"))
            .on("ip -4 addr show", CommandOutput::ok(ADDR_OUTPUT))
            .on("iw dev wlan0 scan", CommandOutput::ok(SCAN_OUTPUT))
            .on("wpa_cli", CommandOutput::ok("wpa_state=SCANNING\n"))
    }

    #[test]
    fn test_parse_scan_keeps_order_and_duplicates() {
        let output = "\tSSID: B\n\tSSID: A\nnoise\n\tSSID: B\n\tSSID: \n";
        assert_eq!(parse_scan_output(output), vec!["B", "A", "B"]);
        assert!(parse_scan_output("").is_empty());
    }

    #[test]
    fn test_parse_ipv4_address() {
        assert_eq!(parse_ipv4_address(ADDR_OUTPUT), Some("192.168.1.20".to_string()));
        assert_eq!(parse_ipv4_address("3: wlan0: <NO-CARRIER> state DOWN\n"), None);
    }

    #[test]
    fn test_connect_messages() {
        assert_eq!(
            connect_message(&Ok("10.0.0.2".to_string())),
            "Connected: IP = 10.0.0.2"
        );
        assert_eq!(
            connect_message(&Err(WifiError::InterfaceMissing("wlan0".into()))),
            "wlan0 not found!"
        );
        assert_eq!(
            connect_message(&Err(WifiError::SupplicantStart { attempts: 3 })),
            "Connection error (wpa_supplicant)"
        );
        assert_eq!(connect_message(&Err(WifiError::NoAddress)), "Failed to obtain IP!");
    }

    #[tokio::test]
    async fn test_scan_returns_ssids_in_order() {
        let fx = Fixture::new(healthy_runner());
        let ssids = fx.manager.scan().await.unwrap();
        assert_eq!(ssids, vec!["HomeNet", "Other"]);
        assert_eq!(fx.runner.count("ip link set wlan0 up"), 0);
    }

    #[tokio::test]
    async fn test_scan_brings_interface_up() {
        let fx = Fixture::new(
            ScriptedRunner::new().on("ip link show", CommandOutput::ok("3: wlan0: state DOWN")),
        );
        fx.manager.scan().await.unwrap();
        let calls = fx.runner.calls();
        let up = calls.iter().position(|c| c == "ip link set wlan0 up").unwrap();
        let scan = calls.iter().position(|c| c == "iw dev wlan0 scan").unwrap();
        assert!(up < scan);
    }

    #[tokio::test]
    async fn test_connect_rejects_short_password() {
        let fx = Fixture::new(healthy_runner());
        let result = fx.manager.connect("Net", "short").await.unwrap();

        assert!(matches!(result, Err(WifiError::Validation(_))));
        assert!(connect_message(&result).contains("8–63"));
        assert!(fx.runner.calls().is_empty());
        assert!(!fx.known_path().exists());
    }

    #[tokio::test]
    async fn test_connect_rejects_long_password_without_touching_store() {
        let fx = Fixture::new(healthy_runner());
        fs::write(fx.known_path(), "Net:pw123456\n").unwrap();

        let result = fx.manager.connect_now("Net", &"x".repeat(64)).await;
        assert!(matches!(result, Err(WifiError::Validation(_))));
        assert!(fx.runner.calls().is_empty());
        assert_eq!(fs::read_to_string(fx.known_path()).unwrap(), "Net:pw123456\n");
    }

    #[tokio::test]
    async fn test_connect_missing_interface() {
        let fx = Fixture::new(ScriptedRunner::new().on("ip link show", CommandOutput::failed(1)));
        let result = fx.manager.connect_now("Net", "password1").await;

        assert!(matches!(result, Err(WifiError::InterfaceMissing(ref i)) if i == "wlan0"));
        assert_eq!(fx.runner.count("wpa_supplicant"), 0);
        assert_eq!(fx.runner.count("ip link set"), 0);
    }

    #[tokio::test]
    async fn test_connect_success_saves_network() {
        let fx = Fixture::new(healthy_runner());
        let result = fx.manager.connect_now("HomeNet", "pw123456").await;

        assert_eq!(result.unwrap(), "192.168.1.20");
        assert!(fx.manager.is_connected_cached());
        assert_eq!(
            fs::read_to_string(fx.known_path()).unwrap(),
            "HomeNet:pw123456\n"
        );
        assert!(!fx.transient_path().exists());

        let calls = fx.runner.calls();
        let order: Vec<usize> = ["killall wpa_supplicant", "wpa_supplicant -B", "udhcpc -i wlan0"]
            .iter()
            .map(|p| calls.iter().position(|c| c.starts_with(p)).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_connect_twice_does_not_duplicate_entry() {
        let fx = Fixture::new(healthy_runner());
        fx.manager.connect_now("HomeNet", "pw123456").await.unwrap();
        fx.manager.connect_now("HomeNet", "pw123456").await.unwrap();
        assert_eq!(
            fs::read_to_string(fx.known_path()).unwrap(),
            "HomeNet:pw123456\n"
        );
    }

    #[tokio::test]
    async fn test_supplicant_retries_exhausted() {
        let fx = Fixture::new(healthy_runner().on("wpa_supplicant", CommandOutput::failed(255)));
        let result = fx.manager.connect_now("HomeNet", "pw123456").await;

        assert!(matches!(result, Err(WifiError::SupplicantStart { attempts: 3 })));
        assert_eq!(fx.runner.count("wpa_supplicant"), 3);
        assert_eq!(fx.runner.count("udhcpc"), 0);
        assert!(!fx.transient_path().exists());
        assert!(!fx.manager.is_connected_cached());
        assert!(!fx.known_path().exists());
    }

    #[tokio::test]
    async fn test_supplicant_succeeds_on_retry() {
        let fx = Fixture::new(healthy_runner().on_seq(
            "wpa_supplicant",
            vec![CommandOutput::failed(1), CommandOutput::ok("")],
        ));
        let result = fx.manager.connect_now("HomeNet", "pw123456").await;
        assert!(result.is_ok());
        assert_eq!(fx.runner.count("wpa_supplicant"), 2);
    }

    #[tokio::test]
    async fn test_connect_without_address() {
        let fx = Fixture::new(
            ScriptedRunner::new()
                .on("ip link show", CommandOutput::ok("state UP"))
                .on("ip -4 addr show", CommandOutput::ok("")),
        );
        let result = fx.manager.connect_now("HomeNet", "pw123456").await;

        assert!(matches!(result, Err(WifiError::NoAddress)));
        assert!(!fx.manager.is_connected_cached());
        assert!(!fx.known_path().exists());
    }

    #[tokio::test]
    async fn test_connect_with_invokes_callback_once() {
        let fx = Fixture::new(healthy_runner());
        let (tx, rx) = oneshot::channel();
        fx.manager
            .connect_with("HomeNet", "pw123456", move |msg| {
                let _ = tx.send(msg);
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), "Connected: IP = 192.168.1.20");
    }

    #[tokio::test]
    async fn test_disconnect_clears_cache() {
        let fx = Fixture::new(healthy_runner());
        fx.manager.connect_now("HomeNet", "pw123456").await.unwrap();
        assert!(fx.manager.is_connected_cached());

        fx.manager.disconnect().await;
        assert!(!fx.manager.is_connected_cached());
        assert_eq!(fx.runner.count("ip link set wlan0 down"), 1);

        // Second disconnect is just as quiet.
        fx.manager.disconnect().await;
        assert!(!fx.manager.is_connected_cached());
    }

    #[tokio::test]
    async fn test_real_probe() {
        let fx = Fixture::new(
            ScriptedRunner::new().on("wpa_cli", CommandOutput::ok("bssid=x\nwpa_state=COMPLETED\n")),
        );
        assert!(!fx.manager.is_connected_cached());
        assert!(fx.manager.is_connected_real().await);
        assert!(!fx.manager.is_connected_cached());
        assert!(fx.manager.refresh_connected().await);
        assert!(fx.manager.is_connected_cached());
    }

    #[test]
    fn test_association_state_field_only() {
        assert!(association_completed("bssid=00:11:22:33:44:55\nwpa_state=COMPLETED\n"));
        assert!(!association_completed(
            "bssid=00:11:22:33:44:55\nssid=COMPLETED-Guest\nwpa_state=ASSOCIATING\n"
        ));
        assert!(!association_completed("wpa_state=COMPLETED_NOT\n"));
        assert!(!association_completed(""));
    }

    #[tokio::test]
    async fn test_real_probe_ignores_ssid_text() {
        let fx = Fixture::new(ScriptedRunner::new().on(
            "wpa_cli",
            CommandOutput::ok("bssid=00:11:22:33:44:55\nssid=COMPLETED-Guest\nwpa_state=ASSOCIATING\n"),
        ));
        assert!(!fx.manager.is_connected_real().await);
        assert!(!fx.manager.refresh_connected().await);
        assert!(!fx.manager.is_connected_cached());
    }

    #[tokio::test]
    async fn test_connect_config_write_failure() {
        let mut fx = Fixture::new(healthy_runner());
        fs::write(fx.known_path(), "Net:pw123456\n").unwrap();
        let settings = WifiSettings {
            ctrl_interface: fx.dir.join("ctrl"),
            transient_config: fx.dir.join("missing").join("wpa_dynamic.conf"),
            known_networks: fx.known_path(),
            ..WifiSettings::default()
        };
        fx.manager = WifiManager::new(
            fx.runner.clone(),
            Arc::new(CredentialStore::new(fx.known_path())),
            fx.sink.clone(),
            settings,
            WifiTimings::immediate(),
            TaskTracker::new(),
        );

        let result = fx.manager.connect_now("HomeNet", "pw123456").await;

        assert!(matches!(result, Err(WifiError::ConfigWrite(_))));
        assert_eq!(connect_message(&result), "Failed to write temporary file!");
        assert_eq!(fx.runner.count("wpa_supplicant"), 0);
        assert_eq!(fx.runner.count("killall"), 0);
        assert!(!fx.manager.is_connected_cached());
        assert_eq!(fs::read_to_string(fx.known_path()).unwrap(), "Net:pw123456\n");
    }

    #[tokio::test]
    async fn test_auto_connect_success() {
        let fx = Fixture::new(healthy_runner());
        fs::write(fx.known_path(), "HomeNet:pw123456\n").unwrap();

        let outcome = fx.manager.auto_connect_background().await.unwrap();

        assert_eq!(
            outcome,
            AutoConnectOutcome::Connected {
                ssid: "HomeNet".to_string(),
                ip: "192.168.1.20".to_string()
            }
        );
        assert_eq!(
            fx.sink.levels(),
            vec![
                Some(StatusLevel::Connecting),
                Some(StatusLevel::Success),
                None
            ]
        );
        assert_eq!(
            fs::read_to_string(fx.known_path()).unwrap(),
            "HomeNet:pw123456\n"
        );
        assert!(fx.manager.is_connected_cached());
    }

    #[tokio::test]
    async fn test_auto_connect_failure_forgets_network() {
        let fx = Fixture::new(healthy_runner().on("wpa_supplicant", CommandOutput::failed(1)));
        fs::write(
            fx.known_path(),
            "Alpha:aaaaaaaa\nHomeNet:pw123456\nBeta:bbbbbbbb\n",
        )
        .unwrap();

        let outcome = fx.manager.auto_connect().await;

        assert!(matches!(outcome, AutoConnectOutcome::Failed { ref ssid, .. } if ssid == "HomeNet"));
        assert_eq!(
            fs::read_to_string(fx.known_path()).unwrap(),
            "Alpha:aaaaaaaa\nBeta:bbbbbbbb\n"
        );
        assert_eq!(
            fx.sink.levels(),
            vec![Some(StatusLevel::Connecting), Some(StatusLevel::Error)]
        );
        assert!(!fx.manager.is_connected_cached());
    }

    #[tokio::test]
    async fn test_auto_connect_first_known_in_scan_order_wins() {
        let fx = Fixture::new(healthy_runner().on(
            "iw dev wlan0 scan",
            CommandOutput::ok("\tSSID: Stranger\n\tSSID: Net2\n\tSSID: Net1\n"),
        ));
        fs::write(fx.known_path(), "Net1:password1\nNet2:password2\n").unwrap();

        let outcome = fx.manager.auto_connect().await;
        assert!(matches!(outcome, AutoConnectOutcome::Connected { ref ssid, .. } if ssid == "Net2"));
        assert_eq!(fx.runner.count("wpa_supplicant -B"), 1);
    }

    #[tokio::test]
    async fn test_auto_connect_only_tries_one_network() {
        let fx = Fixture::new(
            healthy_runner()
                .on("iw dev wlan0 scan", CommandOutput::ok("\tSSID: Net1\n\tSSID: Net2\n"))
                .on("wpa_supplicant", CommandOutput::failed(1)),
        );
        fs::write(fx.known_path(), "Net1:password1\nNet2:password2\n").unwrap();

        let outcome = fx.manager.auto_connect().await;
        assert!(matches!(outcome, AutoConnectOutcome::Failed { ref ssid, .. } if ssid == "Net1"));
        assert_eq!(fx.runner.count("wpa_supplicant -B"), 3);
        assert_eq!(
            fs::read_to_string(fx.known_path()).unwrap(),
            "Net2:password2\n"
        );
    }

    #[tokio::test]
    async fn test_auto_connect_already_connected() {
        let fx = Fixture::new(
            healthy_runner().on("wpa_cli", CommandOutput::ok("wpa_state=COMPLETED\n")),
        );
        fs::write(fx.known_path(), "HomeNet:pw123456\n").unwrap();

        assert_eq!(fx.manager.auto_connect().await, AutoConnectOutcome::AlreadyConnected);
        assert_eq!(fx.runner.count("iw"), 0);
        assert!(fx.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_auto_connect_without_store() {
        let fx = Fixture::new(healthy_runner());
        assert_eq!(fx.manager.auto_connect().await, AutoConnectOutcome::StoreUnavailable);
        assert!(fx.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_auto_connect_no_known_network() {
        let fx = Fixture::new(healthy_runner());
        fs::write(fx.known_path(), "Elsewhere:password1\n").unwrap();

        assert_eq!(fx.manager.auto_connect().await, AutoConnectOutcome::NoKnownNetwork);
        assert!(fx.sink.events().is_empty());
        assert_eq!(fx.runner.count("wpa_supplicant"), 0);
    }
}
