//! Headless sensor station daemon.
//!
//! Runs the connectivity monitor and startup auto-connect, optionally records
//! readings, and logs status pushes until interrupted.
//!
//! # Usage
//!
//! ```bash
//! sensor-station            # Wi-Fi services only
//! sensor-station --record   # also record with the saved sensor settings
//! ```

use log::{error, info};
use sensor_station::{logging, ChannelStatusSink, Station, StationConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let record = std::env::args().skip(1).any(|arg| arg == "--record");

    let (config, report) = StationConfig::load_or_default();
    logging::init(&config.paths.app_log);
    report.log();

    info!("=== Sensor station starting ===");
    info!(
        "Interface {}, known networks at {}",
        config.wifi.interface,
        config.wifi.known_networks.display()
    );

    let (sink, mut events) = ChannelStatusSink::new();
    let station = Station::system(config, Arc::new(sink));
    station.spawn_background();

    if record {
        let settings = station.settings().get();
        info!(
            "Recording every {}s ({})",
            settings.interval().as_secs(),
            if settings.simulate { "simulated" } else { "serial" }
        );
        station.start_recording();
    }

    info!("Running (Ctrl+C to exit)");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Signal handler failed: {}", e);
                }
                break;
            }
            Some(event) = events.recv() => {
                info!("Status: {}", event);
            }
        }
    }

    station.shutdown().await;
}
