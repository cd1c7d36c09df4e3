//! Battery monitor firmware binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run` (simulated battery, settings under `~/.bms-monitor-esp32/`)
//! - **ESP32**: `cargo espflash flash --features esp32 --release`
//!
//! ## Endpoints
//!
//! - JSON API: http://<device>/api/status (port 8080 on host)

use bms_monitor_esp32::{orchestrator, Device, RestartReason, SystemClock, WebServer};
use log::{error, info};

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn build_device() -> Device<bms_monitor_esp32::EspPlatform> {
    use bms_monitor_esp32::bms::NimbleBmsClient;
    use bms_monitor_esp32::delivery::EspTransport;
    use bms_monitor_esp32::network::EspRadio;
    use bms_monitor_esp32::store::NvsStore;
    use bms_monitor_esp32::time_sync::SntpTimeSource;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;

    let peripherals = Peripherals::take().expect("peripherals already taken");
    let sysloop = EspSystemEventLoop::take().expect("system event loop already taken");
    let nvs = bms_monitor_esp32::get_nvs_default_partition().expect("NVS partition unavailable");

    let store = NvsStore::new().expect("failed to open NVS namespaces");
    let radio = EspRadio::new(peripherals.modem, sysloop, Some(nvs)).expect("Wi-Fi driver init failed");

    Device::new(
        store,
        radio,
        NimbleBmsClient::new(),
        EspTransport::new(),
        SntpTimeSource::default(),
    )
}

#[cfg(not(feature = "esp32"))]
fn build_device() -> Device<bms_monitor_esp32::HostPlatform> {
    use bms_monitor_esp32::bms::SimulatedBms;
    use bms_monitor_esp32::delivery::ReqwestTransport;
    use bms_monitor_esp32::network::HostRadio;
    use bms_monitor_esp32::store::FileStore;
    use bms_monitor_esp32::time_sync::SystemTimeSource;

    let store = FileStore::open_default().expect("no home directory for settings");
    let transport = ReqwestTransport::new().expect("HTTP client init failed");

    Device::new(
        store,
        HostRadio::new(),
        SimulatedBms::new(),
        transport,
        SystemTimeSource,
    )
}

#[cfg(feature = "esp32")]
const WEB_PORT: u16 = bms_monitor_esp32::DEFAULT_PORT;

#[cfg(not(feature = "esp32"))]
const WEB_PORT: u16 = 8080;

#[cfg(feature = "esp32")]
fn restart(reason: RestartReason) -> ! {
    info!("Restarting: {}", reason);
    // Let the last HTTP response and log lines flush
    std::thread::sleep(std::time::Duration::from_millis(500));
    // SAFETY: plain IDF call, never returns
    unsafe { esp_idf_sys::esp_restart() }
}

#[cfg(not(feature = "esp32"))]
fn restart(reason: RestartReason) -> ! {
    info!("Restart requested ({}), exiting", reason);
    std::process::exit(0)
}

fn main() {
    platform_init();
    info!("=== BMS monitor starting ===");

    let clock = SystemClock::new();
    let mut device = build_device();
    device.boot(&clock);

    let reason = match WebServer::start(WEB_PORT) {
        Ok(mut server) => orchestrator::run(&mut device, &mut server, &clock),
        Err(e) => {
            error!("Web server failed to start: {}", e);
            orchestrator::run(&mut device, &mut (), &clock)
        }
    };

    restart(reason)
}
