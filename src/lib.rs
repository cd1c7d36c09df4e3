//! Battery monitor firmware library.
//!
//! Everything except the hardware drivers is platform-independent and tested
//! on the host. Hardware sits behind the traits bundled by [`Platform`]:
//! the ESP32 build wires in `EspWifi`, NimBLE, the IDF HTTP client, SNTP and
//! NVS; the host build uses OS networking, a simulated battery, `reqwest` and
//! JSON files.

pub mod bms;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod device;
pub mod network;
pub mod orchestrator;
pub mod peripheral;
pub mod platform;
pub mod store;
pub mod time_sync;
pub mod timer;
pub mod web;

#[cfg(test)]
mod testutil;

// Re-export commonly used items
pub use bms::{BmsClient, BmsError, ReadingSnapshot};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, Configuration, PeripheralAddress, WifiCredentials};
pub use delivery::{DeliveryError, Dispatcher, FailureReason, HttpTransport, SkipReason};
pub use device::{Command, Device, Response, RestartReason};
pub use network::{NetworkManager, NetworkState, WifiRadio};
pub use orchestrator::{run, run_once, RequestSource};
pub use peripheral::{PeripheralLink, PeripheralState};
pub use platform::Platform;
pub use store::{Namespace, SettingsStore, StoreError};
pub use web::{WebServer, DEFAULT_PORT};

#[cfg(not(feature = "esp32"))]
pub use platform::HostPlatform;

#[cfg(feature = "esp32")]
pub use platform::EspPlatform;

/// The default NVS partition, taken once and shared by Wi-Fi and the store.
#[cfg(feature = "esp32")]
pub fn get_nvs_default_partition(
) -> Result<esp_idf_svc::nvs::EspDefaultNvsPartition, esp_idf_sys::EspError> {
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use std::sync::{Mutex, OnceLock};

    static PARTITION: OnceLock<Mutex<Option<EspDefaultNvsPartition>>> = OnceLock::new();

    let slot = PARTITION.get_or_init(|| Mutex::new(None));
    let mut guard = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(partition) = guard.as_ref() {
        return Ok(partition.clone());
    }
    let partition = EspDefaultNvsPartition::take()?;
    *guard = Some(partition.clone());
    Ok(partition)
}
