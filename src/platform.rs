//! Platform bundles.
//!
//! A [`Platform`] names the concrete implementation of every hardware seam
//! so [`Device`](crate::device::Device) stays generic and host-testable.

use crate::bms::BmsClient;
use crate::delivery::HttpTransport;
use crate::network::WifiRadio;
use crate::store::SettingsStore;
use crate::time_sync::TimeSource;

pub trait Platform {
    type Radio: WifiRadio;
    type Bms: BmsClient;
    type Transport: HttpTransport;
    type Time: TimeSource;
    type Store: SettingsStore;
}

/// Host build: OS networking, simulated BMS, `reqwest`, JSON files.
#[cfg(not(feature = "esp32"))]
pub struct HostPlatform;

#[cfg(not(feature = "esp32"))]
impl Platform for HostPlatform {
    type Radio = crate::network::HostRadio;
    type Bms = crate::bms::SimulatedBms;
    type Transport = crate::delivery::ReqwestTransport;
    type Time = crate::time_sync::SystemTimeSource;
    type Store = crate::store::FileStore;
}

/// ESP32 build: `EspWifi`, NimBLE, IDF HTTP client, SNTP, NVS.
#[cfg(feature = "esp32")]
pub struct EspPlatform;

#[cfg(feature = "esp32")]
impl Platform for EspPlatform {
    type Radio = crate::network::EspRadio;
    type Bms = crate::bms::NimbleBmsClient;
    type Transport = crate::delivery::EspTransport;
    type Time = crate::time_sync::SntpTimeSource;
    type Store = crate::store::NvsStore;
}
