//! Network connectivity.
//!
//! The radio runs in one of two mutually exclusive roles: station on the
//! configured infrastructure network, or a local access point used as a
//! fallback when no network is configured or reachable.
//!
//! - [`NetworkManager`] is the state machine, platform-independent
//! - [`WifiRadio`] is the seam to the hardware
//! - `HostRadio` (host) and `EspRadio` (ESP32) implement it

use crate::config::ConfigError;
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

mod manager;

#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
mod wifi;

pub use manager::NetworkManager;

#[cfg(not(feature = "esp32"))]
pub use host::HostRadio;

#[cfg(feature = "esp32")]
pub use wifi::EspRadio;

use crate::config::WifiCredentials;

/// Fallback access point SSID.
pub const AP_SSID: &str = "BMS-Monitor";

/// Fallback access point passphrase.
pub const AP_PASSWORD: &str = "bms12345";

/// Fallback access point channel.
pub const AP_CHANNEL: u8 = 1;

/// Fixed address of the device in access point mode.
pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Interval between link checks while in station mode.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How long a background reconnect may take before it is abandoned.
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on the connection attempt at startup.
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on a user-initiated connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Link status polling period during the bounded foreground waits.
pub const LINK_POLL_PERIOD: Duration = Duration::from_millis(500);

/// Connectivity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkState {
    /// Local access point at a fixed address.
    ApMode { ip: Ipv4Addr },
    /// Joined the configured network.
    StaConnected { ssid: String, ip: Option<IpAddr> },
    /// Background reconnect in flight since `since`.
    StaReconnecting { since: Duration },
    /// Link down, waiting for the next periodic check.
    StaDisconnected,
}

impl NetworkState {
    pub fn is_ap_mode(&self) -> bool {
        matches!(self, Self::ApMode { .. })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::StaConnected { .. })
    }

    /// Short mode label for status output.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::ApMode { .. } => "ap",
            Self::StaConnected { .. } => "sta_connected",
            Self::StaReconnecting { .. } => "sta_reconnecting",
            Self::StaDisconnected => "sta_disconnected",
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApMode { ip } => write!(f, "access point ({})", ip),
            Self::StaConnected { ssid, ip: Some(ip) } => write!(f, "connected to {} ({})", ssid, ip),
            Self::StaConnected { ssid, ip: None } => write!(f, "connected to {}", ssid),
            Self::StaReconnecting { .. } => write!(f, "reconnecting"),
            Self::StaDisconnected => write!(f, "disconnected"),
        }
    }
}

/// One network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub ssid: String,
    pub rssi: i8,
    pub channel: u8,
    pub secured: bool,
}

/// WiFi radio operations used by the state machine.
///
/// `begin_connect` and `reconnect` only start the association; completion is
/// observed through `is_connected`.
pub trait WifiRadio {
    /// Configure station mode with `credentials` and start associating.
    fn begin_connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError>;

    /// Re-issue association with the current station configuration.
    fn reconnect(&mut self) -> Result<(), NetworkError>;

    /// Whether the station link is up.
    fn is_connected(&self) -> bool;

    /// Station address, if any.
    fn ip_addr(&self) -> Option<IpAddr>;

    /// Switch to the fallback access point.
    fn start_access_point(&mut self) -> Result<(), NetworkError>;

    /// Scan for reachable networks.
    fn scan(&mut self) -> Result<Vec<ScanResult>, NetworkError>;

    /// Hardware address as `AA:BB:CC:DD:EE:FF`.
    fn mac_address(&self) -> String;
}

/// Network errors.
#[derive(Debug)]
pub enum NetworkError {
    /// Credentials failed validation.
    InvalidCredentials(ConfigError),
    /// The link did not come up within the bounded wait.
    ConnectTimeout,
    /// Radio driver error.
    Radio(String),
    /// Credentials could not be persisted.
    Store(StoreError),
    /// Generic I/O error.
    Io(std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials(e) => write!(f, "invalid credentials: {}", e),
            Self::ConnectTimeout => write!(f, "connection timed out"),
            Self::Radio(msg) => write!(f, "radio error: {}", msg),
            Self::Store(e) => write!(f, "storage error: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidCredentials(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for NetworkError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidCredentials(e)
    }
}

impl From<StoreError> for NetworkError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for NetworkError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Radio(format!("ESP error: {:?}", e))
    }
}
