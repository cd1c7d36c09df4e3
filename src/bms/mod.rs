//! Battery management unit access.
//!
//! This module contains:
//! - [`snapshot`]: the telemetry record shared with the UI and delivery
//! - [`validity`]: plausibility gate and transition tracking
//! - [`frame`]: status frame decoding
//! - [`simulated`]: stand-in unit for host builds
//! - [`nimble`]: BLE client (ESP32 only)

pub mod frame;
mod snapshot;
mod validity;

#[cfg(not(feature = "esp32"))]
mod simulated;

#[cfg(feature = "esp32")]
mod nimble;

pub use snapshot::ReadingSnapshot;
pub use validity::{
    check, classify, Implausible, Transition, ValidityTracker, CELL_VOLTAGE_RANGE, MAX_SOC,
    PACK_VOLTAGE_RANGE,
};

#[cfg(not(feature = "esp32"))]
pub use simulated::SimulatedBms;

#[cfg(feature = "esp32")]
pub use nimble::NimbleBmsClient;

use crate::config::PeripheralAddress;
use std::fmt;

/// Connection to a battery management unit.
///
/// Implementations are synchronous: `connect` and `poll` return once the
/// operation completed or hit its own bounded timeout.
pub trait BmsClient {
    /// Connect to the unit at `address`.
    fn connect(&mut self, address: &PeripheralAddress) -> Result<(), BmsError>;

    /// Drop the link. Safe to call when not connected.
    fn disconnect(&mut self);

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Request and decode one status frame.
    fn poll(&mut self) -> Result<ReadingSnapshot, BmsError>;
}

/// Errors from the peripheral link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BmsError {
    /// No link to poll over.
    NotConnected,
    /// Connecting to the unit failed.
    ConnectFailed(String),
    /// The unit did not answer in time.
    Timeout,
    /// A response frame could not be decoded.
    InvalidFrame(String),
    /// BLE stack error.
    Ble(String),
}

impl BmsError {
    /// Whether the error means the link is gone.
    pub fn is_link_loss(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Ble(_))
    }
}

impl fmt::Display for BmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectFailed(msg) => write!(f, "connect failed: {}", msg),
            Self::Timeout => write!(f, "no response from unit"),
            Self::InvalidFrame(msg) => write!(f, "invalid frame: {}", msg),
            Self::Ble(msg) => write!(f, "BLE error: {}", msg),
        }
    }
}

impl std::error::Error for BmsError {}
