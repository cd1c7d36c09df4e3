//! Device configuration.
//!
//! This module provides the persisted user configuration and the validated
//! value types it is built from.
//!
//! # Components
//!
//! - [`wifi`] - WiFi credentials (stored in their own namespace)
//! - [`address`] - BLE address of the battery management unit
//!
//! Interval setters clamp instead of rejecting, so a configuration change
//! from the UI never faults.

mod address;
mod wifi;

pub use address::{PeripheralAddress, ADDRESS_LEN};
pub use wifi::{WifiCredentials, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN};

use std::fmt;
use std::time::Duration;

/// POSIX TZ string used until the user picks one (Central European Time).
pub const DEFAULT_TIMEZONE: &str = "CET-1CEST,M3.5.0,M10.5.0/3";

/// Peripheral polling interval bounds and default, in seconds.
pub const MIN_POLL_INTERVAL_SECS: u32 = 5;
pub const MAX_POLL_INTERVAL_SECS: u32 = 300;
pub const DEFAULT_POLL_INTERVAL_SECS: u32 = 20;

/// Delivery interval bounds and default, in seconds.
pub const MIN_DELIVERY_INTERVAL_SECS: u32 = 10;
pub const MAX_DELIVERY_INTERVAL_SECS: u32 = 3600;
pub const DEFAULT_DELIVERY_INTERVAL_SECS: u32 = 60;

/// Longest accepted delivery URL (bytes). Settings values are stored in
/// 256-byte NVS slots including the terminator.
pub const MAX_URL_LEN: usize = 255;

/// Longest accepted time-zone string.
pub const MAX_TIMEZONE_LEN: usize = 64;

/// Persisted user configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// POSIX TZ string for local time display.
    pub timezone: String,
    /// Seconds between peripheral polls.
    pub poll_interval_secs: u32,
    /// Whether the peripheral link is maintained at all.
    pub peripheral_enabled: bool,
    /// Address of the battery management unit, if configured.
    pub peripheral_address: Option<PeripheralAddress>,
    /// Remote webhook URL. Empty means not configured.
    pub delivery_url: String,
    /// Seconds between scheduled deliveries.
    pub delivery_interval_secs: u32,
    /// Whether scheduled delivery is on.
    pub delivery_enabled: bool,
    /// Log a full battery summary after every poll.
    pub verbose: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            peripheral_enabled: true,
            peripheral_address: None,
            delivery_url: String::new(),
            delivery_interval_secs: DEFAULT_DELIVERY_INTERVAL_SECS,
            delivery_enabled: false,
            verbose: false,
        }
    }
}

impl Configuration {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs as u64)
    }

    pub fn delivery_interval(&self) -> Duration {
        Duration::from_secs(self.delivery_interval_secs as u64)
    }

    /// Returns `true` if a delivery endpoint is configured.
    pub fn has_delivery_endpoint(&self) -> bool {
        !self.delivery_url.is_empty()
    }

    /// Set the poll interval, clamped to the supported range.
    pub fn set_poll_interval(&mut self, secs: u32) {
        self.poll_interval_secs = clamp_poll_interval(secs);
    }

    /// Set the delivery interval, clamped to the supported range.
    pub fn set_delivery_interval(&mut self, secs: u32) {
        self.delivery_interval_secs = clamp_delivery_interval(secs);
    }

    /// Set the delivery endpoint after validating it.
    pub fn set_delivery_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let url = url.trim();
        validate_delivery_url(url)?;
        self.delivery_url = url.to_string();
        Ok(())
    }

    /// Set the time zone after validating it.
    pub fn set_timezone(&mut self, tz: &str) -> Result<(), ConfigError> {
        let tz = tz.trim();
        if tz.is_empty() || tz.len() > MAX_TIMEZONE_LEN {
            return Err(ConfigError::InvalidTimezone(tz.to_string()));
        }
        self.timezone = tz.to_string();
        Ok(())
    }

    /// Bring every field back into range. Used after loading from storage.
    pub fn normalize(&mut self) {
        self.poll_interval_secs = clamp_poll_interval(self.poll_interval_secs);
        self.delivery_interval_secs = clamp_delivery_interval(self.delivery_interval_secs);
        if validate_delivery_url(&self.delivery_url).is_err() {
            log::warn!("Discarding invalid delivery URL '{}'", self.delivery_url);
            self.delivery_url.clear();
        }
        if self.timezone.is_empty() {
            self.timezone = DEFAULT_TIMEZONE.to_string();
        }
    }
}

/// Clamp a poll interval to [`MIN_POLL_INTERVAL_SECS`, `MAX_POLL_INTERVAL_SECS`].
pub fn clamp_poll_interval(secs: u32) -> u32 {
    secs.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
}

/// Clamp a delivery interval to [`MIN_DELIVERY_INTERVAL_SECS`, `MAX_DELIVERY_INTERVAL_SECS`].
pub fn clamp_delivery_interval(secs: u32) -> u32 {
    secs.clamp(MIN_DELIVERY_INTERVAL_SECS, MAX_DELIVERY_INTERVAL_SECS)
}

/// An empty URL is valid and means "not configured".
pub fn validate_delivery_url(url: &str) -> Result<(), ConfigError> {
    if url.len() > MAX_URL_LEN {
        return Err(ConfigError::UrlTooLong {
            len: url.len(),
            max: MAX_URL_LEN,
        });
    }
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(url.to_string()))
    }
}

/// Errors that can occur while validating configuration input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Peripheral address is malformed.
    InvalidAddress(String),
    /// Delivery URL is not http(s).
    InvalidUrl(String),
    /// Delivery URL does not fit the settings store.
    UrlTooLong { len: usize, max: usize },
    /// Time zone string is empty or too long.
    InvalidTimezone(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidAddress(msg) => write!(f, "invalid peripheral address: {}", msg),
            Self::InvalidUrl(url) => {
                write!(f, "invalid delivery URL '{}': must start with http:// or https://", url)
            }
            Self::UrlTooLong { len, max } => {
                write!(f, "delivery URL too long: {} bytes (max {})", len, max)
            }
            Self::InvalidTimezone(tz) => write!(f, "invalid time zone '{}'", tz),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.poll_interval(), Duration::from_secs(20));
        assert!(config.peripheral_enabled);
        assert!(config.peripheral_address.is_none());
        assert!(!config.has_delivery_endpoint());
        assert!(!config.delivery_enabled);
    }

    #[test]
    fn test_delivery_interval_clamping() {
        let mut config = Configuration::default();
        config.set_delivery_interval(5);
        assert_eq!(config.delivery_interval_secs, 10);
        config.set_delivery_interval(10000);
        assert_eq!(config.delivery_interval_secs, 3600);
        config.set_delivery_interval(120);
        assert_eq!(config.delivery_interval_secs, 120);
    }

    #[test]
    fn test_poll_interval_clamping() {
        assert_eq!(clamp_poll_interval(0), 5);
        assert_eq!(clamp_poll_interval(301), 300);
        assert_eq!(clamp_poll_interval(42), 42);
    }

    #[test]
    fn test_delivery_url_validation() {
        let mut config = Configuration::default();
        assert!(config.set_delivery_url("https://example.com/hook").is_ok());
        assert!(config.has_delivery_endpoint());
        assert!(matches!(
            config.set_delivery_url("ftp://example.com"),
            Err(ConfigError::InvalidUrl(_))
        ));
        // Rejected input leaves the previous value alone
        assert_eq!(config.delivery_url, "https://example.com/hook");
        assert!(config.set_delivery_url("").is_ok());
        assert!(!config.has_delivery_endpoint());
    }

    #[test]
    fn test_delivery_url_length_limit() {
        let mut config = Configuration::default();
        let prefix = "https://example.com/";
        let longest = format!("{}{}", prefix, "a".repeat(MAX_URL_LEN - prefix.len()));
        assert_eq!(longest.len(), 255);
        assert!(config.set_delivery_url(&longest).is_ok());
        assert_eq!(config.delivery_url, longest);

        let too_long = format!("{}b", longest);
        assert_eq!(
            config.set_delivery_url(&too_long),
            Err(ConfigError::UrlTooLong { len: 256, max: 255 })
        );
        assert_eq!(config.delivery_url, longest);
    }

    #[test]
    fn test_timezone_validation() {
        let mut config = Configuration::default();
        assert!(config.set_timezone("UTC0").is_ok());
        assert_eq!(config.timezone, "UTC0");
        assert!(config.set_timezone("   ").is_err());
        assert!(config.set_timezone(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_normalize_repairs_stored_values() {
        let mut config = Configuration {
            poll_interval_secs: 1,
            delivery_interval_secs: 99999,
            delivery_url: "not a url".into(),
            timezone: String::new(),
            ..Configuration::default()
        };
        config.normalize();
        assert_eq!(config.poll_interval_secs, MIN_POLL_INTERVAL_SECS);
        assert_eq!(config.delivery_interval_secs, MAX_DELIVERY_INTERVAL_SECS);
        assert!(config.delivery_url.is_empty());
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
    }
}
