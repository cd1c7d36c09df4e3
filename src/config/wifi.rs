//! WiFi credential types.
//!
//! Platform-independent, so validation is tested on the host.
//!
//! # Example
//!
//! ```
//! use bms_monitor_esp32::config::WifiCredentials;
//!
//! let creds = WifiCredentials::new("MyNetwork", "MyPassword").unwrap();
//! assert!(!creds.is_open());
//! ```

use super::ConfigError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// SSID limit from IEEE 802.11.
pub const MAX_SSID_LEN: usize = 32;

/// WPA2 passphrase bounds. An empty passphrase means an open network.
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 64;

/// Credentials for joining an infrastructure network.
///
/// The passphrase is zeroed when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    /// Create validated credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Credentials for an open network (no password).
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    /// Check byte lengths of SSID and passphrase.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.ssid.len() {
            0 => return Err(ConfigError::SsidEmpty),
            len if len > MAX_SSID_LEN => {
                return Err(ConfigError::SsidTooLong {
                    len,
                    max: MAX_SSID_LEN,
                })
            }
            _ => {}
        }
        match self.password.len() {
            0 => Ok(()),
            len if len < MIN_PASSWORD_LEN => Err(ConfigError::PasswordTooShort {
                len,
                min: MIN_PASSWORD_LEN,
            }),
            len if len > MAX_PASSWORD_LEN => Err(ConfigError::PasswordTooLong {
                len,
                max: MAX_PASSWORD_LEN,
            }),
            _ => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// Never print the password.
impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}
