//! Non-volatile settings persistence.
//!
//! The store itself is a plain string key-value map split into namespaces.
//! Typed loading and saving of [`Configuration`] and [`WifiCredentials`]
//! lives here so every backend shares the same keys and fallback rules.
//!
//! # Backends
//!
//! - [`MemoryStore`] - volatile map, used by tests
//! - [`FileStore`] - JSON files under the home directory (host only)
//! - [`NvsStore`] - ESP32 Non-Volatile Storage (ESP32 only)

#[cfg(not(feature = "esp32"))]
mod file;
#[cfg(feature = "esp32")]
mod nvs;

#[cfg(not(feature = "esp32"))]
pub use file::FileStore;
#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

use crate::config::{Configuration, PeripheralAddress, WifiCredentials};
use log::{error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Storage namespaces. Credentials are isolated so they can be wiped alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// User configuration.
    Settings,
    /// Network credentials.
    Credentials,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settings => "bms_monitor",
            Self::Credentials => "wifi_config",
        }
    }
}

/// Setting keys. NVS limits keys to 15 characters.
pub mod keys {
    pub const TIMEZONE: &str = "timezone";
    pub const POLL_INTERVAL: &str = "poll_interval";
    pub const PERIPHERAL_ENABLED: &str = "bms_enabled";
    pub const PERIPHERAL_ADDRESS: &str = "bms_address";
    pub const DELIVERY_URL: &str = "webhook_url";
    pub const DELIVERY_INTERVAL: &str = "webhook_intv";
    pub const DELIVERY_ENABLED: &str = "webhook_on";
    pub const VERBOSE: &str = "verbose";
    pub const SSID: &str = "ssid";
    pub const PASSWORD: &str = "password";
}

/// A namespaced string key-value store that survives power cycles.
pub trait SettingsStore {
    /// Read a value. `Ok(None)` if the key is absent.
    fn get_str(&self, ns: Namespace, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set_str(&mut self, ns: Namespace, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&mut self, ns: Namespace, key: &str) -> Result<(), StoreError>;
}

/// Errors from a storage backend.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying I/O failure (host file store).
    Io(std::io::Error),
    /// Stored data could not be parsed.
    Corrupt(String),
    /// Read-back after write did not match.
    VerifyFailed(String),
    /// Backend-specific failure (e.g. NVS error code).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Corrupt(msg) => write!(f, "corrupt data: {}", msg),
            Self::VerifyFailed(key) => write!(f, "verification failed for '{}'", key),
            Self::Backend(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Volatile in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<(Namespace, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held in a namespace.
    pub fn len(&self, ns: Namespace) -> usize {
        self.values.keys().filter(|(n, _)| *n == ns).count()
    }
}

impl SettingsStore for MemoryStore {
    fn get_str(&self, ns: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(&(ns, key.to_string())).cloned())
    }

    fn set_str(&mut self, ns: Namespace, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert((ns, key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&mut self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        self.values.remove(&(ns, key.to_string()));
        Ok(())
    }
}

/// Read and parse a setting, falling back to `default` if absent or invalid.
fn read_or<T: FromStr>(store: &dyn SettingsStore, key: &str, default: T) -> T {
    match store.get_str(Namespace::Settings, key) {
        Ok(Some(raw)) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable setting {}='{}'", key, raw);
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!("Failed to read setting {}: {}", key, e);
            default
        }
    }
}

/// Load the configuration. Never fails: unusable values fall back to defaults.
pub fn load_configuration(store: &dyn SettingsStore) -> Configuration {
    let defaults = Configuration::default();

    let peripheral_address = match store.get_str(Namespace::Settings, keys::PERIPHERAL_ADDRESS) {
        Ok(Some(raw)) if raw.is_empty() => None,
        Ok(Some(raw)) => match PeripheralAddress::from_str(&raw) {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("Ignoring stored peripheral address: {}", e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to read peripheral address: {}", e);
            None
        }
    };

    let mut config = Configuration {
        timezone: read_or(store, keys::TIMEZONE, defaults.timezone.clone()),
        poll_interval_secs: read_or(store, keys::POLL_INTERVAL, defaults.poll_interval_secs),
        peripheral_enabled: read_or(store, keys::PERIPHERAL_ENABLED, defaults.peripheral_enabled),
        peripheral_address,
        delivery_url: read_or(store, keys::DELIVERY_URL, defaults.delivery_url.clone()),
        delivery_interval_secs: read_or(
            store,
            keys::DELIVERY_INTERVAL,
            defaults.delivery_interval_secs,
        ),
        delivery_enabled: read_or(store, keys::DELIVERY_ENABLED, defaults.delivery_enabled),
        verbose: read_or(store, keys::VERBOSE, defaults.verbose),
    };
    config.normalize();
    config
}

/// Key-value form of a configuration, in write order.
fn configuration_entries(config: &Configuration) -> [(&'static str, String); 8] {
    [
        (keys::TIMEZONE, config.timezone.clone()),
        (keys::POLL_INTERVAL, config.poll_interval_secs.to_string()),
        (keys::PERIPHERAL_ENABLED, config.peripheral_enabled.to_string()),
        (
            keys::PERIPHERAL_ADDRESS,
            config
                .peripheral_address
                .as_ref()
                .map_or_else(String::new, |a| a.as_str().to_string()),
        ),
        (keys::DELIVERY_URL, config.delivery_url.clone()),
        (
            keys::DELIVERY_INTERVAL,
            config.delivery_interval_secs.to_string(),
        ),
        (keys::DELIVERY_ENABLED, config.delivery_enabled.to_string()),
        (keys::VERBOSE, config.verbose.to_string()),
    ]
}

/// Persist the configuration, writing only keys whose stored value differs.
///
/// All or nothing: if a write fails, keys already written are restored to
/// their previous values before the error is returned.
pub fn save_configuration(
    store: &mut dyn SettingsStore,
    config: &Configuration,
) -> Result<(), StoreError> {
    let ns = Namespace::Settings;
    let mut written: Vec<(&'static str, Option<String>)> = Vec::new();

    for (key, value) in configuration_entries(config) {
        let previous = store.get_str(ns, key)?;
        if previous.as_deref() == Some(value.as_str()) {
            continue;
        }
        if let Err(e) = store.set_str(ns, key, &value) {
            warn!("Writing {} failed, rolling back {} keys", key, written.len());
            rollback(store, written);
            return Err(e);
        }
        written.push((key, previous));
    }
    Ok(())
}

fn rollback(store: &mut dyn SettingsStore, written: Vec<(&'static str, Option<String>)>) {
    for (key, previous) in written.into_iter().rev() {
        let restored = match previous {
            Some(value) => store.set_str(Namespace::Settings, key, &value),
            None => store.remove(Namespace::Settings, key),
        };
        if let Err(e) = restored {
            error!("Rollback of {} failed: {}", key, e);
        }
    }
}

/// Load network credentials.
///
/// Returns `None` if none are stored or the stored pair fails validation.
pub fn load_credentials(store: &dyn SettingsStore) -> Option<WifiCredentials> {
    let ssid = match store.get_str(Namespace::Credentials, keys::SSID) {
        Ok(Some(ssid)) if !ssid.is_empty() => ssid,
        Ok(_) => return None,
        Err(e) => {
            warn!("Failed to read stored SSID: {}", e);
            return None;
        }
    };
    let password = store
        .get_str(Namespace::Credentials, keys::PASSWORD)
        .ok()
        .flatten()
        .unwrap_or_default();

    match WifiCredentials::new(ssid, password) {
        Ok(creds) => Some(creds),
        Err(e) => {
            warn!("Stored credentials are invalid: {}", e);
            None
        }
    }
}

/// Persist network credentials.
pub fn save_credentials(
    store: &mut dyn SettingsStore,
    creds: &WifiCredentials,
) -> Result<(), StoreError> {
    store.set_str(Namespace::Credentials, keys::SSID, &creds.ssid)?;
    store.set_str(Namespace::Credentials, keys::PASSWORD, &creds.password)?;
    info!("Saved credentials for '{}'", creds.ssid);
    Ok(())
}

/// Erase network credentials, leaving other settings intact.
pub fn clear_credentials(store: &mut dyn SettingsStore) -> Result<(), StoreError> {
    store.remove(Namespace::Credentials, keys::SSID)?;
    store.remove(Namespace::Credentials, keys::PASSWORD)?;
    warn!("Network credentials cleared");
    Ok(())
}
