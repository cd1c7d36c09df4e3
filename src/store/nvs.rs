//! ESP32 Non-Volatile Storage backend.
//!
//! Each [`Namespace`] maps to its own NVS namespace on the default partition,
//! so erasing credentials never touches user settings.
//!
//! # Security
//!
//! NVS is not encrypted unless flash encryption is enabled in the
//! partition table. Credentials are stored in plain text otherwise.

use super::{Namespace, SettingsStore, StoreError};
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::error;

/// Longest value we read back. Covers URLs and time-zone strings.
const MAX_VALUE_LEN: usize = 256;

/// Settings backed by two NVS namespaces.
pub struct NvsStore {
    settings: EspNvs<NvsDefault>,
    credentials: EspNvs<NvsDefault>,
}

impl NvsStore {
    /// Open both namespaces on the shared default partition.
    pub fn new() -> Result<Self, EspError> {
        let partition = crate::get_nvs_default_partition()?;
        Ok(Self {
            settings: EspNvs::new(partition.clone(), Namespace::Settings.as_str(), true)?,
            credentials: EspNvs::new(partition, Namespace::Credentials.as_str(), true)?,
        })
    }

    fn nvs(&self, ns: Namespace) -> &EspNvs<NvsDefault> {
        match ns {
            Namespace::Settings => &self.settings,
            Namespace::Credentials => &self.credentials,
        }
    }

    fn nvs_mut(&mut self, ns: Namespace) -> &mut EspNvs<NvsDefault> {
        match ns {
            Namespace::Settings => &mut self.settings,
            Namespace::Credentials => &mut self.credentials,
        }
    }
}

impl From<EspError> for StoreError {
    fn from(e: EspError) -> Self {
        Self::Backend(format!("{:?}", e))
    }
}

impl SettingsStore for NvsStore {
    fn get_str(&self, ns: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        let mut buf = [0u8; MAX_VALUE_LEN];
        let value = self.nvs(ns).get_str(key, &mut buf)?;
        Ok(value.map(str::to_string))
    }

    /// Writes are read back to catch silent flash write failures.
    fn set_str(&mut self, ns: Namespace, key: &str, value: &str) -> Result<(), StoreError> {
        if value.len() >= MAX_VALUE_LEN {
            return Err(StoreError::Backend(format!(
                "value for '{}' too long ({} bytes)",
                key,
                value.len()
            )));
        }
        self.nvs_mut(ns).set_str(key, value)?;

        if self.get_str(ns, key)?.as_deref() != Some(value) {
            error!("NVS verification failed for {}/{}", ns.as_str(), key);
            return Err(StoreError::VerifyFailed(key.to_string()));
        }
        Ok(())
    }

    fn remove(&mut self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        self.nvs_mut(ns).remove(key)?;
        Ok(())
    }
}
