//! ESP32 WiFi radio.
//!
//! Wraps the non-blocking `EspWifi` driver: `connect()` returns as soon as
//! association started, the state machine polls `is_connected`. The fallback
//! access point runs in mixed mode so the station side can still scan.

use super::{NetworkError, ScanResult, WifiRadio, AP_CHANNEL, AP_PASSWORD, AP_SSID};
use crate::config::WifiCredentials;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use log::{debug, info};
use std::net::IpAddr;

/// ESP-IDF WiFi driver behind [`WifiRadio`].
pub struct EspRadio {
    wifi: EspWifi<'static>,
    station: ClientConfiguration,
}

impl EspRadio {
    /// Take the modem and bring up the driver (not yet started).
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, NetworkError> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self {
            wifi,
            station: ClientConfiguration::default(),
        })
    }

    fn client_configuration(creds: &WifiCredentials) -> Result<ClientConfiguration, NetworkError> {
        let auth_method = if creds.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        Ok(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::Radio("SSID too long".into()))?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::Radio("password too long".into()))?,
            auth_method,
            ..Default::default()
        })
    }

    fn access_point_configuration() -> Result<AccessPointConfiguration, NetworkError> {
        Ok(AccessPointConfiguration {
            ssid: AP_SSID
                .try_into()
                .map_err(|_| NetworkError::Radio("AP SSID too long".into()))?,
            password: AP_PASSWORD
                .try_into()
                .map_err(|_| NetworkError::Radio("AP password too long".into()))?,
            auth_method: AuthMethod::WPA2Personal,
            channel: AP_CHANNEL,
            ..Default::default()
        })
    }

    fn ensure_started(&mut self) -> Result<(), NetworkError> {
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }
}

impl WifiRadio for EspRadio {
    fn begin_connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        self.station = Self::client_configuration(credentials)?;
        if self.wifi.is_connected().unwrap_or(false) {
            let _ = self.wifi.disconnect();
        }
        self.wifi
            .set_configuration(&Configuration::Client(self.station.clone()))?;
        self.ensure_started()?;
        self.wifi.connect()?;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), NetworkError> {
        self.ensure_started()?;
        if let Err(e) = self.wifi.disconnect() {
            debug!("disconnect before reconnect: {:?}", e);
        }
        self.wifi.connect()?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn ip_addr(&self) -> Option<IpAddr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
            .map(IpAddr::V4)
    }

    fn start_access_point(&mut self) -> Result<(), NetworkError> {
        if self.wifi.is_connected().unwrap_or(false) {
            let _ = self.wifi.disconnect();
        }
        let ap = Self::access_point_configuration()?;
        self.wifi
            .set_configuration(&Configuration::Mixed(self.station.clone(), ap))?;
        self.ensure_started()?;
        info!("Access point '{}' started on channel {}", AP_SSID, AP_CHANNEL);
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, NetworkError> {
        self.ensure_started()?;
        let found = self.wifi.scan()?;
        Ok(found
            .into_iter()
            .filter(|ap| !ap.ssid.is_empty())
            .map(|ap| ScanResult {
                ssid: ap.ssid.to_string(),
                rssi: ap.signal_strength,
                channel: ap.channel,
                secured: !matches!(ap.auth_method, None | Some(AuthMethod::None)),
            })
            .collect())
    }

    fn mac_address(&self) -> String {
        match self.wifi.sta_netif().get_mac() {
            Ok(mac) => mac
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(":"),
            Err(_) => String::from("00:00:00:00:00:00"),
        }
    }
}
