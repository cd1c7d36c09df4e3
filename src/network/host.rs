//! Host radio.
//!
//! On host systems the OS owns networking. The radio reports the machine as
//! joined to whatever network was requested and detects the local address
//! used for the default route.

use super::{NetworkError, ScanResult, WifiRadio};
use crate::config::WifiCredentials;
use log::info;
use std::net::IpAddr;

/// Stand-in radio for host builds.
#[derive(Debug, Default)]
pub struct HostRadio {
    ip_addr: Option<IpAddr>,
    access_point: bool,
}

impl HostRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local address of the default route.
    ///
    /// "Connecting" a UDP socket sends nothing but makes the OS pick the
    /// outgoing interface.
    fn detect_local_ip() -> Option<IpAddr> {
        use std::net::UdpSocket;

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        Some(socket.local_addr().ok()?.ip())
    }
}

impl WifiRadio for HostRadio {
    fn begin_connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        self.access_point = false;
        self.ip_addr = Self::detect_local_ip();
        match self.ip_addr {
            Some(ip) => info!("Host network '{}' ready, local IP: {}", credentials.ssid, ip),
            None => info!("Host network '{}' ready, no route detected", credentials.ssid),
        }
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), NetworkError> {
        self.access_point = false;
        self.ip_addr = Self::detect_local_ip();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.access_point
    }

    fn ip_addr(&self) -> Option<IpAddr> {
        self.ip_addr
    }

    fn start_access_point(&mut self) -> Result<(), NetworkError> {
        info!("Host build: access point simulated, UI served on all interfaces");
        self.access_point = true;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, NetworkError> {
        Ok(Vec::new())
    }

    fn mac_address(&self) -> String {
        "02:00:00:00:00:01".to_string()
    }
}
