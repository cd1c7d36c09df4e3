//! Test doubles for the platform seams.
//!
//! Each mock counts its calls so tests can assert "no network call" or
//! "exactly one connection attempt" directly.

use crate::bms::{BmsClient, BmsError, ReadingSnapshot};
use crate::config::{PeripheralAddress, WifiCredentials};
use crate::delivery::{FailureReason, HttpResponse, HttpTransport, Timeouts};
use crate::network::{NetworkError, ScanResult, WifiRadio};
use crate::time_sync::{TimeError, TimeSource};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};

/// A plausible 8-cell reading.
pub fn healthy_reading() -> ReadingSnapshot {
    ReadingSnapshot {
        total_voltage: 26.4,
        cell_voltage_sum: 26.4,
        current: -3.2,
        mosfet_temp: 24,
        cell_temp: 21,
        soc: 85,
        soh: 100,
        remaining_ah: 85.0,
        full_capacity_ah: 100.0,
        battery_state: "Discharging".into(),
        protection_state: "Normal".into(),
        failure_state: "Normal".into(),
        heat_state: "Off".into(),
        balancing_state: "Inactive".into(),
        balance_memory: "0000000000000000".into(),
        discharge_cycles: 12,
        discharged_ah: 1200.0,
        cell_voltages: vec![3.30; 8],
    }
}

/// Radio whose association succeeds instantly when `reachable`.
#[derive(Debug, Default)]
pub struct MockRadio {
    pub reachable: bool,
    pub linked: bool,
    pub connect_calls: u32,
    pub reconnect_calls: u32,
    pub ap_starts: u32,
    pub scan_calls: u32,
    pub last_ssid: Option<String>,
    pub networks: Vec<ScanResult>,
}

impl MockRadio {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn drop_link(&mut self) {
        self.linked = false;
    }
}

impl WifiRadio for MockRadio {
    fn begin_connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        self.connect_calls += 1;
        self.last_ssid = Some(credentials.ssid.clone());
        self.linked = self.reachable;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), NetworkError> {
        self.reconnect_calls += 1;
        self.linked = self.reachable;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.linked
    }

    fn ip_addr(&self) -> Option<IpAddr> {
        self.linked
            .then_some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)))
    }

    fn start_access_point(&mut self) -> Result<(), NetworkError> {
        self.ap_starts += 1;
        self.linked = false;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, NetworkError> {
        self.scan_calls += 1;
        Ok(self.networks.clone())
    }

    fn mac_address(&self) -> String {
        "24:0A:C4:00:00:01".to_string()
    }
}

/// BMS that serves queued results, then healthy readings.
#[derive(Debug, Default)]
pub struct MockBms {
    pub fail_connect: bool,
    pub connected: bool,
    pub connect_calls: u32,
    pub disconnect_calls: u32,
    pub poll_calls: u32,
    pub last_address: Option<PeripheralAddress>,
    pub readings: VecDeque<Result<ReadingSnapshot, BmsError>>,
}

impl MockBms {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BmsClient for MockBms {
    fn connect(&mut self, address: &PeripheralAddress) -> Result<(), BmsError> {
        self.connect_calls += 1;
        self.last_address = Some(address.clone());
        if self.fail_connect {
            return Err(BmsError::ConnectFailed("unreachable".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) -> Result<ReadingSnapshot, BmsError> {
        self.poll_calls += 1;
        if !self.connected {
            return Err(BmsError::NotConnected);
        }
        self.readings
            .pop_front()
            .unwrap_or_else(|| Ok(healthy_reading()))
    }
}

/// Transport returning a fixed result and recording every request.
#[derive(Debug)]
pub struct MockTransport {
    pub result: Result<HttpResponse, FailureReason>,
    pub calls: Vec<(String, String, Timeouts)>,
}

impl MockTransport {
    pub fn answering(status: u16, body: &str) -> Self {
        Self {
            result: Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
            calls: Vec::new(),
        }
    }

    pub fn failing(reason: FailureReason) -> Self {
        Self {
            result: Err(reason),
            calls: Vec::new(),
        }
    }
}

impl HttpTransport for MockTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &str,
        timeouts: Timeouts,
    ) -> Result<HttpResponse, FailureReason> {
        self.calls
            .push((url.to_string(), body.to_string(), timeouts));
        self.result.clone()
    }
}

#[derive(Debug, Default)]
pub struct MockTimeSource {
    pub synced: bool,
    pub fail: bool,
    pub start_calls: Vec<String>,
}

impl TimeSource for MockTimeSource {
    fn start_sync(&mut self, timezone: &str) -> Result<(), TimeError> {
        if self.fail {
            return Err(TimeError::Sntp("no server".into()));
        }
        self.start_calls.push(timezone.to_string());
        Ok(())
    }

    fn is_synced(&self) -> bool {
        self.synced
    }
}
