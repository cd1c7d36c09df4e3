//! Network connectivity state machine.

use super::{
    NetworkError, NetworkState, ScanResult, WifiRadio, AP_IP, BOOTSTRAP_TIMEOUT, CHECK_INTERVAL,
    CONNECT_TIMEOUT, LINK_POLL_PERIOD, RECONNECT_TIMEOUT,
};
use crate::clock::Clock;
use crate::config::WifiCredentials;
use crate::store::{self, SettingsStore};
use crate::timer::Timer;
use log::{error, info, warn};
use std::net::IpAddr;
use std::time::Duration;

/// Owns the radio and the connectivity state.
///
/// Only [`bootstrap`](Self::bootstrap) and
/// [`request_connect`](Self::request_connect) wait for the radio, each
/// bounded. [`tick`](Self::tick) never blocks.
pub struct NetworkManager<R: WifiRadio> {
    radio: R,
    state: NetworkState,
    ssid: Option<String>,
    check_timer: Timer,
}

impl<R: WifiRadio> NetworkManager<R> {
    /// Wrap a radio. Starts disconnected until [`bootstrap`](Self::bootstrap).
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            state: NetworkState::StaDisconnected,
            ssid: None,
            check_timer: Timer::new(CHECK_INTERVAL),
        }
    }

    /// Join the stored network or fall back to the access point.
    ///
    /// Without stored credentials no connection is attempted.
    pub fn bootstrap(&mut self, store: &dyn SettingsStore, clock: &dyn Clock) -> &NetworkState {
        let Some(creds) = store::load_credentials(store) else {
            info!("No network credentials stored");
            self.enter_ap_mode();
            return &self.state;
        };

        info!("Connecting to '{}'", creds.ssid);
        if let Err(e) = self.radio.begin_connect(&creds) {
            warn!("Connect to '{}' failed: {}", creds.ssid, e);
            self.enter_ap_mode();
            return &self.state;
        }

        if self.wait_for_link(clock, BOOTSTRAP_TIMEOUT) {
            self.enter_connected(creds.ssid.clone(), clock.now());
        } else {
            warn!(
                "'{}' not reachable within {}s",
                creds.ssid,
                BOOTSTRAP_TIMEOUT.as_secs()
            );
            self.enter_ap_mode();
        }
        &self.state
    }

    /// Foreground connection attempt with user-supplied credentials.
    ///
    /// Credentials are persisted only after the link came up. On failure the
    /// radio returns to the access point and the error is reported.
    pub fn request_connect(
        &mut self,
        creds: &WifiCredentials,
        store: &mut dyn SettingsStore,
        clock: &dyn Clock,
    ) -> Result<(), NetworkError> {
        creds.validate()?;

        info!("Connecting to '{}' on request", creds.ssid);
        let started = self
            .radio
            .begin_connect(creds)
            .map(|()| self.wait_for_link(clock, CONNECT_TIMEOUT));

        match started {
            Ok(true) => {
                self.enter_connected(creds.ssid.clone(), clock.now());
                store::save_credentials(store, creds)?;
                Ok(())
            }
            Ok(false) => {
                warn!("'{}' not reachable, back to access point", creds.ssid);
                self.enter_ap_mode();
                Err(NetworkError::ConnectTimeout)
            }
            Err(e) => {
                warn!("Connect to '{}' failed: {}", creds.ssid, e);
                self.enter_ap_mode();
                Err(e)
            }
        }
    }

    /// Advance the state machine. No-op in access point mode.
    pub fn tick(&mut self, now: Duration) {
        match self.state {
            NetworkState::ApMode { .. } => {}
            NetworkState::StaConnected { .. } => {
                if !self.radio.is_connected() {
                    warn!("Network link lost");
                    self.set_state(NetworkState::StaDisconnected);
                    self.maybe_reconnect(now);
                }
            }
            NetworkState::StaDisconnected => self.maybe_reconnect(now),
            NetworkState::StaReconnecting { since } => {
                if self.radio.is_connected() {
                    let ssid = self.ssid.clone().unwrap_or_default();
                    self.enter_connected(ssid, now);
                } else if now.saturating_sub(since) >= RECONNECT_TIMEOUT {
                    warn!(
                        "Reconnect timed out after {}s",
                        RECONNECT_TIMEOUT.as_secs()
                    );
                    self.set_state(NetworkState::StaDisconnected);
                }
            }
        }
    }

    /// Erase stored credentials. The caller restarts into access point mode.
    pub fn request_reset(&mut self, store: &mut dyn SettingsStore) -> Result<(), NetworkError> {
        store::clear_credentials(store)?;
        self.ssid = None;
        Ok(())
    }

    /// Scan for reachable networks.
    pub fn scan(&mut self) -> Result<Vec<ScanResult>, NetworkError> {
        let mut networks = self.radio.scan()?;
        // Keep the strongest entry per SSID, strongest first
        networks.sort_by(|a, b| a.ssid.cmp(&b.ssid).then(b.rssi.cmp(&a.rssi)));
        networks.dedup_by(|a, b| a.ssid == b.ssid);
        networks.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        Ok(networks)
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn is_ap_mode(&self) -> bool {
        self.state.is_ap_mode()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// SSID of the configured network, if any.
    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    /// Address the device is reachable at in its current mode.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match &self.state {
            NetworkState::ApMode { ip } => Some(IpAddr::V4(*ip)),
            NetworkState::StaConnected { ip, .. } => *ip,
            _ => None,
        }
    }

    pub fn mac_address(&self) -> String {
        self.radio.mac_address()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Periodic check: start a reconnect if the link is still down.
    fn maybe_reconnect(&mut self, now: Duration) {
        if !self.check_timer.poll(now) {
            return;
        }
        if self.radio.is_connected() {
            let ssid = self.ssid.clone().unwrap_or_default();
            self.enter_connected(ssid, now);
            return;
        }
        info!("Reconnecting to network");
        match self.radio.reconnect() {
            Ok(()) => self.set_state(NetworkState::StaReconnecting { since: now }),
            Err(e) => warn!("Reconnect request failed: {}", e),
        }
    }

    /// Poll the link until it is up or `timeout` elapsed.
    fn wait_for_link(&self, clock: &dyn Clock, timeout: Duration) -> bool {
        let start = clock.now();
        loop {
            if self.radio.is_connected() {
                return true;
            }
            if clock.now().saturating_sub(start) >= timeout {
                return false;
            }
            clock.sleep(LINK_POLL_PERIOD);
        }
    }

    fn enter_connected(&mut self, ssid: String, now: Duration) {
        let ip = self.radio.ip_addr();
        self.ssid = Some(ssid.clone());
        self.check_timer.fire(now);
        self.set_state(NetworkState::StaConnected { ssid, ip });
    }

    fn enter_ap_mode(&mut self) {
        if let Err(e) = self.radio.start_access_point() {
            error!("Failed to start access point: {}", e);
        }
        self.set_state(NetworkState::ApMode { ip: AP_IP });
    }

    fn set_state(&mut self, state: NetworkState) {
        if self.state != state {
            info!("Network: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}
