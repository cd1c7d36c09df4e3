//! The coordinating context.
//!
//! [`Device`] owns every record the firmware mutates: configuration, settings
//! store, network and peripheral state machines, delivery dispatcher, time
//! keeping and the loop timers. All mutation goes through [`Device::tick`]
//! and [`Device::handle`], both called from the single loop context, so each
//! record has exactly one mutator.

use crate::bms::ReadingSnapshot;
use crate::clock::Clock;
use crate::config::{ConfigError, Configuration, PeripheralAddress, WifiCredentials};
use crate::delivery::{
    DeliveryError, DeliveryRecord, DispatchInput, DispatchMode, Dispatcher, SkipReason,
};
use crate::network::{NetworkError, NetworkManager, ScanResult};
use crate::peripheral::PeripheralLink;
use crate::platform::Platform;
use crate::store::{self, StoreError};
use crate::time_sync::{self, TimeSync, RESYNC_INTERVAL};
use crate::timer::{Timer, TimerTable};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Periodic work scheduled by the loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopTask {
    TimeSync,
    Delivery,
}

/// Why the device must restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    /// The peripheral address changed.
    IdentityChanged,
    /// Network credentials were wiped; restart into access point mode.
    CredentialsCleared,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityChanged => write!(f, "peripheral address changed"),
            Self::CredentialsCleared => write!(f, "network credentials cleared"),
        }
    }
}

/// Requests from the local UI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetPeripheralEnabled {
        enabled: bool,
    },
    SetVerbose {
        enabled: bool,
    },
    /// An empty address clears the identity.
    SetPeripheral {
        address: String,
        poll_interval_secs: u32,
    },
    SetTimezone {
        timezone: String,
    },
    SetDelivery {
        enabled: bool,
        url: String,
        interval_secs: u32,
    },
    TestDelivery,
    ResetNetwork,
    ScanNetworks,
    ConnectNetwork {
        ssid: String,
        #[serde(default)]
        password: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    RestartPending { reason: RestartReason },
    Delivered { status: u16 },
    Networks { networks: Vec<ScanResult> },
    Connected { ssid: String, ip: Option<String> },
}

#[derive(Debug)]
pub enum CommandError {
    Config(ConfigError),
    Store(StoreError),
    Network(NetworkError),
    Delivery(DeliveryError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "{}", e),
            Self::Network(e) => write!(f, "{}", e),
            Self::Delivery(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Network(e) => Some(e),
            Self::Delivery(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<NetworkError> for CommandError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

impl From<DeliveryError> for CommandError {
    fn from(e: DeliveryError) -> Self {
        Self::Delivery(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ReadingView {
    /// Whether the latest poll passed the validity gate. `reading` may
    /// still hold the last good one when it did not.
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<ReadingSnapshot>,
    pub peripheral_state: String,
    pub seconds_since_poll: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TimeView {
    pub time: Option<String>,
    pub last_sync: Option<String>,
    pub synced: bool,
    pub sync_pending: bool,
    pub timezone: String,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub network_mode: &'static str,
    pub network_connected: bool,
    pub ap_mode: bool,
    pub ssid: Option<String>,
    pub ip: Option<String>,
    pub mac: String,
    pub peripheral_enabled: bool,
    pub peripheral_connected: bool,
    pub peripheral_address: Option<String>,
    pub data_valid: bool,
    pub verbose: bool,
    pub poll_interval_secs: u32,
    pub delivery_enabled: bool,
    pub time_synced: bool,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct DeliveryView {
    pub enabled: bool,
    pub url: String,
    pub interval_secs: u32,
    pub attempts: u32,
    pub successes: u32,
    pub last: Option<DeliveryRecord>,
    pub last_skip: Option<SkipReason>,
    pub seconds_since_attempt: Option<u64>,
}

pub struct Device<P: Platform> {
    config: Configuration,
    store: P::Store,
    network: NetworkManager<P::Radio>,
    peripheral: PeripheralLink<P::Bms>,
    dispatcher: Dispatcher<P::Transport>,
    time: TimeSync<P::Time>,
    timers: TimerTable<LoopTask>,
    restart: Option<RestartReason>,
}

impl<P: Platform> Device<P> {
    /// Load the configuration and wire up the state machines.
    pub fn new(
        store: P::Store,
        radio: P::Radio,
        bms: P::Bms,
        transport: P::Transport,
        time_source: P::Time,
    ) -> Self {
        let config = store::load_configuration(&store);
        info!(
            "Configuration: poll {}s, BMS {} ({}), delivery {} every {}s",
            config.poll_interval_secs,
            if config.peripheral_enabled { "on" } else { "off" },
            config
                .peripheral_address
                .as_ref()
                .map_or("no address", PeripheralAddress::as_str),
            if config.delivery_enabled { "on" } else { "off" },
            config.delivery_interval_secs
        );

        let mut timers = TimerTable::new();
        timers.insert(LoopTask::TimeSync, Timer::new(RESYNC_INTERVAL));
        timers.insert(LoopTask::Delivery, Timer::new(config.delivery_interval()));

        Self {
            network: NetworkManager::new(radio),
            peripheral: PeripheralLink::new(bms, &config),
            dispatcher: Dispatcher::new(transport),
            time: TimeSync::new(time_source, &config.timezone),
            timers,
            restart: None,
            store,
            config,
        }
    }

    /// Bring the network up (bounded wait) and arm the peripheral link.
    pub fn boot(&mut self, clock: &dyn Clock) {
        self.network.bootstrap(&self.store, clock);
        let now = clock.now();
        if self.network.is_connected() {
            self.time.sync();
            if let Some(timer) = self.timers.get_mut(LoopTask::TimeSync) {
                timer.fire(now);
            }
        }
        if let Some(timer) = self.timers.get_mut(LoopTask::Delivery) {
            timer.fire(now);
        }
        self.peripheral.request_connect();
    }

    /// One loop iteration of background work, in fixed order.
    pub fn tick(&mut self, now: Duration) {
        self.network.tick(now);
        self.peripheral.tick(now);

        self.time.poll();
        for task in self.timers.due(now) {
            // A sync stays due until the network is up
            if task == LoopTask::TimeSync && !self.network.is_connected() {
                continue;
            }
            self.timers.poll(task, now);
            match task {
                LoopTask::TimeSync => self.time.sync(),
                LoopTask::Delivery => {
                    // Outcome is kept in the dispatcher's records
                    let _ = self.dispatch(now, DispatchMode::Scheduled);
                }
            }
        }
    }

    /// Apply a UI request. Mutations are persisted before they take effect.
    pub fn handle(&mut self, command: Command, clock: &dyn Clock) -> Result<Response, CommandError> {
        let now = clock.now();
        match command {
            Command::SetPeripheralEnabled { enabled } => {
                let mut next = self.config.clone();
                next.peripheral_enabled = enabled;
                self.commit(next)?;
                self.peripheral.set_enabled(enabled);
                info!("BMS {}", if enabled { "enabled" } else { "disabled" });
                Ok(Response::Ok)
            }
            Command::SetVerbose { enabled } => {
                let mut next = self.config.clone();
                next.verbose = enabled;
                self.commit(next)?;
                self.peripheral.set_verbose(enabled);
                Ok(Response::Ok)
            }
            Command::SetPeripheral {
                address,
                poll_interval_secs,
            } => {
                let address = match address.trim() {
                    "" => None,
                    raw => Some(raw.parse::<PeripheralAddress>()?),
                };
                let mut next = self.config.clone();
                next.set_poll_interval(poll_interval_secs);
                let identity_changed = next.peripheral_address != address;
                next.peripheral_address = address;
                self.commit(next)?;
                self.peripheral.set_poll_interval(self.config.poll_interval());

                if identity_changed {
                    Ok(self.request_restart(RestartReason::IdentityChanged))
                } else {
                    Ok(Response::Ok)
                }
            }
            Command::SetTimezone { timezone } => {
                let mut next = self.config.clone();
                next.set_timezone(&timezone)?;
                self.commit(next)?;
                self.time.set_timezone(&self.config.timezone);
                self.resync_time(now);
                Ok(Response::Ok)
            }
            Command::SetDelivery {
                enabled,
                url,
                interval_secs,
            } => {
                let mut next = self.config.clone();
                next.set_delivery_url(&url)?;
                next.set_delivery_interval(interval_secs);
                next.delivery_enabled = enabled;
                self.commit(next)?;
                if let Some(timer) = self.timers.get_mut(LoopTask::Delivery) {
                    timer.set_interval(self.config.delivery_interval());
                }
                Ok(Response::Ok)
            }
            Command::TestDelivery => {
                let status = self.dispatch(now, DispatchMode::ManualTest)?;
                Ok(Response::Delivered { status })
            }
            Command::ResetNetwork => {
                self.network.request_reset(&mut self.store)?;
                Ok(self.request_restart(RestartReason::CredentialsCleared))
            }
            Command::ScanNetworks => {
                let networks = self.network.scan()?;
                Ok(Response::Networks { networks })
            }
            Command::ConnectNetwork { ssid, password } => {
                let creds = WifiCredentials::new(ssid, password)?;
                self.network
                    .request_connect(&creds, &mut self.store, clock)?;
                self.resync_time(clock.now());
                Ok(Response::Connected {
                    ssid: creds.ssid.clone(),
                    ip: self.network.ip_addr().map(|ip| ip.to_string()),
                })
            }
        }
    }

    /// Pending restart, if a command asked for one.
    pub fn restart_requested(&self) -> Option<RestartReason> {
        self.restart
    }

    pub fn reading_view(&self, now: Duration) -> ReadingView {
        ReadingView {
            available: self.peripheral.is_valid(),
            reading: self.peripheral.last_reading().cloned(),
            peripheral_state: self.peripheral.state().to_string(),
            seconds_since_poll: self
                .peripheral
                .last_poll()
                .map(|t| now.saturating_sub(t).as_secs()),
        }
    }

    pub fn time_view(&self) -> TimeView {
        TimeView {
            time: self.time.local_time(),
            last_sync: self.time.last_sync().map(str::to_string),
            synced: self.time.is_synced(),
            sync_pending: self.time.is_pending(),
            timezone: self.time.timezone().to_string(),
        }
    }

    pub fn status_view(&self, now: Duration) -> StatusView {
        let state = self.network.state();
        StatusView {
            network_mode: state.mode(),
            network_connected: state.is_connected(),
            ap_mode: state.is_ap_mode(),
            ssid: self.network.ssid().map(str::to_string),
            ip: self.network.ip_addr().map(|ip| ip.to_string()),
            mac: self.network.mac_address(),
            peripheral_enabled: self.config.peripheral_enabled,
            peripheral_connected: self.peripheral.is_connected(),
            peripheral_address: self
                .config
                .peripheral_address
                .as_ref()
                .map(|a| a.to_string()),
            data_valid: self.peripheral.is_valid(),
            verbose: self.config.verbose,
            poll_interval_secs: self.config.poll_interval_secs,
            delivery_enabled: self.config.delivery_enabled,
            time_synced: self.time.is_synced(),
            uptime_secs: now.as_secs(),
        }
    }

    pub fn delivery_view(&self, now: Duration) -> DeliveryView {
        let last = self.dispatcher.last_record().cloned();
        DeliveryView {
            enabled: self.config.delivery_enabled,
            url: self.config.delivery_url.clone(),
            interval_secs: self.config.delivery_interval_secs,
            attempts: self.dispatcher.attempts(),
            successes: self.dispatcher.successes(),
            seconds_since_attempt: last
                .as_ref()
                .map(|r| now.saturating_sub(r.at).as_secs()),
            last,
            last_skip: self.dispatcher.last_skip(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn store(&self) -> &P::Store {
        &self.store
    }

    pub fn network(&self) -> &NetworkManager<P::Radio> {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkManager<P::Radio> {
        &mut self.network
    }

    pub fn peripheral(&self) -> &PeripheralLink<P::Bms> {
        &self.peripheral
    }

    pub fn peripheral_mut(&mut self) -> &mut PeripheralLink<P::Bms> {
        &mut self.peripheral
    }

    pub fn dispatcher(&self) -> &Dispatcher<P::Transport> {
        &self.dispatcher
    }

    pub fn time(&self) -> &TimeSync<P::Time> {
        &self.time
    }

    fn dispatch(&mut self, now: Duration, mode: DispatchMode) -> Result<u16, DeliveryError> {
        let mac = self.network.mac_address();
        let timestamp = time_sync::local_time_string();
        let input = DispatchInput {
            config: &self.config,
            network: self.network.state(),
            snapshot: self.peripheral.valid_snapshot(),
            peripheral_connected: self.peripheral.is_connected(),
            mac: &mac,
            timestamp: &timestamp,
            now,
        };
        self.dispatcher.dispatch(&input, mode)
    }

    /// Persist `next`, then make it current.
    fn commit(&mut self, next: Configuration) -> Result<(), StoreError> {
        if next == self.config {
            return Ok(());
        }
        store::save_configuration(&mut self.store, &next)?;
        info!("Configuration saved");
        self.config = next;
        Ok(())
    }

    /// Sync now if connected, otherwise as soon as the link is up.
    fn resync_time(&mut self, now: Duration) {
        let connected = self.network.is_connected();
        if let Some(timer) = self.timers.get_mut(LoopTask::TimeSync) {
            if connected {
                timer.fire(now);
            } else {
                timer.reset();
            }
        }
        if connected {
            self.time.sync();
        }
    }

    fn request_restart(&mut self, reason: RestartReason) -> Response {
        warn!("Restart requested: {}", reason);
        self.restart = Some(reason);
        Response::RestartPending { reason }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::DeliveryOutcome;
    use crate::network::NetworkState;
    use crate::peripheral::PeripheralState;
    use crate::store::{MemoryStore, Namespace};
    use crate::testutil::{MockBms, MockRadio, MockTimeSource, MockTransport};

    pub(crate) struct TestPlatform;

    impl Platform for TestPlatform {
        type Radio = MockRadio;
        type Bms = MockBms;
        type Transport = MockTransport;
        type Time = MockTimeSource;
        type Store = MemoryStore;
    }

    pub(crate) const ADDRESS: &str = "C8:47:80:3F:67:7C";

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Store with credentials, a peripheral address and delivery enabled.
    pub(crate) fn provisioned_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store::save_credentials(
            &mut store,
            &WifiCredentials::new("home", "password123").unwrap(),
        )
        .unwrap();
        let config = Configuration {
            peripheral_address: Some(ADDRESS.parse().unwrap()),
            delivery_url: "http://10.0.0.2/hook".into(),
            delivery_enabled: true,
            ..Configuration::default()
        };
        store::save_configuration(&mut store, &config).unwrap();
        store
    }

    pub(crate) fn device(store: MemoryStore, radio: MockRadio) -> Device<TestPlatform> {
        Device::new(
            store,
            radio,
            MockBms::new(),
            MockTransport::answering(200, "ok"),
            MockTimeSource::default(),
        )
    }

    #[test]
    fn test_boot_without_credentials_stays_in_ap_mode() {
        let clock = ManualClock::new();
        let mut dev = device(MemoryStore::new(), MockRadio::reachable());
        dev.boot(&clock);

        assert!(dev.network().is_ap_mode());
        assert_eq!(dev.network().radio().connect_calls, 0);
        assert!(dev.time().source().start_calls.is_empty());
    }

    #[test]
    fn test_boot_connects_and_syncs_time() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);

        assert!(dev.network().is_connected());
        assert_eq!(dev.time().source().start_calls.len(), 1);
        assert_eq!(dev.peripheral().state(), PeripheralState::ConnectPending);

        dev.tick(clock.now());
        assert!(dev.peripheral().is_connected());
        assert!(dev.peripheral().is_valid());
    }

    #[test]
    fn test_scheduled_delivery_runs_on_interval() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        dev.tick(secs(0));

        dev.tick(secs(59));
        assert!(dev.dispatcher().transport().calls.is_empty());

        dev.tick(secs(60));
        assert_eq!(dev.dispatcher().transport().calls.len(), 1);
        assert!(dev.dispatcher().last_record().unwrap().success);

        dev.tick(secs(61));
        dev.tick(secs(119));
        assert_eq!(dev.dispatcher().transport().calls.len(), 1);
        dev.tick(secs(120));
        assert_eq!(dev.dispatcher().transport().calls.len(), 2);
    }

    #[test]
    fn test_no_delivery_in_ap_mode() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::unreachable());
        dev.boot(&clock);
        assert!(dev.network().is_ap_mode());

        let start = clock.now();
        for s in 0..=300 {
            dev.tick(start + secs(s));
        }
        assert!(dev.dispatcher().transport().calls.is_empty());
        assert_eq!(
            dev.dispatcher().last_skip(),
            Some(SkipReason::AccessPointMode)
        );
    }

    #[test]
    fn test_no_delivery_while_data_invalid() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        for _ in 0..10 {
            dev.peripheral_mut()
                .client_mut()
                .readings
                .push_back(Ok(ReadingSnapshot::default()));
        }
        dev.boot(&clock);

        for s in 0..=180 {
            dev.tick(secs(s));
        }
        assert!(!dev.peripheral().is_valid());
        assert!(dev.dispatcher().transport().calls.is_empty());
        assert_eq!(dev.dispatcher().last_skip(), Some(SkipReason::InvalidData));
    }

    #[test]
    fn test_no_delivery_after_network_loss() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        dev.tick(secs(0));

        dev.network_mut().radio_mut().reachable = false;
        dev.network_mut().radio_mut().drop_link();
        for s in 1..=60 {
            dev.tick(secs(s));
        }
        assert!(!dev.network().is_connected());
        assert!(dev.dispatcher().transport().calls.is_empty());
        assert_eq!(dev.dispatcher().last_skip(), Some(SkipReason::NotConnected));
    }

    #[test]
    fn test_delivery_interval_clamped_and_persisted() {
        let clock = ManualClock::new();
        let mut dev = device(MemoryStore::new(), MockRadio::reachable());

        dev.handle(
            Command::SetDelivery {
                enabled: true,
                url: "https://example.com/hook".into(),
                interval_secs: 5,
            },
            &clock,
        )
        .unwrap();
        assert_eq!(dev.config().delivery_interval_secs, 10);
        assert_eq!(
            store::load_configuration(dev.store()).delivery_interval_secs,
            10
        );

        dev.handle(
            Command::SetDelivery {
                enabled: true,
                url: "https://example.com/hook".into(),
                interval_secs: 10_000,
            },
            &clock,
        )
        .unwrap();
        assert_eq!(dev.config().delivery_interval_secs, 3600);
        assert_eq!(
            store::load_configuration(dev.store()).delivery_interval_secs,
            3600
        );
    }

    #[test]
    fn test_invalid_delivery_url_changes_nothing() {
        let clock = ManualClock::new();
        let mut dev = device(MemoryStore::new(), MockRadio::reachable());

        let result = dev.handle(
            Command::SetDelivery {
                enabled: true,
                url: "ftp://example.com".into(),
                interval_secs: 30,
            },
            &clock,
        );

        assert!(matches!(
            result,
            Err(CommandError::Config(ConfigError::InvalidUrl(_)))
        ));
        assert_eq!(dev.config(), &Configuration::default());
        assert_eq!(dev.store().len(Namespace::Settings), 0);
    }

    #[test]
    fn test_configuration_survives_restart() {
        let clock = ManualClock::new();
        let mut dev = device(MemoryStore::new(), MockRadio::reachable());

        for command in [
            Command::SetVerbose { enabled: true },
            Command::SetPeripheralEnabled { enabled: false },
            Command::SetPeripheral {
                address: "c8:47:80:3f:67:7c".into(),
                poll_interval_secs: 45,
            },
            Command::SetTimezone {
                timezone: "UTC0".into(),
            },
            Command::SetDelivery {
                enabled: true,
                url: "http://10.0.0.2:8080/bms".into(),
                interval_secs: 120,
            },
        ] {
            dev.handle(command, &clock).unwrap();
        }
        let before = dev.config().clone();

        let restarted = device(dev.store().clone(), MockRadio::reachable());
        assert_eq!(restarted.config(), &before);
        assert_eq!(before.poll_interval_secs, 45);
        assert_eq!(
            before.peripheral_address.as_ref().map(|a| a.as_str()),
            Some(ADDRESS)
        );
    }

    #[test]
    fn test_identity_change_requests_restart() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());

        // Same address, new interval: applied in place
        let response = dev
            .handle(
                Command::SetPeripheral {
                    address: ADDRESS.into(),
                    poll_interval_secs: 30,
                },
                &clock,
            )
            .unwrap();
        assert_eq!(response, Response::Ok);
        assert_eq!(dev.restart_requested(), None);

        let response = dev
            .handle(
                Command::SetPeripheral {
                    address: "AA:BB:CC:DD:EE:FF".into(),
                    poll_interval_secs: 30,
                },
                &clock,
            )
            .unwrap();
        assert_eq!(
            response,
            Response::RestartPending {
                reason: RestartReason::IdentityChanged
            }
        );
        assert_eq!(
            dev.restart_requested(),
            Some(RestartReason::IdentityChanged)
        );
    }

    #[test]
    fn test_malformed_identity_rejected() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());

        let result = dev.handle(
            Command::SetPeripheral {
                address: "C8:47:80:3F:67".into(),
                poll_interval_secs: 30,
            },
            &clock,
        );
        assert!(matches!(
            result,
            Err(CommandError::Config(ConfigError::InvalidAddress(_)))
        ));
        assert_eq!(dev.restart_requested(), None);
    }

    #[test]
    fn test_reset_network_wipes_credentials_only() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);

        let response = dev.handle(Command::ResetNetwork, &clock).unwrap();

        assert_eq!(
            response,
            Response::RestartPending {
                reason: RestartReason::CredentialsCleared
            }
        );
        assert_eq!(store::load_credentials(dev.store()), None);
        // Settings untouched
        assert!(store::load_configuration(dev.store()).delivery_enabled);
    }

    #[test]
    fn test_manual_delivery_overrides_disabled_once() {
        let clock = ManualClock::new();
        let mut store = provisioned_store();
        let mut config = store::load_configuration(&store);
        config.delivery_enabled = false;
        store::save_configuration(&mut store, &config).unwrap();

        let mut dev = device(store, MockRadio::reachable());
        dev.boot(&clock);
        dev.tick(secs(0));

        let response = dev.handle(Command::TestDelivery, &clock).unwrap();
        assert_eq!(response, Response::Delivered { status: 200 });
        assert_eq!(dev.dispatcher().transport().calls.len(), 1);
        assert!(!dev.config().delivery_enabled);
        assert!(!store::load_configuration(dev.store()).delivery_enabled);

        // Scheduled dispatches still honour the flag
        for s in 1..=120 {
            dev.tick(secs(s));
        }
        assert_eq!(dev.dispatcher().transport().calls.len(), 1);
    }

    #[test]
    fn test_manual_delivery_failure_reported() {
        let clock = ManualClock::new();
        let mut dev = Device::<TestPlatform>::new(
            provisioned_store(),
            MockRadio::reachable(),
            MockBms::new(),
            MockTransport::answering(503, "busy"),
            MockTimeSource::default(),
        );
        dev.boot(&clock);
        dev.tick(secs(0));

        let result = dev.handle(Command::TestDelivery, &clock);
        assert!(matches!(
            result,
            Err(CommandError::Delivery(DeliveryError::Http { status: 503 }))
        ));
        let view = dev.delivery_view(secs(0));
        assert_eq!(
            view.last.unwrap().outcome,
            DeliveryOutcome::Status { code: 503 }
        );
    }

    #[test]
    fn test_timezone_change_resyncs_immediately() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        assert_eq!(dev.time().source().start_calls.len(), 1);

        dev.handle(
            Command::SetTimezone {
                timezone: "UTC0".into(),
            },
            &clock,
        )
        .unwrap();

        assert_eq!(dev.time().source().start_calls.len(), 2);
        assert_eq!(dev.time().source().start_calls[1], "UTC0");
        assert_eq!(dev.config().timezone, "UTC0");
    }

    #[test]
    fn test_hourly_time_sync() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);

        dev.tick(secs(3599));
        assert_eq!(dev.time().source().start_calls.len(), 1);
        dev.tick(secs(3600));
        assert_eq!(dev.time().source().start_calls.len(), 2);
    }

    #[test]
    fn test_time_sync_waits_for_network() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        let view = dev.time_view();
        assert!(view.sync_pending);
        assert!(!view.synced);

        dev.network_mut().radio_mut().reachable = false;
        dev.network_mut().radio_mut().drop_link();
        dev.tick(secs(3600));
        assert!(!dev.network().is_connected());
        assert_eq!(dev.time().source().start_calls.len(), 1);

        dev.network_mut().radio_mut().reachable = true;
        let mut t = 3601;
        while !dev.network().is_connected() && t < 3700 {
            dev.tick(secs(t));
            if !dev.network().is_connected() {
                assert_eq!(dev.time().source().start_calls.len(), 1);
            }
            t += 1;
        }
        assert!(dev.network().is_connected());
        assert_eq!(dev.time().source().start_calls.len(), 2);
    }

    #[test]
    fn test_disable_peripheral_disconnects() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        dev.tick(secs(0));
        assert!(dev.peripheral().is_connected());

        dev.handle(Command::SetPeripheralEnabled { enabled: false }, &clock)
            .unwrap();

        assert_eq!(dev.peripheral().state(), PeripheralState::Disconnected);
        assert_eq!(dev.peripheral().client().disconnect_calls, 1);
        let view = dev.reading_view(secs(1));
        assert!(!view.available);
        assert!(view.reading.is_none());
    }

    #[test]
    fn test_connect_network_from_ap_mode() {
        let clock = ManualClock::new();
        let mut dev = device(MemoryStore::new(), MockRadio::reachable());
        dev.boot(&clock);
        assert!(dev.network().is_ap_mode());

        let response = dev
            .handle(
                Command::ConnectNetwork {
                    ssid: "office".into(),
                    password: "password123".into(),
                },
                &clock,
            )
            .unwrap();

        assert!(matches!(response, Response::Connected { ref ssid, .. } if ssid == "office"));
        assert!(matches!(
            dev.network().state(),
            NetworkState::StaConnected { .. }
        ));
        assert!(store::load_credentials(dev.store()).is_some());
        assert_eq!(dev.time().source().start_calls.len(), 1);
        // No restart needed
        assert_eq!(dev.restart_requested(), None);
    }

    #[test]
    fn test_status_view() {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        dev.tick(secs(0));

        let status = dev.status_view(secs(42));
        assert_eq!(status.network_mode, "sta_connected");
        assert!(status.network_connected);
        assert!(!status.ap_mode);
        assert_eq!(status.ssid.as_deref(), Some("home"));
        assert!(status.peripheral_connected);
        assert!(status.data_valid);
        assert_eq!(status.peripheral_address.as_deref(), Some(ADDRESS));
        assert_eq!(status.uptime_secs, 42);
    }

    #[test]
    fn test_command_json() {
        let command: Command = serde_json::from_str(
            r#"{"command":"set_delivery","enabled":true,"url":"http://x/y","interval_secs":30}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            Command::SetDelivery {
                enabled: true,
                url: "http://x/y".into(),
                interval_secs: 30,
            }
        );
        let command: Command = serde_json::from_str(r#"{"command":"test_delivery"}"#).unwrap();
        assert_eq!(command, Command::TestDelivery);
    }
}
