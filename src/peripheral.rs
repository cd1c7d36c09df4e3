//! Peripheral connectivity state machine.
//!
//! Owns the BMS client, the last plausible [`ReadingSnapshot`] and the
//! validity flag. Implausible frames only flip the flag; they never replace
//! the stored reading.
//! Connection attempts are never made from a request handler: callers arm a
//! pending connection with [`PeripheralLink::request_connect`] and the next
//! [`PeripheralLink::tick`] performs it.

use crate::bms::{BmsClient, ReadingSnapshot, Transition, ValidityTracker};
use crate::config::{Configuration, PeripheralAddress};
use crate::timer::Timer;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Minimum time between two connection attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    Disconnected,
    ConnectPending,
    Connected,
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::ConnectPending => write!(f, "connect pending"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

pub struct PeripheralLink<C: BmsClient> {
    client: C,
    state: PeripheralState,
    address: Option<PeripheralAddress>,
    enabled: bool,
    verbose: bool,
    poll_timer: Timer,
    last_attempt: Option<Duration>,
    snapshot: ReadingSnapshot,
    validity: ValidityTracker,
}

impl<C: BmsClient> PeripheralLink<C> {
    pub fn new(client: C, config: &Configuration) -> Self {
        Self {
            client,
            state: PeripheralState::Disconnected,
            address: config.peripheral_address.clone(),
            enabled: config.peripheral_enabled,
            verbose: config.verbose,
            poll_timer: Timer::new(config.poll_interval()),
            last_attempt: None,
            snapshot: ReadingSnapshot::default(),
            validity: ValidityTracker::new(),
        }
    }

    /// Arm a connection attempt for the next tick.
    ///
    /// No-op while connected or already pending, when disabled, or without a
    /// configured address. Returns whether an attempt was armed.
    pub fn request_connect(&mut self) -> bool {
        if self.state != PeripheralState::Disconnected {
            return false;
        }
        if !self.enabled {
            debug!("BMS disabled, not connecting");
            return false;
        }
        if self.address.is_none() {
            debug!("No BMS address configured");
            return false;
        }
        self.set_state(PeripheralState::ConnectPending);
        true
    }

    /// Advance the state machine.
    pub fn tick(&mut self, now: Duration) {
        if !self.enabled {
            return;
        }
        match self.state {
            PeripheralState::ConnectPending => self.attempt_connect(now),
            PeripheralState::Connected => {
                if !self.client.is_connected() {
                    warn!("BMS link lost");
                    self.drop_link(now);
                } else if self.poll_timer.poll(now) {
                    self.poll(now);
                }
            }
            PeripheralState::Disconnected => {
                let backoff_over = self
                    .last_attempt
                    .map_or(true, |t| now.saturating_sub(t) >= RECONNECT_BACKOFF);
                if backoff_over {
                    self.request_connect();
                }
            }
        }
    }

    /// Disconnect and stop all activity. Always honoured immediately.
    pub fn disable(&mut self) {
        self.enabled = false;
        if self.client.is_connected() || self.state == PeripheralState::Connected {
            self.client.disconnect();
        }
        self.validity.clear();
        self.snapshot = ReadingSnapshot::default();
        self.set_state(PeripheralState::Disconnected);
    }

    /// Re-enable and arm a connection.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.last_attempt = None;
        self.request_connect();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_timer.set_interval(interval);
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeripheralState::Connected
    }

    pub fn address(&self) -> Option<&PeripheralAddress> {
        self.address.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    /// Last reading that passed the plausibility gate, while the flag holds.
    pub fn valid_snapshot(&self) -> Option<&ReadingSnapshot> {
        self.is_valid().then_some(&self.snapshot)
    }

    /// Last plausible reading, kept across later implausible polls.
    /// `None` before the first one and after the link is disabled.
    pub fn last_reading(&self) -> Option<&ReadingSnapshot> {
        (!self.snapshot.cell_voltages.is_empty()).then_some(&self.snapshot)
    }

    /// Time of the last poll attempt.
    pub fn last_poll(&self) -> Option<Duration> {
        self.poll_timer.last_fired()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    fn attempt_connect(&mut self, now: Duration) {
        let Some(address) = self.address.clone() else {
            self.set_state(PeripheralState::Disconnected);
            return;
        };
        self.last_attempt = Some(now);
        info!("Connecting to BMS {}", address);
        match self.client.connect(&address) {
            Ok(()) => {
                self.set_state(PeripheralState::Connected);
                self.poll_timer.fire(now);
                self.poll(now);
            }
            Err(e) => {
                warn!(
                    "BMS connect failed: {}, retry in {}s",
                    e,
                    RECONNECT_BACKOFF.as_secs()
                );
                self.set_state(PeripheralState::Disconnected);
            }
        }
    }

    fn poll(&mut self, now: Duration) {
        match self.client.poll() {
            Ok(snapshot) => {
                let transition = self.validity.update(&snapshot);
                if !self.validity.is_valid() {
                    return;
                }
                self.snapshot = snapshot;
                if self.verbose || transition == Some(Transition::BecameValid) {
                    self.snapshot.log_summary();
                }
            }
            Err(e) if e.is_link_loss() || !self.client.is_connected() => {
                warn!("BMS poll failed: {}", e);
                self.drop_link(now);
            }
            Err(e) => warn!("BMS poll failed: {}", e),
        }
    }

    fn drop_link(&mut self, now: Duration) {
        self.client.disconnect();
        self.last_attempt = Some(now);
        self.set_state(PeripheralState::Disconnected);
    }

    fn set_state(&mut self, state: PeripheralState) {
        if self.state != state {
            info!("BMS: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}
