//! Outbound delivery of readings to a webhook.
//!
//! A dispatch checks its preconditions in a fixed order before touching the
//! network: enabled, endpoint configured, not in access point mode, station
//! connected, reading valid. The first failing one is recorded as the skip
//! reason. Otherwise the reading is posted once with bounded timeouts and the
//! outcome recorded. Failures are never retried before the next scheduled
//! dispatch.

mod payload;

#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
mod esp;

pub use payload::Payload;

#[cfg(not(feature = "esp32"))]
pub use host::ReqwestTransport;

#[cfg(feature = "esp32")]
pub use esp::EspTransport;

use crate::bms::ReadingSnapshot;
use crate::config::Configuration;
use crate::network::NetworkState;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Identifier sent as `device` in every payload.
pub const DEVICE_ID: &str = "bms-monitor-esp32";

/// Bound on establishing the connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the whole request.
pub const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response excerpt kept for display (characters).
pub const EXCERPT_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub total: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            total: TOTAL_TIMEOUT,
        }
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single-shot JSON POST.
pub trait HttpTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &str,
        timeouts: Timeouts,
    ) -> Result<HttpResponse, FailureReason>;
}

/// Why a request produced no HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ConnectionFailed,
    SendFailed,
    NoStream,
    NoConnection,
    ConnectionLost,
    Timeout,
    Other(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::NoStream => write!(f, "no stream"),
            Self::NoConnection => write!(f, "no connection"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Why a dispatch did not touch the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    NoEndpoint,
    AccessPointMode,
    NotConnected,
    InvalidData,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "delivery disabled"),
            Self::NoEndpoint => write!(f, "no endpoint configured"),
            Self::AccessPointMode => write!(f, "device in access point mode"),
            Self::NotConnected => write!(f, "network not connected"),
            Self::InvalidData => write!(f, "no valid battery data"),
        }
    }
}

/// Outcome of the last real attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Status { code: u16 },
    Failed { reason: FailureReason },
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { code } => write!(f, "HTTP {}", code),
            Self::Failed { reason } => write!(f, "{}", reason),
        }
    }
}

/// Result of the last delivery attempt, overwritten on each attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    /// Loop time of the attempt.
    #[serde(skip)]
    pub at: Duration,
    /// Local time of the attempt.
    pub timestamp: String,
    pub outcome: DeliveryOutcome,
    /// Start of the response body.
    pub excerpt: String,
    pub success: bool,
}

#[derive(Debug)]
pub enum DeliveryError {
    Skipped(SkipReason),
    Http { status: u16 },
    Transport(FailureReason),
    Serialize(serde_json::Error),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Http { status } => write!(f, "endpoint answered HTTP {}", status),
            Self::Transport(reason) => write!(f, "request failed: {}", reason),
            Self::Serialize(e) => write!(f, "payload encoding failed: {}", e),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

/// Scheduled dispatch or a one-off user test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Scheduled,
    /// Ignores the enabled flag for this one attempt.
    ManualTest,
}

/// Everything a dispatch reads, borrowed from the device context.
pub struct DispatchInput<'a> {
    pub config: &'a Configuration,
    pub network: &'a NetworkState,
    /// The current reading, `None` unless it passed the validity gate.
    pub snapshot: Option<&'a ReadingSnapshot>,
    pub peripheral_connected: bool,
    pub mac: &'a str,
    pub timestamp: &'a str,
    pub now: Duration,
}

/// First failing precondition, in the documented order.
pub fn check_preconditions(input: &DispatchInput<'_>, mode: DispatchMode) -> Result<(), SkipReason> {
    if mode == DispatchMode::Scheduled && !input.config.delivery_enabled {
        return Err(SkipReason::Disabled);
    }
    if !input.config.has_delivery_endpoint() {
        return Err(SkipReason::NoEndpoint);
    }
    if input.network.is_ap_mode() {
        return Err(SkipReason::AccessPointMode);
    }
    if !input.network.is_connected() {
        return Err(SkipReason::NotConnected);
    }
    if input.snapshot.is_none() {
        return Err(SkipReason::InvalidData);
    }
    Ok(())
}

/// Owns the transport and the delivery records.
pub struct Dispatcher<T: HttpTransport> {
    transport: T,
    timeouts: Timeouts,
    last_record: Option<DeliveryRecord>,
    last_skip: Option<SkipReason>,
    attempts: u32,
    successes: u32,
}

impl<T: HttpTransport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeouts: Timeouts::default(),
            last_record: None,
            last_skip: None,
            attempts: 0,
            successes: 0,
        }
    }

    /// Attempt one delivery. Returns the HTTP status on a 2xx answer.
    pub fn dispatch(
        &mut self,
        input: &DispatchInput<'_>,
        mode: DispatchMode,
    ) -> Result<u16, DeliveryError> {
        if let Err(reason) = check_preconditions(input, mode) {
            debug!("Delivery skipped: {}", reason);
            self.last_skip = Some(reason);
            return Err(DeliveryError::Skipped(reason));
        }
        self.last_skip = None;

        let Some(snapshot) = input.snapshot else {
            return Err(DeliveryError::Skipped(SkipReason::InvalidData));
        };
        let body = Payload::new(
            DEVICE_ID,
            input.mac,
            input.timestamp,
            input.peripheral_connected,
            snapshot,
        )
        .to_json()?;

        self.attempts += 1;
        let url = &input.config.delivery_url;
        let result = self.transport.post_json(url, &body, self.timeouts);

        let (record, outcome) = match result {
            Ok(response) => {
                let success = response.is_success();
                let record = DeliveryRecord {
                    at: input.now,
                    timestamp: input.timestamp.to_string(),
                    outcome: DeliveryOutcome::Status {
                        code: response.status,
                    },
                    excerpt: excerpt(&response.body),
                    success,
                };
                let outcome = if success {
                    self.successes += 1;
                    info!("Delivered to {}: HTTP {}", url, response.status);
                    Ok(response.status)
                } else {
                    warn!("Delivery to {} rejected: HTTP {}", url, response.status);
                    Err(DeliveryError::Http {
                        status: response.status,
                    })
                };
                (record, outcome)
            }
            Err(reason) => {
                warn!("Delivery to {} failed: {}", url, reason);
                let record = DeliveryRecord {
                    at: input.now,
                    timestamp: input.timestamp.to_string(),
                    outcome: DeliveryOutcome::Failed {
                        reason: reason.clone(),
                    },
                    excerpt: String::new(),
                    success: false,
                };
                (record, Err(DeliveryError::Transport(reason)))
            }
        };
        self.last_record = Some(record);
        outcome
    }

    pub fn last_record(&self) -> Option<&DeliveryRecord> {
        self.last_record.as_ref()
    }

    /// Reason the most recent dispatch was skipped, cleared by a real attempt.
    pub fn last_skip(&self) -> Option<SkipReason> {
        self.last_skip
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn excerpt(body: &str) -> String {
    body.trim().chars().take(EXCERPT_LEN).collect()
}
