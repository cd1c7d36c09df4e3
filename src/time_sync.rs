//! Wall-clock time keeping.
//!
//! Time comes from SNTP once the station link is up. The loop triggers a
//! re-sync every hour and immediately after a time zone change; completion is
//! asynchronous and picked up by [`TimeSync::poll`].

use chrono::Local;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Interval between SNTP re-syncs.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Display format for local time.
pub const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The SNTP client could not be started.
    Sntp(String),
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sntp(msg) => write!(f, "SNTP error: {}", msg),
        }
    }
}

impl std::error::Error for TimeError {}

/// Source of wall-clock synchronisation.
pub trait TimeSource {
    /// Apply `timezone` (POSIX TZ string) and start a synchronisation.
    fn start_sync(&mut self, timezone: &str) -> Result<(), TimeError>;

    /// Whether the last started synchronisation completed.
    fn is_synced(&self) -> bool;
}

/// Set the process time zone used by local time formatting.
#[cfg(feature = "esp32")]
pub fn apply_timezone(timezone: &str) {
    std::env::set_var("TZ", timezone);
    // SAFETY: tzset only re-reads the TZ environment variable
    unsafe { esp_idf_sys::tzset() }
}

/// The host keeps the operating system's zone. The process environment is
/// shared with other threads and is left untouched.
#[cfg(not(feature = "esp32"))]
pub fn apply_timezone(timezone: &str) {
    debug!("Host keeps the system time zone (requested {})", timezone);
}

/// Current local time in [`TIME_FORMAT`].
pub fn local_time_string() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Tracks synchronisation state on top of a [`TimeSource`].
pub struct TimeSync<S: TimeSource> {
    source: S,
    timezone: String,
    pending: bool,
    synced: bool,
    last_sync: Option<String>,
}

impl<S: TimeSource> TimeSync<S> {
    pub fn new(source: S, timezone: &str) -> Self {
        apply_timezone(timezone);
        Self {
            source,
            timezone: timezone.to_string(),
            pending: false,
            synced: false,
            last_sync: None,
        }
    }

    /// Start a synchronisation with the current time zone.
    pub fn sync(&mut self) {
        info!("Starting time sync (TZ {})", self.timezone);
        match self.source.start_sync(&self.timezone) {
            Ok(()) => self.pending = true,
            Err(e) => warn!("Time sync failed to start: {}", e),
        }
    }

    /// Record completion of a pending synchronisation. Cheap, call every loop.
    pub fn poll(&mut self) {
        if self.pending && self.source.is_synced() {
            self.pending = false;
            self.synced = true;
            let now = local_time_string();
            info!("Time synchronised: {}", now);
            self.last_sync = Some(now);
        }
    }

    /// Switch time zone. The caller triggers the re-sync.
    pub fn set_timezone(&mut self, timezone: &str) {
        self.timezone = timezone.to_string();
        apply_timezone(timezone);
        info!("Time zone set to {}", timezone);
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Whether wall-clock time has been synchronised at least once.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Local time of the last completed synchronisation.
    pub fn last_sync(&self) -> Option<&str> {
        self.last_sync.as_deref()
    }

    /// Current local time, `None` before the first synchronisation.
    pub fn local_time(&self) -> Option<String> {
        self.synced.then(local_time_string)
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Host time source: the OS clock is already synchronised.
#[cfg(not(feature = "esp32"))]
#[derive(Debug, Default)]
pub struct SystemTimeSource;

#[cfg(not(feature = "esp32"))]
impl TimeSource for SystemTimeSource {
    fn start_sync(&mut self, timezone: &str) -> Result<(), TimeError> {
        apply_timezone(timezone);
        Ok(())
    }

    fn is_synced(&self) -> bool {
        true
    }
}

/// SNTP client from ESP-IDF. Recreated on each sync to force a fresh query.
#[cfg(feature = "esp32")]
#[derive(Default)]
pub struct SntpTimeSource {
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
}

#[cfg(feature = "esp32")]
impl TimeSource for SntpTimeSource {
    fn start_sync(&mut self, timezone: &str) -> Result<(), TimeError> {
        apply_timezone(timezone);
        self.sntp = None;
        let sntp = esp_idf_svc::sntp::EspSntp::new_default()
            .map_err(|e| TimeError::Sntp(format!("{:?}", e)))?;
        self.sntp = Some(sntp);
        Ok(())
    }

    fn is_synced(&self) -> bool {
        self.sntp.as_ref().is_some_and(|sntp| {
            sntp.get_sync_status() == esp_idf_svc::sntp::SyncStatus::Completed
        })
    }
}
