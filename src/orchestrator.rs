//! The main loop.
//!
//! Each iteration services pending UI requests, then runs the device's
//! background work in fixed order, then yields briefly. Only this loop
//! mutates the [`Device`].

use crate::clock::Clock;
use crate::device::{Device, RestartReason};
use crate::platform::Platform;
use log::{info, warn};
use std::time::Duration;

/// Yield between loop iterations.
pub const IDLE_YIELD: Duration = Duration::from_millis(10);

/// Something that feeds UI requests into the loop.
pub trait RequestSource<P: Platform> {
    /// Handle whatever is pending without blocking.
    fn service(&mut self, device: &mut Device<P>, clock: &dyn Clock);
}

/// No UI at all.
impl<P: Platform> RequestSource<P> for () {
    fn service(&mut self, _device: &mut Device<P>, _clock: &dyn Clock) {}
}

/// One loop iteration. Returns the restart reason if one is pending.
pub fn run_once<P, R>(
    device: &mut Device<P>,
    requests: &mut R,
    clock: &dyn Clock,
) -> Option<RestartReason>
where
    P: Platform,
    R: RequestSource<P>,
{
    requests.service(device, clock);
    if let Some(reason) = device.restart_requested() {
        return Some(reason);
    }
    device.tick(clock.now());
    device.restart_requested()
}

/// Run until a restart is requested.
pub fn run<P, R>(device: &mut Device<P>, requests: &mut R, clock: &dyn Clock) -> RestartReason
where
    P: Platform,
    R: RequestSource<P>,
{
    info!("Entering main loop");
    loop {
        if let Some(reason) = run_once(device, requests, clock) {
            warn!("Leaving main loop: {}", reason);
            return reason;
        }
        clock.sleep(IDLE_YIELD);
    }
}
