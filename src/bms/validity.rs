//! Plausibility gate for battery readings.
//!
//! Right after a (re)connection the unit can report zeroed or garbage frames.
//! Readings that fail [`check`] must not reach the UI or the webhook. The
//! [`ValidityTracker`] logs each flip of the derived flag exactly once.

use super::ReadingSnapshot;
use log::{info, warn};
use std::fmt;
use std::ops::RangeInclusive;

/// Plausible pack voltage range (V).
pub const PACK_VOLTAGE_RANGE: RangeInclusive<f32> = 10.0..=60.0;

/// Plausible single-cell voltage range (V).
pub const CELL_VOLTAGE_RANGE: RangeInclusive<f32> = 2.0..=4.0;

/// Highest plausible state of charge (%).
pub const MAX_SOC: u16 = 100;

/// The first rule a reading violated.
#[derive(Debug, Clone, PartialEq)]
pub enum Implausible {
    PackVoltage(f32),
    StateOfCharge(u16),
    NoCells,
    CellVoltage { index: usize, volts: f32 },
}

impl fmt::Display for Implausible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackVoltage(v) => write!(f, "pack voltage {:.2} V out of range", v),
            Self::StateOfCharge(soc) => write!(f, "state of charge {}% out of range", soc),
            Self::NoCells => write!(f, "no cell voltages reported"),
            Self::CellVoltage { index, volts } => {
                write!(f, "cell {} voltage {:.3} V out of range", index + 1, volts)
            }
        }
    }
}

/// Check every plausibility rule. Pure.
pub fn check(snapshot: &ReadingSnapshot) -> Result<(), Implausible> {
    // `contains` is false for NaN, so NaN readings are rejected too
    if !PACK_VOLTAGE_RANGE.contains(&snapshot.total_voltage) {
        return Err(Implausible::PackVoltage(snapshot.total_voltage));
    }
    if snapshot.soc > MAX_SOC {
        return Err(Implausible::StateOfCharge(snapshot.soc));
    }
    if snapshot.cell_voltages.is_empty() {
        return Err(Implausible::NoCells);
    }
    if let Some((index, &volts)) = snapshot
        .cell_voltages
        .iter()
        .enumerate()
        .find(|(_, v)| !CELL_VOLTAGE_RANGE.contains(*v))
    {
        return Err(Implausible::CellVoltage { index, volts });
    }
    Ok(())
}

/// `true` if the reading is plausible.
pub fn classify(snapshot: &ReadingSnapshot) -> bool {
    check(snapshot).is_ok()
}

/// A change of the validity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BecameValid,
    BecameInvalid,
}

/// Derived validity flag with edge-triggered reporting.
///
/// Starts invalid: nothing has been read yet.
#[derive(Debug, Default)]
pub struct ValidityTracker {
    valid: bool,
}

impl ValidityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Classify a fresh reading and report a transition if the flag flipped.
    pub fn update(&mut self, snapshot: &ReadingSnapshot) -> Option<Transition> {
        let verdict = check(snapshot);
        let now_valid = verdict.is_ok();
        if now_valid == self.valid {
            return None;
        }
        self.valid = now_valid;

        match verdict {
            Ok(()) => {
                info!("Battery data valid again");
                Some(Transition::BecameValid)
            }
            Err(reason) => {
                warn!("Battery data invalid: {}", reason);
                Some(Transition::BecameInvalid)
            }
        }
    }

    /// Drop back to invalid without reporting (e.g. peripheral disabled).
    pub fn clear(&mut self) {
        self.valid = false;
    }
}
