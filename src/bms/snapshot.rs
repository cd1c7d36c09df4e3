//! Battery telemetry snapshot.

use log::info;
use serde::Serialize;

/// The latest telemetry reported by the battery management unit.
///
/// Replaced wholesale on every plausible poll. `cell_voltages` mirrors
/// whatever the unit reports, in physical order, and is only empty before
/// the first plausible poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingSnapshot {
    /// Pack voltage (V).
    pub total_voltage: f32,
    /// Sum of the individual cell voltages (V).
    pub cell_voltage_sum: f32,
    /// Pack current (A), negative while discharging.
    pub current: f32,
    /// MOSFET temperature (°C).
    pub mosfet_temp: i16,
    /// Cell temperature (°C).
    pub cell_temp: i16,
    /// State of charge (%).
    pub soc: u16,
    /// State of health (%).
    pub soh: u16,
    /// Remaining capacity (Ah).
    pub remaining_ah: f32,
    /// Full charge capacity (Ah).
    pub full_capacity_ah: f32,
    pub battery_state: String,
    pub protection_state: String,
    pub failure_state: String,
    pub heat_state: String,
    pub balancing_state: String,
    pub balance_memory: String,
    /// Lifetime discharge cycles.
    pub discharge_cycles: u32,
    /// Lifetime discharged capacity (Ah).
    pub discharged_ah: f32,
    /// Per-cell voltages (V).
    pub cell_voltages: Vec<f32>,
}

impl ReadingSnapshot {
    pub fn cell_count(&self) -> usize {
        self.cell_voltages.len()
    }

    /// Spread between the highest and lowest cell (V). Zero without cells.
    pub fn cell_delta(&self) -> f32 {
        let max = self.cell_voltages.iter().copied().fold(f32::MIN, f32::max);
        let min = self.cell_voltages.iter().copied().fold(f32::MAX, f32::min);
        if self.cell_voltages.is_empty() {
            0.0
        } else {
            max - min
        }
    }

    /// Write a full human-readable summary to the log.
    pub fn log_summary(&self) {
        info!("--- Battery status ---");
        info!(
            "Voltage: {:.2} V (cells sum {:.2} V), current {:.2} A",
            self.total_voltage, self.cell_voltage_sum, self.current
        );
        info!(
            "Cells: {}, spread {:.3} V",
            self.cell_count(),
            self.cell_delta()
        );
        for (i, v) in self.cell_voltages.iter().enumerate() {
            info!("  Cell {:2}: {:.3} V", i + 1, v);
        }
        info!(
            "SOC {}%, SOH {}%, remaining {:.2} Ah of {:.2} Ah",
            self.soc, self.soh, self.remaining_ah, self.full_capacity_ah
        );
        info!(
            "Temperatures: MOSFET {} °C, cells {} °C",
            self.mosfet_temp, self.cell_temp
        );
        info!(
            "State: {} | protection: {} | failure: {} | heat: {}",
            self.battery_state, self.protection_state, self.failure_state, self.heat_state
        );
        info!(
            "Balancing: {} | balance memory: {}",
            self.balancing_state, self.balance_memory
        );
        info!(
            "Discharge cycles: {}, discharged: {:.2} Ah",
            self.discharge_cycles, self.discharged_ah
        );
    }
}
