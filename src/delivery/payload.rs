//! Webhook body.
//!
//! ```json
//! {
//!   "device": "bms-monitor-esp32",
//!   "mac": "24:0A:C4:12:34:56",
//!   "timestamp": "17.10.2026 14:03:12",
//!   "connected": true,
//!   "battery": { "voltage": 26.4, "current": -12.5, "soc": 85, "soh": 100,
//!                "remaining_ah": 85.5, "full_capacity_ah": 100.0 },
//!   "temperature": { "mosfet": 23, "cells": 19 },
//!   "status": { "battery_state": "Discharging", "protection_state": "Normal",
//!               "failure_state": "Normal", "heat_state": "Off" },
//!   "cell_voltages": [3.3, 3.301, ...],
//!   "statistics": { "discharge_cycles": 17, "discharged_ah": 1700.0 }
//! }
//! ```

use crate::bms::ReadingSnapshot;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    pub device: &'a str,
    pub mac: &'a str,
    pub timestamp: &'a str,
    pub connected: bool,
    pub battery: Battery,
    pub temperature: Temperature,
    pub status: Status<'a>,
    pub cell_voltages: &'a [f32],
    pub statistics: Statistics,
}

#[derive(Debug, Serialize)]
pub struct Battery {
    pub voltage: f32,
    pub current: f32,
    pub soc: u16,
    pub soh: u16,
    pub remaining_ah: f32,
    pub full_capacity_ah: f32,
}

#[derive(Debug, Serialize)]
pub struct Temperature {
    pub mosfet: i16,
    pub cells: i16,
}

#[derive(Debug, Serialize)]
pub struct Status<'a> {
    pub battery_state: &'a str,
    pub protection_state: &'a str,
    pub failure_state: &'a str,
    pub heat_state: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub discharge_cycles: u32,
    pub discharged_ah: f32,
}

impl<'a> Payload<'a> {
    pub fn new(
        device: &'a str,
        mac: &'a str,
        timestamp: &'a str,
        connected: bool,
        snapshot: &'a ReadingSnapshot,
    ) -> Self {
        Self {
            device,
            mac,
            timestamp,
            connected,
            battery: Battery {
                voltage: snapshot.total_voltage,
                current: snapshot.current,
                soc: snapshot.soc,
                soh: snapshot.soh,
                remaining_ah: snapshot.remaining_ah,
                full_capacity_ah: snapshot.full_capacity_ah,
            },
            temperature: Temperature {
                mosfet: snapshot.mosfet_temp,
                cells: snapshot.cell_temp,
            },
            status: Status {
                battery_state: &snapshot.battery_state,
                protection_state: &snapshot.protection_state,
                failure_state: &snapshot.failure_state,
                heat_state: &snapshot.heat_state,
            },
            cell_voltages: &snapshot.cell_voltages,
            statistics: Statistics {
                discharge_cycles: snapshot.discharge_cycles,
                discharged_ah: snapshot.discharged_ah,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
