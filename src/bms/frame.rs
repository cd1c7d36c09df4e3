//! LiTime BMS status frame decoding.
//!
//! The unit answers a status query with a single little-endian frame
//! (delivered over one or more BLE notifications). Offsets below are byte
//! positions within the reassembled frame.
//!
//! ```text
//! off  size  field
//!   8   u32  pack voltage (mV)
//!  12   u32  cell voltage sum (mV)
//!  16  16xu16 cell voltages (mV, 0 = no cell)
//!  48   i32  current (mA)
//!  52   i16  cell temperature (°C)
//!  54   i16  MOSFET temperature (°C)
//!  62   u16  remaining capacity (cAh)
//!  64   u16  full capacity (cAh)
//!  68   u32  heat state
//!  76   u32  protection state
//!  80   u32  failure state
//!  84   u32  balancing state
//!  88   u16  battery state
//!  90   u16  state of charge (%)
//!  92   u32  state of health (%)
//!  96   u32  discharge cycles
//! 100   u32  discharged capacity (mAh)
//! ```

use super::{BmsError, ReadingSnapshot};

/// Status query written to the unit's command characteristic.
pub const STATUS_REQUEST: [u8; 8] = [0x00, 0x00, 0x04, 0x01, 0x13, 0x55, 0xAA, 0x17];

/// Length of a complete status frame.
pub const FRAME_LEN: usize = 105;

/// Maximum number of cell slots in a frame.
pub const MAX_CELLS: usize = 16;

const CELLS_OFFSET: usize = 16;

fn u16_at(frame: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([frame[off], frame[off + 1]])
}

fn i16_at(frame: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([frame[off], frame[off + 1]])
}

fn u32_at(frame: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([frame[off], frame[off + 1], frame[off + 2], frame[off + 3]])
}

fn i32_at(frame: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([frame[off], frame[off + 1], frame[off + 2], frame[off + 3]])
}

/// Decode a complete status frame.
pub fn decode(frame: &[u8]) -> Result<ReadingSnapshot, BmsError> {
    if frame.len() < FRAME_LEN {
        return Err(BmsError::InvalidFrame(format!(
            "short frame: {} bytes (need {})",
            frame.len(),
            FRAME_LEN
        )));
    }

    let cell_voltages = (0..MAX_CELLS)
        .map(|i| u16_at(frame, CELLS_OFFSET + i * 2))
        .filter(|&mv| mv > 0)
        .map(|mv| mv as f32 / 1000.0)
        .collect();

    let balancing = u32_at(frame, 84);

    Ok(ReadingSnapshot {
        total_voltage: u32_at(frame, 8) as f32 / 1000.0,
        cell_voltage_sum: u32_at(frame, 12) as f32 / 1000.0,
        current: i32_at(frame, 48) as f32 / 1000.0,
        cell_temp: i16_at(frame, 52),
        mosfet_temp: i16_at(frame, 54),
        remaining_ah: u16_at(frame, 62) as f32 / 100.0,
        full_capacity_ah: u16_at(frame, 64) as f32 / 100.0,
        heat_state: heat_state(u32_at(frame, 68)),
        protection_state: protection_state(u32_at(frame, 76)),
        failure_state: failure_state(u32_at(frame, 80)),
        balancing_state: balancing_state(balancing),
        balance_memory: format!("{:016b}", balancing & 0xFFFF),
        battery_state: battery_state(u16_at(frame, 88)),
        soc: u16_at(frame, 90),
        soh: u32_at(frame, 92).min(u16::MAX as u32) as u16,
        discharge_cycles: u32_at(frame, 96),
        discharged_ah: u32_at(frame, 100) as f32 / 1000.0,
        cell_voltages,
    })
}

fn battery_state(raw: u16) -> String {
    match raw {
        0x0000 => "Idle".to_string(),
        0x0001 => "Charging".to_string(),
        0x0002 => "Discharging".to_string(),
        0x0004 => "Protected".to_string(),
        0x0008 => "Charging limited".to_string(),
        other => format!("Unknown (0x{:04X})", other),
    }
}

const PROTECTION_FLAGS: &[(u32, &str)] = &[
    (0x0000_0004, "cell overvoltage"),
    (0x0000_0020, "cell undervoltage"),
    (0x0000_0040, "charge overcurrent"),
    (0x0000_0080, "discharge overcurrent"),
    (0x0000_0100, "charge overtemperature"),
    (0x0000_0200, "discharge overtemperature"),
    (0x0000_0400, "charge undertemperature"),
    (0x0000_0800, "discharge undertemperature"),
    (0x0000_4000, "short circuit"),
];

const FAILURE_FLAGS: &[(u32, &str)] = &[
    (0x0000_0001, "cell failure"),
    (0x0000_0002, "charge MOSFET failure"),
    (0x0000_0004, "discharge MOSFET failure"),
    (0x0000_0008, "temperature sensor failure"),
];

/// Render a flag word as a comma-separated list, `ok` when clear.
fn describe_flags(raw: u32, flags: &[(u32, &str)], ok: &str) -> String {
    if raw == 0 {
        return ok.to_string();
    }
    let mut names: Vec<String> = flags
        .iter()
        .filter(|(mask, _)| raw & mask != 0)
        .map(|(_, name)| name.to_string())
        .collect();
    let known = flags.iter().fold(0, |acc, (mask, _)| acc | mask);
    if raw & !known != 0 {
        names.push(format!("0x{:08X}", raw & !known));
    }
    names.join(", ")
}

fn protection_state(raw: u32) -> String {
    describe_flags(raw, PROTECTION_FLAGS, "Normal")
}

fn failure_state(raw: u32) -> String {
    describe_flags(raw, FAILURE_FLAGS, "Normal")
}

fn heat_state(raw: u32) -> String {
    if raw & 0x0000_0080 != 0 {
        "Heating".to_string()
    } else {
        "Off".to_string()
    }
}

fn balancing_state(raw: u32) -> String {
    let cells = (raw & 0xFFFF).count_ones();
    if cells == 0 {
        "Inactive".to_string()
    } else {
        format!("Active ({} cells)", cells)
    }
}
