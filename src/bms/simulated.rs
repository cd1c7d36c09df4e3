//! Simulated battery management unit for host builds.
//!
//! Behaves like a real unit closely enough to exercise the peripheral state
//! machine and the validity gate: the first poll after each connect returns a
//! zeroed frame, later polls a slowly discharging 8-cell LiFePO4 pack.

use super::{frame, BmsClient, BmsError, ReadingSnapshot};
use crate::config::PeripheralAddress;
use log::info;

const CELLS: usize = 8;

/// Host stand-in for the BLE client.
#[derive(Debug, Default)]
pub struct SimulatedBms {
    connected: bool,
    polls_since_connect: u32,
    total_polls: u32,
}

impl SimulatedBms {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&self) -> Vec<u8> {
        let mut f = vec![0u8; frame::FRAME_LEN];
        let step = self.total_polls;

        // Drift between 85% and 40% state of charge
        let soc = 85 - (step % 46) as u16;
        let cell_mv: Vec<u16> = (0..CELLS)
            .map(|i| 3_200 + soc + (i as u16 * 3) % 7)
            .collect();
        let pack_mv: u32 = cell_mv.iter().map(|&mv| mv as u32).sum();

        f[8..12].copy_from_slice(&pack_mv.to_le_bytes());
        f[12..16].copy_from_slice(&pack_mv.to_le_bytes());
        for (i, mv) in cell_mv.iter().enumerate() {
            f[16 + i * 2..18 + i * 2].copy_from_slice(&mv.to_le_bytes());
        }
        f[48..52].copy_from_slice(&(-4_200i32).to_le_bytes());
        f[52..54].copy_from_slice(&19i16.to_le_bytes());
        f[54..56].copy_from_slice(&23i16.to_le_bytes());
        f[62..64].copy_from_slice(&(soc * 100).to_le_bytes());
        f[64..66].copy_from_slice(&10_000u16.to_le_bytes());
        f[88..90].copy_from_slice(&0x0002u16.to_le_bytes());
        f[90..92].copy_from_slice(&soc.to_le_bytes());
        f[92..96].copy_from_slice(&100u32.to_le_bytes());
        f[96..100].copy_from_slice(&17u32.to_le_bytes());
        f[100..104].copy_from_slice(&(1_700_000u32 + step * 10).to_le_bytes());
        f
    }
}

impl BmsClient for SimulatedBms {
    fn connect(&mut self, address: &PeripheralAddress) -> Result<(), BmsError> {
        info!("Simulated BMS connected at {}", address);
        self.connected = true;
        self.polls_since_connect = 0;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) -> Result<ReadingSnapshot, BmsError> {
        if !self.connected {
            return Err(BmsError::NotConnected);
        }
        self.polls_since_connect += 1;
        if self.polls_since_connect == 1 {
            return frame::decode(&[0u8; frame::FRAME_LEN]);
        }
        self.total_polls += 1;
        frame::decode(&self.frame())
    }
}
