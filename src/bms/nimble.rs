//! BLE client for the LiTime BMS (ESP32 only).
//!
//! ```text
//! Service FFE0
//! ├── FFE1 (Notify) - status frame, split over several notifications
//! └── FFE2 (Write)  - command channel
//! ```

use super::{frame, BmsClient, BmsError, ReadingSnapshot};
use crate::config::PeripheralAddress;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{BLEAddress, BLEAddressType, BLEClient, BLEDevice, BLEError};
use esp_idf_svc::hal::task::block_on;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SERVICE_UUID: BleUuid = BleUuid::from_uuid16(0xFFE0);
const NOTIFY_UUID: BleUuid = BleUuid::from_uuid16(0xFFE1);
const WRITE_UUID: BleUuid = BleUuid::from_uuid16(0xFFE2);

/// How long to wait for a complete frame after the status request.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

impl From<BLEError> for BmsError {
    fn from(e: BLEError) -> Self {
        BmsError::Ble(format!("{:?}", e))
    }
}

/// BLE central talking to one battery unit.
pub struct NimbleBmsClient {
    client: BLEClient,
    rx: Arc<Mutex<Vec<u8>>>,
    subscribed: bool,
}

impl NimbleBmsClient {
    /// Initialise the NimBLE stack and create an idle client.
    pub fn new() -> Self {
        // Brings the stack up on first use
        let _ = BLEDevice::take();
        Self {
            client: BLEClient::new(),
            rx: Arc::new(Mutex::new(Vec::with_capacity(frame::FRAME_LEN))),
            subscribed: false,
        }
    }

    fn subscribe(&mut self) -> Result<(), BmsError> {
        let rx = self.rx.clone();
        let client = &mut self.client;
        block_on(async {
            let service = client.get_service(SERVICE_UUID).await?;
            let notify = service.get_characteristic(NOTIFY_UUID).await?;
            notify.on_notify(move |data| {
                if let Ok(mut buf) = rx.lock() {
                    buf.extend_from_slice(data);
                }
            });
            notify.subscribe_notify(false).await?;
            Ok::<(), BLEError>(())
        })?;
        self.subscribed = true;
        Ok(())
    }

    fn take_frame(&self) -> Option<Vec<u8>> {
        let mut buf = self.rx.lock().ok()?;
        if buf.len() >= frame::FRAME_LEN {
            Some(std::mem::take(&mut *buf))
        } else {
            None
        }
    }
}

impl Default for NimbleBmsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BmsClient for NimbleBmsClient {
    fn connect(&mut self, address: &PeripheralAddress) -> Result<(), BmsError> {
        let addr = BLEAddress::from_str(address.as_str(), BLEAddressType::Public)
            .ok_or_else(|| BmsError::ConnectFailed(format!("bad address {}", address)))?;

        info!("Connecting to BMS at {}", address);
        let client = &mut self.client;
        block_on(client.connect(&addr))
            .map_err(|e| BmsError::ConnectFailed(format!("{:?}", e)))?;

        self.subscribed = false;
        if let Err(e) = self.subscribe() {
            warn!("BMS service discovery failed: {}", e);
            self.disconnect();
            return Err(e);
        }
        info!("BMS connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.client.connected() {
            if let Err(e) = self.client.disconnect() {
                debug!("BMS disconnect: {:?}", e);
            }
        }
        self.subscribed = false;
    }

    fn is_connected(&self) -> bool {
        self.client.connected() && self.subscribed
    }

    fn poll(&mut self) -> Result<ReadingSnapshot, BmsError> {
        if !self.is_connected() {
            return Err(BmsError::NotConnected);
        }

        if let Ok(mut buf) = self.rx.lock() {
            buf.clear();
        }

        let client = &mut self.client;
        block_on(async {
            let service = client.get_service(SERVICE_UUID).await?;
            let write = service.get_characteristic(WRITE_UUID).await?;
            write.write_value(&frame::STATUS_REQUEST, false).await?;
            Ok::<(), BLEError>(())
        })?;

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            if let Some(raw) = self.take_frame() {
                return frame::decode(&raw);
            }
            if Instant::now() >= deadline {
                return Err(BmsError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
