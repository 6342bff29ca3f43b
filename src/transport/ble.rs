//! # Bluetooth Low Energy Transport
//!
//! GATT communication with BLE receipt printers via `btleplug`.
//!
//! ## Device Identity
//!
//! Printers are addressed by their peripheral id as reported by the
//! platform BLE stack (a MAC address on Linux/Windows, an opaque UUID on
//! macOS). The id string is stable for the lifetime of the adapter.
//!
//! ## Write Characteristic
//!
//! Most ESC/POS BLE printers expose the de-facto standard printing service
//! `0x18F0` with write characteristic `0x2AF1`; some clones use vendor
//! characteristics such as `0xFF02`. Connection looks for the well-known
//! characteristics first and falls back to the first writable one.
//!
//! ## Chunked Writes
//!
//! BLE attribute writes are limited by the negotiated MTU. The default
//! chunk size is 512 bytes (the ATT maximum attribute length) with a
//! pacing delay between chunks; printers with tiny buffers rely on that
//! pacing when writing without response.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::error::CandelaError;

use super::{ConnectionType, DiscoveredPrinter, ScanOptions, Transport};

/// De-facto standard BLE printing write characteristic (service 0x18F0)
const WRITE_CHAR_STANDARD: Uuid = uuid_from_u16(0x2AF1);

/// Vendor write characteristic used by several printer clones
const WRITE_CHAR_VENDOR: Uuid = uuid_from_u16(0xFF02);

/// Default chunk size for writes (ATT maximum attribute length)
const CHUNK_SIZE: usize = 512;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 20;

/// An open printer: connected peripheral plus its write characteristic.
struct OpenPrinter {
    peripheral: Peripheral,
    write_char: Characteristic,
    write_type: WriteType,
}

/// # BLE Printer Transport
///
/// Owns one platform adapter and the set of currently connected
/// peripherals.
pub struct BleTransport {
    adapter: Adapter,
    open: Mutex<HashMap<String, OpenPrinter>>,
}

impl BleTransport {
    /// Create a transport over the first available Bluetooth adapter.
    pub async fn new() -> Result<Self, CandelaError> {
        let manager = Manager::new()
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE manager init failed: {}", e)))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE adapter list failed: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| CandelaError::Transport("No Bluetooth adapter present".to_string()))?;
        Ok(Self {
            adapter,
            open: Mutex::new(HashMap::new()),
        })
    }

    /// Find a known peripheral by its id string.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, CandelaError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE peripheral list failed: {}", e)))?;
        peripherals
            .into_iter()
            .find(|p| p.id().to_string() == address)
            .ok_or_else(|| CandelaError::Transport(format!("No BLE peripheral {}", address)))
    }

    /// Pick the write characteristic: well-known printer characteristics
    /// first, then any writable one.
    fn pick_write_char(peripheral: &Peripheral) -> Option<Characteristic> {
        let chars = peripheral.characteristics();
        for uuid in [WRITE_CHAR_STANDARD, WRITE_CHAR_VENDOR] {
            if let Some(c) = chars.iter().find(|c| c.uuid == uuid) {
                return Some(c.clone());
            }
        }
        chars
            .iter()
            .find(|c| {
                c.properties
                    .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
            })
            .cloned()
    }

    async fn report(
        &self,
        id: &btleplug::platform::PeripheralId,
        found: &mpsc::Sender<DiscoveredPrinter>,
    ) -> bool {
        let Ok(peripheral) = self.adapter.peripheral(id).await else {
            return true;
        };
        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);
        found
            .send(DiscoveredPrinter {
                address: id.to_string(),
                name,
                connection_type: ConnectionType::Ble,
            })
            .await
            .is_ok()
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Ble
    }

    fn default_chunk_size(&self) -> usize {
        CHUNK_SIZE
    }

    fn chunk_delay(&self) -> Duration {
        Duration::from_millis(CHUNK_DELAY_MS)
    }

    async fn scan(
        &self,
        options: &ScanOptions,
        found: &mpsc::Sender<DiscoveredPrinter>,
    ) -> Result<(), CandelaError> {
        // Platform capability negotiation: Android refuses BLE scans
        // without the fine-location permission.
        if cfg!(target_os = "android") && !options.android_uses_fine_location {
            return Err(CandelaError::Transport(
                "BLE scan requires the fine-location permission".to_string(),
            ));
        }

        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE event stream failed: {}", e)))?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE scan start failed: {}", e)))?;
        debug!("BLE scan started for {:?}", options.duration);

        let deadline = tokio::time::sleep(options.duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = found.closed() => break,
                event = events.next() => match event {
                    Some(CentralEvent::DeviceDiscovered(id))
                    | Some(CentralEvent::DeviceUpdated(id)) => {
                        if !self.report(&id, found).await {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        self.adapter.stop_scan().await.ok();
        debug!("BLE scan finished");
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<(), CandelaError> {
        if self.open.lock().await.contains_key(address) {
            return Ok(());
        }

        let peripheral = self.find_peripheral(address).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE connect failed: {}", e)))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE service discovery failed: {}", e)))?;

        let write_char = Self::pick_write_char(&peripheral).ok_or_else(|| {
            CandelaError::Transport(format!("{} exposes no writable characteristic", address))
        })?;

        // Prefer acknowledged writes; fall back to write-without-response
        // for printers that only support that.
        let write_type = if write_char.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        info!(
            "BLE printer connected at {} (char {}, {:?})",
            address, write_char.uuid, write_type
        );
        self.open.lock().await.insert(
            address.to_string(),
            OpenPrinter {
                peripheral,
                write_char,
                write_type,
            },
        );
        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<(), CandelaError> {
        let removed = self.open.lock().await.remove(address);
        if let Some(printer) = removed {
            printer.peripheral.disconnect().await.ok();
            debug!("BLE printer at {} disconnected", address);
        }
        Ok(())
    }

    async fn write(&self, address: &str, bytes: &[u8]) -> Result<(), CandelaError> {
        // Snapshot the target so the lock is not held across the GATT
        // write — independent printers write concurrently.
        let (peripheral, write_char, write_type) = {
            let open = self.open.lock().await;
            let printer = open
                .get(address)
                .ok_or_else(|| CandelaError::Transport(format!("{} is not open", address)))?;
            (
                printer.peripheral.clone(),
                printer.write_char.clone(),
                printer.write_type,
            )
        };
        peripheral
            .write(&write_char, bytes, write_type)
            .await
            .map_err(|e| CandelaError::Transport(format!("BLE write failed: {}", e)))
    }

    async fn radio_on(&self) -> bool {
        matches!(
            self.adapter.adapter_state().await,
            Ok(CentralState::PoweredOn)
        )
    }

    async fn request_radio_on(&self) -> Result<(), CandelaError> {
        // No cross-platform API to flip the radio; surface the request in
        // the log so the operator can act on it. Fire-and-forget.
        warn!("Bluetooth radio enable requested; enable it in the platform settings");
        Ok(())
    }
}
