//! # USB Transport
//!
//! Bulk-transfer communication with USB receipt printers via `rusb`.
//!
//! ## Device Identity
//!
//! Printers are addressed as `usb:<bus>-<device>` using the libusb bus
//! topology. Vendor/product ids are reported in the discovered name so two
//! identical printers on different ports stay distinguishable.
//!
//! ## Discovery
//!
//! USB enumeration is instantaneous — a scan performs a single pass over
//! the device list and reports every device exposing a printer-class
//! interface (bInterfaceClass 0x07).
//!
//! ## Chunked Writes
//!
//! USB printers have comparatively large receive buffers; the default
//! chunk size is 4096 bytes with a small pacing delay. Bulk writes use an
//! unlimited timeout — the write blocks until the device accepts the data,
//! which is the transport's own flow control.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use tokio::sync::mpsc;

use crate::error::CandelaError;

use super::{ConnectionType, DiscoveredPrinter, ScanOptions, Transport};

/// USB interface class for printers
const USB_CLASS_PRINTER: u8 = 0x07;

/// Default chunk size for writes (bytes)
const CHUNK_SIZE: usize = 4096;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

/// Bulk write timeout. Zero means unlimited: the write suspends until the
/// device accepts the data, so the device's own flow control governs.
const WRITE_TIMEOUT: Duration = Duration::ZERO;

/// An open printer: claimed interface plus its bulk-out endpoint.
struct OpenPrinter {
    handle: DeviceHandle<Context>,
    endpoint_out: u8,
}

impl OpenPrinter {
    fn write_all(&self, bytes: &[u8]) -> Result<(), CandelaError> {
        let mut sent = 0;
        while sent < bytes.len() {
            let n = self
                .handle
                .write_bulk(self.endpoint_out, &bytes[sent..], WRITE_TIMEOUT)
                .map_err(|e| CandelaError::Transport(format!("Bulk write failed: {}", e)))?;
            sent += n;
        }
        Ok(())
    }
}

/// # USB Printer Transport
///
/// Owns a libusb context and the set of currently open printers. libusb
/// calls are blocking; they run on the blocking thread pool so transport
/// operations still suspend the async caller.
pub struct UsbTransport {
    context: Context,
    open: Arc<Mutex<HashMap<String, Arc<OpenPrinter>>>>,
}

impl UsbTransport {
    /// Create a transport over a fresh libusb context.
    pub fn new() -> Result<Self, CandelaError> {
        let context = Context::new()
            .map_err(|e| CandelaError::Transport(format!("libusb init failed: {}", e)))?;
        Ok(Self {
            context,
            open: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Stable address for a device: bus number + device address.
    fn address_of(device: &Device<Context>) -> String {
        format!("usb:{:03}-{:03}", device.bus_number(), device.address())
    }

    /// Find the device matching an address produced by [`Self::address_of`].
    fn find_device(&self, address: &str) -> Result<Device<Context>, CandelaError> {
        let devices = self
            .context
            .devices()
            .map_err(|e| CandelaError::Transport(format!("USB enumeration failed: {}", e)))?;
        devices
            .iter()
            .find(|d| Self::address_of(d) == address)
            .ok_or_else(|| CandelaError::Transport(format!("No USB device at {}", address)))
    }

    /// Locate the printer-class interface and its bulk-out endpoint.
    fn find_printer_endpoint(device: &Device<Context>) -> Option<(u8, u8)> {
        let config = device.active_config_descriptor().ok()?;
        for iface in config.interfaces() {
            for desc in iface.descriptors() {
                if desc.class_code() != USB_CLASS_PRINTER {
                    continue;
                }
                for endpoint in desc.endpoint_descriptors() {
                    if endpoint.direction() == Direction::Out
                        && endpoint.transfer_type() == TransferType::Bulk
                    {
                        return Some((desc.interface_number(), endpoint.address()));
                    }
                }
            }
        }
        None
    }

    /// Whether a device exposes a printer-class interface at all.
    fn is_printer(device: &Device<Context>) -> bool {
        Self::find_printer_endpoint(device).is_some()
    }

    fn describe(device: &Device<Context>) -> Option<String> {
        let desc = device.device_descriptor().ok()?;
        // Product strings need an open handle; not every device permits one
        let product = device
            .open()
            .ok()
            .and_then(|h| h.read_product_string_ascii(&desc).ok());
        Some(match product {
            Some(name) => format!("{} ({:04x}:{:04x})", name, desc.vendor_id(), desc.product_id()),
            None => format!("{:04x}:{:04x}", desc.vendor_id(), desc.product_id()),
        })
    }
}

#[async_trait]
impl Transport for UsbTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Usb
    }

    fn default_chunk_size(&self) -> usize {
        CHUNK_SIZE
    }

    fn chunk_delay(&self) -> Duration {
        Duration::from_millis(CHUNK_DELAY_MS)
    }

    fn supports_large_single_block(&self) -> bool {
        // Host-side libusb buffers the whole transfer; banding is not
        // needed for memory reasons on this path.
        true
    }

    async fn scan(
        &self,
        _options: &ScanOptions,
        found: &mpsc::Sender<DiscoveredPrinter>,
    ) -> Result<(), CandelaError> {
        let context = self.context.clone();
        let printers = tokio::task::spawn_blocking(move || -> Result<Vec<DiscoveredPrinter>, CandelaError> {
            let devices = context
                .devices()
                .map_err(|e| CandelaError::Transport(format!("USB enumeration failed: {}", e)))?;

            let mut printers = Vec::new();
            for device in devices.iter() {
                if !Self::is_printer(&device) {
                    continue;
                }
                printers.push(DiscoveredPrinter {
                    address: Self::address_of(&device),
                    name: Self::describe(&device),
                    connection_type: ConnectionType::Usb,
                });
            }
            Ok(printers)
        })
        .await
        .map_err(|e| CandelaError::Transport(format!("USB scan task failed: {}", e)))??;

        debug!("USB scan found {} printer(s)", printers.len());
        for printer in printers {
            if found.send(printer).await.is_err() {
                break; // receiver dropped — scan stopped early
            }
        }
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<(), CandelaError> {
        if self.open.lock().unwrap().contains_key(address) {
            return Ok(());
        }

        let device = self.find_device(address)?;
        let address = address.to_string();
        let open = self.open.clone();

        tokio::task::spawn_blocking(move || -> Result<(), CandelaError> {
            let (iface, endpoint_out) = Self::find_printer_endpoint(&device).ok_or_else(|| {
                CandelaError::Transport(format!("{} has no printer bulk-out endpoint", address))
            })?;

            let mut handle = device
                .open()
                .map_err(|e| CandelaError::Transport(format!("USB open failed: {}", e)))?;

            // The kernel usblp driver may own the interface
            handle.set_auto_detach_kernel_driver(true).ok();
            handle
                .claim_interface(iface)
                .map_err(|e| CandelaError::Transport(format!("Claim interface failed: {}", e)))?;

            info!("USB printer connected at {}", address);
            open.lock().unwrap().insert(
                address,
                Arc::new(OpenPrinter {
                    handle,
                    endpoint_out,
                }),
            );
            Ok(())
        })
        .await
        .map_err(|e| CandelaError::Transport(format!("USB connect task failed: {}", e)))?
    }

    async fn disconnect(&self, address: &str) -> Result<(), CandelaError> {
        let removed = self.open.lock().unwrap().remove(address);
        if let Some(printer) = removed {
            // rusb releases claimed interfaces and closes the handle on drop
            tokio::task::spawn_blocking(move || drop(printer))
                .await
                .map_err(|e| {
                    CandelaError::Transport(format!("USB disconnect task failed: {}", e))
                })?;
            debug!("USB printer at {} disconnected", address);
        }
        Ok(())
    }

    async fn write(&self, address: &str, bytes: &[u8]) -> Result<(), CandelaError> {
        let printer = self
            .open
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| CandelaError::Transport(format!("{} is not open", address)))?;

        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || printer.write_all(&bytes))
            .await
            .map_err(|e| CandelaError::Transport(format!("USB write task failed: {}", e)))?
    }
}
