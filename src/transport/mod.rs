//! # Printer Transport Layer
//!
//! This module provides communication backends for sending data to printers.
//!
//! ## Available Transports
//!
//! - [`usb`]: USB bulk transfer via `rusb`
//! - [`ble`]: Bluetooth Low Energy GATT writes via `btleplug`
//!
//! ## The Transport Seam
//!
//! The connection manager and job pipeline only ever see the [`Transport`]
//! trait. All operations are opaque async calls that suspend the caller
//! until the underlying stack reports completion; no operation carries its
//! own timeout beyond what the platform stack imposes. A hung write blocks
//! the job — that is a documented limitation, not something the pipeline
//! retries around.
//!
//! Tests inject fake implementations; nothing in the core depends on real
//! hardware being present.

pub mod ble;
pub mod usb;

pub use ble::BleTransport;
pub use usb::UsbTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::CandelaError;

/// Physical connection type of a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Usb,
    Ble,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usb => write!(f, "usb"),
            Self::Ble => write!(f, "ble"),
        }
    }
}

/// Options for a discovery scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long the scan runs before completing on its own.
    pub duration: Duration,

    /// Whether the app holds the fine-location permission (relevant only
    /// for BLE scanning on Android). Without it, the BLE scan fails
    /// distinctly or proceeds with reduced discovery scope — a platform
    /// capability negotiation, not a protocol rule.
    pub android_uses_fine_location: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(4),
            android_uses_fine_location: false,
        }
    }
}

/// A printer found during discovery, before it enters the registry.
#[derive(Debug, Clone)]
pub struct DiscoveredPrinter {
    /// Transport-stable identity (USB bus address, BLE peripheral id)
    pub address: String,
    /// Advertised or descriptor name, when the device reports one
    pub name: Option<String>,
    pub connection_type: ConnectionType,
}

/// # Printer Transport
///
/// One implementation per connection type. Write ordering is the caller's
/// contract: `write` must not be invoked concurrently for one address
/// (the connection manager serializes per printer).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connection type this transport serves.
    fn connection_type(&self) -> ConnectionType;

    /// Default transmission chunk size for this transport, used when the
    /// caller does not override it.
    fn default_chunk_size(&self) -> usize;

    /// Pacing delay between transmission chunks. Gives the device time to
    /// drain its receive buffer; zero disables pacing.
    fn chunk_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Whether this transport can accept a whole image as one raster block,
    /// relying on transmission chunking alone (large native receive
    /// buffer). When false, jobs band the image first.
    fn supports_large_single_block(&self) -> bool {
        false
    }

    /// Run a discovery scan, reporting printers through `found` as they
    /// appear. Returns when the scan duration elapses or the receiver is
    /// dropped (early stop). Duplicate reports for one address are allowed.
    async fn scan(
        &self,
        options: &ScanOptions,
        found: &mpsc::Sender<DiscoveredPrinter>,
    ) -> Result<(), CandelaError>;

    /// Open a connection to the printer at `address`.
    async fn connect(&self, address: &str) -> Result<(), CandelaError>;

    /// Close the connection. Idempotent: unknown addresses are a no-op.
    async fn disconnect(&self, address: &str) -> Result<(), CandelaError>;

    /// Write one chunk, suspending until the transport confirms it.
    async fn write(&self, address: &str, bytes: &[u8]) -> Result<(), CandelaError>;

    /// Whether the transport's radio is usable right now. USB has no radio
    /// and always reports true.
    async fn radio_on(&self) -> bool {
        true
    }

    /// Request the platform radio be enabled. Fire-and-forget: completion
    /// of this call does not mean the radio is on.
    async fn request_radio_on(&self) -> Result<(), CandelaError> {
        Ok(())
    }
}
