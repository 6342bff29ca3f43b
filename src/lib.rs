//! # Candela - Thermal Printer Job Pipeline
//!
//! Candela is a Rust library for driving thermal receipt printers over USB
//! and Bluetooth Low Energy. It converts print jobs (raw byte streams or
//! decoded bitmaps) into device-ready ESC/POS command sequences and
//! chunked transport writes. It provides:
//!
//! - **Protocol implementation**: ESC/POS command builders
//! - **Raster encoding**: grayscale bitmaps to `GS v 0` bit images,
//!   honoring hardware byte alignment
//! - **Chunk planning**: vertical image banding and transmission chunking
//! - **Connection management**: USB/BLE discovery, per-printer state
//!   machine, ordered chunked writes
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use candela::{
//!     job::{self, PrintOptions, RenderOptions},
//!     manager::ConnectionManager,
//!     raster::RasterImage,
//!     transport::{BleTransport, ConnectionType, Transport, UsbTransport},
//! };
//!
//! # async fn example() -> Result<(), candela::error::CandelaError> {
//! // Construct a manager over the transports available on this host
//! let manager = ConnectionManager::new([
//!     Arc::new(UsbTransport::new()?) as Arc<dyn Transport>,
//!     Arc::new(BleTransport::new().await?) as Arc<dyn Transport>,
//! ]);
//!
//! // Discover printers for a few seconds
//! let printers = manager
//!     .get_printers(
//!         Duration::from_secs(4),
//!         &[ConnectionType::Usb, ConnectionType::Ble],
//!         false,
//!     )
//!     .await?;
//!
//! // Connect and print a decoded bitmap with a trailing cut
//! let target = &printers[0].address;
//! manager.connect(target).await?;
//!
//! let image = RasterImage::decode(&std::fs::read("receipt.png")?)?;
//! let options = PrintOptions {
//!     render: RenderOptions { cut_after_printed: true, ..Default::default() },
//!     ..Default::default()
//! };
//! job::print_rendered(&manager, target, &image, &options).await?;
//!
//! manager.disconnect(target).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | ESC/POS command builders |
//! | [`raster`] | Bitmap type, alignment policy, raster encoder |
//! | [`chunk`] | Band and transmission chunk planning |
//! | [`transport`] | USB and BLE communication backends |
//! | [`manager`] | Printer registry and connection state machine |
//! | [`job`] | Render + print orchestration |
//! | [`printer`] | Capability profiles |
//! | [`error`] | Error types |

pub mod chunk;
pub mod error;
pub mod job;
pub mod manager;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod transport;

// Re-exports for convenience
pub use error::CandelaError;
pub use job::{print_rendered, render_to_raster};
pub use manager::{ConnectionManager, ConnectionState, Printer};
pub use printer::{CapabilityProfile, PaperWidth};
pub use raster::RasterImage;
pub use transport::{ConnectionType, Transport};
