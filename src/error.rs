//! # Error Types
//!
//! This module defines error types used throughout the candela library.
//!
//! The taxonomy is deliberately small:
//!
//! - [`CandelaError::Decode`]: the source image could not be interpreted as
//!   a bitmap (corrupt data, zero dimensions). Raster encoding aborts with
//!   no partial output.
//! - [`CandelaError::NotConnected`]: a write was attempted on a printer
//!   that is not in the Connected state. No transport write is issued.
//! - [`CandelaError::Transport`]: a connect/write/disconnect failure
//!   surfaced from the USB or BLE transport.
//!
//! There are no internal retries; retrying a partially-sent raster job is
//! unsafe without resetting the printer buffer, so retry policy belongs to
//! the caller.

use thiserror::Error;

/// Main error type for candela operations
#[derive(Debug, Error)]
pub enum CandelaError {
    /// Source image could not be decoded as a valid bitmap
    #[error("Decode error: {0}")]
    Decode(String),

    /// Write attempted on a printer that is not connected
    #[error("Printer not connected: {0}")]
    NotConnected(String),

    /// Transport-level errors (connection, discovery, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for CandelaError {
    fn from(err: image::ImageError) -> Self {
        CandelaError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for CandelaError {
    fn from(err: serde_json::Error) -> Self {
        CandelaError::Io(std::io::Error::other(err))
    }
}
