//! # ESC/POS Raster Graphics (GS v 0)
//!
//! Raster bit image command used to print bitmap content on thermal
//! receipt printers.
//!
//! ## Coordinate System
//!
//! ```text
//! (0,0) ──────────────────────► X (horizontal, up to profile width)
//!   │
//!   │   ████████  ← each dot is one thermal element
//!   │   ████████
//!   ▼
//!   Y (vertical, paper feed direction)
//! ```
//!
//! ## Bit Packing
//!
//! Graphics data is packed as bytes where each bit represents one dot:
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! Byte value 0xAA = 10101010 = █░█░█░█░
//! ```

use super::{GS, u16_le};

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH d1...dk)
///
/// Prints a raster image of arbitrary height. The single graphics command
/// implemented by essentially every ESC/POS receipt printer.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 m xL xH yL yH d1...dk |
/// | Decimal | 29 118 48 m xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `m`: Mode (0 = normal density)
/// - `xL, xH`: Width in **bytes**, little-endian
/// - `yL, yH`: Height in **dots**, little-endian
/// - `d1...dk`: Image data, k = width_bytes × height, row by row
///
/// ## Example
///
/// ```
/// use candela::protocol::raster;
///
/// // 576-dot wide (72 bytes), 100-row tall image
/// let data = vec![0xAA; 72 * 100];
/// let cmd = raster::bit_image(576, 100, &data);
///
/// // Header: GS v 0 0, then width bytes LE, height LE
/// assert_eq!(&cmd[0..4], &[0x1D, 0x76, 0x30, 0x00]);
/// assert_eq!(cmd[4], 72);  // xL
/// assert_eq!(cmd[5], 0);   // xH
/// assert_eq!(cmd[6], 100); // yL
/// assert_eq!(cmd[7], 0);   // yH
/// ```
///
/// ## Buffer Limits
///
/// Printers buffer the whole command before printing it. Large images
/// should be split into horizontal bands, each emitted as its own
/// `GS v 0` command (see [`crate::chunk::band_spans`]), then the combined
/// stream chunked for transmission.
pub fn bit_image(width_dots: u16, height: u16, data: &[u8]) -> Vec<u8> {
    let width_bytes = width_dots.div_ceil(8);
    let expected_len = width_bytes as usize * height as usize;

    debug_assert!(
        data.len() == expected_len,
        "Raster data length mismatch. Expected {} ({} bytes × {} rows), got {}",
        expected_len,
        width_bytes,
        height,
        data.len()
    );

    let [xl, xh] = u16_le(width_bytes);
    let [yl, yh] = u16_le(height);

    let mut cmd = Vec::with_capacity(8 + data.len());
    cmd.push(GS);
    cmd.push(b'v');
    cmd.push(b'0');
    cmd.push(0); // m = 0 (normal density)
    cmd.push(xl);
    cmd.push(xh);
    cmd.push(yl);
    cmd.push(yh);
    cmd.extend_from_slice(data);
    cmd
}

/// Header length of a `GS v 0` command (everything before the pixel data).
pub const BIT_IMAGE_HEADER_LEN: usize = 8;
