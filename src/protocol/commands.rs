//! # ESC/POS Printer Commands
//!
//! Basic control commands: initialization, paper feed and cutter control.
//!
//! ## Reference
//!
//! Based on "ESC/POS Application Programming Guide" by Seiko Epson Corp.
//! Command support varies slightly between vendors; the subset here is the
//! common denominator implemented by effectively every receipt printer.

use super::{ESC, GS};

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on default state. Called at the start of
/// each print job to ensure consistent behavior.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
/// | Decimal | 27 64 |
///
/// ## What Gets Reset
///
/// - Print buffer is cleared
/// - Text formatting disabled
/// - Line spacing reset to default
///
/// NV graphics and configuration settings are not affected.
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Feed Paper (ESC J n)
///
/// Feeds paper forward by `n` motion units (dots on thermal mechanisms).
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC J n  |
/// | Hex     | 1B 4A n  |
/// | Decimal | 27 74 n  |
#[inline]
pub fn feed(n: u8) -> Vec<u8> {
    vec![ESC, b'J', n]
}

/// # Full Cut (GS V 0)
///
/// Performs a full cut at the current paper position without feeding.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS V 0   |
/// | Hex     | 1D 56 00 |
/// | Decimal | 29 86 0  |
///
/// May cut through printed content; use [`cut_full_feed`] to feed the last
/// printed line past the cutter first.
#[inline]
pub fn cut_full() -> Vec<u8> {
    vec![GS, b'V', 0]
}

/// # Partial Cut (GS V 1)
///
/// Performs a partial cut, leaving a small "hinge" connecting the receipt
/// to the roll so it can be torn off without falling.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS V 1   |
/// | Hex     | 1D 56 01 |
/// | Decimal | 29 86 1  |
#[inline]
pub fn cut_partial() -> Vec<u8> {
    vec![GS, b'V', 1]
}

/// # Feed to Cut Position, Then Full Cut (GS V 65 n)
///
/// Function B: feeds paper by `n` motion units past the last printed line
/// so it clears the cutter blade, then performs a full cut. This is the
/// most commonly used cut command for receipts.
///
/// ## Protocol Details
///
/// | Format  | Bytes      |
/// |---------|------------|
/// | ASCII   | GS V 65 n  |
/// | Hex     | 1D 56 41 n |
/// | Decimal | 29 86 65 n |
#[inline]
pub fn cut_full_feed() -> Vec<u8> {
    vec![GS, b'V', 65, 0]
}

/// # Feed to Cut Position, Then Partial Cut (GS V 66 n)
///
/// Same as [`cut_full_feed`] but leaves a small uncut portion.
#[inline]
pub fn cut_partial_feed() -> Vec<u8> {
    vec![GS, b'V', 66, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(init(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_feed() {
        assert_eq!(feed(64), vec![0x1B, 0x4A, 64]);
    }

    #[test]
    fn test_cut_commands() {
        assert_eq!(cut_full(), vec![0x1D, 0x56, 0]);
        assert_eq!(cut_partial(), vec![0x1D, 0x56, 1]);
        assert_eq!(cut_full_feed(), vec![0x1D, 0x56, 65, 0]);
        assert_eq!(cut_partial_feed(), vec![0x1D, 0x56, 66, 0]);
    }
}
