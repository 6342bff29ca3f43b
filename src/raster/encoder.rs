//! # Raster Encoder
//!
//! Converts a grayscale [`RasterImage`] into `GS v 0` command bytes.
//!
//! The encoder expects its input width to already be a multiple of 8 —
//! callers apply the alignment policy ([`super::align_to_8`] + resize)
//! first; the encoder itself never resizes.
//!
//! Two paths produce the same printed dots:
//!
//! - [`encode`]: the whole image as a single raster block. Used on
//!   transports with a large native receive buffer.
//! - [`encode_banded`]: the image split into fixed-height bands, one
//!   command per band, concatenated in band order. Bounds peak printer
//!   buffer usage for tall images.
//!
//! Banding never shifts, duplicates or crops a row; only the command
//! headers differ between the two streams.

use crate::chunk::{self, BandSpan};
use crate::error::CandelaError;
use crate::printer::CapabilityProfile;
use crate::protocol::raster;

use super::RasterImage;

/// Gray level below which a pixel prints black.
///
/// Pixels are single-byte luma values (0 = black, 255 = white); anything
/// darker than mid-gray burns a dot.
pub const BLACK_THRESHOLD: u8 = 128;

/// Encode a full image as one raster block.
///
/// ## Contract
///
/// - `image.width()` must be a multiple of 8 (caller aligns first)
/// - `image.width()` must not exceed the profile's bit-image width limit
/// - image height must fit the command's 16-bit height field
///
/// No partial output: any failure produces no bytes at all.
pub fn encode(
    image: &RasterImage,
    profile: &CapabilityProfile,
) -> Result<Vec<u8>, CandelaError> {
    encode_rows(image, profile, BandSpan { start: 0, height: image.height() })
}

/// Encode an image as fixed-height bands, concatenated in band order.
///
/// `band_height` of `None` uses [`chunk::DEFAULT_BAND_HEIGHT`].
pub fn encode_banded(
    image: &RasterImage,
    profile: &CapabilityProfile,
    band_height: Option<u32>,
) -> Result<Vec<u8>, CandelaError> {
    let band_height = band_height.unwrap_or(chunk::DEFAULT_BAND_HEIGHT);
    let spans = chunk::band_spans(image.height(), band_height);

    let width_bytes = image.width() as usize / 8;
    let per_band = raster::BIT_IMAGE_HEADER_LEN + width_bytes * band_height as usize;
    let mut out = Vec::with_capacity(per_band * spans.len());

    for span in spans {
        out.extend(encode_rows(image, profile, span)?);
    }
    Ok(out)
}

/// Encode one horizontal span of the image as a single `GS v 0` command.
fn encode_rows(
    image: &RasterImage,
    profile: &CapabilityProfile,
    span: BandSpan,
) -> Result<Vec<u8>, CandelaError> {
    let width = image.width();
    debug_assert!(width % 8 == 0, "Encoder input width must be byte-aligned");
    debug_assert!(
        width / 8 <= profile.max_width_bytes as u32,
        "Image exceeds the profile bit-image width limit"
    );
    debug_assert!(span.height <= u16::MAX as u32);

    let packed = pack_rows(image.rows(span.start, span.height), width as usize);
    Ok(raster::bit_image(width as u16, span.height as u16, &packed))
}

/// Pack grayscale rows into raster bits, 8 dots per byte.
///
/// Bit 7 is the leftmost dot; a set bit prints black.
fn pack_rows(pixels: &[u8], width: usize) -> Vec<u8> {
    let width_bytes = width / 8;
    let rows = pixels.len() / width;
    let mut packed = vec![0u8; width_bytes * rows];

    for (i, pixel) in pixels.iter().enumerate() {
        if *pixel < BLACK_THRESHOLD {
            let byte = i / 8;
            let bit = 7 - (i % 8);
            packed[byte] |= 1 << bit;
        }
    }

    debug_assert_eq!(packed.len(), width_bytes * rows);
    packed
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::PaperWidth;
    use crate::protocol::raster::BIT_IMAGE_HEADER_LEN;

    fn profile() -> std::sync::Arc<CapabilityProfile> {
        CapabilityProfile::by_paper(PaperWidth::Mm80)
    }

    /// Decode a stream of GS v 0 commands back into a dot matrix.
    /// Returns (width_dots, rows of bools).
    fn decode_stream(stream: &[u8]) -> (usize, Vec<Vec<bool>>) {
        let mut rows = Vec::new();
        let mut width_dots = 0;
        let mut pos = 0;
        while pos < stream.len() {
            assert_eq!(&stream[pos..pos + 4], &[0x1D, 0x76, 0x30, 0x00]);
            let wb = stream[pos + 4] as usize | (stream[pos + 5] as usize) << 8;
            let h = stream[pos + 6] as usize | (stream[pos + 7] as usize) << 8;
            width_dots = wb * 8;
            pos += BIT_IMAGE_HEADER_LEN;
            for _ in 0..h {
                let mut row = Vec::with_capacity(width_dots);
                for byte in &stream[pos..pos + wb] {
                    for bit in (0..8).rev() {
                        row.push(byte >> bit & 1 == 1);
                    }
                }
                rows.push(row);
                pos += wb;
            }
        }
        (width_dots, rows)
    }

    #[test]
    fn test_pack_rows_msb_first() {
        // ████░░░░ → 0xF0
        let pixels = vec![0, 0, 0, 0, 255, 255, 255, 255];
        assert_eq!(pack_rows(&pixels, 8), vec![0xF0]);
    }

    #[test]
    fn test_pack_rows_threshold() {
        let pixels = vec![BLACK_THRESHOLD - 1, BLACK_THRESHOLD, 0, 255, 0, 255, 0, 255];
        // 1 0 1 0 1 0 1 0 → 0xAA
        assert_eq!(pack_rows(&pixels, 8), vec![0xAA]);
    }

    #[test]
    fn test_encode_header_and_length() {
        let image = RasterImage::from_luma(576, 65, vec![0; 576 * 65]).unwrap();
        let out = encode(&image, &profile()).unwrap();

        assert_eq!(&out[0..4], &[0x1D, 0x76, 0x30, 0x00]);
        assert_eq!(out[4], 72); // xL
        assert_eq!(out[6], 65); // yL
        assert_eq!(out.len(), BIT_IMAGE_HEADER_LEN + 72 * 65);
    }

    #[test]
    fn test_encode_banded_emits_one_command_per_band() {
        let image = RasterImage::from_luma(576, 65, vec![255; 576 * 65]).unwrap();
        let out = encode_banded(&image, &profile(), None).unwrap();

        // 3 bands: 30 + 30 + 5 rows, each with its own header
        let expected = 3 * BIT_IMAGE_HEADER_LEN + 72 * 65;
        assert_eq!(out.len(), expected);

        let (_, rows) = decode_stream(&out);
        assert_eq!(rows.len(), 65);
    }

    #[test]
    fn test_band_invariance() {
        // Same dot matrix out of the full-block and banded paths
        let pixels: Vec<u8> = (0..104u32 * 77)
            .map(|i| (i * 37 % 256) as u8)
            .collect();
        let image = RasterImage::from_luma(104, 77, pixels).unwrap();

        let full = encode(&image, &profile()).unwrap();
        let banded = encode_banded(&image, &profile(), Some(30)).unwrap();

        assert_eq!(decode_stream(&full), decode_stream(&banded));
    }

    #[test]
    fn test_band_invariance_across_band_heights() {
        let pixels: Vec<u8> = (0..64u32 * 100).map(|i| (i % 256) as u8).collect();
        let image = RasterImage::from_luma(64, 100, pixels).unwrap();

        let reference = decode_stream(&encode(&image, &profile()).unwrap());
        for band_height in [1u32, 24, 30, 99, 100, 500] {
            let banded = encode_banded(&image, &profile(), Some(band_height)).unwrap();
            assert_eq!(decode_stream(&banded), reference);
        }
    }

    #[test]
    fn test_encode_all_black_all_white() {
        let black = RasterImage::from_luma(8, 2, vec![0; 16]).unwrap();
        let out = encode(&black, &profile()).unwrap();
        assert_eq!(&out[BIT_IMAGE_HEADER_LEN..], &[0xFF, 0xFF]);

        let white = RasterImage::from_luma(8, 2, vec![255; 16]).unwrap();
        let out = encode(&white, &profile()).unwrap();
        assert_eq!(&out[BIT_IMAGE_HEADER_LEN..], &[0x00, 0x00]);
    }
}
