//! # Raster Images
//!
//! Bitmap handling for the print pipeline: decoding, grayscale conversion,
//! and the width-alignment policy required by thermal printer hardware.
//!
//! ## Width Alignment
//!
//! Raster commands address dots in whole bytes (8 dots per byte), so every
//! image is brought to a width that is a multiple of 8 **before** encoding.
//! Alignment always rounds *up* — rounding down would crop printable
//! content at the right edge.
//!
//! ## Modules
//!
//! - [`encoder`]: grayscale bitmap → `GS v 0` command bytes

pub mod encoder;

use image::{DynamicImage, GrayImage, imageops::FilterType};

use crate::error::CandelaError;

/// Round a width up to the next multiple of 8.
///
/// Returns `width` unchanged when it is already a multiple of 8. Applied to
/// caller-requested custom widths and to an image's natural width before
/// raster encoding. Never rounds down.
///
/// ## Example
///
/// ```
/// use candela::raster::align_to_8;
///
/// assert_eq!(align_to_8(576), 576);
/// assert_eq!(align_to_8(100), 104);
/// assert_eq!(align_to_8(1), 8);
/// ```
#[inline]
pub fn align_to_8(width: u32) -> u32 {
    if width % 8 == 0 {
        width
    } else {
        width + (8 - width % 8)
    }
}

/// # Raster Image
///
/// A decoded single-channel grayscale bitmap. Color sources are converted
/// on construction; printers are monochrome bit-image devices and the color
/// information is discarded.
///
/// Invariant: both dimensions are non-zero. Zero-dimension sources are
/// rejected with [`CandelaError::Decode`] at construction, so downstream
/// code never sees a degenerate bitmap.
#[derive(Debug, Clone)]
pub struct RasterImage {
    inner: GrayImage,
}

impl RasterImage {
    /// Decode an encoded image (PNG, JPEG, ...) into a grayscale bitmap.
    ///
    /// ## Errors
    ///
    /// [`CandelaError::Decode`] if the buffer is not a valid image or has a
    /// zero dimension.
    pub fn decode(bytes: &[u8]) -> Result<Self, CandelaError> {
        let image = image::load_from_memory(bytes)?;
        Self::from_dynamic(&image)
    }

    /// Convert a decoded [`DynamicImage`] (handed over by the external
    /// rendering collaborator) into a grayscale bitmap.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, CandelaError> {
        Self::from_gray(image.to_luma8())
    }

    /// Wrap a raw grayscale buffer (one byte per pixel, row-major).
    ///
    /// ## Errors
    ///
    /// [`CandelaError::Decode`] if the buffer length does not match the
    /// dimensions, or a dimension is zero.
    pub fn from_luma(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CandelaError> {
        let gray = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
            CandelaError::Decode(format!(
                "Pixel buffer does not match dimensions {}x{}",
                width, height
            ))
        })?;
        Self::from_gray(gray)
    }

    fn from_gray(gray: GrayImage) -> Result<Self, CandelaError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(CandelaError::Decode(format!(
                "Zero-dimension image ({}x{})",
                gray.width(),
                gray.height()
            )));
        }
        Ok(Self { inner: gray })
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Grayscale pixel buffer, row-major, one byte per pixel.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        self.inner.as_raw()
    }

    /// A horizontal slice of rows `[start, start + height)`.
    ///
    /// Rows are contiguous in the buffer, so a band is a plain sub-slice.
    pub fn rows(&self, start: u32, height: u32) -> &[u8] {
        let row_len = self.width() as usize;
        let from = start as usize * row_len;
        let to = (start + height) as usize * row_len;
        &self.pixels()[from..to]
    }

    /// Resize to an exact target width, preserving aspect ratio.
    ///
    /// The target width is aligned to 8 first (upward), matching the
    /// hardware alignment policy. Height scales proportionally and is
    /// clamped to at least one row.
    pub fn resize_to_width(&self, width: u32) -> Self {
        let target_w = align_to_8(width);
        if target_w == self.width() {
            return self.clone();
        }
        let target_h =
            ((self.height() as u64 * target_w as u64) / self.width() as u64).max(1) as u32;
        let resized = image::imageops::resize(&self.inner, target_w, target_h, FilterType::Lanczos3);
        Self { inner: resized }
    }

    /// Align the natural width to a multiple of 8, resizing up if needed.
    ///
    /// Returns the image unchanged when already aligned.
    pub fn aligned(&self) -> Self {
        if self.width() % 8 == 0 {
            self.clone()
        } else {
            self.resize_to_width(align_to_8(self.width()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to_8_multiples_unchanged() {
        for w in [0u32, 8, 16, 384, 576, 1000 - 1000 % 8] {
            assert_eq!(align_to_8(w), w);
        }
    }

    #[test]
    fn test_align_to_8_rounds_up() {
        assert_eq!(align_to_8(1), 8);
        assert_eq!(align_to_8(7), 8);
        assert_eq!(align_to_8(9), 16);
        assert_eq!(align_to_8(100), 104);
        assert_eq!(align_to_8(577), 584);
    }

    #[test]
    fn test_align_to_8_full_range() {
        for w in 0u32..=1000 {
            let aligned = align_to_8(w);
            assert_eq!(aligned % 8, 0);
            assert!(aligned >= w);
            assert!(aligned < w + 8);
        }
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(RasterImage::from_luma(0, 10, vec![]).is_err());
        assert!(RasterImage::from_luma(10, 0, vec![]).is_err());
    }

    #[test]
    fn test_buffer_length_mismatch_rejected() {
        assert!(RasterImage::from_luma(8, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = RasterImage::decode(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap_err();
        assert!(matches!(err, CandelaError::Decode(_)));
    }

    #[test]
    fn test_rows_slicing() {
        let pixels: Vec<u8> = (0..8 * 4).map(|i| i as u8).collect();
        let image = RasterImage::from_luma(8, 4, pixels).unwrap();

        let band = image.rows(1, 2);
        assert_eq!(band.len(), 8 * 2);
        assert_eq!(band[0], 8); // first pixel of row 1
        assert_eq!(band[15], 23); // last pixel of row 2
    }

    #[test]
    fn test_aligned_is_noop_for_aligned_widths() {
        let image = RasterImage::from_luma(16, 4, vec![0; 16 * 4]).unwrap();
        let aligned = image.aligned();
        assert_eq!(aligned.width(), 16);
        assert_eq!(aligned.height(), 4);
    }

    #[test]
    fn test_aligned_rounds_width_up() {
        let image = RasterImage::from_luma(100, 50, vec![128; 100 * 50]).unwrap();
        let aligned = image.aligned();
        assert_eq!(aligned.width(), 104);
        // Height scales proportionally, never to zero
        assert!(aligned.height() >= 50);
    }

    #[test]
    fn test_resize_to_width_aligns_target() {
        let image = RasterImage::from_luma(64, 64, vec![0; 64 * 64]).unwrap();
        // Request an unaligned custom width; it is rounded up to 208
        let resized = image.resize_to_width(200);
        assert_eq!(resized.width(), 208);
        assert_eq!(resized.height(), 208);
    }

    #[test]
    fn test_from_dynamic_discards_color() {
        let mut rgb = image::RgbImage::new(8, 1);
        for p in rgb.pixels_mut() {
            *p = image::Rgb([255, 0, 0]);
        }
        let image = RasterImage::from_dynamic(&DynamicImage::ImageRgb8(rgb)).unwrap();
        assert_eq!(image.width(), 8);
        // Red converts to a mid-gray luma value, one channel per pixel
        assert_eq!(image.pixels().len(), 8);
    }
}
