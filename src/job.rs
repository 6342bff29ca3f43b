//! # Print Job Orchestration
//!
//! Top-level entry points that tie the pipeline together: a decoded bitmap
//! comes in from the external rendering collaborator, device-ready command
//! bytes go out through the connection manager.
//!
//! ```text
//! bitmap → width policy → grayscale → banding → raster encode → cut bytes
//!        → transmission chunking → transport writes
//! ```
//!
//! [`render_to_raster`] produces the command stream; [`print_rendered`]
//! renders and transmits in one call, resolving the banded vs
//! single-block path from the target's transport capability.

use crate::error::CandelaError;
use crate::manager::ConnectionManager;
use crate::printer::CapabilityProfile;
use crate::raster::{RasterImage, encoder};

/// Options for rendering a bitmap into a command stream.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Resize to this width (aligned up to a multiple of 8) before
    /// encoding. `None` keeps the natural width, aligned the same way.
    pub custom_width: Option<u32>,

    /// Append the profile's cut command bytes after the raster data, as
    /// the last bytes of the stream.
    pub cut_after_printed: bool,

    /// Vertical band height override; `None` uses the default (30 rows).
    pub band_height: Option<u32>,

    /// Raster the whole image as one block instead of banding. Safe only
    /// on transports with a large native receive buffer; the printed dots
    /// are identical either way.
    pub single_block: bool,
}

/// Options for a full print call.
#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    pub render: RenderOptions,

    /// Force transmission chunking even for small payloads.
    pub long_data: bool,

    /// Transmission chunk size override; `None` uses the transport
    /// default.
    pub chunk_size: Option<usize>,
}

/// Render a decoded bitmap into a device-ready command stream.
///
/// Applies the width policy (custom width override, then alignment to a
/// multiple of 8, always resizing up, never truncating), clamps to the
/// profile's printable width, encodes the raster bands and appends the cut
/// bytes when requested.
///
/// ## Errors
///
/// [`CandelaError::Decode`] when the bitmap is degenerate. No partial
/// output: on error nothing is returned, so nothing can be transmitted.
pub fn render_to_raster(
    image: &RasterImage,
    profile: &CapabilityProfile,
    options: &RenderOptions,
) -> Result<Vec<u8>, CandelaError> {
    // Width policy: explicit override first, then natural-width alignment
    let mut image = match options.custom_width {
        Some(width) => image.resize_to_width(width),
        None => image.aligned(),
    };

    // Never exceed the profile's bit-image width limit; scaling down
    // preserves the full content (clipping would crop it)
    if image.width() > profile.width_dots as u32 {
        image = image.resize_to_width(profile.width_dots as u32);
    }

    let mut stream = if options.single_block {
        encoder::encode(&image, profile)?
    } else {
        encoder::encode_banded(&image, profile, options.band_height)?
    };

    if options.cut_after_printed {
        stream.extend_from_slice(&profile.cut);
    }
    Ok(stream)
}

/// Render a bitmap and transmit it to a Connected printer.
///
/// The banded vs single-block path is resolved from the target's
/// transport capability; the command stream is handed to
/// [`ConnectionManager::print_data`] for transmission chunking.
///
/// ## Errors
///
/// [`CandelaError::NotConnected`] when the printer is unknown or not
/// Connected (nothing is rendered or written), plus any render or
/// transport error.
pub async fn print_rendered(
    manager: &ConnectionManager,
    address: &str,
    image: &RasterImage,
    options: &PrintOptions,
) -> Result<(), CandelaError> {
    let printer = manager
        .printer(address)
        .ok_or_else(|| CandelaError::NotConnected(address.to_string()))?;

    let mut render = options.render.clone();
    render.single_block = render.single_block || manager.supports_large_single_block(address);

    let stream = render_to_raster(image, &printer.profile, &render)?;
    manager
        .print_data(address, &stream, options.long_data, options.chunk_size)
        .await
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

    #[test]
    fn test_render_bands_and_cut() {
        // 104×65, already aligned: 3 bands (30, 30, 5) + cut bytes
        let image = RasterImage::from_luma(104, 65, vec![0; 104 * 65]).unwrap();
        let profile = profile();
        let options = RenderOptions {
            cut_after_printed: true,
            ..Default::default()
        };

        let stream = render_to_raster(&image, &profile, &options).unwrap();

        let expected_raster = 3 * BIT_IMAGE_HEADER_LEN + (104 / 8) * 65;
        assert_eq!(stream.len(), expected_raster + profile.cut.len());
        assert!(stream.ends_with(&profile.cut));
    }

    #[test]
    fn test_unaligned_width_is_resized_up() {
        // 100 wide → 104; height scales proportionally (never cropped)
        let image = RasterImage::from_luma(100, 65, vec![0; 100 * 65]).unwrap();
        let options = RenderOptions {
            single_block: true,
            ..Default::default()
        };
        let stream = render_to_raster(&image, &profile(), &options).unwrap();
        assert_eq!(stream[4], 13); // xL = 104 / 8
    }

    #[test]
    fn test_render_without_cut() {
        let image = RasterImage::from_luma(64, 10, vec![255; 64 * 10]).unwrap();
        let stream = render_to_raster(&image, &profile(), &RenderOptions::default()).unwrap();
        assert!(!stream.ends_with(&profile().cut));
    }

    #[test]
    fn test_custom_width_is_aligned_up() {
        let image = RasterImage::from_luma(64, 64, vec![0; 64 * 64]).unwrap();
        let options = RenderOptions {
            custom_width: Some(100),
            single_block: true,
            ..Default::default()
        };
        let stream = render_to_raster(&image, &profile(), &options).unwrap();

        // 100 → 104 dots → 13 bytes per row
        assert_eq!(stream[4], 13); // xL
        assert_eq!(stream[5], 0); // xH
    }

    #[test]
    fn test_width_clamped_to_profile() {
        // 1000 dots exceeds the 80mm profile's 576; resized down, not cropped
        let image = RasterImage::from_luma(1000, 8, vec![0; 1000 * 8]).unwrap();
        let options = RenderOptions {
            single_block: true,
            ..Default::default()
        };
        let stream = render_to_raster(&image, &profile(), &options).unwrap();
        assert_eq!(stream[4], 72); // xL = 576 / 8
    }

    #[test]
    fn test_single_block_emits_one_header() {
        let image = RasterImage::from_luma(64, 90, vec![0; 64 * 90]).unwrap();
        let options = RenderOptions {
            single_block: true,
            ..Default::default()
        };
        let stream = render_to_raster(&image, &profile(), &options).unwrap();
        assert_eq!(stream.len(), BIT_IMAGE_HEADER_LEN + 8 * 90);
    }
}
