//! # Chunk Planning
//!
//! Two independent fixed-size partitioning concerns, both with a final
//! undersized remainder:
//!
//! 1. **Vertical image banding** ([`band_spans`]): a tall image is split
//!    into horizontal bands of [`DEFAULT_BAND_HEIGHT`] rows. Each band is
//!    raster-encoded independently and the command bytes concatenated in
//!    band order. This bounds peak memory for large images and matches
//!    typical printer receive-buffer limits.
//!
//! 2. **Transmission chunking** ([`split_stream`]): the full command byte
//!    stream is split into chunks of at most `chunk_size` bytes, written in
//!    order over the active connection. USB/BLE transports have
//!    maximum-transfer-unit limits; oversized single writes fail or are
//!    truncated silently by the underlying stack.
//!
//! Both constants are configuration with documented defaults, overridable
//! per call — they are not hardware-derived protocol rules.
//!
//! ## Ordering
//!
//! Bands and chunks must be consumed in the order produced. Printers
//! process the stream serially; reordering corrupts the print.

/// Default band height in rows for vertical image banding.
///
/// Conservative enough that one band of full-width 80mm graphics
/// (30 × 72 bytes ≈ 2.2KB) fits comfortably in any receive buffer.
pub const DEFAULT_BAND_HEIGHT: u32 = 30;

/// One horizontal band of an image: rows `[start, start + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandSpan {
    /// First row of the band
    pub start: u32,
    /// Number of rows in the band (≤ the requested band height)
    pub height: u32,
}

/// Split an image height into fixed-height horizontal bands.
///
/// Produces `ceil(height / band_height)` spans. Every span is `band_height`
/// rows tall except a final remainder. A height of 0 produces no spans
/// (a no-op, not an error).
///
/// ## Example
///
/// ```
/// use candela::chunk::band_spans;
///
/// let spans = band_spans(65, 30);
/// let heights: Vec<u32> = spans.iter().map(|s| s.height).collect();
/// assert_eq!(heights, vec![30, 30, 5]);
/// ```
pub fn band_spans(height: u32, band_height: u32) -> Vec<BandSpan> {
    debug_assert!(band_height > 0, "band height must be non-zero");

    let mut spans = Vec::with_capacity(height.div_ceil(band_height) as usize);
    let mut start = 0;
    while start < height {
        let h = band_height.min(height - start);
        spans.push(BandSpan { start, height: h });
        start += h;
    }
    spans
}

/// Split a byte stream into transmission chunks of at most `chunk_size`.
///
/// Produces `ceil(len / chunk_size)` in-order chunks; concatenating them
/// reconstructs the stream exactly. An empty stream produces no chunks.
pub fn split_stream(bytes: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    debug_assert!(chunk_size > 0, "chunk size must be non-zero");
    bytes.chunks(chunk_size)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_spans_exact_multiple() {
        let spans = band_spans(60, 30);
        assert_eq!(
            spans,
            vec![
                BandSpan { start: 0, height: 30 },
                BandSpan { start: 30, height: 30 },
            ]
        );
    }

    #[test]
    fn test_band_spans_remainder() {
        // H=65 → bands of heights [30, 30, 5]
        let spans = band_spans(65, 30);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2], BandSpan { start: 60, height: 5 });
    }

    #[test]
    fn test_band_spans_cover_height_exactly() {
        for height in [1u32, 29, 30, 31, 59, 60, 61, 1000] {
            let spans = band_spans(height, 30);
            assert_eq!(spans.len() as u32, height.div_ceil(30));
            assert_eq!(spans.iter().map(|s| s.height).sum::<u32>(), height);
            assert!(spans.iter().all(|s| s.height <= 30));

            // Contiguous and in order
            let mut expected_start = 0;
            for span in &spans {
                assert_eq!(span.start, expected_start);
                expected_start += span.height;
            }
        }
    }

    #[test]
    fn test_band_spans_zero_height() {
        assert!(band_spans(0, 30).is_empty());
    }

    #[test]
    fn test_band_spans_custom_band_height() {
        let spans = band_spans(100, 24);
        assert_eq!(spans.len(), 5);
        assert_eq!(spans[4].height, 4);
    }

    #[test]
    fn test_split_stream_round_trip() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        for chunk_size in [1usize, 7, 512, 999, 1000, 4096] {
            let chunks: Vec<&[u8]> = split_stream(&data, chunk_size).collect();
            assert_eq!(chunks.len(), data.len().div_ceil(chunk_size));
            assert!(chunks.iter().all(|c| c.len() <= chunk_size));

            let rejoined: Vec<u8> = chunks.concat();
            assert_eq!(rejoined, data);
        }
    }

    #[test]
    fn test_split_stream_empty() {
        let chunks: Vec<&[u8]> = split_stream(&[], 512).collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_split_stream_single_chunk() {
        let data = vec![1u8, 2, 3];
        let chunks: Vec<&[u8]> = split_stream(&data, 512).collect();
        assert_eq!(chunks, vec![&data[..]]);
    }
}
