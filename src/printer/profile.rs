//! # Printer Capability Profiles
//!
//! This module defines the hardware characteristics of supported thermal
//! printer classes. Receipt printers cluster into two paper widths:
//!
//! | Paper | Print width | Width (dots) | Width (bytes) |
//! |-------|-------------|--------------|---------------|
//! | 58mm  | 48mm        | 384          | 48            |
//! | 80mm  | 72mm        | 576          | 72            |
//!
//! A profile is loaded once by paper-size key, is immutable, and is shared
//! by reference (`Arc`) across all jobs targeting that printer class.
//!
//! ## Usage
//!
//! ```
//! use candela::printer::{CapabilityProfile, PaperWidth};
//!
//! let profile = CapabilityProfile::by_paper(PaperWidth::Mm80);
//! assert_eq!(profile.width_dots, 576);
//! ```

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::protocol::commands;

/// Paper width class of a receipt printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperWidth {
    /// 58mm paper, 48mm printable (384 dots)
    Mm58,
    /// 80mm paper, 72mm printable (576 dots)
    Mm80,
}

impl PaperWidth {
    /// Parse a paper-size key (`"58mm"` / `"80mm"`).
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "58" | "58mm" => Ok(Self::Mm58),
            "80" | "80mm" => Ok(Self::Mm80),
            other => Err(format!("Unknown paper width '{}'. Use '58mm' or '80mm'", other)),
        }
    }
}

/// # Capability Profile
///
/// Hardware constants for one printer class: printable width, bit-image
/// width limit and the cut command bytes. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Human-readable profile name (e.g. "Generic 80mm")
    pub name: String,

    /// Paper width class
    pub paper: PaperWidth,

    /// Maximum print width in dots (always a multiple of 8)
    pub width_dots: u16,

    /// Bit-image width limit in bytes (width_dots / 8)
    pub max_width_bytes: u16,

    /// Resolution in dots per inch
    pub dpi: u16,

    /// Cut command bytes appended after a job when requested
    pub cut: Vec<u8>,
}

impl CapabilityProfile {
    fn mm58() -> Self {
        Self {
            name: "Generic 58mm".to_string(),
            paper: PaperWidth::Mm58,
            width_dots: 384,
            max_width_bytes: 48,
            dpi: 203,
            cut: commands::cut_partial_feed(),
        }
    }

    fn mm80() -> Self {
        Self {
            name: "Generic 80mm".to_string(),
            paper: PaperWidth::Mm80,
            width_dots: 576,
            max_width_bytes: 72,
            dpi: 203,
            cut: commands::cut_partial_feed(),
        }
    }

    /// Look up the shared profile for a paper width class.
    ///
    /// Profiles are constructed once and shared by reference; every job
    /// targeting the same paper class sees the same instance.
    pub fn by_paper(paper: PaperWidth) -> Arc<Self> {
        static MM58: OnceLock<Arc<CapabilityProfile>> = OnceLock::new();
        static MM80: OnceLock<Arc<CapabilityProfile>> = OnceLock::new();
        match paper {
            PaperWidth::Mm58 => MM58.get_or_init(|| Arc::new(Self::mm58())).clone(),
            PaperWidth::Mm80 => MM80.get_or_init(|| Arc::new(Self::mm80())).clone(),
        }
    }

    /// Parse a profile key (`"58mm"` / `"80mm"` or a profile name).
    pub fn parse(s: &str) -> Result<Arc<Self>, String> {
        if let Some(profile) = Self::built_in().into_iter().find(|p| p.name == s) {
            return Ok(Arc::new(profile));
        }
        PaperWidth::parse(s).map(Self::by_paper)
    }

    /// List all built-in profiles.
    pub fn built_in() -> Vec<Self> {
        vec![Self::mm58(), Self::mm80()]
    }

    /// Calculate dots per millimeter
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Calculate print width in millimeters
    #[inline]
    pub fn width_mm(&self) -> f32 {
        self.width_dots as f32 / self.dots_per_mm()
    }

    /// Convert millimeters to dots
    #[inline]
    pub fn mm_to_dots(&self, mm: f32) -> u16 {
        (mm * self.dots_per_mm()).round() as u16
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::mm80()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_dimensions() {
        let p80 = CapabilityProfile::by_paper(PaperWidth::Mm80);
        assert_eq!(p80.width_dots, 576);
        assert_eq!(p80.max_width_bytes, 72);
        assert_eq!(p80.width_dots, p80.max_width_bytes * 8);

        let p58 = CapabilityProfile::by_paper(PaperWidth::Mm58);
        assert_eq!(p58.width_dots, 384);
        assert_eq!(p58.max_width_bytes, 48);
    }

    #[test]
    fn test_by_paper_is_shared() {
        let a = CapabilityProfile::by_paper(PaperWidth::Mm80);
        let b = CapabilityProfile::by_paper(PaperWidth::Mm80);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(CapabilityProfile::parse("58mm").unwrap().width_dots, 384);
        assert_eq!(CapabilityProfile::parse("80mm").unwrap().width_dots, 576);
        assert_eq!(CapabilityProfile::parse("80").unwrap().width_dots, 576);
        assert!(CapabilityProfile::parse("a4").is_err());
    }

    #[test]
    fn test_cut_bytes_present() {
        let profile = CapabilityProfile::by_paper(PaperWidth::Mm80);
        // GS V 66 0 (feed then partial cut)
        assert_eq!(profile.cut, vec![0x1D, 0x56, 66, 0]);
    }

    #[test]
    fn test_dots_per_mm() {
        let profile = CapabilityProfile::by_paper(PaperWidth::Mm80);
        // 203 DPI ≈ 8 dots/mm
        assert!((profile.dots_per_mm() - 8.0).abs() < 0.1);
        // 576 dots / 8 dpmm = 72mm
        assert!((profile.width_mm() - 72.0).abs() < 1.0);
    }
}
