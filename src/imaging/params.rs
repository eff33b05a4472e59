//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides which renditions to produce) and the
//! [`backend`](super::backend) (which does the pixel work). Swapping backends,
//! e.g. for a recording mock in tests, never touches operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OutputFormat`]: Encoded format of every rendition.
//! - [`RenderSettings`]: Format, quality and retina multiplier, from config.
//! - [`RenderParams`]: One crop + resize + encode pass.

use super::geometry::CropBox;
use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoded format of rendered images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    /// Lossless WebP; quality is ignored.
    Webp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

/// Encoding settings shared by every rendition of a manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Multiplier of the high-resolution pass for retina sizes.
    pub retina_scale: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: Quality::default(),
            retina_scale: 2,
        }
    }
}

/// A single crop + resize + encode pass over a source buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    /// Region of the source to keep.
    pub crop: CropBox,
    /// Output width after resizing the crop.
    pub width: u32,
    /// Output height after resizing the crop.
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}
