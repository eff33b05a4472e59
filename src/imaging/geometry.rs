//! Rectangle arithmetic and crop fitting.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::size::ResolvedSize;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("empty rectangle ({x1}, {y1})-({x2}, {y2})")]
    Empty { x1: u32, y1: u32, x2: u32, y2: u32 },
    #[error("crop {rect} does not fit inside {width}x{height}")]
    OutOfBounds {
        rect: CropBox,
        width: u32,
        height: u32,
    },
    #[error("target size {width}x{height} has a zero side")]
    ZeroTarget { width: u32, height: u32 },
}

/// A rectangle `[x1, x2) × [y1, y2)` in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropBox {
    /// Build a rectangle, rejecting `x1 >= x2` or `y1 >= y2`.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self, GeometryError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(GeometryError::Empty { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Build from an origin and a size.
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Result<Self, GeometryError> {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height() as f64
    }

    /// Check `0 <= x1 < x2 <= width` and `0 <= y1 < y2 <= height`.
    pub fn validate_within(self, width: u32, height: u32) -> Result<Self, GeometryError> {
        if self.is_empty() {
            return Err(GeometryError::Empty {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
            });
        }
        if self.x2 > width || self.y2 > height {
            return Err(GeometryError::OutOfBounds {
                rect: self,
                width,
                height,
            });
        }
        Ok(self)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.validate_within(width, height).is_ok()
    }
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})-({}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Largest rectangle centered in `bounds` with the target's aspect ratio.
///
/// The ratio compared is the exact `width / height` of the target, not its
/// rounded display ratio. When the ratios already match, `bounds` is returned
/// unchanged.
pub fn fit_to_crop(bounds: CropBox, target: &ResolvedSize) -> Result<CropBox, GeometryError> {
    if target.width == 0 || target.height == 0 {
        return Err(GeometryError::ZeroTarget {
            width: target.width,
            height: target.height,
        });
    }
    if bounds.is_empty() {
        return Err(GeometryError::Empty {
            x1: bounds.x1,
            y1: bounds.y1,
            x2: bounds.x2,
            y2: bounds.y2,
        });
    }

    let (bw, bh) = (bounds.width(), bounds.height());
    let (tw, th) = (target.width, target.height);
    let ratio = tw as f64 / th as f64;

    // Compare bw/bh against tw/th without floating point
    let bounds_side = bw as u64 * th as u64;
    let target_side = bh as u64 * tw as u64;

    let (fit_w, fit_h) = match bounds_side.cmp(&target_side) {
        Ordering::Equal => return Ok(bounds),
        // Bounds are wider: keep full height, trim width
        Ordering::Greater => (((bh as f64 * ratio).round() as u32).clamp(1, bw), bh),
        // Bounds are taller: keep full width, trim height
        Ordering::Less => (bw, ((bw as f64 / ratio).round() as u32).clamp(1, bh)),
    };

    let x1 = bounds.x1 + (bw - fit_w) / 2;
    let y1 = bounds.y1 + (bh - fit_h) / 2;
    Ok(CropBox {
        x1,
        y1,
        x2: x1 + fit_w,
        y2: y1 + fit_h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(w: u32, h: u32) -> ResolvedSize {
        ResolvedSize::from_dimensions(w, h)
    }

    fn full(w: u32, h: u32) -> CropBox {
        CropBox::new(0, 0, w, h).unwrap()
    }

    // =========================================================================
    // CropBox
    // =========================================================================

    #[test]
    fn new_rejects_inverted_rect() {
        assert!(matches!(
            CropBox::new(10, 0, 5, 10),
            Err(GeometryError::Empty { .. })
        ));
        assert!(CropBox::new(0, 10, 10, 10).is_err());
    }

    #[test]
    fn from_xywh_matches_corners() {
        let b = CropBox::from_xywh(100, 100, 200, 50).unwrap();
        assert_eq!(b, CropBox::new(100, 100, 300, 150).unwrap());
        assert_eq!((b.width(), b.height()), (200, 50));
    }

    #[test]
    fn validate_within_accepts_edges() {
        let b = full(640, 480);
        assert_eq!(b.validate_within(640, 480), Ok(b));
    }

    #[test]
    fn validate_within_rejects_overflow() {
        let b = CropBox::new(100, 100, 700, 300).unwrap();
        assert!(matches!(
            b.validate_within(640, 480),
            Err(GeometryError::OutOfBounds {
                width: 640,
                height: 480,
                ..
            })
        ));
    }

    #[test]
    fn display_lists_corners() {
        assert_eq!(
            CropBox::new(1, 2, 3, 4).unwrap().to_string(),
            "(1, 2)-(3, 4)"
        );
    }

    // =========================================================================
    // fit_to_crop
    // =========================================================================

    #[test]
    fn same_ratio_returns_bounds() {
        assert_eq!(fit_to_crop(full(640, 480), &target(320, 240)), Ok(full(640, 480)));
    }

    #[test]
    fn wider_bounds_trim_width_centered() {
        // 640x480 → 5:4, height kept: 480 * 1.25 = 600, offset (640 - 600) / 2 = 20
        assert_eq!(
            fit_to_crop(full(640, 480), &target(500, 400)),
            Ok(CropBox::new(20, 0, 620, 480).unwrap())
        );
    }

    #[test]
    fn square_target_in_landscape() {
        assert_eq!(
            fit_to_crop(full(640, 480), &target(60, 60)),
            Ok(CropBox::new(80, 0, 560, 480).unwrap())
        );
    }

    #[test]
    fn taller_bounds_trim_height_centered() {
        // 480x640 → 16:9, width kept: 480 / (16/9) = 270, offset (640 - 270) / 2 = 185
        assert_eq!(
            fit_to_crop(full(480, 640), &target(1600, 900)),
            Ok(CropBox::new(0, 185, 480, 455).unwrap())
        );
    }

    #[test]
    fn fit_respects_bounds_origin() {
        let bounds = CropBox::new(100, 50, 300, 150).unwrap();
        assert_eq!(
            fit_to_crop(bounds, &target(1, 1)),
            Ok(CropBox::new(150, 50, 250, 150).unwrap())
        );
    }

    #[test]
    fn extreme_ratio_keeps_one_pixel() {
        let fit = fit_to_crop(full(10, 10), &target(1000, 1)).unwrap();
        assert_eq!((fit.width(), fit.height()), (10, 1));
    }

    #[test]
    fn fit_stays_inside_bounds() {
        for (w, h) in [(1024, 788), (60, 60), (7, 3), (500, 400), (1, 999)] {
            let fit = fit_to_crop(full(641, 479), &target(w, h)).unwrap();
            assert!(fit.fits_within(641, 479), "{w}x{h} → {fit}");
        }
    }

    #[test]
    fn zero_target_errors() {
        assert_eq!(
            fit_to_crop(full(640, 480), &target(0, 100)),
            Err(GeometryError::ZeroTarget {
                width: 0,
                height: 100
            })
        );
    }

    #[test]
    fn empty_bounds_error() {
        let empty = CropBox {
            x1: 5,
            y1: 5,
            x2: 5,
            y2: 10,
        };
        assert!(matches!(
            fit_to_crop(empty, &target(1, 1)),
            Err(GeometryError::Empty { .. })
        ));
    }
}
