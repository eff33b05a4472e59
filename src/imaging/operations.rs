//! High-level image operations.
//!
//! These functions combine geometry with backend execution. They take the
//! parent's bounds, the stored crop and the resolved target, decide what to
//! render, and call the backend. Nothing here touches a store.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::geometry::{CropBox, GeometryError, fit_to_crop};
use super::params::{RenderParams, RenderSettings};
use crate::size::ResolvedSize;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, source: &[u8]) -> Result<(u32, u32)> {
    let Dimensions { width, height } = backend.identify(source)?;
    Ok((width, height))
}

/// Where the crop of a render came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropSource {
    /// The crop row already stored for the image.
    Stored,
    /// Computed by [`fit_to_crop`]; must be persisted with the render.
    Fitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropChoice {
    pub rect: CropBox,
    pub source: CropSource,
}

/// Decide which crop a render uses.
///
/// A stored crop wins while it still fits the parent. A stale stored crop is
/// re-fitted when `refit` is set (`auto_crop` sizes, or a crop that was
/// itself fitted) and rejected otherwise. Without a stored
/// crop the target ratio is fitted, or the full bounds are used when there is
/// no target.
pub fn choose_crop(
    bounds: CropBox,
    stored: Option<CropBox>,
    target: Option<&ResolvedSize>,
    refit: bool,
) -> std::result::Result<CropChoice, GeometryError> {
    if let Some(rect) = stored {
        match rect.validate_within(bounds.x2, bounds.y2) {
            Ok(rect) => {
                return Ok(CropChoice {
                    rect,
                    source: CropSource::Stored,
                });
            }
            Err(err) if !refit => return Err(err),
            Err(_) => {}
        }
    }
    let rect = match target {
        Some(target) => fit_to_crop(bounds, target)?,
        None => bounds,
    };
    Ok(CropChoice {
        rect,
        source: CropSource::Fitted,
    })
}

/// One pass to execute: the base rendition or a retina multiple.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRendition {
    pub scale: u32,
    pub params: RenderParams,
}

/// Plan the renditions of one image.
///
/// Always one pass at `target`; retina sizes add a pass at
/// `settings.retina_scale` times the target using the same crop.
pub fn plan_renditions(
    crop: CropBox,
    target: ResolvedSize,
    retina: bool,
    settings: &RenderSettings,
) -> Vec<PlannedRendition> {
    let mut scales = vec![1];
    if retina && settings.retina_scale > 1 {
        scales.push(settings.retina_scale);
    }
    scales
        .into_iter()
        .map(|scale| {
            let size = target.scaled(scale);
            PlannedRendition {
                scale,
                params: RenderParams {
                    crop,
                    width: size.width,
                    height: size.height,
                    format: settings.format,
                    quality: settings.quality,
                },
            }
        })
        .collect()
}

/// Encoded output of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendition {
    pub scale: u32,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Execute planned passes against one source buffer.
pub fn render_renditions(
    backend: &impl ImageBackend,
    source: &[u8],
    plans: &[PlannedRendition],
) -> Result<Vec<Rendition>> {
    plans
        .iter()
        .map(|plan| {
            let bytes = backend.render(source, &plan.params)?;
            Ok(Rendition {
                scale: plan.scale,
                width: plan.params.width,
                height: plan.params.height,
                bytes,
            })
        })
        .collect()
}
