//! Target size descriptions and size sets.
//!
//! A [`SizeSpec`] describes a derived image by any two of width, height and
//! aspect ratio. [`SizeSpec::resolve`] fills in the third:
//!
//! | Given | Computed |
//! |---|---|
//! | width + height | `aspect_ratio = round(width / height, 2)` |
//! | width + aspect_ratio | `height = round(width / aspect_ratio)` |
//! | height + aspect_ratio | `width = round(height * aspect_ratio)` |
//!
//! ## Rounding
//!
//! Pixel dimensions use [`f64::round`] (half away from zero) on the IEEE-754
//! quotient. Note that `100.0 / 1.6` is `62.49999…` in binary floating point,
//! so a 100px wide 1.6 size is 62px tall. Aspect ratios are kept to two
//! decimals.
//!
//! ## Size Sets
//!
//! A [`SizeSet`] is a named, ordered group of specs applied to an image
//! together. Which set applies to an owner is decided by a
//! [`SizeSetResolver`], so static and owner-dependent mappings share one call
//! site.

use crate::model::{OwnerRef, SizeSetId, SizeSpecId};
use crate::naming::slugify;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizeError {
    #[error("size '{slug}' needs at least two of width, height and aspect_ratio")]
    InsufficientSizeData { slug: String },
    #[error("size '{slug}' has invalid aspect ratio {ratio}")]
    InvalidAspectRatio { slug: String, ratio: f64 },
    #[error("size '{slug}' resolves to {value} px, outside 1..={max}", max = u32::MAX)]
    DimensionOutOfRange { slug: String, value: f64 },
}

/// Round a ratio to two decimals.
pub fn round_ratio(ratio: f64) -> f64 {
    (ratio * 100.0).round() / 100.0
}

/// Concrete pixel dimensions of a size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSize {
    pub width: u32,
    pub height: u32,
    /// Two-decimal aspect ratio, for display and comparison.
    pub aspect_ratio: f64,
}

impl ResolvedSize {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let aspect_ratio = if height == 0 {
            0.0
        } else {
            round_ratio(width as f64 / height as f64)
        };
        Self {
            width,
            height,
            aspect_ratio,
        }
    }

    /// Multiply both sides, e.g. for a retina pass.
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
            aspect_ratio: self.aspect_ratio,
        }
    }
}

/// A named target size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SizeSpecId>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<f64>,
    /// Re-fit the crop automatically when the stored one no longer fits.
    #[serde(default)]
    pub auto_crop: bool,
    /// Also render a higher-resolution pass.
    #[serde(default)]
    pub retina: bool,
    /// Owning set. `None` marks a manual, single-use size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_set: Option<SizeSetId>,
}

impl SizeSpec {
    /// A size named `name`, slugged from the name, with no dimensions yet.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            slug: slugify(&name),
            name,
            width: None,
            height: None,
            aspect_ratio: None,
            auto_crop: false,
            retina: false,
            size_set: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: f64) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn with_auto_crop(mut self, auto_crop: bool) -> Self {
        self.auto_crop = auto_crop;
        self
    }

    pub fn with_retina(mut self, retina: bool) -> Self {
        self.retina = retina;
        self
    }

    pub fn is_manual(&self) -> bool {
        self.size_set.is_none()
    }

    fn checked_ratio(&self, ratio: f64) -> Result<f64, SizeError> {
        if ratio.is_finite() && ratio > 0.0 {
            Ok(ratio)
        } else {
            Err(SizeError::InvalidAspectRatio {
                slug: self.slug.clone(),
                ratio,
            })
        }
    }

    /// Round a computed side to whole pixels. Zero and anything past
    /// `u32::MAX` are errors rather than saturated casts.
    fn checked_dimension(&self, value: f64) -> Result<u32, SizeError> {
        let rounded = value.round();
        if (1.0..=u32::MAX as f64).contains(&rounded) {
            Ok(rounded as u32)
        } else {
            Err(SizeError::DimensionOutOfRange {
                slug: self.slug.clone(),
                value,
            })
        }
    }

    /// Resolve to concrete dimensions from this size alone.
    pub fn resolve(&self) -> Result<ResolvedSize, SizeError> {
        match (self.width, self.height, self.aspect_ratio) {
            (Some(width), Some(height), _) => Ok(ResolvedSize::from_dimensions(width, height)),
            (Some(width), None, Some(ratio)) => {
                let ratio = self.checked_ratio(ratio)?;
                Ok(ResolvedSize {
                    width,
                    height: self.checked_dimension(width as f64 / ratio)?,
                    aspect_ratio: round_ratio(ratio),
                })
            }
            (None, Some(height), Some(ratio)) => {
                let ratio = self.checked_ratio(ratio)?;
                Ok(ResolvedSize {
                    width: self.checked_dimension(height as f64 * ratio)?,
                    height,
                    aspect_ratio: round_ratio(ratio),
                })
            }
            _ => Err(SizeError::InsufficientSizeData {
                slug: self.slug.clone(),
            }),
        }
    }

    /// Resolve, borrowing the parent's aspect ratio when only one side is set.
    ///
    /// Returns `Ok(None)` when neither width nor height is set: the rendition
    /// then takes the size of its crop.
    pub fn resolve_with_fallback(
        &self,
        parent_ratio: Option<f64>,
    ) -> Result<Option<ResolvedSize>, SizeError> {
        match (self.width, self.height, self.aspect_ratio) {
            (None, None, _) => Ok(None),
            (Some(_), None, None) | (None, Some(_), None) => {
                let ratio = parent_ratio.ok_or_else(|| SizeError::InsufficientSizeData {
                    slug: self.slug.clone(),
                })?;
                self.clone().with_aspect_ratio(ratio).resolve().map(Some)
            }
            _ => self.resolve().map(Some),
        }
    }
}

/// A named, ordered group of sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SizeSetId>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub sizes: Vec<SizeSpec>,
}

impl SizeSet {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            slug: slugify(&name),
            name,
            sizes: Vec::new(),
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_size(mut self, size: SizeSpec) -> Self {
        self.sizes.push(size);
        self
    }

    /// True if `key` is this set's name or slug.
    pub fn matches(&self, key: &str) -> bool {
        self.name == key || self.slug == key
    }

    pub fn find(&self, slug: &str) -> Option<&SizeSpec> {
        self.sizes.iter().find(|s| s.slug == slug)
    }
}

/// Picks the size set (by name or slug) that applies to an owner.
pub trait SizeSetResolver {
    fn resolve(&self, owner: &OwnerRef) -> String;
}

/// The same set for every owner.
#[derive(Debug, Clone)]
pub struct StaticSizeSet(pub String);

impl StaticSizeSet {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl SizeSetResolver for StaticSizeSet {
    fn resolve(&self, _owner: &OwnerRef) -> String {
        self.0.clone()
    }
}

impl<F> SizeSetResolver for F
where
    F: Fn(&OwnerRef) -> String,
{
    fn resolve(&self, owner: &OwnerRef) -> String {
        self(owner)
    }
}
