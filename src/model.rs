//! Entity types shared by the manager and the stores.
//!
//! An [`Image`] is a node in the derivation graph. Its [`Role`] encodes the
//! original-XOR-derived invariant: an original has neither a parent nor a
//! size, a derived image always has a parent and (once assigned) a size.

use crate::imaging::geometry::CropBox;
use crate::size::round_ratio;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a persisted [`Image`].
    ImageId,
    "image"
);
entity_id!(
    /// Identifier of a persisted [`SizeSpec`](crate::size::SizeSpec).
    SizeSpecId,
    "size"
);
entity_id!(
    /// Identifier of a persisted [`SizeSet`](crate::size::SizeSet).
    SizeSetId,
    "size-set"
);

/// Opaque key of the host entity an image belongs to.
///
/// Stored and compared, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerRef(String);

impl OwnerRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier handed back by a [`FileStore`](crate::store::FileStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredPath(String);

impl StoredPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an image in the derivation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    Original,
    Derived {
        /// The image this one is cut from. Usually the original, but derived
        /// images can be parents themselves.
        original: ImageId,
        /// `None` only for a manual stub whose size has not been assigned yet.
        size: Option<SizeSpecId>,
    },
}

/// Render state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Unrendered,
    Rendered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// `None` until the entity store persists the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ImageId>,
    pub owner: OwnerRef,
    /// Logical file name, used to derive child names.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<StoredPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retina_file: Option<StoredPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// SHA-256 of the stored 1x file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub role: Role,
}

impl Image {
    /// An unsaved original with no file yet.
    pub fn new_original(owner: OwnerRef, name: impl Into<String>) -> Self {
        Self {
            id: None,
            owner,
            name: name.into(),
            file: None,
            retina_file: None,
            width: None,
            height: None,
            checksum: None,
            role: Role::Original,
        }
    }

    /// An unsaved, unrendered child of `parent`.
    pub fn new_derived(parent: &Image, parent_id: ImageId, size: Option<SizeSpecId>) -> Self {
        Self {
            id: None,
            owner: parent.owner.clone(),
            name: parent.name.clone(),
            file: None,
            retina_file: None,
            width: None,
            height: None,
            checksum: None,
            role: Role::Derived {
                original: parent_id,
                size,
            },
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self.role, Role::Original)
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Parent image, `None` for originals.
    pub fn parent(&self) -> Option<ImageId> {
        match self.role {
            Role::Original => None,
            Role::Derived { original, .. } => Some(original),
        }
    }

    pub fn size(&self) -> Option<SizeSpecId> {
        match self.role {
            Role::Original => None,
            Role::Derived { size, .. } => size,
        }
    }

    /// Assign a size to a derived image. Returns `false` for originals, which
    /// never carry a size.
    pub fn set_size(&mut self, spec: SizeSpecId) -> bool {
        match &mut self.role {
            Role::Original => false,
            Role::Derived { size, .. } => {
                *size = Some(spec);
                true
            }
        }
    }

    pub fn state(&self) -> ImageState {
        if self.file.is_some() && self.width.is_some() && self.height.is_some() {
            ImageState::Rendered
        } else {
            ImageState::Unrendered
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }

    /// Full-image rectangle, available once dimensions are known.
    pub fn bounds(&self) -> Option<CropBox> {
        let (w, h) = self.dimensions()?;
        CropBox::new(0, 0, w, h).ok()
    }

    /// Exact width / height ratio.
    pub fn exact_aspect_ratio(&self) -> Option<f64> {
        let (w, h) = self.dimensions()?;
        (h > 0).then(|| w as f64 / h as f64)
    }

    /// Width / height rounded to two decimals.
    pub fn aspect_ratio(&self) -> Option<f64> {
        self.exact_aspect_ratio().map(round_ratio)
    }
}

/// Who chose a stored crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropOrigin {
    /// Set explicitly through `set_crop`.
    Manual,
    /// Proposed by crop fitting during a render. Dropped whenever the parent
    /// is re-rendered.
    Fitted,
}

/// Crop rectangle of a derived image, in its parent's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub image: ImageId,
    pub rect: CropBox,
    pub origin: CropOrigin,
}

impl Crop {
    pub fn manual(image: ImageId, rect: CropBox) -> Self {
        Self {
            image,
            rect,
            origin: CropOrigin::Manual,
        }
    }

    pub fn fitted(image: ImageId, rect: CropBox) -> Self {
        Self {
            image,
            rect,
            origin: CropOrigin::Fitted,
        }
    }
}
