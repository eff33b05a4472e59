//! The entity store collaborator.

use crate::model::{Crop, Image, ImageId, OwnerRef, SizeSetId, SizeSpecId};
use crate::size::{SizeSet, SizeSpec};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },
    #[error("{0} has no id; save it first")]
    Unsaved(&'static str),
    #[error("no open transaction")]
    NoTransaction,
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Rows for the derivation graph.
///
/// Implementations assign ids on insert and keep size-set members in
/// insertion order. They do no cascading of their own; the manager decides
/// what goes together and wraps it in [`begin`](Self::begin) /
/// [`commit`](Self::commit).
pub trait EntityStore {
    fn insert_image(&mut self, image: &Image) -> Result<ImageId, StoreError>;
    fn update_image(&mut self, image: &Image) -> Result<(), StoreError>;
    fn get_image(&self, id: ImageId) -> Result<Image, StoreError>;
    fn delete_image(&mut self, id: ImageId) -> Result<(), StoreError>;
    /// Direct children of `parent`, by id.
    fn derived_of(&self, parent: ImageId) -> Vec<Image>;
    fn images_by_owner(&self, owner: &OwnerRef) -> Vec<Image>;
    fn count_images(&self) -> usize;
    /// Images whose role references `size`.
    fn count_images_with_size(&self, size: SizeSpecId) -> usize;

    /// Insert a size. Slugs are unique within a set; manual sizes may repeat.
    fn insert_size_spec(&mut self, spec: &SizeSpec) -> Result<SizeSpecId, StoreError>;
    fn get_size_spec(&self, id: SizeSpecId) -> Result<SizeSpec, StoreError>;
    fn delete_size_spec(&mut self, id: SizeSpecId) -> Result<(), StoreError>;
    fn count_size_specs(&self) -> usize;

    /// Insert a set together with its sizes.
    fn insert_size_set(&mut self, set: &SizeSet) -> Result<SizeSetId, StoreError>;
    /// Find a set by name or slug, with its sizes in order.
    fn find_size_set(&self, name_or_slug: &str) -> Result<SizeSet, StoreError>;
    fn size_sets(&self) -> Vec<SizeSet>;

    fn get_crop(&self, image: ImageId) -> Option<Crop>;
    /// Attach or replace the crop of an existing image.
    fn put_crop(&mut self, crop: Crop) -> Result<(), StoreError>;
    /// Returns whether a crop was removed.
    fn delete_crop(&mut self, image: ImageId) -> bool;
    fn count_crops(&self) -> usize;

    fn begin(&mut self);
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;
}
