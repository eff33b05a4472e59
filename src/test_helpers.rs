//! Shared test utilities for the cropset test suite.
//!
//! Provides synthetic source images, the stock size sets used across the
//! manager tests, ready-made managers over in-memory collaborators, and a
//! store that fails on demand for rollback tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut manager = mock_manager(&[(640, 480)]);
//! manager.register_size_set(facebook_set()).unwrap();
//! let original = manager
//!     .create_original(owner(), "dawn.jpg", b"source")
//!     .unwrap();
//! ```

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::imaging::backend::tests::MockBackend;
use crate::imaging::{Dimensions, RustBackend};
use crate::manager::DerivedImageManager;
use crate::model::{Crop, Image, ImageId, OwnerRef, SizeSetId, SizeSpecId};
use crate::size::{SizeSet, SizeSpec};
use crate::store::{EntityStore, MemoryFileStore, MemoryStore, StoreError};

// =========================================================================
// Source images
// =========================================================================

/// Encode a `width` x `height` PNG whose pixels vary along both axes, so any
/// change of crop shows up in the output bytes.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

// =========================================================================
// Size sets
// =========================================================================

/// `facebook`: a 60x60 auto-cropped retina thumb and a 1024 wide 1.3 banner.
pub fn facebook_set() -> SizeSet {
    SizeSet::new("Facebook")
        .with_size(
            SizeSpec::new("Thumbnail")
                .with_slug("thumb")
                .with_width(60)
                .with_height(60)
                .with_auto_crop(true)
                .with_retina(true),
        )
        .with_size(
            SizeSpec::new("Banner")
                .with_width(1024)
                .with_aspect_ratio(1.3),
        )
}

/// `mobile`: a single 500x400 auto-cropped retina headline.
pub fn mobile_set() -> SizeSet {
    SizeSet::new("Mobile").with_size(
        SizeSpec::new("Headline")
            .with_width(500)
            .with_height(400)
            .with_auto_crop(true)
            .with_retina(true),
    )
}

pub fn owner() -> OwnerRef {
    OwnerRef::new("post:1")
}

// =========================================================================
// Managers
// =========================================================================

pub type MockManager = DerivedImageManager<MemoryStore, MemoryFileStore, MockBackend>;

/// Manager over a mock backend. `originals` are the dimensions reported for
/// successive `create_original` calls, in call order.
pub fn mock_manager(originals: &[(u32, u32)]) -> MockManager {
    let dims = originals
        .iter()
        .rev()
        .map(|&(width, height)| Dimensions { width, height })
        .collect();
    DerivedImageManager::new(
        MemoryStore::new(),
        MemoryFileStore::new(),
        MockBackend::with_dimensions(dims),
    )
}

/// Manager over the real codec, for tests that look at pixels.
pub fn pixel_manager() -> DerivedImageManager<MemoryStore, MemoryFileStore, RustBackend> {
    DerivedImageManager::new(MemoryStore::new(), MemoryFileStore::new(), RustBackend::new())
}

// =========================================================================
// Failing store
// =========================================================================

/// [`MemoryStore`] that fails chosen writes, to exercise rollbacks.
///
/// Build the scenario on a plain manager, then move its store in here with
/// [`DerivedImageManager::into_parts`].
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_delete_image_at: Option<usize>,
    fail_image_updates: bool,
    deletes: usize,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_delete_image_at: None,
            fail_image_updates: false,
            deletes: 0,
        }
    }

    /// Fail the `n`th `delete_image` call, counting from 1.
    pub fn fail_delete_image_at(mut self, n: usize) -> Self {
        self.fail_delete_image_at = Some(n);
        self
    }

    pub fn fail_image_updates(mut self) -> Self {
        self.fail_image_updates = true;
        self
    }

    fn injected(key: impl ToString) -> StoreError {
        StoreError::not_found("injected failure", key)
    }
}

impl EntityStore for FailingStore {
    fn insert_image(&mut self, image: &Image) -> Result<ImageId, StoreError> {
        self.inner.insert_image(image)
    }

    fn update_image(&mut self, image: &Image) -> Result<(), StoreError> {
        if self.fail_image_updates {
            return Err(Self::injected(&image.name));
        }
        self.inner.update_image(image)
    }

    fn get_image(&self, id: ImageId) -> Result<Image, StoreError> {
        self.inner.get_image(id)
    }

    fn delete_image(&mut self, id: ImageId) -> Result<(), StoreError> {
        self.deletes += 1;
        if self.fail_delete_image_at == Some(self.deletes) {
            return Err(Self::injected(id));
        }
        self.inner.delete_image(id)
    }

    fn derived_of(&self, parent: ImageId) -> Vec<Image> {
        self.inner.derived_of(parent)
    }

    fn images_by_owner(&self, owner: &OwnerRef) -> Vec<Image> {
        self.inner.images_by_owner(owner)
    }

    fn count_images(&self) -> usize {
        self.inner.count_images()
    }

    fn count_images_with_size(&self, size: SizeSpecId) -> usize {
        self.inner.count_images_with_size(size)
    }

    fn insert_size_spec(&mut self, spec: &SizeSpec) -> Result<SizeSpecId, StoreError> {
        self.inner.insert_size_spec(spec)
    }

    fn get_size_spec(&self, id: SizeSpecId) -> Result<SizeSpec, StoreError> {
        self.inner.get_size_spec(id)
    }

    fn delete_size_spec(&mut self, id: SizeSpecId) -> Result<(), StoreError> {
        self.inner.delete_size_spec(id)
    }

    fn count_size_specs(&self) -> usize {
        self.inner.count_size_specs()
    }

    fn insert_size_set(&mut self, set: &SizeSet) -> Result<SizeSetId, StoreError> {
        self.inner.insert_size_set(set)
    }

    fn find_size_set(&self, name_or_slug: &str) -> Result<SizeSet, StoreError> {
        self.inner.find_size_set(name_or_slug)
    }

    fn size_sets(&self) -> Vec<SizeSet> {
        self.inner.size_sets()
    }

    fn get_crop(&self, image: ImageId) -> Option<Crop> {
        self.inner.get_crop(image)
    }

    fn put_crop(&mut self, crop: Crop) -> Result<(), StoreError> {
        self.inner.put_crop(crop)
    }

    fn delete_crop(&mut self, image: ImageId) -> bool {
        self.inner.delete_crop(image)
    }

    fn count_crops(&self) -> usize {
        self.inner.count_crops()
    }

    fn begin(&mut self) {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}
