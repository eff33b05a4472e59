//! In-memory entity store.
//!
//! Transactions snapshot the tables on [`begin`](EntityStore::begin) and
//! restore the snapshot on [`rollback`](EntityStore::rollback). Nested
//! transactions stack.

use super::entity::{EntityStore, StoreError};
use crate::model::{Crop, Image, ImageId, OwnerRef, SizeSetId, SizeSpecId};
use crate::size::{SizeSet, SizeSpec};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct SizeSetRow {
    name: String,
    slug: String,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    images: BTreeMap<ImageId, Image>,
    sizes: BTreeMap<SizeSpecId, SizeSpec>,
    size_sets: BTreeMap<SizeSetId, SizeSetRow>,
    crops: BTreeMap<ImageId, Crop>,
    next_id: u64,
}

impl Tables {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn set_members(&self, set: SizeSetId) -> Vec<SizeSpec> {
        self.sizes
            .values()
            .filter(|s| s.size_set == Some(set))
            .cloned()
            .collect()
    }

    fn assemble_set(&self, id: SizeSetId, row: &SizeSetRow) -> SizeSet {
        SizeSet {
            id: Some(id),
            name: row.name.clone(),
            slug: row.slug.clone(),
            sizes: self.set_members(id),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    snapshots: Vec<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        !self.snapshots.is_empty()
    }
}

impl EntityStore for MemoryStore {
    fn insert_image(&mut self, image: &Image) -> Result<ImageId, StoreError> {
        if let Some(parent) = image.parent()
            && !self.tables.images.contains_key(&parent)
        {
            return Err(StoreError::not_found("image", parent));
        }
        let id = ImageId(self.tables.next());
        let mut row = image.clone();
        row.id = Some(id);
        self.tables.images.insert(id, row);
        Ok(id)
    }

    fn update_image(&mut self, image: &Image) -> Result<(), StoreError> {
        let id = image.id.ok_or(StoreError::Unsaved("image"))?;
        let row = self
            .tables
            .images
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("image", id))?;
        *row = image.clone();
        Ok(())
    }

    fn get_image(&self, id: ImageId) -> Result<Image, StoreError> {
        self.tables
            .images
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("image", id))
    }

    fn delete_image(&mut self, id: ImageId) -> Result<(), StoreError> {
        self.tables
            .images
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("image", id))
    }

    fn derived_of(&self, parent: ImageId) -> Vec<Image> {
        self.tables
            .images
            .values()
            .filter(|img| img.parent() == Some(parent))
            .cloned()
            .collect()
    }

    fn images_by_owner(&self, owner: &OwnerRef) -> Vec<Image> {
        self.tables
            .images
            .values()
            .filter(|img| &img.owner == owner)
            .cloned()
            .collect()
    }

    fn count_images(&self) -> usize {
        self.tables.images.len()
    }

    fn count_images_with_size(&self, size: SizeSpecId) -> usize {
        self.tables
            .images
            .values()
            .filter(|img| img.size() == Some(size))
            .count()
    }

    fn insert_size_spec(&mut self, spec: &SizeSpec) -> Result<SizeSpecId, StoreError> {
        if let Some(set) = spec.size_set {
            if !self.tables.size_sets.contains_key(&set) {
                return Err(StoreError::not_found("size set", set));
            }
            if self
                .tables
                .sizes
                .values()
                .any(|s| s.size_set == Some(set) && s.slug == spec.slug)
            {
                return Err(StoreError::Duplicate {
                    kind: "size",
                    key: spec.slug.clone(),
                });
            }
        }
        let id = SizeSpecId(self.tables.next());
        let mut row = spec.clone();
        row.id = Some(id);
        self.tables.sizes.insert(id, row);
        Ok(id)
    }

    fn get_size_spec(&self, id: SizeSpecId) -> Result<SizeSpec, StoreError> {
        self.tables
            .sizes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("size", id))
    }

    fn delete_size_spec(&mut self, id: SizeSpecId) -> Result<(), StoreError> {
        self.tables
            .sizes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("size", id))
    }

    fn count_size_specs(&self) -> usize {
        self.tables.sizes.len()
    }

    fn insert_size_set(&mut self, set: &SizeSet) -> Result<SizeSetId, StoreError> {
        if self
            .tables
            .size_sets
            .values()
            .any(|row| row.slug == set.slug || row.name == set.name)
        {
            return Err(StoreError::Duplicate {
                kind: "size set",
                key: set.slug.clone(),
            });
        }
        // Validate members before touching any table
        for (i, size) in set.sizes.iter().enumerate() {
            if set.sizes[..i].iter().any(|s| s.slug == size.slug) {
                return Err(StoreError::Duplicate {
                    kind: "size",
                    key: size.slug.clone(),
                });
            }
        }

        let id = SizeSetId(self.tables.next());
        self.tables.size_sets.insert(
            id,
            SizeSetRow {
                name: set.name.clone(),
                slug: set.slug.clone(),
            },
        );
        for size in &set.sizes {
            let mut member = size.clone();
            member.size_set = Some(id);
            self.insert_size_spec(&member)?;
        }
        Ok(id)
    }

    fn find_size_set(&self, name_or_slug: &str) -> Result<SizeSet, StoreError> {
        self.tables
            .size_sets
            .iter()
            .find(|(_, row)| row.slug == name_or_slug || row.name == name_or_slug)
            .map(|(id, row)| self.tables.assemble_set(*id, row))
            .ok_or_else(|| StoreError::not_found("size set", name_or_slug))
    }

    fn size_sets(&self) -> Vec<SizeSet> {
        self.tables
            .size_sets
            .iter()
            .map(|(id, row)| self.tables.assemble_set(*id, row))
            .collect()
    }

    fn get_crop(&self, image: ImageId) -> Option<Crop> {
        self.tables.crops.get(&image).copied()
    }

    fn put_crop(&mut self, crop: Crop) -> Result<(), StoreError> {
        if !self.tables.images.contains_key(&crop.image) {
            return Err(StoreError::not_found("image", crop.image));
        }
        self.tables.crops.insert(crop.image, crop);
        Ok(())
    }

    fn delete_crop(&mut self, image: ImageId) -> bool {
        self.tables.crops.remove(&image).is_some()
    }

    fn count_crops(&self) -> usize {
        self.tables.crops.len()
    }

    fn begin(&mut self) {
        self.snapshots.push(self.tables.clone());
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshots
            .pop()
            .map(|_| ())
            .ok_or(StoreError::NoTransaction)
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let snapshot = self.snapshots.pop().ok_or(StoreError::NoTransaction)?;
        self.tables = snapshot;
        Ok(())
    }
}
