//! The derivation engine.
//!
//! [`DerivedImageManager`] owns the three collaborators (an [`EntityStore`],
//! a [`FileStore`] and an [`ImageBackend`]) and drives every image through its
//! lifecycle:
//!
//! ```text
//! create_original ──► Original (rendered)
//!                        │ add_size_set / new_derived_image
//!                        ▼
//!                  derived stub (unsaved) ── save ──► Unrendered ── render ──► Rendered
//!                                                                    ▲            │
//!                                                                    └─ re-render ┘
//! any saved image ── delete ──► gone, together with its subtree
//! ```
//!
//! ## Commit Points
//!
//! A render computes everything in memory first. New files are written next,
//! then the rows are updated inside one store transaction, and only after the
//! transaction commits are the superseded files removed. A failure before
//! the commit leaves the rows untouched and removes the new files.
//!
//! Originals are protected: re-rendering one needs `force` and yields a
//! [`PendingRender`] that changes nothing until [`DerivedImageManager::commit`].
//!
//! ## Progress
//!
//! When built [`with_events`](DerivedImageManager::with_events), the manager
//! sends a [`DeriveEvent`] for every stored original, created stub batch,
//! render, commit, deletion and skip. The CLI prints them through
//! [`output::format_derive_event`](crate::output::format_derive_event).

use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::Sender;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checksum::hash_bytes;
use crate::config::EngineConfig;
use crate::imaging::{
    BackendError, CropBox, CropChoice, CropSource, GeometryError, ImageBackend, PlannedRendition,
    RenderSettings, Rendition, choose_crop, get_dimensions, plan_renditions, render_renditions,
};
use crate::model::{Crop, CropOrigin, Image, ImageId, ImageState, OwnerRef, SizeSpecId, StoredPath};
use crate::naming::{derived_file_name, reencoded_file_name};
use crate::size::{ResolvedSize, SizeError, SizeSet, SizeSetResolver, SizeSpec};
use crate::store::{EntityStore, FileStore, StoreError};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Size(#[from] SizeError),
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Image backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is an original; re-rendering it needs force")]
    ProtectedOriginal(ImageId),
    #[error("{image} is not {expected}")]
    TypeMismatch {
        image: String,
        expected: &'static str,
    },
    #[error("{0} has neither a size nor a crop")]
    MissingSize(ImageId),
    #[error("{0} has not been rendered")]
    Unrendered(ImageId),
}

impl ManagerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;

// ============================================================================
// Events and reports
// ============================================================================

/// One stored file of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputInfo {
    /// `1` for the base rendition, the retina multiplier otherwise.
    pub scale: u32,
    pub path: String,
    pub width: u32,
    pub height: u32,
}

/// Progress events sent while the manager works.
#[derive(Debug, Clone, PartialEq)]
pub enum DeriveEvent {
    OriginalStored {
        id: ImageId,
        name: String,
        width: u32,
        height: u32,
    },
    StubsCreated {
        parent: ImageId,
        size_set: String,
        slugs: Vec<String>,
    },
    Rendered {
        id: ImageId,
        /// Size slug, or `crop-<id>` for a crop-only derivation.
        label: String,
        crop: CropBox,
        crop_source: CropSource,
        outputs: Vec<OutputInfo>,
    },
    OriginalCommitted {
        id: ImageId,
        file: String,
        width: u32,
        height: u32,
    },
    Deleted {
        root: ImageId,
        images: usize,
        files: usize,
    },
    Skipped {
        id: ImageId,
        reason: String,
    },
}

/// A re-rendered original held in memory.
///
/// Nothing is written until it is passed to
/// [`DerivedImageManager::commit`]; dropping it discards the render.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a pending render changes nothing until committed"]
pub struct PendingRender {
    pub image: ImageId,
    /// Logical name the committed file is requested under.
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Region of the current file the render was cut from.
    pub crop: CropBox,
    pub bytes: Vec<u8>,
}

impl PendingRender {
    pub fn checksum(&self) -> String {
        hash_bytes(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// A derived image, rendered and committed.
    Derived(Image),
    /// A forced original render awaiting commit.
    Original(PendingRender),
}

impl RenderOutcome {
    /// The committed image, if this was a derived render.
    pub fn into_image(self) -> Option<Image> {
        match self {
            Self::Derived(image) => Some(image),
            Self::Original(_) => None,
        }
    }
}

/// What a cascade deletion removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub images: usize,
    pub crops: usize,
    /// Manual sizes left without any image.
    pub sizes: usize,
    /// Stored files removed after the commit.
    pub files: usize,
}

/// Outcome of [`DerivedImageManager::generate_for_owner`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateReport {
    /// Stubs created and saved during reconciliation.
    pub created: usize,
    pub rendered: Vec<ImageId>,
    /// Images (or originals whose reconciliation failed) left out, with the
    /// reason. Only filled in permissive mode.
    pub skipped: Vec<(ImageId, String)>,
}

/// Everything a derived render needs, gathered before any pixel work.
struct RenderJob {
    id: ImageId,
    image: Image,
    parent_name: String,
    label: String,
    source: Vec<u8>,
    crop: CropChoice,
    plans: Vec<PlannedRendition>,
}

// ============================================================================
// Manager
// ============================================================================

pub struct DerivedImageManager<S, F, B> {
    store: S,
    files: F,
    backend: B,
    settings: RenderSettings,
    events: Option<Sender<DeriveEvent>>,
}

impl<S: EntityStore, F: FileStore, B: ImageBackend> DerivedImageManager<S, F, B> {
    pub fn new(store: S, files: F, backend: B) -> Self {
        Self {
            store,
            files,
            backend,
            settings: RenderSettings::default(),
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Send a [`DeriveEvent`] to `tx` for every step.
    pub fn with_events(mut self, tx: Sender<DeriveEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_parts(self) -> (S, F, B) {
        (self.store, self.files, self.backend)
    }

    fn emit(&self, event: DeriveEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    /// Run `f` inside a store transaction, rolling back on error.
    fn transaction<T>(&mut self, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        self.store.begin();
        match f(&mut self.store) {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.store.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Remove stored files. Failures are logged; returns how many went.
    fn remove_files(&mut self, paths: impl IntoIterator<Item = StoredPath>) -> usize {
        let mut removed = 0;
        for path in paths {
            match self.files.delete(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path, error = %err, "could not remove stored file"),
            }
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Originals and size sets
    // ------------------------------------------------------------------------

    /// Store `bytes` as a new original owned by `owner`.
    pub fn create_original(&mut self, owner: OwnerRef, name: &str, bytes: &[u8]) -> Result<Image> {
        let (width, height) = get_dimensions(&self.backend, bytes)?;
        let path = self.files.write(name, bytes)?;

        let mut image = Image::new_original(owner, name);
        image.file = Some(path.clone());
        image.width = Some(width);
        image.height = Some(height);
        image.checksum = Some(hash_bytes(bytes));

        let id = match self.store.insert_image(&image) {
            Ok(id) => id,
            Err(err) => {
                self.remove_files([path]);
                return Err(err.into());
            }
        };
        image.id = Some(id);

        info!(%id, name, width, height, "stored original");
        self.emit(DeriveEvent::OriginalStored {
            id,
            name: name.to_string(),
            width,
            height,
        });
        Ok(image)
    }

    /// Persist a size set with its sizes. Every member needs a width or a
    /// height; the missing side may come from the parent at render time.
    pub fn register_size_set(&mut self, set: SizeSet) -> Result<SizeSet> {
        for spec in &set.sizes {
            validate_size(spec, false)?;
        }
        self.store.insert_size_set(&set)?;
        let stored = self.store.find_size_set(&set.slug)?;
        debug!(slug = %stored.slug, sizes = stored.sizes.len(), "registered size set");
        Ok(stored)
    }

    /// Register the sets of a config. Sets whose slug already exists are
    /// left as they are.
    pub fn register_configured_sets(&mut self, config: &EngineConfig) -> Result<Vec<SizeSet>> {
        let mut sets = Vec::new();
        for set in config.size_sets() {
            match self.store.find_size_set(&set.slug) {
                Ok(existing) => sets.push(existing),
                Err(err) if err.is_not_found() => sets.push(self.register_size_set(set)?),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(sets)
    }

    pub fn size_sets(&self) -> Vec<SizeSet> {
        self.store.size_sets()
    }

    // ------------------------------------------------------------------------
    // Stubs
    // ------------------------------------------------------------------------

    /// Unsaved stubs for every size of the set that `parent` does not have a
    /// persisted derived image for yet. Calling it again after saving the
    /// stubs returns an empty list.
    pub fn add_size_set(&mut self, parent: ImageId, name_or_slug: &str) -> Result<Vec<Image>> {
        let set = self.store.find_size_set(name_or_slug)?;
        let parent_image = self.store.get_image(parent)?;
        let existing = self.derived_slugs(parent)?;

        let (stubs, slugs): (Vec<Image>, Vec<String>) = set
            .sizes
            .iter()
            .filter(|spec| !existing.contains(&spec.slug))
            .map(|spec| {
                (
                    Image::new_derived(&parent_image, parent, spec.id),
                    spec.slug.clone(),
                )
            })
            .unzip();

        debug!(%parent, set = %set.slug, created = stubs.len(), "reconciled size set");
        if !stubs.is_empty() {
            self.emit(DeriveEvent::StubsCreated {
                parent,
                size_set: set.slug,
                slugs,
            });
        }
        Ok(stubs)
    }

    /// [`add_size_set`](Self::add_size_set) with the set picked from the
    /// parent's owner.
    pub fn add_size_set_for(
        &mut self,
        parent: ImageId,
        resolver: &dyn SizeSetResolver,
    ) -> Result<Vec<Image>> {
        let owner = self.store.get_image(parent)?.owner;
        let key = resolver.resolve(&owner);
        self.add_size_set(parent, &key)
    }

    /// Unsaved stub under `parent` without a size.
    pub fn new_derived_image(&self, parent: ImageId) -> Result<Image> {
        let parent_image = self.store.get_image(parent)?;
        Ok(Image::new_derived(&parent_image, parent, None))
    }

    /// Persist `spec` as a manual size (no owning set) and assign it to
    /// `stub`. A saved stub is updated in place and loses a fitted crop; a
    /// manual size it no longer uses is removed. All of it commits together.
    pub fn assign_manual_size(&mut self, stub: &mut Image, spec: SizeSpec) -> Result<SizeSpec> {
        if stub.is_original() {
            return Err(ManagerError::TypeMismatch {
                image: stub
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| stub.name.clone()),
                expected: "a derived image",
            });
        }
        let mut spec = spec;
        spec.id = None;
        spec.size_set = None;
        validate_size(&spec, true)?;

        let saved = stub.id;
        let stub_size = stub.size();
        let id = self.transaction(|store| {
            let id = store.insert_size_spec(&spec)?;
            let mut previous = stub_size;
            if let Some(image) = saved {
                // Only the size changes; render results stay as stored
                let mut row = store.get_image(image)?;
                previous = row.size();
                row.set_size(id);
                store.update_image(&row)?;
                if is_fitted(store.get_crop(image)) {
                    store.delete_crop(image);
                }
            }
            if let Some(previous) = previous {
                prune_manual_size(store, previous)?;
            }
            Ok(id)
        })?;
        spec.id = Some(id);
        stub.set_size(id);
        Ok(spec)
    }

    /// Insert an unsaved image or update a saved one.
    pub fn save(&mut self, image: &mut Image) -> Result<ImageId> {
        save_row(&mut self.store, image)
    }

    /// Save every image in one transaction. On failure nothing is persisted
    /// and the images keep the ids they came in with.
    pub fn save_all(&mut self, images: &mut [Image]) -> Result<Vec<ImageId>> {
        let fresh: Vec<usize> = images
            .iter()
            .enumerate()
            .filter(|(_, image)| !image.is_saved())
            .map(|(n, _)| n)
            .collect();
        let result = self.transaction(|store| {
            images
                .iter_mut()
                .map(|image| save_row(store, image))
                .collect::<Result<Vec<_>>>()
        });
        if result.is_err() {
            for n in fresh {
                images[n].id = None;
            }
        }
        result
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub fn image(&self, id: ImageId) -> Result<Image> {
        Ok(self.store.get_image(id)?)
    }

    /// Persisted direct children of `parent`.
    pub fn derived(&self, parent: ImageId) -> Result<Vec<Image>> {
        self.store.get_image(parent)?;
        Ok(self.store.derived_of(parent))
    }

    pub fn derived_count(&self, parent: ImageId) -> Result<usize> {
        self.derived(parent).map(|children| children.len())
    }

    pub fn originals_for(&self, owner: &OwnerRef) -> Vec<Image> {
        self.store
            .images_by_owner(owner)
            .into_iter()
            .filter(Image::is_original)
            .collect()
    }

    pub fn crop(&self, id: ImageId) -> Option<CropBox> {
        self.store.get_crop(id).map(|crop| crop.rect)
    }

    pub fn size_spec(&self, id: SizeSpecId) -> Result<SizeSpec> {
        Ok(self.store.get_size_spec(id)?)
    }

    /// Whether `parent` has a persisted derived image for size `slug`.
    pub fn has_size(&self, parent: ImageId, slug: &str) -> Result<bool> {
        self.store.get_image(parent)?;
        Ok(self.derived_slugs(parent)?.contains(slug))
    }

    /// Bytes of an image's 1x file.
    pub fn read(&self, image: &Image) -> Result<Vec<u8>> {
        let file = match (&image.file, image.id) {
            (Some(file), _) => file,
            (None, Some(id)) => return Err(ManagerError::Unrendered(id)),
            (None, None) => return Err(StoreError::Unsaved("image").into()),
        };
        Ok(self.files.read(file)?)
    }

    fn derived_slugs(&self, parent: ImageId) -> Result<HashSet<String>> {
        self.store
            .derived_of(parent)
            .iter()
            .filter_map(Image::size)
            .map(|size| self.store.get_size_spec(size).map(|spec| spec.slug))
            .collect::<std::result::Result<_, _>>()
            .map_err(Into::into)
    }

    // ------------------------------------------------------------------------
    // Crops
    // ------------------------------------------------------------------------

    /// Store the crop of `id` without rendering. Derived crops are checked
    /// against the parent's bounds, an original's against its own.
    pub fn set_crop(&mut self, id: ImageId, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Image> {
        let image = self.store.get_image(id)?;
        let (frame_id, frame) = match image.parent() {
            Some(parent) => (parent, self.store.get_image(parent)?),
            None => (id, image.clone()),
        };
        let (width, height) = frame
            .dimensions()
            .ok_or(ManagerError::Unrendered(frame_id))?;
        let rect = CropBox::new(x1, y1, x2, y2)?.validate_within(width, height)?;
        self.store.put_crop(Crop::manual(id, rect))?;
        debug!(%id, %rect, "stored crop");
        Ok(image)
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Render `id` from its parent. Originals need `force` and come back as a
    /// [`PendingRender`] reshaped by their stored crop, if any.
    pub fn render(&mut self, id: ImageId, force: bool) -> Result<RenderOutcome> {
        let image = self.store.get_image(id)?;
        if image.is_original() {
            return self
                .render_original(id, None, force)
                .map(RenderOutcome::Original);
        }
        let job = self.plan_derived(image)?;
        let renditions = render_renditions(&self.backend, &job.source, &job.plans)?;
        self.commit_derived(job, renditions)
            .map(RenderOutcome::Derived)
    }

    /// Re-render an original, optionally reshaped to `target`.
    ///
    /// The crop is the original's stored crop when present, else `target`
    /// fitted into the full image. Without a target the output keeps the
    /// crop's size. The stored file is untouched until [`commit`](Self::commit).
    pub fn render_original(
        &mut self,
        id: ImageId,
        target: Option<&SizeSpec>,
        force: bool,
    ) -> Result<PendingRender> {
        let image = self.store.get_image(id)?;
        if !image.is_original() {
            return Err(ManagerError::TypeMismatch {
                image: id.to_string(),
                expected: "an original",
            });
        }
        if !force {
            return Err(ManagerError::ProtectedOriginal(id));
        }
        let (bounds, file) = match (image.bounds(), &image.file) {
            (Some(bounds), Some(file)) => (bounds, file),
            _ => return Err(ManagerError::Unrendered(id)),
        };

        let resolved = match target {
            Some(spec) => spec.resolve_with_fallback(image.exact_aspect_ratio())?,
            None => None,
        };
        let stored = self.store.get_crop(id);
        let refit = target.is_some_and(|spec| spec.auto_crop) || is_fitted(stored);
        let crop = choose_crop(bounds, stored.map(|c| c.rect), resolved.as_ref(), refit)?;
        let size = resolved.unwrap_or_else(|| {
            ResolvedSize::from_dimensions(crop.rect.width(), crop.rect.height())
        });

        let plans = plan_renditions(crop.rect, size, false, &self.settings);
        let source = self.files.read(file)?;
        let rendition = render_renditions(&self.backend, &source, &plans)?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::ProcessingFailed("render produced no output".into()))?;

        debug!(%id, width = rendition.width, height = rendition.height, "rendered original, pending commit");
        Ok(PendingRender {
            image: id,
            name: reencoded_file_name(&image.name, self.settings.format.extension()),
            width: rendition.width,
            height: rendition.height,
            crop: crop.rect,
            bytes: rendition.bytes,
        })
    }

    /// Store a pending original render.
    ///
    /// Writes the new file, updates the row, and clears the original's own
    /// crop together with every fitted crop of its direct children and the
    /// crops of `auto_crop` children, so they are re-fitted on their next
    /// render. Manual crops on other sizes are kept. The superseded file is
    /// removed after the commit.
    pub fn commit(&mut self, pending: PendingRender) -> Result<Image> {
        let id = pending.image;
        let mut image = self.store.get_image(id)?;
        if !image.is_original() {
            return Err(ManagerError::TypeMismatch {
                image: id.to_string(),
                expected: "an original",
            });
        }

        let mut refit_children = Vec::new();
        for child in self.store.derived_of(id) {
            let Some(child_id) = child.id else { continue };
            let auto_crop = match child.size() {
                Some(size) => self.store.get_size_spec(size)?.auto_crop,
                None => false,
            };
            if auto_crop || is_fitted(self.store.get_crop(child_id)) {
                refit_children.push(child_id);
            }
        }

        let path = self.files.write(&pending.name, &pending.bytes)?;
        let previous = image.file.replace(path.clone());
        image.name = pending.name;
        image.width = Some(pending.width);
        image.height = Some(pending.height);
        image.checksum = Some(hash_bytes(&pending.bytes));

        let row = image.clone();
        let result = self.transaction(|store| {
            store.update_image(&row)?;
            store.delete_crop(id);
            for child in &refit_children {
                store.delete_crop(*child);
            }
            Ok(())
        });
        if let Err(err) = result {
            self.remove_files([path]);
            return Err(err);
        }
        self.remove_files(previous.into_iter().filter(|old| *old != path));

        info!(%id, file = %path, width = pending.width, height = pending.height, "committed original");
        self.emit(DeriveEvent::OriginalCommitted {
            id,
            file: path.to_string(),
            width: pending.width,
            height: pending.height,
        });
        Ok(image)
    }

    /// Render several derived images.
    ///
    /// Every render is planned first, the pixel work runs on rayon's pool,
    /// and the results are committed in order. Any planning or render
    /// failure returns before anything is committed.
    pub fn render_many(&mut self, ids: &[ImageId]) -> Result<Vec<Image>> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            let image = self.store.get_image(id)?;
            if image.is_original() {
                return Err(ManagerError::ProtectedOriginal(id));
            }
            jobs.push(self.plan_derived(image)?);
        }

        let backend = &self.backend;
        let rendered: Vec<Vec<Rendition>> = jobs
            .par_iter()
            .map(|job| render_renditions(backend, &job.source, &job.plans))
            .collect::<std::result::Result<_, _>>()?;
        debug!(count = jobs.len(), "rendered batch");

        jobs.into_iter()
            .zip(rendered)
            .map(|(job, renditions)| self.commit_derived(job, renditions))
            .collect()
    }

    fn plan_derived(&self, image: Image) -> Result<RenderJob> {
        let id = image.id.ok_or(StoreError::Unsaved("image"))?;
        let parent_id = image.parent().ok_or(ManagerError::ProtectedOriginal(id))?;
        let parent = self.store.get_image(parent_id)?;
        let (bounds, parent_file) = match (parent.bounds(), &parent.file) {
            (Some(bounds), Some(file)) => (bounds, file.clone()),
            _ => return Err(ManagerError::Unrendered(parent_id)),
        };

        let spec = image
            .size()
            .map(|size| self.store.get_size_spec(size))
            .transpose()?;
        let stored_crop = self.store.get_crop(id);
        let stored = stored_crop.map(|crop| crop.rect);
        let target = match &spec {
            Some(spec) => spec.resolve_with_fallback(parent.exact_aspect_ratio())?,
            None if stored.is_some() => None,
            None => return Err(ManagerError::MissingSize(id)),
        };

        let refit = spec.as_ref().is_some_and(|spec| spec.auto_crop) || is_fitted(stored_crop);
        let crop = choose_crop(bounds, stored, target.as_ref(), refit)?;
        let target = target.unwrap_or_else(|| {
            ResolvedSize::from_dimensions(crop.rect.width(), crop.rect.height())
        });
        let retina = spec.as_ref().is_some_and(|spec| spec.retina);
        let plans = plan_renditions(crop.rect, target, retina, &self.settings);
        let label = spec
            .map(|spec| spec.slug)
            .unwrap_or_else(|| format!("crop-{}", id.0));
        let source = self.files.read(&parent_file)?;

        Ok(RenderJob {
            id,
            image,
            parent_name: parent.name,
            label,
            source,
            crop,
            plans,
        })
    }

    fn commit_derived(&mut self, job: RenderJob, renditions: Vec<Rendition>) -> Result<Image> {
        let RenderJob {
            id,
            mut image,
            parent_name,
            label,
            crop,
            ..
        } = job;
        let Some(base) = renditions.first() else {
            return Err(BackendError::ProcessingFailed("render produced no output".into()).into());
        };
        let ext = self.settings.format.extension();

        let mut written = Vec::with_capacity(renditions.len());
        for rendition in &renditions {
            let name = derived_file_name(&parent_name, &label, rendition.scale, ext);
            match self.files.write(&name, &rendition.bytes) {
                Ok(path) => written.push(path),
                Err(err) => {
                    self.remove_files(written);
                    return Err(err.into());
                }
            }
        }

        let previous: Vec<StoredPath> = image
            .file
            .take()
            .into_iter()
            .chain(image.retina_file.take())
            .filter(|old| !written.contains(old))
            .collect();
        image.name = derived_file_name(&parent_name, &label, 1, ext);
        image.file = written.first().cloned();
        image.retina_file = written.get(1).cloned();
        image.width = Some(base.width);
        image.height = Some(base.height);
        image.checksum = Some(hash_bytes(&base.bytes));

        let row = image.clone();
        let result = self.transaction(|store| {
            if crop.source == CropSource::Fitted {
                store.put_crop(Crop::fitted(id, crop.rect))?;
            }
            store.update_image(&row)?;
            Ok(())
        });
        if let Err(err) = result {
            self.remove_files(written);
            return Err(err);
        }
        self.remove_files(previous);

        info!(%id, label = %label, width = base.width, height = base.height, "rendered derived image");
        self.emit(DeriveEvent::Rendered {
            id,
            label,
            crop: crop.rect,
            crop_source: crop.source,
            outputs: renditions
                .iter()
                .zip(&written)
                .map(|(rendition, path)| OutputInfo {
                    scale: rendition.scale,
                    path: path.to_string(),
                    width: rendition.width,
                    height: rendition.height,
                })
                .collect(),
        });
        Ok(image)
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Delete `id` and everything derived from it.
    pub fn delete(&mut self, id: ImageId) -> Result<DeleteReport> {
        self.delete_subtree(id)
    }

    /// Delete `id` and its descendants with their crops in one transaction,
    /// then drop manual sizes no image references any more. Stored files go
    /// after the commit.
    pub fn delete_subtree(&mut self, id: ImageId) -> Result<DeleteReport> {
        let root = self.store.get_image(id)?;
        let subtree = self.collect_subtree(root);

        let mut report = self.transaction(|store| {
            let mut report = DeleteReport::default();
            let mut sizes = Vec::new();
            // Children before parents
            for image in subtree.iter().rev() {
                let Some(image_id) = image.id else { continue };
                if store.delete_crop(image_id) {
                    report.crops += 1;
                }
                store.delete_image(image_id)?;
                report.images += 1;
                if let Some(size) = image.size()
                    && !sizes.contains(&size)
                {
                    sizes.push(size);
                }
            }
            for size in sizes {
                if prune_manual_size(store, size)? {
                    report.sizes += 1;
                }
            }
            Ok(report)
        })?;

        let files: Vec<StoredPath> = subtree
            .iter()
            .flat_map(|image| image.file.iter().chain(image.retina_file.iter()))
            .cloned()
            .collect();
        report.files = self.remove_files(files);

        info!(%id, images = report.images, files = report.files, "deleted image subtree");
        self.emit(DeriveEvent::Deleted {
            root: id,
            images: report.images,
            files: report.files,
        });
        Ok(report)
    }

    /// `root` followed by its descendants, breadth first.
    fn collect_subtree(&self, root: Image) -> Vec<Image> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(image) = queue.pop_front() {
            if let Some(id) = image.id {
                queue.extend(self.store.derived_of(id));
            }
            order.push(image);
        }
        order
    }

    // ------------------------------------------------------------------------
    // Bulk generation
    // ------------------------------------------------------------------------

    /// Reconcile every original of `owner` against the set picked by
    /// `resolver`, save the new stubs, and render each unrendered derived
    /// image.
    ///
    /// Strict mode returns the first error. Permissive mode logs failures,
    /// reports them as skipped, and carries on.
    pub fn generate_for_owner(
        &mut self,
        owner: &OwnerRef,
        resolver: &dyn SizeSetResolver,
        permissive: bool,
    ) -> Result<GenerateReport> {
        let mut report = GenerateReport::default();
        for original in self.originals_for(owner) {
            let Some(id) = original.id else { continue };
            match self.reconcile(id, resolver) {
                Ok(created) => report.created += created,
                Err(err) if permissive => {
                    self.skip(id, &err, &mut report);
                    continue;
                }
                Err(err) => return Err(err),
            }

            let unrendered: Vec<ImageId> = self
                .store
                .derived_of(id)
                .into_iter()
                .filter(|child| child.state() == ImageState::Unrendered)
                .filter_map(|child| child.id)
                .collect();
            for child in unrendered {
                match self.render(child, false) {
                    Ok(_) => report.rendered.push(child),
                    Err(err) if permissive => self.skip(child, &err, &mut report),
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(report)
    }

    fn reconcile(&mut self, id: ImageId, resolver: &dyn SizeSetResolver) -> Result<usize> {
        let mut stubs = self.add_size_set_for(id, resolver)?;
        self.save_all(&mut stubs)?;
        Ok(stubs.len())
    }

    fn skip(&self, id: ImageId, err: &ManagerError, report: &mut GenerateReport) {
        warn!(%id, error = %err, "skipping image");
        report.skipped.push((id, err.to_string()));
        self.emit(DeriveEvent::Skipped {
            id,
            reason: err.to_string(),
        });
    }
}

fn is_fitted(crop: Option<Crop>) -> bool {
    crop.is_some_and(|crop| crop.origin == CropOrigin::Fitted)
}

fn save_row<S: EntityStore>(store: &mut S, image: &mut Image) -> Result<ImageId> {
    match image.id {
        Some(id) => {
            store.update_image(image)?;
            Ok(id)
        }
        None => {
            let id = store.insert_image(image)?;
            image.id = Some(id);
            Ok(id)
        }
    }
}

/// Delete `size` if it is manual and no image references it.
fn prune_manual_size<S: EntityStore>(store: &mut S, size: SizeSpecId) -> Result<bool> {
    let spec = store.get_size_spec(size)?;
    if spec.is_manual() && store.count_images_with_size(size) == 0 {
        store.delete_size_spec(size)?;
        debug!(%size, slug = %spec.slug, "removed unreferenced manual size");
        return Ok(true);
    }
    Ok(false)
}

/// Check a size can be resolved once a parent ratio is known. A size with
/// neither width nor height only resolves against a crop.
fn validate_size(spec: &SizeSpec, allow_crop_only: bool) -> std::result::Result<(), SizeError> {
    match spec.resolve_with_fallback(Some(1.0))? {
        None if !allow_crop_only => Err(SizeError::InsufficientSizeData {
            slug: spec.slug.clone(),
        }),
        _ => Ok(()),
    }
}
