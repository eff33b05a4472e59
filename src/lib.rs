//! # cropset
//!
//! A derived image engine. Given an original raster image and a named set of
//! target sizes, cropset crops and resizes the original into child images,
//! tracks how they relate, and keeps them consistent as sizes and crops
//! change.
//!
//! # Architecture
//!
//! ```text
//! SizeSet ─► SizeSpec::resolve ─► fit_to_crop ─► Crop ─► render ─► FileStore
//!                                                                    │
//!                                   Image rows, crops, sizes ─► EntityStore
//! ```
//!
//! The [`DerivedImageManager`](manager::DerivedImageManager) sits on top and
//! owns the lifecycle: reconciling size sets, manual derivations, rendering
//! and re-rendering, and cascade deletion. Storage and pixel work are
//! collaborators behind traits, so the manager runs the same against the
//! in-memory stores in tests and against a directory on disk in the CLI.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`size`] | `SizeSpec` resolution, `SizeSet`, and the `SizeSetResolver` seam |
//! | [`imaging`] | Crop geometry, render planning, and the `image`-crate backend |
//! | [`manager`] | The derivation engine: lifecycle, reconciliation, cascade deletion |
//! | [`store`] | Entity store and file store traits with in-memory and on-disk implementations |
//! | [`model`] | `Image`, `Crop`, ids and owner references |
//! | [`config`] | `cropset.toml` loading, validation, and merging over stock defaults |
//! | [`naming`] | Slugs and derived file names |
//! | [`checksum`] | SHA-256 content hashes of stored files |
//! | [`output`] | CLI output formatting for manager events and size listings |
//!
//! # Design Decisions
//!
//! ## Originals Are Protected
//!
//! Rendering never writes over an original. A forced re-render of an original
//! produces a [`PendingRender`](manager::PendingRender) held in memory; only
//! an explicit commit replaces the stored file. File stores never overwrite
//! either: a taken name gets a numbered variant, and superseded files are
//! removed only after the rows pointing at the new ones are committed.
//!
//! ## Rounding
//!
//! Missing dimensions are computed with `f64::round` (half away from zero) on
//! the floating point quotient, so a 100px wide size with aspect ratio 1.6 is
//! 62px tall. Aspect ratios are kept to two decimals.
//!
//! ## Serialised Mutation
//!
//! Every mutating manager operation takes `&mut self`, so at most one
//! mutation of the image graph runs at a time. Only the pixel work of
//! [`render_many`](manager::DerivedImageManager::render_many) is parallel.

pub mod checksum;
pub mod config;
pub mod imaging;
pub mod manager;
pub mod model;
pub mod naming;
pub mod output;
pub mod size;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
