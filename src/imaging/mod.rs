//! Image processing: geometry, parameters, backends and operations.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Crop fit** | [`geometry::fit_to_crop`] (pure) |
//! | **Crop + resize** | `crop_imm` + `resize_exact` (Lanczos3) |
//! | **Encode** | PNG / JPEG / lossless WebP |
//!
//! The module is split into:
//! - **Geometry**: Rectangles and the crop-fitting algorithm (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining geometry + backend

pub mod backend;
pub mod geometry;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use geometry::{CropBox, GeometryError, fit_to_crop};
pub use operations::{
    CropChoice, CropSource, PlannedRendition, Rendition, choose_crop, get_dimensions,
    plan_renditions, render_renditions,
};
pub use params::{OutputFormat, Quality, RenderParams, RenderSettings};
pub use rust_backend::RustBackend;
