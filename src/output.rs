//! CLI output formatting for manager events and size listings.
//!
//! # Entity Display Contract
//!
//! Every image is shown by its id first, with files and crops as indented
//! context lines. Derived images are indented one level under the original
//! they were cut from, so a `derive` run reads as a tree:
//!
//! ```text
//! image#1 photos/dawn.jpg (640x480)
//!     image#1 + facebook: thumb, banner
//!     image#4 thumb
//!         Crop: (80, 0)-(560, 480) fitted
//!         1x: photos/dawn-thumb.png (60x60)
//!         2x: photos/dawn-thumb@2x.png (120x120)
//!     image#5 banner
//!         Crop: (8, 0)-(632, 480) fitted
//!         1x: photos/dawn-banner.png (1024x788)
//! ```
//!
//! ## Sizes
//!
//! ```text
//! facebook (Facebook)
//!     thumb 60x60 auto-crop retina
//!     banner 1024x788
//! ```
//!
//! # Architecture
//!
//! Each listing has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::imaging::CropSource;
use crate::manager::DeriveEvent;
use crate::size::{SizeSet, SizeSpec};

fn crop_source_label(source: CropSource) -> &'static str {
    match source {
        CropSource::Stored => "stored",
        CropSource::Fitted => "fitted",
    }
}

/// Short dimension summary of a size, as configured.
///
/// - width + height (or one side + ratio) → `60x60`
/// - width only → `100 wide`
/// - height only → `100 tall`
/// - nothing → `crop size`
fn size_dimensions(spec: &SizeSpec) -> String {
    if let Ok(resolved) = spec.resolve() {
        return format!("{}x{}", resolved.width, resolved.height);
    }
    match (spec.width, spec.height) {
        (Some(w), _) => format!("{} wide", w),
        (_, Some(h)) => format!("{} tall", h),
        _ => "crop size".to_string(),
    }
}

// ============================================================================
// Derive events
// ============================================================================

/// Format a single manager event as display lines.
pub fn format_derive_event(event: &DeriveEvent) -> Vec<String> {
    match event {
        DeriveEvent::OriginalStored {
            id,
            name,
            width,
            height,
        } => vec![format!("{} {} ({}x{})", id, name, width, height)],
        DeriveEvent::StubsCreated {
            parent,
            size_set,
            slugs,
        } => vec![format!("    {} + {}: {}", parent, size_set, slugs.join(", "))],
        DeriveEvent::Rendered {
            id,
            label,
            crop,
            crop_source,
            outputs,
        } => {
            let mut lines = vec![
                format!("    {} {}", id, label),
                format!("        Crop: {} {}", crop, crop_source_label(*crop_source)),
            ];
            for output in outputs {
                lines.push(format!(
                    "        {}x: {} ({}x{})",
                    output.scale, output.path, output.width, output.height
                ));
            }
            lines
        }
        DeriveEvent::OriginalCommitted {
            id,
            file,
            width,
            height,
        } => vec![format!("{} → {} ({}x{})", id, file, width, height)],
        DeriveEvent::Deleted {
            root,
            images,
            files,
        } => vec![format!(
            "Deleted {}: {} {}, {} {}",
            root,
            images,
            plural(*images, "image", "images"),
            files,
            plural(*files, "file", "files")
        )],
        DeriveEvent::Skipped { id, reason } => vec![format!("    {} skipped: {}", id, reason)],
    }
}

fn plural(n: usize, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 { one } else { many }
}

// ============================================================================
// Size listings
// ============================================================================

/// Format registered size sets with their sizes in order.
pub fn format_size_sets(sets: &[SizeSet]) -> Vec<String> {
    if sets.is_empty() {
        return vec!["No size sets configured".to_string()];
    }
    let mut lines = Vec::new();
    for set in sets {
        lines.push(format!("{} ({})", set.slug, set.name));
        for spec in &set.sizes {
            let mut line = format!("    {} {}", spec.slug, size_dimensions(spec));
            if spec.auto_crop {
                line.push_str(" auto-crop");
            }
            if spec.retina {
                line.push_str(" retina");
            }
            lines.push(line);
        }
    }
    lines
}

pub fn print_size_sets(sets: &[SizeSet]) {
    for line in format_size_sets(sets) {
        println!("{}", line);
    }
}
