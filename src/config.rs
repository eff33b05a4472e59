//! Engine configuration.
//!
//! Handles loading, validating, and merging `cropset.toml`. User files are
//! sparse: they are merged over the stock defaults, so a file that only sets
//! `[output] format = "jpeg"` keeps every other default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! format = "png"            # png | jpeg | webp (lossless)
//! quality = 90              # JPEG quality (1-100)
//!
//! [retina]
//! scale = 2                 # Multiplier of the high-resolution pass
//!
//! [processing]
//! max_processes = 4         # Max parallel renders (omit for auto = CPU cores)
//!
//! [[size_sets]]
//! name = "Facebook"
//! slug = "facebook"         # Optional, derived from name
//!
//! [[size_sets.sizes]]
//! name = "Thumbnail"
//! slug = "thumb"
//! width = 60
//! height = 60
//! auto_crop = true
//! retina = true
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{OutputFormat, Quality, RenderSettings};
use crate::naming::slugify;
use crate::size::{SizeSet, SizeSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `cropset.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Encoding of rendered images.
    pub output: OutputConfig,
    /// High-resolution pass settings.
    pub retina: RetinaConfig,
    /// Parallel rendering settings.
    pub processing: ProcessingConfig,
    /// Size sets registered at startup.
    pub size_sets: Vec<SizeSetConfig>,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if !(1..=4).contains(&self.retina.scale) {
            return Err(ConfigError::Validation("retina.scale must be 1-4".into()));
        }
        let mut set_slugs = HashSet::new();
        for set in &self.size_sets {
            let set_slug = set.slug();
            if set_slug.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "size set '{}' has an empty slug",
                    set.name
                )));
            }
            if !set_slugs.insert(set_slug.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate size set slug '{}'",
                    set_slug
                )));
            }
            let mut size_slugs = HashSet::new();
            for size in &set.sizes {
                size.validate(&set_slug)?;
                if !size_slugs.insert(size.slug()) {
                    return Err(ConfigError::Validation(format!(
                        "duplicate size slug '{}' in size set '{}'",
                        size.slug(),
                        set_slug
                    )));
                }
            }
        }
        Ok(())
    }

    /// Encoding settings for the manager.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            format: self.output.format,
            quality: Quality::new(self.output.quality),
            retina_scale: self.retina.scale,
        }
    }

    /// Configured size sets as unsaved entities.
    pub fn size_sets(&self) -> Vec<SizeSet> {
        self.size_sets.iter().map(SizeSetConfig::to_size_set).collect()
    }
}

/// Output encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// JPEG quality (1 = worst, 100 = best). Ignored for PNG and WebP.
    pub quality: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 90,
        }
    }
}

/// Retina settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetinaConfig {
    /// Multiplier of the extra pass rendered for `retina = true` sizes.
    pub scale: u32,
}

impl Default for RetinaConfig {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// A size set as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSetConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default)]
    pub sizes: Vec<SizeConfig>,
}

impl SizeSetConfig {
    pub fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }

    pub fn to_size_set(&self) -> SizeSet {
        self.sizes
            .iter()
            .fold(SizeSet::new(&self.name).with_slug(self.slug()), |set, size| {
                set.with_size(size.to_size_spec())
            })
    }
}

/// A size as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    #[serde(default)]
    pub auto_crop: bool,
    #[serde(default)]
    pub retina: bool,
}

impl SizeConfig {
    pub fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }

    fn validate(&self, set_slug: &str) -> Result<(), ConfigError> {
        let label = format!("{}/{}", set_slug, self.slug());
        if self.slug().is_empty() {
            return Err(ConfigError::Validation(format!(
                "size '{}' in size set '{}' has an empty slug",
                self.name, set_slug
            )));
        }
        if self.width.is_none() && self.height.is_none() {
            return Err(ConfigError::Validation(format!(
                "size '{}' needs a width or a height",
                label
            )));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ConfigError::Validation(format!(
                "size '{}' has a zero dimension",
                label
            )));
        }
        if let Some(ratio) = self.aspect_ratio
            && !(ratio.is_finite() && ratio > 0.0)
        {
            return Err(ConfigError::Validation(format!(
                "size '{}' has invalid aspect_ratio {}",
                label, ratio
            )));
        }
        Ok(())
    }

    pub fn to_size_spec(&self) -> SizeSpec {
        SizeSpec {
            id: None,
            name: self.name.clone(),
            slug: self.slug(),
            width: self.width,
            height: self.height,
            aspect_ratio: self.aspect_ratio,
            auto_crop: self.auto_crop,
            retina: self.retina,
            size_set: None,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EngineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely; arrays such
///   as `size_sets` are replaced, not concatenated.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EngineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file, merged over stock defaults and validated.
///
/// A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// Returns a fully-commented stock `cropset.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# cropset configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# Encoded format of every rendered image: "png", "jpeg" or "webp" (lossless).
format = "png"

# JPEG quality (1 = worst, 100 = best). Ignored for png and webp.
quality = 90

# ---------------------------------------------------------------------------
# Retina
# ---------------------------------------------------------------------------
[retina]
# Sizes with `retina = true` get a second pass at this multiple of their
# resolved dimensions, cut from the same crop and stored as `name@<scale>x`.
scale = 2

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel render workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Size sets
# ---------------------------------------------------------------------------
# Each set is a named group of sizes applied to an image together.
# A size needs two of width, height and aspect_ratio; with only one of width
# or height the missing side follows the source image's aspect ratio.
#
# [[size_sets]]
# name = "Facebook"
# slug = "facebook"
#
# [[size_sets.sizes]]
# name = "Thumbnail"
# slug = "thumb"
# width = 60
# height = 60
# auto_crop = true
# retina = true
#
# [[size_sets.sizes]]
# name = "Banner"
# slug = "banner"
# width = 1024
# aspect_ratio = 1.3
"##
}
