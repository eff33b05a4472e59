//! Naming conventions for size slugs and derived file names.
//!
//! Every derived image is stored under a logical name built from its parent's
//! logical name and the slug of the size it was rendered for. The file store
//! decides the final path; this module only decides the *name* requested.
//!
//! ## Derived Names
//!
//! - `photos/dawn.jpg` + `thumb` → `photos/dawn-thumb.png`
//! - `photos/dawn.jpg` + `thumb` at 2x → `photos/dawn-thumb@2x.png`
//! - `dawn` (no extension) + `banner` → `dawn-banner.png`
//!
//! ## Slugs
//!
//! Size and size set slugs are lowercase ASCII with dashes. Slugs are derived
//! from display names when the caller does not give one:
//! - `"Facebook Banner"` → `"facebook-banner"`
//! - `"  Retina  Thumb! "` → `"retina-thumb"`

/// A logical file name split into its directory, stem and extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Everything up to and including the last `/`. Empty for bare names.
    pub dir: String,
    /// File name without directory and extension.
    pub stem: String,
    /// Extension without the dot, if any.
    pub extension: Option<String>,
}

/// Split a logical file name.
///
/// - `"a/b/dawn.jpg"` → dir=`"a/b/"`, stem=`"dawn"`, extension=`Some("jpg")`
/// - `"dawn"` → dir=`""`, stem=`"dawn"`, extension=`None`
/// - `".hidden"` → dir=`""`, stem=`".hidden"`, extension=`None`
pub fn parse_file_name(name: &str) -> ParsedName {
    let (dir, file) = match name.rfind('/') {
        Some(pos) => (&name[..=pos], &name[pos + 1..]),
        None => ("", name),
    };
    match file.rfind('.') {
        Some(pos) if pos > 0 => ParsedName {
            dir: dir.to_string(),
            stem: file[..pos].to_string(),
            extension: Some(file[pos + 1..].to_string()),
        },
        _ => ParsedName {
            dir: dir.to_string(),
            stem: file.to_string(),
            extension: None,
        },
    }
}

/// Build the logical name of a derived rendition.
///
/// `scale` is the retina multiplier; `1` produces the plain name.
pub fn derived_file_name(parent_name: &str, slug: &str, scale: u32, extension: &str) -> String {
    let parsed = parse_file_name(parent_name);
    let suffix = if scale > 1 {
        format!("@{}x", scale)
    } else {
        String::new()
    };
    format!(
        "{}{}-{}{}.{}",
        parsed.dir, parsed.stem, slug, suffix, extension
    )
}

/// Logical name for a re-rendered original: same stem, new extension.
pub fn reencoded_file_name(name: &str, extension: &str) -> String {
    let parsed = parse_file_name(name);
    format!("{}{}.{}", parsed.dir, parsed.stem, extension)
}

/// Turn a display name into a slug: lowercase ASCII alphanumerics joined by
/// single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
