//! Content checksums for stored images.
//!
//! Every stored 1x rendition and every original gets a SHA-256 checksum,
//! recorded on the [`Image`](crate::model::Image) row when the file is
//! committed. Checksums are content-based, so two renders from identical
//! inputs carry the same checksum and any change to the crop, the target size
//! or the parent's pixels shows up as a different one.

use crate::model::StoredPath;
use crate::store::FileStore;
use sha2::{Digest, Sha256};
use std::io;

/// SHA-256 of a buffer, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of a stored file, read back through the file store.
pub fn hash_stored(files: &impl FileStore, path: &StoredPath) -> io::Result<String> {
    let bytes = files.read(path)?;
    Ok(hash_bytes(&bytes))
}
