//! Persistence collaborators.
//!
//! The manager never talks to a database or a filesystem directly. It goes
//! through two traits:
//!
//! - [`EntityStore`]: rows for images, sizes, size sets and crops, with
//!   lookups, counts and a transaction boundary.
//! - [`FileStore`]: opaque blobs addressed by logical name.
//!
//! In-memory implementations back the tests and the CLI; [`DirFileStore`]
//! keeps files in a directory.

mod entity;
mod files;
mod memory;

pub use entity::{EntityStore, StoreError};
pub use files::{DirFileStore, FileStore, MemoryFileStore};
pub use memory::MemoryStore;
