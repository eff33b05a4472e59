//! The file store collaborator.
//!
//! Callers ask for a logical name and get back an opaque [`StoredPath`]. A
//! store never overwrites an existing file: when the name is taken it picks
//! the next free variant (`dawn.png`, `dawn_1.png`, `dawn_2.png`, …). This is
//! what keeps an original's bytes intact until a re-render is committed and
//! the old path explicitly deleted.

use crate::model::StoredPath;
use crate::naming::parse_file_name;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub trait FileStore {
    /// Store `bytes` under `name` or a free variant of it.
    fn write(&mut self, name: &str, bytes: &[u8]) -> io::Result<StoredPath>;
    fn read(&self, path: &StoredPath) -> io::Result<Vec<u8>>;
    fn delete(&mut self, path: &StoredPath) -> io::Result<()>;
    fn exists(&self, path: &StoredPath) -> bool;
}

/// First variant of `name` for which `taken` is false.
fn available_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(name) {
        return name.to_string();
    }
    let parsed = parse_file_name(name);
    let ext = parsed
        .extension
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    (1..)
        .map(|n| format!("{}{}_{}{}", parsed.dir, parsed.stem, n, ext))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn not_found(path: &StoredPath) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no stored file at {}", path),
    )
}

/// Files kept in a map. Used by tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileStore for MemoryFileStore {
    fn write(&mut self, name: &str, bytes: &[u8]) -> io::Result<StoredPath> {
        let name = available_name(name, |n| self.files.contains_key(n));
        self.files.insert(name.clone(), bytes.to_vec());
        Ok(StoredPath::new(name))
    }

    fn read(&self, path: &StoredPath) -> io::Result<Vec<u8>> {
        self.files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn delete(&mut self, path: &StoredPath) -> io::Result<()> {
        self.files
            .remove(path.as_str())
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &StoredPath) -> bool {
        self.files.contains_key(path.as_str())
    }
}

/// Files under a root directory. Stored paths are relative to the root.
#[derive(Debug, Clone)]
pub struct DirFileStore {
    root: PathBuf,
}

impl DirFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative name under the root, refusing escapes.
    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        if name.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid stored name: {}", name),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for DirFileStore {
    fn write(&mut self, name: &str, bytes: &[u8]) -> io::Result<StoredPath> {
        self.resolve(name)?;
        let name = available_name(name, |n| self.root.join(n).exists());
        let path = self.resolve(&name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(StoredPath::new(name))
    }

    fn read(&self, path: &StoredPath) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path.as_str())?)
    }

    fn delete(&mut self, path: &StoredPath) -> io::Result<()> {
        fs::remove_file(self.resolve(path.as_str())?)
    }

    fn exists(&self, path: &StoredPath) -> bool {
        self.resolve(path.as_str())
            .map(|p| p.is_file())
            .unwrap_or(false)
    }
}
