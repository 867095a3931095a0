//! Accès au stockage externe des ressources (système de fichiers).
//!
//! Registries never touch `std::fs` directly: every side effect on a
//! physical resource goes through a [`ResourceStore`], so tests can swap
//! in [`MemoryStore`] and inject failures.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

/// Trait des opérations physiques dont les registres ont besoin.
pub trait ResourceStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// True if both paths designate the same physical resource, e.g. the
    /// same file reached with a different letter case on a case-insensitive
    /// filesystem.
    fn same_resource(&self, a: &Path, b: &Path) -> bool;
}

/// Implementation over the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceStore for FsStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        debug!("Renaming {:?} -> {:?}", from, to);
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        debug!("Removing {:?}", path);
        // Un répertoire non vide n'est jamais supprimé récursivement
        if path.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn same_resource(&self, a: &Path, b: &Path) -> bool {
        if a == b {
            return true;
        }
        same_file(a, b)
    }
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

/// In-memory store with optional case-insensitive matching and failure
/// injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    case_insensitive: bool,
    paths: Mutex<BTreeSet<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that behaves like a case-insensitive filesystem.
    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.paths.lock().insert(self.key(&path));
    }

    pub fn discard(&self, path: &Path) {
        self.paths.lock().remove(&self.key(path));
    }

    /// Every later rename or removal touching `path` fails.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.failing.lock().insert(self.key(&path));
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    fn key(&self, path: &Path) -> PathBuf {
        if self.case_insensitive {
            PathBuf::from(path.to_string_lossy().to_lowercase())
        } else {
            path.to_path_buf()
        }
    }

    fn check_failure(&self, path: &Path) -> io::Result<()> {
        if self.failing.lock().contains(&self.key(path)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected failure on {}", path.display()),
            ));
        }
        Ok(())
    }
}

impl ResourceStore for MemoryStore {
    fn exists(&self, path: &Path) -> bool {
        self.paths.lock().contains(&self.key(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check_failure(from)?;
        self.check_failure(to)?;

        let mut paths = self.paths.lock();
        let from_key = self.key(from);
        if !paths.remove(&from_key) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", from.display()),
            ));
        }

        // Déplace aussi tout ce qui se trouve sous `from`
        let nested: Vec<PathBuf> = paths
            .iter()
            .filter(|p| p.starts_with(&from_key))
            .cloned()
            .collect();
        for old in nested {
            paths.remove(&old);
            if let Ok(rest) = old.strip_prefix(&from_key) {
                paths.insert(self.key(&to.join(rest)));
            }
        }

        paths.insert(self.key(to));
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.check_failure(path)?;
        if self.paths.lock().remove(&self.key(path)) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ))
        }
    }

    fn same_resource(&self, a: &Path, b: &Path) -> bool {
        self.key(a) == self.key(b) && self.exists(a)
    }
}
