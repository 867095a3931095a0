//! Dérivation déterministe des identifiants d'entités.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator hashed between the scope path and the local name, so that
/// ("a/b", "c") and ("a", "b/c") never feed the same bytes.
const SCOPE_SEPARATOR: u8 = 0x1f;

/// Identifiant stable d'une entité (32 caractères hexadécimaux).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an identifier obtained elsewhere (snapshot, event details).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<EntityId> for serde_json::Value {
    fn from(id: EntityId) -> Self {
        serde_json::Value::String(id.0)
    }
}

/// Génère l'identifiant d'une entité à partir du chemin canonique de son
/// scope parent et de son nom local.
///
/// SHA256 over `scope_path`, a separator byte and `name`, truncated to
/// the first 16 bytes and hex encoded. Root entities pass an empty scope
/// path. The same pair always yields the same id; a hash match is taken as
/// identity without looking at the resource itself.
///
/// # Exemple
///
/// ```
/// use pmolibrary::derive_id;
///
/// let id = derive_id("/media/usb0/Music", "song.mp3");
/// assert_eq!(id.as_str().len(), 32);
/// assert_eq!(id, derive_id("/media/usb0/Music", "song.mp3"));
/// ```
pub fn derive_id(scope_path: &str, name: &str) -> EntityId {
    let mut hasher = Sha256::new();
    hasher.update(scope_path.as_bytes());
    hasher.update([SCOPE_SEPARATOR]);
    hasher.update(name.as_bytes());
    let result = hasher.finalize();
    EntityId(hex::encode(&result[..16]))
}

/// Canonical textual form of a scope path: forward slashes, no trailing
/// slash (except for the filesystem root itself).
pub fn canonical_scope_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() && raw.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn derivation_is_deterministic() {
        let pairs = [
            ("", "usb-stick"),
            ("/media/usb0", "Music"),
            ("/media/usb0/Music", "song.mp3"),
            ("C:/Users/me/Music", "Été.flac"),
        ];
        for (scope, name) in pairs {
            assert_eq!(derive_id(scope, name), derive_id(scope, name));
        }
    }

    #[test]
    fn scope_and_name_are_not_concatenated() {
        assert_ne!(derive_id("a/b", "c"), derive_id("a", "b/c"));
        assert_ne!(derive_id("/music", "a.mp3"), derive_id("/other", "a.mp3"));
    }

    #[test]
    fn ids_are_case_sensitive() {
        assert_ne!(derive_id("/music", "Song.mp3"), derive_id("/music", "song.mp3"));
    }

    #[test]
    fn id_has_fixed_length() {
        let id = derive_id("", "");
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn canonical_paths() {
        assert_eq!(canonical_scope_path(&PathBuf::from("/media/usb0/")), "/media/usb0");
        assert_eq!(canonical_scope_path(&PathBuf::from("/")), "/");
        assert_eq!(canonical_scope_path(&PathBuf::from("")), "");
        assert_eq!(canonical_scope_path(&PathBuf::from("music\\rock")), "music/rock");
    }
}
