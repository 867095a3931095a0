use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::id::{canonical_scope_path, EntityId};

/// Référence non possédante vers le scope parent d'une entité.
///
/// Holds the parent's id, its location and the ids of every scope above
/// it, root first. It is only used for id derivation, lookup and cascades;
/// it never keeps the parent alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: EntityId,
    pub path: PathBuf,
    pub ancestors: Vec<EntityId>,
}

impl Scope {
    pub fn new(id: EntityId, path: impl Into<PathBuf>, ancestors: Vec<EntityId>) -> Self {
        Self {
            id,
            path: path.into(),
            ancestors,
        }
    }

    pub fn canonical_path(&self) -> String {
        canonical_scope_path(&self.path)
    }

    /// True if `scope_id` is this scope or one of its ancestors.
    pub fn is_within(&self, scope_id: &EntityId) -> bool {
        self.id == *scope_id || self.ancestors.contains(scope_id)
    }

    /// Number of scopes from the root down to this one, inclusive.
    pub fn depth(&self) -> usize {
        self.ancestors.len() + 1
    }

    pub fn location_of(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Location of an entity named `name` under `parent`. Root entities are
/// located at their name (a device's mount point).
pub(crate) fn location(parent: Option<&Scope>, name: &str) -> PathBuf {
    match parent {
        Some(scope) => scope.location_of(name),
        None => Path::new(name).to_path_buf(),
    }
}

pub(crate) fn scope_path(parent: Option<&Scope>) -> String {
    parent.map(Scope::canonical_path).unwrap_or_default()
}
