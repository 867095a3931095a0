//! Types d'erreurs pour pmolibrary

use std::path::PathBuf;

/// Erreurs des registres de la bibliothèque
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Cannot rename to '{name}': id {id} already belongs to {existing:?}")]
    NameConflict {
        name: String,
        id: String,
        existing: PathBuf,
    },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Backing resource is missing: {0:?}")]
    ResourceMissing(PathBuf),

    #[error("Resource operation failed on {path:?}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_name(name: &str, reason: &str) -> Self {
        Error::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Resource {
            path: path.into(),
            source,
        }
    }
}

/// Type Result spécialisé pour pmolibrary
pub type Result<T> = std::result::Result<T, Error>;
