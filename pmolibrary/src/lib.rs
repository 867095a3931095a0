//! # pmolibrary - Registres d'entités de la bibliothèque musicale
//!
//! Cette crate fournit le noyau du modèle de bibliothèque :
//! - Dérivation déterministe des identifiants (scope parent + nom local)
//! - Un registre générique par type d'entité (devices, répertoires,
//!   pistes, playlists) : enregistrement, consultation, renommage
//!   atomique, suppression et nettoyage par scope
//! - Des cascades entre registres via le bus `pmoevents`
//! - Un contexte applicatif explicite (démarrage, commit à l'arrêt)
//!
//! # Architecture
//!
//! - **EntityRegistry<K>** : propriétaire exclusif de la table id → entité
//! - **ResourceStore** : effets de bord sur les ressources physiques
//! - **LibraryContext** : assemble registres, bus et cascades
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//! use pmolibrary::{FsStore, LibraryConfig, LibraryContext, NoSnapshot};
//!
//! # fn main() -> pmolibrary::Result<()> {
//! let config = LibraryConfig::load(None)?;
//! pmolibrary::logging::init_logging(&config.logging.filter);
//!
//! let library = LibraryContext::start(config, Arc::new(FsStore::new()), &NoSnapshot)?;
//! let usb = library.add_device("/media/usb0");
//! let music = library.add_directory("Music", &usb);
//! let track = library.add_track("song.mp3", &music);
//!
//! let renamed = library.tracks().rename(&track, "better-song.mp3")?;
//! println!("{} -> {}", renamed.name(), renamed.id());
//! # Ok(())
//! # }
//! ```

mod cascade;
mod config;
mod context;
mod entity;
mod error;
mod id;
mod kind;
mod registry;
mod scope;
mod store;

pub mod logging;

// Réexports publics
pub use cascade::{install as install_cascades, PlaylistReferences, ScopeCleanup, ScopeMove};
pub use config::{EventsConfig, ExtensionsConfig, LibraryConfig, LoggingConfig};
pub use context::{CommitSink, LibraryContext, LibrarySnapshot, NoSnapshot, SnapshotSource};
pub use entity::{Entity, EntitySnapshot, Properties};
pub use error::{Error, Result};
pub use id::{canonical_scope_path, derive_id, EntityId};
pub use kind::{
    Device, Directory, EntityKind, NameRule, PlaylistFile, Track, DEFAULT_PLAYLIST_EXTENSIONS,
    DEFAULT_TRACK_EXTENSIONS,
};
pub use registry::{CleanupFailure, CleanupReport, Disposal, EntityRegistry};
pub use scope::Scope;
pub use store::{FsStore, MemoryStore, ResourceStore};

pub use pmoevents;
