//! LibraryContext : instances explicites des registres et du bus.
//!
//! The context is built once at startup (restoring registries from an
//! external snapshot) and passed to collaborators. [`LibraryContext::shutdown`]
//! hands the final state to the commit collaborator and stops delivery.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use pmoevents::{ObservationManager, ObserverHandle};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cascade;
use crate::config::LibraryConfig;
use crate::entity::{Entity, EntitySnapshot};
use crate::error::{Error, Result};
use crate::id::EntityId;
use crate::kind::{Device, Directory, PlaylistFile, Track};
use crate::registry::{Disposal, EntityRegistry};
use crate::store::ResourceStore;

/// État complet des registres, tel que persisté par un collaborateur externe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub devices: Vec<EntitySnapshot>,
    pub directories: Vec<EntitySnapshot>,
    pub tracks: Vec<EntitySnapshot>,
    pub playlists: Vec<EntitySnapshot>,
}

impl LibrarySnapshot {
    pub fn entity_count(&self) -> usize {
        self.devices.len() + self.directories.len() + self.tracks.len() + self.playlists.len()
    }
}

/// Source of the state loaded at startup.
pub trait SnapshotSource {
    fn load(&self) -> anyhow::Result<Option<LibrarySnapshot>>;
}

/// Collaborator flushing the state to persistent storage at shutdown.
pub trait CommitSink {
    fn commit(&self, snapshot: &LibrarySnapshot) -> anyhow::Result<()>;
}

/// Startup without any persisted state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSnapshot;

impl SnapshotSource for NoSnapshot {
    fn load(&self) -> anyhow::Result<Option<LibrarySnapshot>> {
        Ok(None)
    }
}

pub struct LibraryContext {
    config: LibraryConfig,
    observers: Arc<ObservationManager>,
    devices: Arc<EntityRegistry<Device>>,
    directories: Arc<EntityRegistry<Directory>>,
    tracks: Arc<EntityRegistry<Track>>,
    playlists: Arc<EntityRegistry<PlaylistFile>>,
    cascades: Vec<ObserverHandle>,
}

impl fmt::Debug for LibraryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryContext")
            .field("config", &self.config)
            .field("devices", &self.devices)
            .field("directories", &self.directories)
            .field("tracks", &self.tracks)
            .field("playlists", &self.playlists)
            .finish_non_exhaustive()
    }
}

impl LibraryContext {
    pub fn start(
        config: LibraryConfig,
        store: Arc<dyn ResourceStore>,
        source: &dyn SnapshotSource,
    ) -> Result<Self> {
        let observers = Arc::new(
            ObservationManager::new(config.manager_options())
                .context("cannot start the event delivery thread")?,
        );

        let devices = Arc::new(EntityRegistry::<Device>::new(observers.clone(), store.clone()));
        let directories = Arc::new(EntityRegistry::<Directory>::new(
            observers.clone(),
            store.clone(),
        ));
        let tracks = Arc::new(EntityRegistry::<Track>::with_name_rule(
            observers.clone(),
            store.clone(),
            config.track_name_rule(),
        ));
        let playlists = Arc::new(EntityRegistry::<PlaylistFile>::with_name_rule(
            observers.clone(),
            store,
            config.playlist_name_rule(),
        ));

        let snapshot = source
            .load()
            .map_err(|e| Error::Snapshot(format!("cannot load library snapshot: {e:#}")))?;
        if let Some(snapshot) = snapshot {
            let restored = devices.restore(snapshot.devices)
                + directories.restore(snapshot.directories)
                + tracks.restore(snapshot.tracks)
                + playlists.restore(snapshot.playlists);
            info!(restored, "Library restored from snapshot");
        }

        let cascades = cascade::install(&observers, &directories, &tracks, &playlists);

        info!("Library context started");
        Ok(Self {
            config,
            observers,
            devices,
            directories,
            tracks,
            playlists,
            cascades,
        })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn observers(&self) -> &Arc<ObservationManager> {
        &self.observers
    }

    pub fn devices(&self) -> &Arc<EntityRegistry<Device>> {
        &self.devices
    }

    pub fn directories(&self) -> &Arc<EntityRegistry<Directory>> {
        &self.directories
    }

    pub fn tracks(&self) -> &Arc<EntityRegistry<Track>> {
        &self.tracks
    }

    pub fn playlists(&self) -> &Arc<EntityRegistry<PlaylistFile>> {
        &self.playlists
    }

    /// Registers a device by its mount point.
    pub fn add_device(&self, mount_point: &str) -> Arc<Entity> {
        self.devices.register_named(mount_point, None)
    }

    /// Registers a directory under a device or another directory.
    pub fn add_directory(&self, name: &str, parent: &Entity) -> Arc<Entity> {
        self.directories.register_named(name, Some(&parent.scope()))
    }

    pub fn add_track(&self, name: &str, directory: &Entity) -> Arc<Entity> {
        self.tracks.register_named(name, Some(&directory.scope()))
    }

    /// Registers a playlist file; the track list is only set on a newly
    /// created entity.
    pub fn add_playlist(&self, name: &str, directory: &Entity, tracks: &[EntityId]) -> Arc<Entity> {
        let playlist = self.playlists.register_named(name, Some(&directory.scope()));
        if playlist.property(PlaylistFile::TRACKS).is_none() {
            let ids: Vec<serde_json::Value> = tracks.iter().cloned().map(Into::into).collect();
            playlist.set_property(PlaylistFile::TRACKS, ids);
        }
        playlist
    }

    /// Removes a device; directories, tracks and playlists under it follow
    /// through the cascade.
    pub fn remove_device(&self, id: &EntityId) -> Result<Arc<Entity>> {
        self.devices.remove(id, Disposal::Forget)
    }

    pub fn remove_directory(&self, id: &EntityId, disposal: Disposal) -> Result<Arc<Entity>> {
        self.directories.remove(id, disposal)
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        LibrarySnapshot {
            devices: self.devices.snapshot(),
            directories: self.directories.snapshot(),
            tracks: self.tracks.snapshot(),
            playlists: self.playlists.snapshot(),
        }
    }

    /// Flushes pending events, commits the final state and stops the
    /// observation manager. The manager is stopped even when the commit
    /// fails; the commit error is then returned.
    pub fn shutdown(self, sink: &dyn CommitSink) -> Result<()> {
        self.observers.flush();
        let snapshot = self.snapshot();
        let committed = sink.commit(&snapshot);

        for observer in &self.cascades {
            self.observers.unregister(observer);
        }
        self.observers.shutdown();

        match committed {
            Ok(()) => {
                info!(entities = snapshot.entity_count(), "Library committed and stopped");
                Ok(())
            }
            Err(e) => Err(Error::Snapshot(format!("commit failed: {e:#}"))),
        }
    }
}
