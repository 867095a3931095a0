//! Cascades entre registres.
//!
//! A primary mutation in one registry is published as an event once its
//! lock is released; the observers below react by taking the lock of
//! their own registry only. They hold `Weak` handles so the observation
//! manager never keeps a registry alive.

use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context};
use pmoevents::{keys, Event, EventKind, ObservationManager, Observer, ObserverHandle};
use tracing::debug;

use crate::id::EntityId;
use crate::kind::{Directory, EntityKind, PlaylistFile, Track};
use crate::registry::{Disposal, EntityRegistry};
use crate::scope::Scope;

fn detail_id(event: &Event, key: &str) -> anyhow::Result<EntityId> {
    event
        .detail_str(key)
        .map(EntityId::from)
        .ok_or_else(|| anyhow!("{} event without '{}' detail", event.kind, key))
}

/// Drops the entities of one registry living under a removed device or
/// directory.
pub struct ScopeCleanup<K: EntityKind> {
    name: String,
    registry: Weak<EntityRegistry<K>>,
}

impl<K: EntityKind> ScopeCleanup<K> {
    pub fn new(registry: &Arc<EntityRegistry<K>>) -> Self {
        Self {
            name: format!("scope-cleanup:{}", K::label()),
            registry: Arc::downgrade(registry),
        }
    }
}

impl<K: EntityKind> Observer for ScopeCleanup<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::DeviceRemoved, EventKind::DirectoryRemoved]
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let scope_id = detail_id(event, keys::ID)?;
        let report = registry.cleanup_scope(&scope_id, Disposal::Forget);
        debug!(
            observer = %self.name,
            scope = %scope_id,
            removed = report.removed.len(),
            "Cascade cleanup"
        );
        Ok(())
    }
}

/// Follows a renamed device or directory: re-parents and re-keys the
/// direct children held by one registry.
pub struct ScopeMove<K: EntityKind> {
    name: String,
    registry: Weak<EntityRegistry<K>>,
}

impl<K: EntityKind> ScopeMove<K> {
    pub fn new(registry: &Arc<EntityRegistry<K>>) -> Self {
        Self {
            name: format!("scope-move:{}", K::label()),
            registry: Arc::downgrade(registry),
        }
    }
}

impl<K: EntityKind> Observer for ScopeMove<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::DeviceRenamed, EventKind::DirectoryRenamed]
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let old_id = detail_id(event, keys::OLD_ID)?;
        let scope = event
            .detail(keys::SCOPE)
            .cloned()
            .ok_or_else(|| anyhow!("{} event without scope", event.kind))?;
        let scope: Scope =
            serde_json::from_value(scope).context("malformed scope in rename event")?;

        registry.rescope(&old_id, &scope);
        Ok(())
    }
}

/// Keeps playlists' track lists pointing at live track ids and asks views
/// to refresh the playlists it touched.
pub struct PlaylistReferences {
    playlists: Weak<EntityRegistry<PlaylistFile>>,
}

impl PlaylistReferences {
    pub fn new(playlists: &Arc<EntityRegistry<PlaylistFile>>) -> Self {
        Self {
            playlists: Arc::downgrade(playlists),
        }
    }
}

impl Observer for PlaylistReferences {
    fn name(&self) -> &str {
        "playlist-references"
    }

    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::TrackRenamed, EventKind::TrackRemoved]
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(playlists) = self.playlists.upgrade() else {
            return Ok(());
        };

        let touched = match event.kind {
            EventKind::TrackRenamed => {
                let old_id = detail_id(event, keys::OLD_ID)?;
                let new_id = detail_id(event, keys::NEW_ID)?;
                playlists.retarget_references(PlaylistFile::TRACKS, &old_id, Some(&new_id))
            }
            EventKind::TrackRemoved => {
                let id = detail_id(event, keys::ID)?;
                playlists.retarget_references(PlaylistFile::TRACKS, &id, None)
            }
            _ => return Ok(()),
        };

        for playlist in touched {
            playlists.observers().notify(
                Event::new(EventKind::PlaylistNeedsRefresh)
                    .with(keys::ID, playlist.id())
                    .with(keys::NAME, playlist.name())
                    .with("cause", event.kind.as_str()),
            );
        }
        Ok(())
    }
}

/// Registers every cascade observer on `observers` and returns their
/// handles.
///
/// Scope cleanups come first so a removed device empties directories,
/// then tracks, then playlists.
pub fn install(
    observers: &ObservationManager,
    directories: &Arc<EntityRegistry<Directory>>,
    tracks: &Arc<EntityRegistry<Track>>,
    playlists: &Arc<EntityRegistry<PlaylistFile>>,
) -> Vec<ObserverHandle> {
    let handles: Vec<ObserverHandle> = vec![
        Arc::new(ScopeCleanup::new(directories)),
        Arc::new(ScopeCleanup::new(tracks)),
        Arc::new(ScopeCleanup::new(playlists)),
        Arc::new(ScopeMove::new(directories)),
        Arc::new(ScopeMove::new(tracks)),
        Arc::new(ScopeMove::new(playlists)),
        Arc::new(PlaylistReferences::new(playlists)),
    ];
    for handle in &handles {
        observers.subscribe(handle.clone());
    }
    handles
}
