use std::fmt;

use serde::{Deserialize, Serialize};

/// Catégories de changements d'état diffusés dans la bibliothèque.
///
/// The set is closed: registries emit the entity lifecycle kinds, external
/// collaborators (scanner, playback engine) emit the remaining ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // -- Devices -------------------------------------------------------------
    DeviceAdded,
    DeviceRenamed,
    DeviceRemoved,

    // -- Directories ---------------------------------------------------------
    DirectoryAdded,
    DirectoryRenamed,
    DirectoryRemoved,

    // -- Tracks --------------------------------------------------------------
    TrackAdded,
    TrackRenamed,
    TrackRemoved,

    // -- Playlist files ------------------------------------------------------
    PlaylistAdded,
    PlaylistRenamed,
    PlaylistRemoved,
    /// A playlist's content changed underneath it and views must reload it.
    PlaylistNeedsRefresh,

    // -- Collaborators -------------------------------------------------------
    LibraryScanStarted,
    LibraryScanFinished,
    PlaybackStateChanged,
    CurrentTrackChanged,
    VolumeChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        EventKind::DeviceAdded,
        EventKind::DeviceRenamed,
        EventKind::DeviceRemoved,
        EventKind::DirectoryAdded,
        EventKind::DirectoryRenamed,
        EventKind::DirectoryRemoved,
        EventKind::TrackAdded,
        EventKind::TrackRenamed,
        EventKind::TrackRemoved,
        EventKind::PlaylistAdded,
        EventKind::PlaylistRenamed,
        EventKind::PlaylistRemoved,
        EventKind::PlaylistNeedsRefresh,
        EventKind::LibraryScanStarted,
        EventKind::LibraryScanFinished,
        EventKind::PlaybackStateChanged,
        EventKind::CurrentTrackChanged,
        EventKind::VolumeChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeviceAdded => "device_added",
            EventKind::DeviceRenamed => "device_renamed",
            EventKind::DeviceRemoved => "device_removed",
            EventKind::DirectoryAdded => "directory_added",
            EventKind::DirectoryRenamed => "directory_renamed",
            EventKind::DirectoryRemoved => "directory_removed",
            EventKind::TrackAdded => "track_added",
            EventKind::TrackRenamed => "track_renamed",
            EventKind::TrackRemoved => "track_removed",
            EventKind::PlaylistAdded => "playlist_added",
            EventKind::PlaylistRenamed => "playlist_renamed",
            EventKind::PlaylistRemoved => "playlist_removed",
            EventKind::PlaylistNeedsRefresh => "playlist_needs_refresh",
            EventKind::LibraryScanStarted => "library_scan_started",
            EventKind::LibraryScanFinished => "library_scan_finished",
            EventKind::PlaybackStateChanged => "playback_state_changed",
            EventKind::CurrentTrackChanged => "current_track_changed",
            EventKind::VolumeChanged => "volume_changed",
        }
    }

    /// True for the kinds that announce a scope (device or directory) moving.
    pub fn is_scope_move(&self) -> bool {
        matches!(self, EventKind::DeviceRenamed | EventKind::DirectoryRenamed)
    }

    /// True for the kinds that announce a scope (device or directory) going away.
    pub fn is_scope_removal(&self) -> bool {
        matches!(self, EventKind::DeviceRemoved | EventKind::DirectoryRemoved)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
