//! Types d'entités gérés par les registres.
//!
//! Comme `CacheConfig` pour les caches, un [`EntityKind`] paramètre un
//! registre générique : son libellé, ses règles de nommage, la présence
//! d'une ressource physique et les évènements qu'il émet.

use pmoevents::EventKind;

use crate::error::{Error, Result};

/// Constraint applied to names given to `rename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRule {
    /// Any non-empty name (device labels, mount points).
    Label,
    /// One path segment: non-empty, no path separator.
    Segment,
    /// A file name: one segment, exactly one `.`, a non-empty stem and an
    /// extension taken from `extensions` (case-insensitive).
    File { extensions: Vec<String> },
}

impl NameRule {
    pub fn file(extensions: &[&str]) -> Self {
        NameRule::File {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::invalid_name(name, "name is empty"));
        }
        if matches!(self, NameRule::Label) {
            return Ok(());
        }

        if name.contains('/') || name.contains('\\') {
            return Err(Error::invalid_name(name, "name contains a path separator"));
        }
        if name == "." || name == ".." {
            return Err(Error::invalid_name(name, "name designates a relative directory"));
        }

        let NameRule::File { extensions } = self else {
            return Ok(());
        };

        let Some((stem, extension)) = name.rsplit_once('.') else {
            return Err(Error::invalid_name(name, "name has no extension"));
        };
        if stem.contains('.') {
            return Err(Error::invalid_name(name, "name has more than one extension delimiter"));
        }
        if stem.is_empty() {
            return Err(Error::invalid_name(name, "name has an empty stem"));
        }
        let extension = extension.to_ascii_lowercase();
        if !extensions.iter().any(|e| *e == extension) {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: format!("extension '.{}' is not one of {:?}", extension, extensions),
            });
        }
        Ok(())
    }
}

/// Paramètres d'un type d'entité.
pub trait EntityKind: Send + Sync + 'static {
    /// Libellé du type (logs, détails d'évènements)
    fn label() -> &'static str;

    /// Whether entities of this kind have a physical resource that rename
    /// and delete act on.
    fn backed_by_resource() -> bool {
        true
    }

    fn default_name_rule() -> NameRule;

    fn added_event() -> EventKind;

    fn renamed_event() -> EventKind;

    fn removed_event() -> EventKind;
}

/// Support amovible ou racine de bibliothèque, nommé par son point de montage.
pub struct Device;

/// Répertoire sous un device ou sous un autre répertoire.
pub struct Directory;

/// Fichier audio.
pub struct Track;

/// Fichier playlist. The ordered track ids it references are kept in the
/// [`PlaylistFile::TRACKS`] property.
pub struct PlaylistFile;

pub const DEFAULT_TRACK_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "opus", "m4a", "wav", "aiff"];
pub const DEFAULT_PLAYLIST_EXTENSIONS: &[&str] = &["m3u"];

impl PlaylistFile {
    pub const TRACKS: &'static str = "tracks";
}

impl EntityKind for Device {
    fn label() -> &'static str {
        "device"
    }

    fn backed_by_resource() -> bool {
        false
    }

    fn default_name_rule() -> NameRule {
        NameRule::Label
    }

    fn added_event() -> EventKind {
        EventKind::DeviceAdded
    }

    fn renamed_event() -> EventKind {
        EventKind::DeviceRenamed
    }

    fn removed_event() -> EventKind {
        EventKind::DeviceRemoved
    }
}

impl EntityKind for Directory {
    fn label() -> &'static str {
        "directory"
    }

    fn default_name_rule() -> NameRule {
        NameRule::Segment
    }

    fn added_event() -> EventKind {
        EventKind::DirectoryAdded
    }

    fn renamed_event() -> EventKind {
        EventKind::DirectoryRenamed
    }

    fn removed_event() -> EventKind {
        EventKind::DirectoryRemoved
    }
}

impl EntityKind for Track {
    fn label() -> &'static str {
        "track"
    }

    fn default_name_rule() -> NameRule {
        NameRule::file(DEFAULT_TRACK_EXTENSIONS)
    }

    fn added_event() -> EventKind {
        EventKind::TrackAdded
    }

    fn renamed_event() -> EventKind {
        EventKind::TrackRenamed
    }

    fn removed_event() -> EventKind {
        EventKind::TrackRemoved
    }
}

impl EntityKind for PlaylistFile {
    fn label() -> &'static str {
        "playlist"
    }

    fn default_name_rule() -> NameRule {
        NameRule::file(DEFAULT_PLAYLIST_EXTENSIONS)
    }

    fn added_event() -> EventKind {
        EventKind::PlaylistAdded
    }

    fn renamed_event() -> EventKind {
        EventKind::PlaylistRenamed
    }

    fn removed_event() -> EventKind {
        EventKind::PlaylistRemoved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(rule: &NameRule, name: &str) -> Option<String> {
        match rule.validate(name) {
            Ok(()) => None,
            Err(Error::InvalidName { reason, .. }) => Some(reason),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn playlist_rule() {
        let rule = PlaylistFile::default_name_rule();
        assert!(reason(&rule, "road trip.m3u").is_none());
        assert!(reason(&rule, "LOUD.M3U").is_none());
        assert!(reason(&rule, "plA.mp4").unwrap().contains("extension"));
        assert!(reason(&rule, "plA").unwrap().contains("no extension"));
        assert!(reason(&rule, "pl.old.m3u").unwrap().contains("more than one"));
        assert!(reason(&rule, ".m3u").unwrap().contains("empty stem"));
        assert!(reason(&rule, "sub/pl.m3u").unwrap().contains("separator"));
        assert!(reason(&rule, "").is_some());
    }

    #[test]
    fn track_rule_accepts_audio_extensions() {
        let rule = Track::default_name_rule();
        for name in ["a.mp3", "b.flac", "c.OGG"] {
            assert!(rule.validate(name).is_ok(), "{name}");
        }
        assert!(rule.validate("cover.jpg").is_err());
    }

    #[test]
    fn segment_and_label_rules() {
        assert!(NameRule::Segment.validate("Rock").is_ok());
        assert!(NameRule::Segment.validate("Rock/Indie").is_err());
        assert!(NameRule::Segment.validate("  ").is_err());
        for rule in [NameRule::Segment, PlaylistFile::default_name_rule()] {
            for name in [".", ".."] {
                assert!(reason(&rule, name).unwrap().contains("relative directory"), "{name}");
            }
        }
        assert!(NameRule::Label.validate("/media/usb0").is_ok());
    }
}
