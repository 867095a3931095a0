//! Valeur immuable transportée par l'ObservationManager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EventKind;

/// Sac de propriétés attaché à un évènement (clé → valeur).
pub type Details = HashMap<String, Value>;

/// Well-known detail keys shared by emitters and observers.
pub mod keys {
    /// Identifier of the entity concerned (after the change for renames).
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const OLD_ID: &str = "old_id";
    pub const NEW_ID: &str = "new_id";
    pub const OLD_NAME: &str = "old_name";
    pub const NEW_NAME: &str = "new_name";
    /// Serialized scope children of the entity live in.
    pub const SCOPE: &str = "scope";
    /// Label of the registry that produced the event.
    pub const ENTITY_KIND: &str = "kind";
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Évènement : un type et ses détails.
///
/// `sequence` is process-wide and strictly increasing, so it reflects
/// creation order for every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub details: Details,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self::with_details(kind, Details::new())
    }

    pub fn with_details(kind: EventKind, details: Details) -> Self {
        Self {
            kind,
            details,
            timestamp: Utc::now(),
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Builder-style insertion of one detail.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_details() {
        let event = Event::new(EventKind::TrackRenamed)
            .with(keys::OLD_ID, "a")
            .with(keys::NEW_ID, "b")
            .with("bitrate", 320);

        assert_eq!(event.detail_str(keys::OLD_ID), Some("a"));
        assert_eq!(event.detail_str(keys::NEW_ID), Some("b"));
        assert_eq!(event.detail("bitrate"), Some(&Value::from(320)));
        assert_eq!(event.detail_str("bitrate"), None);
        assert!(event.detail("missing").is_none());
    }

    #[test]
    fn sequence_follows_creation_order() {
        let first = Event::new(EventKind::VolumeChanged);
        let second = Event::new(EventKind::VolumeChanged);
        assert!(second.sequence > first.sequence);
    }
}
