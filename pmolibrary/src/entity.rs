//! Entité enregistrée : identité dérivée, nom, scope parent et propriétés.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::EntityId;
use crate::scope::{self, Scope};

/// Sac de propriétés ouvert d'une entité.
pub type Properties = HashMap<String, Value>;

#[derive(Debug, Clone)]
struct Identity {
    id: EntityId,
    name: String,
    parent: Option<Scope>,
}

/// Entité partagée par son registre et par les collaborateurs qui la
/// consultent (`Arc<Entity>`).
///
/// Identity fields change only through the owning registry (rename,
/// rescope). Properties can be edited by anyone holding the handle.
#[derive(Debug)]
pub struct Entity {
    kind: &'static str,
    identity: RwLock<Identity>,
    properties: RwLock<Properties>,
}

/// Persistable image of an entity, produced for the commit collaborator
/// and consumed when registries are restored at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    pub parent: Option<Scope>,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub(crate) fn new(kind: &'static str, id: EntityId, name: String, parent: Option<Scope>) -> Self {
        Self {
            kind,
            identity: RwLock::new(Identity { id, name, parent }),
            properties: RwLock::new(Properties::new()),
        }
    }

    pub(crate) fn from_snapshot(kind: &'static str, snapshot: EntitySnapshot) -> Self {
        Self {
            kind,
            identity: RwLock::new(Identity {
                id: snapshot.id,
                name: snapshot.name,
                parent: snapshot.parent,
            }),
            properties: RwLock::new(snapshot.properties),
        }
    }

    /// Label of the registry kind this entity belongs to.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn id(&self) -> EntityId {
        self.identity.read().id.clone()
    }

    pub fn name(&self) -> String {
        self.identity.read().name.clone()
    }

    pub fn parent(&self) -> Option<Scope> {
        self.identity.read().parent.clone()
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.identity.read().parent.as_ref().map(|p| p.id.clone())
    }

    /// Chemin de la ressource physique (scope parent + nom).
    pub fn location(&self) -> PathBuf {
        let identity = self.identity.read();
        scope::location(identity.parent.as_ref(), &identity.name)
    }

    /// Scope offered to the entities living inside this one.
    pub fn scope(&self) -> Scope {
        let identity = self.identity.read();
        let mut ancestors = Vec::new();
        if let Some(parent) = &identity.parent {
            ancestors.extend(parent.ancestors.iter().cloned());
            ancestors.push(parent.id.clone());
        }
        Scope {
            id: identity.id.clone(),
            path: scope::location(identity.parent.as_ref(), &identity.name),
            ancestors,
        }
    }

    /// True if the parent scope, or one of its ancestors, is `scope_id`.
    pub fn is_under(&self, scope_id: &EntityId) -> bool {
        self.identity
            .read()
            .parent
            .as_ref()
            .is_some_and(|parent| parent.is_within(scope_id))
    }

    pub(crate) fn depth(&self) -> usize {
        self.identity.read().parent.as_ref().map_or(0, Scope::depth)
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.properties.read().get(key).cloned()
    }

    /// Sets a property, returning the previous value.
    pub fn set_property(&self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.properties.write().insert(key.to_string(), value.into())
    }

    pub fn remove_property(&self, key: &str) -> Option<Value> {
        self.properties.write().remove(key)
    }

    pub fn properties(&self) -> Properties {
        self.properties.read().clone()
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        let identity = self.identity.read().clone();
        EntitySnapshot {
            id: identity.id,
            name: identity.name,
            parent: identity.parent,
            properties: self.properties(),
        }
    }

    pub(crate) fn rename_to(&self, id: EntityId, name: String) {
        let mut identity = self.identity.write();
        identity.id = id;
        identity.name = name;
    }

    pub(crate) fn reparent(&self, id: EntityId, parent: Scope) {
        let mut identity = self.identity.write();
        identity.id = id;
        identity.parent = Some(parent);
    }

    /// Replaces `old` by `new` (or drops it when `new` is `None`) in the
    /// string list stored under `key`. Returns `true` if the list changed.
    pub(crate) fn retarget_in_list(&self, key: &str, old: &str, new: Option<&str>) -> bool {
        let mut properties = self.properties.write();
        let Some(Value::Array(items)) = properties.get_mut(key) else {
            return false;
        };

        let before = items.clone();
        match new {
            Some(new) => {
                for item in items.iter_mut() {
                    if item.as_str() == Some(old) {
                        *item = Value::String(new.to_string());
                    }
                }
            }
            None => items.retain(|item| item.as_str() != Some(old)),
        }
        *items != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Entity {
        let parent = Scope::new("dir".into(), "/mnt/usb/Music", vec!["device".into()]);
        Entity::new("track", "abc".into(), "a.mp3".into(), Some(parent))
    }

    #[test]
    fn child_scope_extends_ancestors() {
        let entity = sample();
        let scope = entity.scope();
        assert_eq!(scope.id, EntityId::from("abc"));
        assert_eq!(scope.path, PathBuf::from("/mnt/usb/Music/a.mp3"));
        assert_eq!(scope.ancestors, vec![EntityId::from("device"), EntityId::from("dir")]);
        assert!(entity.is_under(&"device".into()));
        assert!(entity.is_under(&"dir".into()));
        assert!(!entity.is_under(&"abc".into()));
    }

    #[test]
    fn rename_keeps_properties() {
        let entity = sample();
        entity.set_property("title", "Song");
        entity.rename_to("def".into(), "b.mp3".into());

        assert_eq!(entity.id(), EntityId::from("def"));
        assert_eq!(entity.name(), "b.mp3");
        assert_eq!(entity.property("title"), Some(json!("Song")));
    }

    #[test]
    fn retarget_list_entries() {
        let entity = sample();
        entity.set_property("tracks", json!(["x", "y", "x"]));

        assert!(entity.retarget_in_list("tracks", "x", Some("z")));
        assert_eq!(entity.property("tracks"), Some(json!(["z", "y", "z"])));

        assert!(entity.retarget_in_list("tracks", "y", None));
        assert_eq!(entity.property("tracks"), Some(json!(["z", "z"])));

        assert!(!entity.retarget_in_list("tracks", "missing", None));
        assert!(!entity.retarget_in_list("absent", "z", None));
    }

    #[test]
    fn snapshot_round_trips_through_entity() {
        let entity = sample();
        entity.set_property("rating", 4);
        let restored = Entity::from_snapshot("track", entity.snapshot());
        assert_eq!(restored.snapshot(), entity.snapshot());
    }
}
