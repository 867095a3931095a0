//! EntityRegistry : registre générique id → entité pour un type d'entité.
//!
//! Each registry owns one map behind one exclusive lock. Every composite
//! mutation (check-then-insert, the rename swap, scope cleanup, rescope)
//! runs entirely under that lock; events are emitted only after the lock
//! is released, so an observer may call back into any registry.

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use pmoevents::{keys, Event, EventKind, ObservationManager};
use tracing::{debug, info, warn};

use crate::entity::{Entity, EntitySnapshot};
use crate::error::{Error, Result};
use crate::id::{derive_id, EntityId};
use crate::kind::{EntityKind, NameRule};
use crate::scope::{self, Scope};
use crate::store::ResourceStore;

/// What happens to the physical resource when an entity leaves a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Only the registry entry goes away.
    Forget,
    /// The backing resource is deleted first.
    Delete,
}

/// Entité que le nettoyage n'a pas pu supprimer.
#[derive(Debug)]
pub struct CleanupFailure {
    pub id: EntityId,
    pub location: PathBuf,
    pub error: Error,
}

/// Résultat d'un nettoyage de scope (best-effort).
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<Arc<Entity>>,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct EntityRegistry<K: EntityKind> {
    entries: Mutex<HashMap<EntityId, Arc<Entity>>>,
    name_rule: NameRule,
    store: Arc<dyn ResourceStore>,
    observers: Arc<ObservationManager>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: EntityKind> fmt::Debug for EntityRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("kind", &K::label())
            .field("len", &self.len())
            .field("name_rule", &self.name_rule)
            .finish_non_exhaustive()
    }
}

impl<K: EntityKind> EntityRegistry<K> {
    pub fn new(observers: Arc<ObservationManager>, store: Arc<dyn ResourceStore>) -> Self {
        Self::with_name_rule(observers, store, K::default_name_rule())
    }

    pub fn with_name_rule(
        observers: Arc<ObservationManager>,
        store: Arc<dyn ResourceStore>,
        name_rule: NameRule,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            name_rule,
            store,
            observers,
            _kind: PhantomData,
        }
    }

    pub fn label(&self) -> &'static str {
        K::label()
    }

    pub fn name_rule(&self) -> &NameRule {
        &self.name_rule
    }

    pub fn observers(&self) -> &Arc<ObservationManager> {
        &self.observers
    }

    // ------------------------------------------------------------------
    // Enregistrement et consultation
    // ------------------------------------------------------------------

    /// Registers an entity under `id`.
    ///
    /// If `id` is already present the existing entity is returned untouched
    /// (first registration wins) and no event is emitted.
    pub fn register(&self, id: EntityId, name: &str, parent: Option<&Scope>) -> Arc<Entity> {
        let (entity, created) = {
            let mut entries = self.entries.lock();
            match entries.entry(id) {
                Entry::Occupied(slot) => (slot.get().clone(), false),
                Entry::Vacant(slot) => {
                    let entity = Arc::new(Entity::new(
                        K::label(),
                        slot.key().clone(),
                        name.to_string(),
                        parent.cloned(),
                    ));
                    slot.insert(entity.clone());
                    (entity, true)
                }
            }
        };

        if created {
            debug!(kind = K::label(), id = %entity.id(), name, "Entity registered");
            self.observers
                .notify(entity_event::<K>(K::added_event(), &entity));
        }
        entity
    }

    /// Derives the id from `parent` and `name`, then registers.
    pub fn register_named(&self, name: &str, parent: Option<&Scope>) -> Arc<Entity> {
        let id = derive_id(&scope::scope_path(parent), name);
        self.register(id, name, parent)
    }

    pub fn lookup(&self, id: &EntityId) -> Result<Arc<Entity>> {
        self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.entries.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Bulk enumeration, in no particular order.
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.entries.lock().values().cloned().collect()
    }

    /// Entities whose direct parent is `scope_id`.
    pub fn children_of(&self, scope_id: &EntityId) -> Vec<Arc<Entity>> {
        self.entries
            .lock()
            .values()
            .filter(|e| e.parent_id().as_ref() == Some(scope_id))
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Renommage
    // ------------------------------------------------------------------

    /// Renames `entity` inside its scope.
    ///
    /// The physical rename happens first; the registry entry is swapped
    /// only once it succeeded. The rename event (old and new id) is then
    /// delivered synchronously, outside the lock, so dependent registries
    /// have updated their references when this returns.
    pub fn rename(&self, entity: &Entity, new_name: &str) -> Result<Arc<Entity>> {
        self.name_rule.validate(new_name)?;

        let (renamed, event) = {
            let mut entries = self.entries.lock();
            let old_id = entity.id();
            let current = entries
                .get(&old_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(old_id.to_string()))?;

            let old_name = current.name();
            if old_name == new_name {
                return Ok(current);
            }

            let parent = current.parent();
            let new_id = derive_id(&scope::scope_path(parent.as_ref()), new_name);
            let old_location = current.location();
            let new_location = scope::location(parent.as_ref(), new_name);
            let backed = K::backed_by_resource();

            if backed && !self.store.exists(&old_location) {
                return Err(Error::ResourceMissing(old_location));
            }

            match entries.get(&new_id) {
                Some(existing) if !Arc::ptr_eq(existing, &current) => {
                    let existing_location = existing.location();
                    if !self.store.same_resource(&existing_location, &old_location) {
                        return Err(Error::NameConflict {
                            name: new_name.to_string(),
                            id: new_id.to_string(),
                            existing: existing_location,
                        });
                    }
                    // Même ressource vue avec une autre casse : pas un conflit
                    debug!(
                        kind = K::label(),
                        id = %new_id,
                        "Rename target already registered for the same resource"
                    );
                }
                Some(_) => {}
                None => {
                    if backed
                        && self.store.exists(&new_location)
                        && !self.store.same_resource(&new_location, &old_location)
                    {
                        return Err(Error::NameConflict {
                            name: new_name.to_string(),
                            id: new_id.to_string(),
                            existing: new_location,
                        });
                    }
                }
            }

            if backed {
                self.store
                    .rename(&old_location, &new_location)
                    .map_err(|source| Error::resource(old_location.clone(), source))?;
            }

            entries.remove(&old_id);
            current.rename_to(new_id.clone(), new_name.to_string());
            entries.insert(new_id.clone(), current.clone());

            info!(
                kind = K::label(),
                old_id = %old_id,
                new_id = %new_id,
                "Renamed '{}' to '{}'",
                old_name,
                new_name
            );
            let event = rename_event::<K>(&current, &old_id, &old_name);
            (current, event)
        };

        self.observers.notify_sync(event);
        Ok(renamed)
    }

    // ------------------------------------------------------------------
    // Suppression
    // ------------------------------------------------------------------

    /// Removes one entity. With [`Disposal::Delete`] the backing resource
    /// is deleted first; if that fails the registry is left unchanged.
    pub fn remove(&self, id: &EntityId, disposal: Disposal) -> Result<Arc<Entity>> {
        let removed = {
            let mut entries = self.entries.lock();
            let entity = entries
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))?;

            if disposal == Disposal::Delete && K::backed_by_resource() {
                let location = entity.location();
                self.store
                    .remove(&location)
                    .map_err(|source| Error::resource(location, source))?;
            }

            entries.remove(id);
            entity
        };

        debug!(kind = K::label(), id = %id, "Entity removed");
        self.observers
            .notify_sync(entity_event::<K>(K::removed_event(), &removed));
        Ok(removed)
    }

    /// Removes every entity whose parent scope, or one of its ancestors,
    /// is `scope_id`.
    ///
    /// Best-effort: with [`Disposal::Delete`], an entity whose resource
    /// cannot be deleted is logged, stays registered and is reported in
    /// [`CleanupReport::failed`]; the others are still processed. Deepest
    /// entities go first so directories are emptied before being deleted.
    pub fn cleanup_scope(&self, scope_id: &EntityId, disposal: Disposal) -> CleanupReport {
        let report = {
            let mut entries = self.entries.lock();
            let mut doomed: Vec<Arc<Entity>> = entries
                .values()
                .filter(|e| e.is_under(scope_id))
                .cloned()
                .collect();
            doomed.sort_by_key(|e| Reverse(e.depth()));

            let mut report = CleanupReport::default();
            for entity in doomed {
                let id = entity.id();
                if disposal == Disposal::Delete && K::backed_by_resource() {
                    let location = entity.location();
                    if let Err(source) = self.store.remove(&location) {
                        warn!(
                            kind = K::label(),
                            id = %id,
                            "Cleanup could not delete {:?}: {}",
                            location,
                            source
                        );
                        report.failed.push(CleanupFailure {
                            id,
                            location: location.clone(),
                            error: Error::resource(location, source),
                        });
                        continue;
                    }
                }
                entries.remove(&id);
                report.removed.push(entity);
            }
            report
        };

        if !report.removed.is_empty() || !report.failed.is_empty() {
            info!(
                kind = K::label(),
                scope = %scope_id,
                removed = report.removed.len(),
                failed = report.failed.len(),
                "Scope cleanup done"
            );
        }

        for entity in &report.removed {
            self.observers
                .notify_sync(entity_event::<K>(K::removed_event(), entity));
        }
        report
    }

    // ------------------------------------------------------------------
    // Cascades
    // ------------------------------------------------------------------

    /// Re-parents every entity whose direct parent is `old_scope_id` under
    /// `new_scope` and re-keys it from its new location.
    ///
    /// Physical resources are not touched: the scope itself already moved.
    /// Each re-keyed entity emits this kind's rename event, so scopes nested
    /// deeper follow level by level. When the new id is already registered
    /// the existing entry wins and the moved entity is dropped; the rename
    /// event still points references at the surviving id.
    pub fn rescope(&self, old_scope_id: &EntityId, new_scope: &Scope) -> Vec<Arc<Entity>> {
        let (moved, events) = {
            let mut entries = self.entries.lock();
            let children: Vec<Arc<Entity>> = entries
                .values()
                .filter(|e| e.parent_id().as_ref() == Some(old_scope_id))
                .cloned()
                .collect();

            let new_scope_path = new_scope.canonical_path();
            let mut moved = Vec::with_capacity(children.len());
            let mut events = Vec::new();
            for child in children {
                let old_id = child.id();
                let name = child.name();
                let new_id = derive_id(&new_scope_path, &name);

                entries.remove(&old_id);
                match entries.get(&new_id) {
                    Some(existing) => {
                        warn!(
                            kind = K::label(),
                            old_id = %old_id,
                            new_id = %new_id,
                            "Moved entity collides with a registered one, keeping the registered entity"
                        );
                        events.push(rename_event::<K>(existing, &old_id, &name));
                    }
                    None => {
                        child.reparent(new_id.clone(), new_scope.clone());
                        entries.insert(new_id.clone(), child.clone());
                        if new_id != old_id {
                            events.push(rename_event::<K>(&child, &old_id, &name));
                        }
                        moved.push(child);
                    }
                }
            }
            (moved, events)
        };

        if !moved.is_empty() {
            debug!(
                kind = K::label(),
                from = %old_scope_id,
                to = %new_scope.id,
                count = moved.len(),
                "Entities rescoped"
            );
        }
        for event in events {
            self.observers.notify_sync(event);
        }
        moved
    }

    /// Replaces `old` by `new` (or drops it when `new` is `None`) in the id
    /// list stored under property `key` of every entity. Returns the
    /// entities that changed.
    pub fn retarget_references(
        &self,
        key: &str,
        old: &EntityId,
        new: Option<&EntityId>,
    ) -> Vec<Arc<Entity>> {
        let entries = self.entries.lock();
        entries
            .values()
            .filter(|e| e.retarget_in_list(key, old.as_str(), new.map(EntityId::as_str)))
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Persistance
    // ------------------------------------------------------------------

    /// Image of every entity, sorted by id.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        let mut snapshots: Vec<EntitySnapshot> = self
            .entries
            .lock()
            .values()
            .map(|e| e.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Loads entities from a snapshot without emitting events. Ids already
    /// present keep their entity. Returns the number of entities inserted.
    pub fn restore(&self, snapshots: Vec<EntitySnapshot>) -> usize {
        let mut entries = self.entries.lock();
        let mut inserted = 0;
        for snapshot in snapshots {
            if let Entry::Vacant(slot) = entries.entry(snapshot.id.clone()) {
                slot.insert(Arc::new(Entity::from_snapshot(K::label(), snapshot)));
                inserted += 1;
            }
        }
        debug!(kind = K::label(), inserted, "Registry restored");
        inserted
    }

    /// Drops every entry without emitting events. Returns how many were held.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

fn entity_event<K: EntityKind>(kind: EventKind, entity: &Entity) -> Event {
    Event::new(kind)
        .with(keys::ID, entity.id())
        .with(keys::NAME, entity.name())
        .with(keys::ENTITY_KIND, K::label())
}

fn rename_event<K: EntityKind>(entity: &Entity, old_id: &EntityId, old_name: &str) -> Event {
    let new_id = entity.id();
    Event::new(K::renamed_event())
        .with(keys::ID, new_id.clone())
        .with(keys::OLD_ID, old_id.clone())
        .with(keys::NEW_ID, new_id)
        .with(keys::OLD_NAME, old_name)
        .with(keys::NEW_NAME, entity.name())
        .with(keys::ENTITY_KIND, K::label())
        .with(keys::SCOPE, serde_json::to_value(entity.scope()).unwrap_or_default())
}
