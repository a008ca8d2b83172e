//! Identity map and snapshot store of one session.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::connection::DbConnection;
use crate::error::PersistenceError;
use crate::persister::EntityPersister;
use crate::schema::{Entity, EntityRef, descriptor, simple_type_name};
use crate::types::{EntityId, RowValues};

/// Identity of an entity within one session: its type and identifier value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    type_id: TypeId,
    type_name: &'static str,
    id: EntityId,
}

impl EntityKey {
    #[must_use]
    pub fn of<T: Entity>(id: impl Into<EntityId>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: simple_type_name::<T>(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// Type-erased view of a cached entity, implemented for every `RefCell<T: Entity>`.
///
/// Lets the context and the action queue hold entities of different types side by side.
pub trait ManagedEntity {
    fn type_name(&self) -> &'static str;

    /// Key of the entity; `Ok(None)` while its identifier is unset.
    ///
    /// # Errors
    /// Fails if the entity is mutably borrowed or its identifier cannot be a key.
    fn entity_key(&self) -> Result<Option<EntityKey>, PersistenceError>;

    /// Current values of the scalar fields.
    ///
    /// # Errors
    /// Fails if the entity is mutably borrowed.
    fn snapshot_values(&self) -> Result<Vec<RowValues>, PersistenceError>;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// # Errors
    /// Propagates the persister's error.
    fn insert(&self, persister: &EntityPersister, conn: &mut dyn DbConnection)
    -> Result<(), PersistenceError>;

    /// # Errors
    /// Propagates the persister's error.
    fn update(&self, persister: &EntityPersister, conn: &mut dyn DbConnection)
    -> Result<(), PersistenceError>;

    /// # Errors
    /// Propagates the persister's error.
    fn delete(&self, persister: &EntityPersister, conn: &mut dyn DbConnection)
    -> Result<(), PersistenceError>;
}

fn borrowed(type_name: &str) -> PersistenceError {
    PersistenceError::state(format!("{type_name} entity is mutably borrowed"))
}

impl<T: Entity> ManagedEntity for RefCell<T> {
    fn type_name(&self) -> &'static str {
        simple_type_name::<T>()
    }

    fn entity_key(&self) -> Result<Option<EntityKey>, PersistenceError> {
        let desc = descriptor::<T>()?;
        let entity = self.try_borrow().map_err(|_| borrowed(desc.type_name()))?;
        Ok(desc.entity_id(&entity)?.map(EntityKey::of::<T>))
    }

    fn snapshot_values(&self) -> Result<Vec<RowValues>, PersistenceError> {
        let desc = descriptor::<T>()?;
        let entity = self.try_borrow().map_err(|_| borrowed(desc.type_name()))?;
        Ok(desc.snapshot(&entity))
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn insert(
        &self,
        persister: &EntityPersister,
        conn: &mut dyn DbConnection,
    ) -> Result<(), PersistenceError> {
        persister.insert(conn, self)
    }

    fn update(
        &self,
        persister: &EntityPersister,
        conn: &mut dyn DbConnection,
    ) -> Result<(), PersistenceError> {
        persister.update(conn, self)
    }

    fn delete(
        &self,
        persister: &EntityPersister,
        conn: &mut dyn DbConnection,
    ) -> Result<(), PersistenceError> {
        persister.delete(conn, self)
    }
}

fn require_key(entity: &dyn ManagedEntity) -> Result<EntityKey, PersistenceError> {
    entity.entity_key()?.ok_or_else(|| {
        PersistenceError::state(format!(
            "{} entity without an identifier cannot be cached",
            entity.type_name()
        ))
    })
}

/// Saved copy of a context, restored when a flush fails.
pub(crate) struct Checkpoint {
    entities: HashMap<EntityKey, Rc<dyn ManagedEntity>>,
    snapshots: HashMap<EntityKey, Vec<RowValues>>,
}

/// Per-session identity map with the field snapshot of every cached entity.
#[derive(Default)]
pub struct PersistenceContext {
    entities: HashMap<EntityKey, Rc<dyn ManagedEntity>>,
    snapshots: HashMap<EntityKey, Vec<RowValues>>,
}

impl PersistenceContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached instance of `T` with identifier `id`, if any.
    #[must_use]
    pub fn get_cached<T: Entity>(&self, id: impl Into<EntityId>) -> Option<EntityRef<T>> {
        self.get_by_key(&EntityKey::of::<T>(id))
    }

    pub(crate) fn get_by_key<T: Entity>(&self, key: &EntityKey) -> Option<EntityRef<T>> {
        let entity = Rc::clone(self.entities.get(key)?);
        entity.into_any().downcast::<RefCell<T>>().ok()
    }

    #[must_use]
    pub fn contains_key(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Whether `entity` itself (not merely an entity with the same key) is cached.
    ///
    /// # Errors
    /// Fails if the entity is mutably borrowed.
    pub fn contains<T: Entity>(&self, entity: &EntityRef<T>) -> Result<bool, PersistenceError> {
        let Some(key) = entity.entity_key()? else {
            return Ok(false);
        };
        Ok(self
            .get_by_key::<T>(&key)
            .is_some_and(|cached| Rc::ptr_eq(&cached, entity)))
    }

    /// Cache `entity` and snapshot it. If its key is already cached the resident instance is
    /// returned and `entity` is ignored.
    ///
    /// # Errors
    /// Fails for an entity without identifier or one that is mutably borrowed.
    pub fn cache<T: Entity>(&mut self, entity: EntityRef<T>) -> Result<EntityRef<T>, PersistenceError> {
        let resident = self.cache_managed(Rc::clone(&entity) as Rc<dyn ManagedEntity>)?;
        Ok(resident.into_any().downcast::<RefCell<T>>().unwrap_or(entity))
    }

    pub(crate) fn cache_managed(
        &mut self,
        entity: Rc<dyn ManagedEntity>,
    ) -> Result<Rc<dyn ManagedEntity>, PersistenceError> {
        let key = require_key(entity.as_ref())?;
        if let Some(existing) = self.entities.get(&key) {
            return Ok(Rc::clone(existing));
        }
        let values = entity.snapshot_values()?;
        self.snapshots.insert(key.clone(), values);
        self.entities.insert(key, Rc::clone(&entity));
        Ok(entity)
    }

    /// Record the current scalar field values of a cached entity.
    ///
    /// # Errors
    /// Fails for an entity without identifier or one that is mutably borrowed.
    pub fn snapshot<T: Entity>(&mut self, entity: &EntityRef<T>) -> Result<(), PersistenceError> {
        self.snapshot_managed(&**entity)
    }

    pub(crate) fn snapshot_managed(
        &mut self,
        entity: &dyn ManagedEntity,
    ) -> Result<(), PersistenceError> {
        let key = require_key(entity)?;
        let values = entity.snapshot_values()?;
        self.snapshots.insert(key, values);
        Ok(())
    }

    /// Evict the cache and snapshot entries of `entity`.
    ///
    /// # Errors
    /// Fails if the entity is mutably borrowed.
    pub fn remove<T: Entity>(&mut self, entity: &EntityRef<T>) -> Result<(), PersistenceError> {
        self.remove_managed(&**entity)
    }

    pub(crate) fn remove_managed(&mut self, entity: &dyn ManagedEntity) -> Result<(), PersistenceError> {
        if let Some(key) = entity.entity_key()? {
            self.entities.remove(&key);
            self.snapshots.remove(&key);
        }
        Ok(())
    }

    /// Entities whose scalar fields changed since their snapshot, each reported once.
    /// Their snapshots are refreshed to the current values.
    ///
    /// Returned in key order so that flushes are reproducible.
    ///
    /// # Errors
    /// Fails if a cached entity is mutably borrowed.
    pub fn diff(&mut self) -> Result<Vec<Rc<dyn ManagedEntity>>, PersistenceError> {
        let mut dirty = Vec::new();
        for (key, entity) in &self.entities {
            let current = entity.snapshot_values()?;
            let changed = self
                .snapshots
                .get(key)
                .is_none_or(|previous| *previous != current);
            if changed {
                dirty.push((key.clone(), Rc::clone(entity), current));
            }
        }
        dirty.sort_by(|a, b| (a.0.type_name, &a.0.id).cmp(&(b.0.type_name, &b.0.id)));

        Ok(dirty
            .into_iter()
            .map(|(key, entity, current)| {
                self.snapshots.insert(key, current);
                entity
            })
            .collect())
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            entities: self.entities.clone(),
            snapshots: self.snapshots.clone(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.entities = checkpoint.entities;
        self.snapshots = checkpoint.snapshots;
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.snapshots.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.entities.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("PersistenceContext")
            .field("entities", &keys)
            .finish()
    }
}
