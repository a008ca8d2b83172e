use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::PersistenceError;
use crate::schema::EntityRef;

type Supplier<T> = Box<dyn Fn() -> Result<Vec<EntityRef<T>>, PersistenceError>>;

enum CollectionState<T> {
    Unresolved(Supplier<T>),
    Resolved(Vec<EntityRef<T>>),
}

/// The "many" side of a one-to-many relation.
///
/// An eagerly fetched collection is resolved from the start. A lazy one holds a supplier and
/// runs it on the first access of any kind, then keeps the result; a failed load leaves it
/// unresolved so a later access tries again. Loading after the owning session closed fails
/// with [`PersistenceError::LazyInitialization`].
pub struct EntityCollection<T> {
    state: RefCell<CollectionState<T>>,
}

impl<T> EntityCollection<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    #[must_use]
    pub fn from_vec(items: Vec<EntityRef<T>>) -> Self {
        Self {
            state: RefCell::new(CollectionState::Resolved(items)),
        }
    }

    /// Collection backed by `supplier`, which runs on first access.
    pub fn lazy(
        supplier: impl Fn() -> Result<Vec<EntityRef<T>>, PersistenceError> + 'static,
    ) -> Self {
        Self {
            state: RefCell::new(CollectionState::Unresolved(Box::new(supplier))),
        }
    }

    /// `true` once the backing collection is in memory. Never triggers a load.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.state.try_borrow().as_deref(),
            Ok(CollectionState::Resolved(_))
        )
    }

    /// Run `f` over the loaded items.
    ///
    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn with_items<R>(&self, f: impl FnOnce(&[EntityRef<T>]) -> R) -> Result<R, PersistenceError> {
        self.materialize()?;
        let state = self.borrow_state()?;
        match &*state {
            CollectionState::Resolved(items) => Ok(f(items)),
            CollectionState::Unresolved(_) => Err(not_resolved()),
        }
    }

    fn with_items_mut<R>(
        &self,
        f: impl FnOnce(&mut Vec<EntityRef<T>>) -> R,
    ) -> Result<R, PersistenceError> {
        self.materialize()?;
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_| PersistenceError::state("collection is already borrowed"))?;
        match &mut *state {
            CollectionState::Resolved(items) => Ok(f(items)),
            CollectionState::Unresolved(_) => Err(not_resolved()),
        }
    }

    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn len(&self) -> Result<usize, PersistenceError> {
        self.with_items(<[EntityRef<T>]>::len)
    }

    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn is_empty(&self) -> Result<bool, PersistenceError> {
        self.with_items(<[EntityRef<T>]>::is_empty)
    }

    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn get(&self, index: usize) -> Result<Option<EntityRef<T>>, PersistenceError> {
        self.with_items(|items| items.get(index).cloned())
    }

    /// Snapshot of the items, suitable for iteration.
    ///
    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn to_vec(&self) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        self.with_items(<[EntityRef<T>]>::to_vec)
    }

    /// Membership by instance identity.
    ///
    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn contains(&self, entity: &EntityRef<T>) -> Result<bool, PersistenceError> {
        self.with_items(|items| items.iter().any(|item| Rc::ptr_eq(item, entity)))
    }

    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn push(&self, entity: EntityRef<T>) -> Result<(), PersistenceError> {
        self.with_items_mut(|items| items.push(entity))
    }

    /// Remove `entity` (by identity); `Ok(false)` if it was not present.
    ///
    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn remove(&self, entity: &EntityRef<T>) -> Result<bool, PersistenceError> {
        self.with_items_mut(|items| {
            let before = items.len();
            items.retain(|item| !Rc::ptr_eq(item, entity));
            items.len() != before
        })
    }

    /// # Errors
    /// Returns the supplier's error if the collection cannot be loaded.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.with_items_mut(Vec::clear)
    }

    fn borrow_state(&self) -> Result<std::cell::Ref<'_, CollectionState<T>>, PersistenceError> {
        self.state
            .try_borrow()
            .map_err(|_| PersistenceError::state("collection is being modified"))
    }

    fn materialize(&self) -> Result<(), PersistenceError> {
        let loaded = {
            let state = self.borrow_state()?;
            match &*state {
                CollectionState::Resolved(_) => return Ok(()),
                CollectionState::Unresolved(supplier) => supplier()?,
            }
        };
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_| PersistenceError::state("collection is already borrowed"))?;
        *state = CollectionState::Resolved(loaded);
        Ok(())
    }
}

fn not_resolved() -> PersistenceError {
    PersistenceError::state("collection was not resolved")
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<EntityRef<T>>> for EntityCollection<T> {
    fn from(items: Vec<EntityRef<T>>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> fmt::Debug for EntityCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow().as_deref() {
            Ok(CollectionState::Resolved(items)) => f
                .debug_struct("EntityCollection")
                .field("len", &items.len())
                .finish(),
            Ok(CollectionState::Unresolved(_)) => f.write_str("EntityCollection(<unresolved>)"),
            Err(_) => f.write_str("EntityCollection(<borrowed>)"),
        }
    }
}
