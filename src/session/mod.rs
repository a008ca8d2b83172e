//! Unit of work: [`Session`], its [`Transaction`] and the [`SessionFactory`] that opens it.

mod factory;
mod transaction;

pub use factory::SessionFactory;
pub use transaction::Transaction;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, info, trace, warn};

use crate::action::{ActionQueue, EntityAction};
use crate::connection::DbConnection;
use crate::context::{ManagedEntity, PersistenceContext};
use crate::error::PersistenceError;
use crate::lazy::EntityCollection;
use crate::persister::{EntityPersister, Loader};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::schema::{Entity, EntityRef, descriptor, simple_type_name};
use crate::types::{EntityId, RowValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionState {
    Closed,
    Open,
}

pub(crate) struct SessionCore {
    pool: ConnectionPool,
    persister: EntityPersister,
    connection: Option<PooledConnection>,
    context: PersistenceContext,
    actions: ActionQueue,
    pub(crate) state: SessionState,
    pub(crate) transaction: TransactionState,
    self_ref: Weak<RefCell<SessionCore>>,
}

impl SessionCore {
    fn ensure_open(&self) -> Result<(), PersistenceError> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(PersistenceError::state("Session is closed")),
        }
    }

    fn ensure_transaction(&self) -> Result<(), PersistenceError> {
        match self.transaction {
            TransactionState::Open => Ok(()),
            TransactionState::Closed => Err(PersistenceError::state("Transaction is not open")),
        }
    }

    /// Lease a connection on first use.
    fn ensure_connection(&mut self) -> Result<(), PersistenceError> {
        if self.connection.is_none() {
            self.connection = Some(self.pool.lease()?);
        }
        Ok(())
    }

    fn with_loader<R>(
        &mut self,
        use_context: bool,
        load: impl FnOnce(&mut Loader<'_>) -> Result<R, PersistenceError>,
    ) -> Result<R, PersistenceError> {
        self.ensure_connection()?;
        let session = Weak::clone(&self.self_ref);
        let persister = self.persister;
        let checkpoint = use_context.then(|| self.context.checkpoint());
        let loaded = {
            let Self {
                connection,
                context,
                ..
            } = &mut *self;
            let conn = connection
                .as_deref_mut()
                .ok_or_else(|| PersistenceError::state("Session has no connection"))?;
            let context = use_context.then_some(context);
            let mut loader = Loader::new(persister, conn, context, Some(session));
            load(&mut loader)
        };
        // Entities registered before a relation failed must not stay cached half-loaded.
        if loaded.is_err() {
            if let Some(checkpoint) = checkpoint {
                self.context.restore(checkpoint);
            }
        }
        loaded
    }

    pub(crate) fn flush(&mut self) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        let checkpoint = self.context.checkpoint();
        let dirty = match self.context.diff() {
            Ok(dirty) => dirty,
            Err(err) => {
                self.context.restore(checkpoint);
                return Err(err);
            }
        };
        for entity in dirty {
            self.actions.enqueue(EntityAction::Update {
                persister: self.persister,
                entity,
            });
        }
        if self.actions.is_empty() {
            return Ok(());
        }

        let in_transaction = self.transaction == TransactionState::Open;
        if let Err(err) = self.ensure_connection() {
            self.context.restore(checkpoint);
            self.actions.clear();
            return Err(err);
        }
        let Self {
            connection,
            context,
            actions,
            ..
        } = self;
        let Some(conn) = connection.as_deref_mut() else {
            return Err(PersistenceError::state("Session has no connection"));
        };

        let pending = actions.drain_in_priority_order();
        let count = pending.len();
        match run_actions(conn, context, pending, in_transaction) {
            Ok(()) => {
                info!(actions = count, in_transaction, "session flushed");
                Ok(())
            }
            Err(cause) => {
                context.restore(checkpoint);
                match conn.rollback() {
                    Ok(()) => {
                        if let Err(err) = conn.set_auto_commit(true) {
                            warn!(error = %err, "failed to restore auto-commit after flush error");
                        }
                        warn!(error = %cause, "flush failed, connection rolled back");
                        Err(PersistenceError::Flush(Box::new(cause)))
                    }
                    Err(source) => {
                        // Still inside the failed transaction: never commit it, never reuse it.
                        if let Some(conn) = connection.take() {
                            conn.discard();
                        }
                        warn!(error = %cause, rollback = %source, "flush failed and rollback failed");
                        Err(PersistenceError::Rollback {
                            source: Box::new(source),
                            cause: Box::new(cause),
                        })
                    }
                }
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.context.clear();
        self.actions.clear();
    }

    /// Discard any statement executed on the leased connection since the last commit.
    pub(crate) fn rollback_connection(&mut self) -> Result<(), PersistenceError> {
        if let Some(conn) = self.connection.as_deref_mut() {
            if let Err(err) = conn.rollback() {
                if let Some(conn) = self.connection.take() {
                    conn.discard();
                }
                return Err(err);
            }
            conn.set_auto_commit(true)?;
        }
        Ok(())
    }

    fn load_collection<R: Entity>(
        &mut self,
        column: &str,
        owner_id: &RowValues,
    ) -> Result<Vec<EntityRef<R>>, PersistenceError> {
        let desc = descriptor::<R>()?;
        self.with_loader(true, |loader| loader.find_all_by(&desc, column, owner_id))
    }
}

fn run_actions(
    conn: &mut dyn DbConnection,
    context: &mut PersistenceContext,
    pending: Vec<EntityAction>,
    in_transaction: bool,
) -> Result<(), PersistenceError> {
    if in_transaction {
        conn.set_auto_commit(false)?;
    }
    for action in pending {
        action.execute(conn, context)?;
    }
    conn.commit()?;
    conn.set_auto_commit(true)
}

/// Lazy collection of `R` loaded through `session` once first read.
pub(crate) fn lazy_collection<R: Entity>(
    session: Weak<RefCell<SessionCore>>,
    column: String,
    owner_id: RowValues,
) -> EntityCollection<R> {
    EntityCollection::lazy(move || {
        let closed = || PersistenceError::LazyInitialization {
            entity: simple_type_name::<R>().to_string(),
        };
        let core = session.upgrade().ok_or_else(closed)?;
        let mut core = core
            .try_borrow_mut()
            .map_err(|_| PersistenceError::state("Session is busy"))?;
        if core.state == SessionState::Closed {
            return Err(closed());
        }
        debug!(entity = simple_type_name::<R>(), column = %column, "initializing lazy collection");
        core.load_collection::<R>(&column, &owner_id)
    })
}

/// A unit of work over one leased connection.
///
/// Persistent entities are tracked in an identity map: loading the same row twice yields the
/// same [`EntityRef`], and changes to their fields are written back on flush. Inserts and
/// deletes are queued and run on flush, inserts first and deletes last. A session is meant for
/// one thread of control and is neither `Send` nor `Sync`.
pub struct Session {
    core: Rc<RefCell<SessionCore>>,
}

impl Session {
    pub(crate) fn open(pool: ConnectionPool, persister: EntityPersister) -> Self {
        let core = Rc::new_cyclic(|self_ref| {
            RefCell::new(SessionCore {
                pool,
                persister,
                connection: None,
                context: PersistenceContext::new(),
                actions: ActionQueue::new(),
                state: SessionState::Open,
                transaction: TransactionState::Closed,
                self_ref: Weak::clone(self_ref),
            })
        });
        debug!("session opened");
        Self { core }
    }

    pub(crate) fn core(&self) -> Result<std::cell::RefMut<'_, SessionCore>, PersistenceError> {
        self.core
            .try_borrow_mut()
            .map_err(|_| PersistenceError::state("Session is busy"))
    }

    /// Transaction handle bound to this session.
    #[must_use]
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.core
            .try_borrow()
            .is_ok_and(|core| core.state == SessionState::Open)
    }

    /// Queue `entity` for insertion at the next flush.
    ///
    /// # Errors
    /// Fails if the session is closed, no transaction is open, or an entity with the same
    /// identifier is already persistent in this session.
    pub fn persist<T: Entity>(&self, entity: &EntityRef<T>) -> Result<(), PersistenceError> {
        let mut core = self.core()?;
        core.ensure_open()?;
        core.ensure_transaction()?;
        if let Some(key) = entity.entity_key()? {
            if core.context.contains_key(&key) {
                return Err(PersistenceError::state(format!(
                    "Entity {key} is already persistent"
                )));
            }
        }
        trace!(entity = simple_type_name::<T>(), "persist");
        let persister = core.persister;
        core.actions.enqueue(EntityAction::Insert {
            persister,
            entity: Rc::clone(entity) as Rc<dyn ManagedEntity>,
        });
        Ok(())
    }

    /// The entity of type `T` with identifier `id`, loading it if it is not yet in the
    /// session. Pending changes are flushed first.
    ///
    /// # Errors
    /// Fails if the session is closed, the flush fails, or the row cannot be loaded.
    pub fn find<T: Entity>(
        &self,
        id: impl Into<EntityId>,
    ) -> Result<Option<EntityRef<T>>, PersistenceError> {
        let id = id.into();
        let mut core = self.core()?;
        core.ensure_open()?;
        core.flush()?;
        trace!(entity = simple_type_name::<T>(), %id, "find");
        if let Some(cached) = core.context.get_cached::<T>(id.clone()) {
            return Ok(Some(cached));
        }
        core.with_loader(true, |loader| loader.load_by_id::<T>(&id.to_value()))
    }

    /// Every row of `T`, after flushing pending changes.
    ///
    /// The returned instances are loaded fresh and are not added to the session.
    ///
    /// # Errors
    /// Fails if the session is closed, the flush fails, or a row cannot be loaded.
    pub fn find_all<T: Entity>(&self) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        let mut core = self.core()?;
        core.ensure_open()?;
        core.flush()?;
        trace!(entity = simple_type_name::<T>(), "find_all");
        let desc = descriptor::<T>()?;
        core.with_loader(false, |loader| loader.find_all(&desc))
    }

    /// Queue the deletion of a persistent entity.
    ///
    /// # Errors
    /// Fails if the session is closed, no transaction is open, or `entity` is not persistent
    /// in this session.
    pub fn remove<T: Entity>(&self, entity: &EntityRef<T>) -> Result<(), PersistenceError> {
        let mut core = self.core()?;
        core.ensure_open()?;
        core.ensure_transaction()?;
        if !core.context.contains(entity)? {
            return Err(PersistenceError::state(format!(
                "{} entity is not persistent in this session",
                simple_type_name::<T>()
            )));
        }
        trace!(entity = simple_type_name::<T>(), "remove");
        let persister = core.persister;
        core.actions.enqueue(EntityAction::Delete {
            persister,
            entity: Rc::clone(entity) as Rc<dyn ManagedEntity>,
        });
        Ok(())
    }

    /// Write queued inserts and deletes and every modified entity, then commit.
    ///
    /// On failure the connection is rolled back, the session's cache is left as it was
    /// before the flush and the pending queue is discarded.
    ///
    /// # Errors
    /// Returns `PersistenceError::Flush` wrapping the cause, or `PersistenceError::Rollback`
    /// if the rollback failed as well.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.core()?.flush()
    }

    /// Drop every cached entity and pending action without writing anything.
    ///
    /// # Errors
    /// Fails if the session is closed.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        let mut core = self.core()?;
        core.ensure_open()?;
        core.clear();
        Ok(())
    }

    /// Flush, detach every entity and return the connection to the pool.
    ///
    /// If the flush fails the session stays open.
    ///
    /// # Errors
    /// Fails if the session is already closed or the flush fails.
    pub fn close(&self) -> Result<(), PersistenceError> {
        let mut core = self.core()?;
        core.ensure_open()?;
        core.flush()?;
        core.clear();
        core.state = SessionState::Closed;
        core.transaction = TransactionState::Closed;
        if let Some(conn) = core.connection.take() {
            conn.release();
        }
        info!("session closed");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Session")
                .field("state", &core.state)
                .field("transaction", &core.transaction)
                .field("context", &core.context)
                .field("actions", &core.actions)
                .finish(),
            Err(_) => f.write_str("Session(<busy>)"),
        }
    }
}
