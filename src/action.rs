//! Deferred mutations and the queue that orders them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::connection::DbConnection;
use crate::context::{ManagedEntity, PersistenceContext};
use crate::error::PersistenceError;
use crate::persister::EntityPersister;

/// A pending mutation of one entity.
pub enum EntityAction {
    Insert {
        persister: EntityPersister,
        entity: Rc<dyn ManagedEntity>,
    },
    Update {
        persister: EntityPersister,
        entity: Rc<dyn ManagedEntity>,
    },
    Delete {
        persister: EntityPersister,
        entity: Rc<dyn ManagedEntity>,
    },
}

impl EntityAction {
    /// Execution rank: inserts run first, deletes last.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            EntityAction::Insert { .. } => 1,
            EntityAction::Update { .. } => 2,
            EntityAction::Delete { .. } => 3,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            EntityAction::Insert { .. } => "insert",
            EntityAction::Update { .. } => "update",
            EntityAction::Delete { .. } => "delete",
        }
    }

    #[must_use]
    pub fn entity(&self) -> &Rc<dyn ManagedEntity> {
        match self {
            EntityAction::Insert { entity, .. }
            | EntityAction::Update { entity, .. }
            | EntityAction::Delete { entity, .. } => entity,
        }
    }

    /// Run the statement and bring the context in line with it: an inserted entity is
    /// cached, an updated one re-snapshotted, a deleted one evicted.
    ///
    /// # Errors
    /// Propagates the persister's or the context's error.
    pub fn execute(
        self,
        conn: &mut dyn DbConnection,
        context: &mut PersistenceContext,
    ) -> Result<(), PersistenceError> {
        debug!(action = self.name(), entity = self.entity().type_name(), "executing action");
        match self {
            EntityAction::Insert { persister, entity } => {
                entity.insert(&persister, conn)?;
                context.cache_managed(entity)?;
            }
            EntityAction::Update { persister, entity } => {
                entity.update(&persister, conn)?;
                context.snapshot_managed(&*entity)?;
            }
            EntityAction::Delete { persister, entity } => {
                entity.delete(&persister, conn)?;
                context.remove_managed(&*entity)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityAction")
            .field("kind", &self.name())
            .field("entity", &self.entity().type_name())
            .finish()
    }
}

struct Queued {
    priority: u8,
    seq: u64,
    action: EntityAction,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap is a max-heap: the lowest priority value and the oldest entry pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending actions of a session, drained insert-first, then update, then delete.
/// Within one kind actions keep their enqueue order.
#[derive(Default)]
pub struct ActionQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, action: EntityAction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued {
            priority: action.priority(),
            seq,
            action,
        });
    }

    /// Remove every action, in execution order.
    pub fn drain_in_priority_order(&mut self) -> Vec<EntityAction> {
        let mut ordered = Vec::with_capacity(self.heap.len());
        while let Some(queued) = self.heap.pop() {
            ordered.push(queued.action);
        }
        ordered
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.heap.len())
            .finish()
    }
}
