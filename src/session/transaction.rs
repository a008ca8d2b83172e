use tracing::{debug, warn};

use crate::error::PersistenceError;

use super::{Session, TransactionState};

/// Explicit transaction of a [`Session`].
///
/// `persist` and `remove` require an open transaction. While it is open, a flush runs with
/// auto-commit disabled so all of its statements commit together.
///
/// ```rust,no_run
/// # use sql_persistence::prelude::*;
/// # fn demo(session: &Session, entity: &EntityRef<impl Entity>) -> Result<(), PersistenceError> {
/// let tx = session.transaction();
/// tx.begin()?;
/// session.persist(entity)?;
/// tx.commit()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Transaction<'s> {
    session: &'s Session,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Open the transaction; a no-op if it is already open.
    ///
    /// # Errors
    /// Fails if the session is closed.
    pub fn begin(&self) -> Result<(), PersistenceError> {
        let mut core = self.session.core()?;
        core.ensure_open()?;
        if core.transaction == TransactionState::Closed {
            core.transaction = TransactionState::Open;
            debug!("transaction begun");
        }
        Ok(())
    }

    /// Flush the session and close the transaction. The transaction is closed even when the
    /// flush fails.
    ///
    /// # Errors
    /// Fails if the transaction is not open or the flush fails.
    pub fn commit(&self) -> Result<(), PersistenceError> {
        let mut core = self.session.core()?;
        core.ensure_transaction()?;
        let flushed = core.flush();
        core.transaction = TransactionState::Closed;
        if flushed.is_ok() {
            debug!("transaction committed");
        }
        flushed
    }

    /// Close the transaction and discard every pending change of the session.
    ///
    /// The transaction is closed and the session cleared even when the connection rollback
    /// fails; the connection is then dropped from the pool.
    ///
    /// # Errors
    /// Fails if the transaction is not open or the connection cannot be rolled back.
    pub fn rollback(&self) -> Result<(), PersistenceError> {
        let mut core = self.session.core()?;
        core.ensure_transaction()?;
        core.transaction = TransactionState::Closed;
        core.clear();
        if let Err(err) = core.rollback_connection() {
            warn!(error = %err, "connection rollback failed");
            return Err(err);
        }
        debug!("transaction rolled back");
        Ok(())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session
            .core
            .try_borrow()
            .is_ok_and(|core| core.transaction == TransactionState::Open)
    }
}
