use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use deadpool::unmanaged::Object;
use tracing::{debug, warn};

use crate::connection::DbConnection;

use super::PoolShared;

/// A connection leased from a [`ConnectionPool`](super::ConnectionPool).
///
/// Dropping it (or calling [`release`](Self::release)) is the logical close: the physical
/// connection goes back to the pool, or is closed if the pool has been shut down meanwhile.
pub struct PooledConnection {
    object: Option<Object<Box<dyn DbConnection>>>,
    shared: Arc<PoolShared>,
}

impl PooledConnection {
    pub(crate) fn new(object: Object<Box<dyn DbConnection>>, shared: Arc<PoolShared>) -> Self {
        Self {
            object: Some(object),
            shared,
        }
    }

    /// Return the connection to its pool.
    pub fn release(self) {
        drop(self);
    }

    /// Close the physical connection and take it out of the pool for good.
    ///
    /// Used when the connection is left in an unknown transaction state.
    pub fn discard(mut self) {
        if let Some(object) = self.object.take() {
            if let Err(err) = Object::take(object).close() {
                warn!(error = %err, "failed to close discarded connection");
            }
            warn!("connection discarded from pool");
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn DbConnection;

    fn deref(&self) -> &Self::Target {
        match &self.object {
            Some(object) => &***object,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.object {
            Some(object) => &mut ***object,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        if self.shared.closed.load(Ordering::Acquire) {
            let conn = Object::take(object);
            if let Err(err) = conn.close() {
                warn!(error = %err, "failed to close connection released after pool shutdown");
            }
        } else {
            drop(object);
            debug!("connection released");
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("released", &self.object.is_none())
            .finish()
    }
}
