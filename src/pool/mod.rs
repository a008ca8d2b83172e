pub mod connection;

pub use connection::PooledConnection;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use deadpool::unmanaged::{Pool, PoolError};
use tracing::{debug, info, warn};

use crate::config::ConfigProvider;
use crate::connection::{Connector, DbConnection};
use crate::error::PersistenceError;

pub(crate) struct PoolShared {
    pub(crate) closed: AtomicBool,
}

/// Fixed-size pool of pre-opened physical connections.
///
/// Every connection is opened up front; the pool never grows. [`lease`](Self::lease) does not
/// wait: an empty pool fails with [`PersistenceError::PoolExhausted`]. Cloning the pool is cheap
/// and every clone shares the same connections, so one pool can serve sessions on many threads.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool<Box<dyn DbConnection>>,
    shared: Arc<PoolShared>,
    size: usize,
}

impl ConnectionPool {
    /// Open `connection_pool_size` connections through `connector`.
    ///
    /// # Errors
    /// Returns the connector's error if any connection cannot be opened; connections opened
    /// before the failure are closed again.
    pub fn open(
        config: &dyn ConfigProvider,
        connector: &dyn Connector,
    ) -> Result<Self, PersistenceError> {
        let size = config.connection_pool_size();
        if size == 0 {
            return Err(PersistenceError::Config(
                "Property pool_size must be greater than zero".into(),
            ));
        }
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            match connector.connect(config) {
                Ok(conn) => connections.push(conn),
                Err(err) => {
                    for conn in connections {
                        if let Err(close_err) = conn.close() {
                            warn!(error = %close_err, "failed to close connection after pool open error");
                        }
                    }
                    return Err(err);
                }
            }
        }
        let pool = Self::from_connections(connections)?;
        info!(size, url = config.url(), "connection pool opened");
        Ok(pool)
    }

    /// Build a pool over already opened connections.
    ///
    /// # Errors
    /// Returns `PersistenceError::Config` for an empty list.
    pub fn from_connections(
        connections: Vec<Box<dyn DbConnection>>,
    ) -> Result<Self, PersistenceError> {
        let size = connections.len();
        if size == 0 {
            return Err(PersistenceError::Config(
                "a connection pool needs at least one connection".into(),
            ));
        }
        let pool = Pool::new(size);
        for conn in connections {
            pool.try_add(conn).map_err(|(_, err)| PersistenceError::from(err))?;
        }
        Ok(Self {
            pool,
            shared: Arc::new(PoolShared {
                closed: AtomicBool::new(false),
            }),
            size,
        })
    }

    /// Take one idle connection without waiting.
    ///
    /// # Errors
    /// Returns `PoolExhausted` when every connection is leased and `PoolClosed` after
    /// [`close`](Self::close).
    pub fn lease(&self) -> Result<PooledConnection, PersistenceError> {
        if self.is_closed() {
            return Err(PersistenceError::PoolClosed);
        }
        match self.pool.try_get() {
            Ok(object) => {
                debug!(available = self.available(), "connection leased");
                Ok(PooledConnection::new(object, Arc::clone(&self.shared)))
            }
            Err(PoolError::Closed) => Err(PersistenceError::PoolClosed),
            Err(_) => Err(PersistenceError::PoolExhausted { size: self.size }),
        }
    }

    /// Physically close every idle connection and refuse further leases.
    ///
    /// Idempotent. Connections still leased are closed when they are released.
    ///
    /// # Errors
    /// Returns the first error reported while closing a connection; the pool is closed
    /// regardless.
    pub fn close(&self) -> Result<(), PersistenceError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_err = None;
        let mut closed = 0usize;
        while let Ok(conn) = self.pool.try_remove() {
            closed += 1;
            if let Err(err) = conn.close() {
                warn!(error = %err, "failed to close pooled connection");
                first_err.get_or_insert(err);
            }
        }
        self.pool.close();
        info!(closed, size = self.size, "connection pool closed");
        first_err.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of idle connections.
    #[must_use]
    pub fn available(&self) -> usize {
        self.pool.status().available
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultSet;
    use crate::types::RowValues;
    use std::sync::atomic::AtomicUsize;

    struct Dummy {
        closes: Arc<AtomicUsize>,
    }

    impl DbConnection for Dummy {
        fn query(&mut self, _: &str, _: &[RowValues]) -> Result<ResultSet, PersistenceError> {
            Ok(ResultSet::with_capacity(0))
        }
        fn execute(&mut self, _: &str, _: &[RowValues]) -> Result<usize, PersistenceError> {
            Ok(0)
        }
        fn execute_returning_key(
            &mut self,
            _: &str,
            _: &[RowValues],
        ) -> Result<(usize, Option<RowValues>), PersistenceError> {
            Ok((0, None))
        }
        fn set_auto_commit(&mut self, _: bool) -> Result<(), PersistenceError> {
            Ok(())
        }
        fn auto_commit(&self) -> bool {
            true
        }
        fn commit(&mut self) -> Result<(), PersistenceError> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), PersistenceError> {
            Ok(())
        }
        fn close(self: Box<Self>) -> Result<(), PersistenceError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pool_of(n: usize) -> (ConnectionPool, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let conns = (0..n)
            .map(|_| {
                Box::new(Dummy {
                    closes: Arc::clone(&closes),
                }) as Box<dyn DbConnection>
            })
            .collect();
        (ConnectionPool::from_connections(conns).unwrap(), closes)
    }

    #[test]
    fn lease_fails_fast_when_exhausted() {
        let (pool, _) = pool_of(1);
        let held = pool.lease().unwrap();
        assert!(matches!(
            pool.lease(),
            Err(PersistenceError::PoolExhausted { size: 1 })
        ));
        drop(held);
        assert!(pool.lease().is_ok());
    }

    #[test]
    fn close_closes_each_connection_once() {
        let (pool, closes) = pool_of(3);
        let leased = pool.lease().unwrap();
        pool.close().unwrap();
        pool.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert!(matches!(pool.lease(), Err(PersistenceError::PoolClosed)));

        leased.release();
        assert_eq!(closes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_leases_never_share_a_connection() {
        let (pool, _) = pool_of(4);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if let Ok(conn) = pool.lease() {
                            drop(conn);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.available(), 4);
    }
}
