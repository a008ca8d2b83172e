use tracing::info;

use crate::config::{ConfigProvider, DatabaseConfig};
use crate::connection::Connector;
use crate::error::PersistenceError;
use crate::persister::EntityPersister;
use crate::pool::ConnectionPool;

use super::Session;

/// Owns the connection pool and opens [`Session`]s over it.
///
/// The factory is `Send + Sync`; sessions it opens are confined to the thread that opened
/// them.
#[derive(Debug)]
pub struct SessionFactory {
    config: DatabaseConfig,
    pool: ConnectionPool,
    persister: EntityPersister,
}

impl SessionFactory {
    /// Open a factory over an `SQLite` pool.
    ///
    /// # Errors
    /// Fails if the configuration is invalid or a connection cannot be opened.
    #[cfg(feature = "sqlite")]
    pub fn new(config: DatabaseConfig) -> Result<Self, PersistenceError> {
        Self::with_connector(config, &crate::sqlite::SqliteConnector)
    }

    /// Open a factory whose pool connections come from `connector`.
    ///
    /// # Errors
    /// Fails if the configuration is invalid or a connection cannot be opened.
    pub fn with_connector(
        config: DatabaseConfig,
        connector: &dyn Connector,
    ) -> Result<Self, PersistenceError> {
        config.validate()?;
        let pool = ConnectionPool::open(&config, connector)?;
        info!(url = config.url(), pool_size = pool.size(), show_sql = config.show_sql(), "session factory created");
        Ok(Self {
            persister: EntityPersister::new(config.show_sql()),
            config,
            pool,
        })
    }

    /// Open a session. The session leases a connection on its first database access.
    ///
    /// # Errors
    /// Fails if the factory is closed.
    pub fn open_session(&self) -> Result<Session, PersistenceError> {
        if self.pool.is_closed() {
            return Err(PersistenceError::state("SessionFactory is closed"));
        }
        Ok(Session::open(self.pool.clone(), self.persister))
    }

    /// Close every pooled connection.
    ///
    /// # Errors
    /// Returns the first error reported while closing a connection.
    pub fn close(&self) -> Result<(), PersistenceError> {
        self.pool.close()?;
        info!("session factory closed");
        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}
