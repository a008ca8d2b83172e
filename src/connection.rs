//! Minimal driver capability surface consumed by the runtime.
//!
//! The persister only ever prepares a statement, binds positional parameters and either
//! reads rows or counts affected rows, so the surface collapses to `query`/`execute` over a
//! parameter slice. Transaction control follows auto-commit semantics: with auto-commit off,
//! statements join an implicit transaction that `commit`/`rollback` end.

use crate::config::ConfigProvider;
use crate::error::PersistenceError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// A physical database connection.
pub trait DbConnection: Send {
    /// Run a row-returning statement.
    ///
    /// # Errors
    /// Returns `PersistenceError` if preparing, binding or stepping the statement fails.
    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PersistenceError>;

    /// Run a DML statement and return the affected row count.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the statement fails.
    fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, PersistenceError>;

    /// Run an INSERT and return the affected row count with the generated key, if any.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the statement fails.
    fn execute_returning_key(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(usize, Option<RowValues>), PersistenceError>;

    /// Switch auto-commit mode. Enabling it commits any open transaction.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the pending transaction cannot be committed.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), PersistenceError>;

    fn auto_commit(&self) -> bool;

    /// Commit the open transaction; a no-op when none is open.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the commit fails.
    fn commit(&mut self) -> Result<(), PersistenceError>;

    /// Roll back the open transaction; a no-op when none is open.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the rollback fails.
    fn rollback(&mut self) -> Result<(), PersistenceError>;

    /// Close the physical connection. Only the pool's teardown path calls this.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the driver reports a failure while closing.
    fn close(self: Box<Self>) -> Result<(), PersistenceError>;
}

/// Opens physical connections for a pool.
pub trait Connector {
    /// # Errors
    /// Returns `PersistenceError` if the connection cannot be opened.
    fn connect(&self, config: &dyn ConfigProvider)
    -> Result<Box<dyn DbConnection>, PersistenceError>;
}
