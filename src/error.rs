use thiserror::Error;

/// Every failure surfaced by the persistence runtime.
///
/// Find/persist/remove errors raised outside a flush are local and leave the session usable.
/// A flush failure rolls the connection back and is reported as [`PersistenceError::Flush`]
/// wrapping the original cause.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("SQL execution error: {source} (statement: {sql})")]
    Sql {
        sql: String,
        #[source]
        source: Box<PersistenceError>,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Illegal state: {0}")]
    State(String),

    #[error("{operation}: expected {expected} affected row(s), got {actual}")]
    RowCount {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Result must contain exactly one row, {rows} rows matched in table {table}")]
    NonUniqueResult { table: String, rows: usize },

    #[error("Cannot convert value of type {from} to field type {to}")]
    TypeConversion { from: String, to: String },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("No connection available: all {size} pooled connections are leased")]
    PoolExhausted { size: usize },

    #[error("Connection pool has been closed")]
    PoolClosed,

    #[error("Could not lazily initialize collection of {entity}: session is closed")]
    LazyInitialization { entity: String },

    #[error("Exception occurred during flush, changes were rolled back: {0}")]
    Flush(#[source] Box<PersistenceError>),

    #[error("Rollback failed ({source}) after flush error: {cause}")]
    Rollback {
        #[source]
        source: Box<PersistenceError>,
        cause: Box<PersistenceError>,
    },
}

impl PersistenceError {
    /// Annotate a driver failure with the statement that produced it.
    pub(crate) fn with_sql(self, sql: &str) -> Self {
        match self {
            already @ PersistenceError::Sql { .. } => already,
            other => PersistenceError::Sql {
                sql: sql.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        PersistenceError::State(message.into())
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        PersistenceError::Schema(message.into())
    }

    pub(crate) fn conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        PersistenceError::TypeConversion {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Walk `Flush`/`Sql` wrappers down to the first non-wrapper error.
    #[must_use]
    pub fn root_cause(&self) -> &PersistenceError {
        match self {
            PersistenceError::Flush(inner) | PersistenceError::Sql { source: inner, .. } => {
                inner.root_cause()
            }
            other => other,
        }
    }
}

impl From<deadpool::unmanaged::PoolError> for PersistenceError {
    fn from(err: deadpool::unmanaged::PoolError) -> Self {
        match err {
            deadpool::unmanaged::PoolError::Closed => PersistenceError::PoolClosed,
            other => PersistenceError::ConnectionError(format!("pool error: {other}")),
        }
    }
}
