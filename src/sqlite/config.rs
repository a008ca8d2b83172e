use std::time::Duration;

use tracing::debug;

use crate::config::ConfigProvider;
use crate::connection::{Connector, DbConnection};
use crate::error::PersistenceError;

use super::connection::SqliteConnection;

const URL_PREFIXES: &[&str] = &["jdbc:sqlite:", "sqlite://", "sqlite:"];
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens rusqlite connections for a connection pool.
///
/// The configured url is a database path or a `file:` URI; `jdbc:sqlite:`/`sqlite:` prefixes
/// are accepted and stripped. Credentials are ignored by `SQLite`. Every physical connection
/// gets a busy timeout and, for on-disk databases, WAL journaling so pooled connections can
/// read while another one writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    #[must_use]
    pub fn database_path(url: &str) -> &str {
        URL_PREFIXES
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix))
            .unwrap_or(url)
    }
}

impl Connector for SqliteConnector {
    fn connect(
        &self,
        config: &dyn ConfigProvider,
    ) -> Result<Box<dyn DbConnection>, PersistenceError> {
        let path = Self::database_path(config.url());
        let conn = rusqlite::Connection::open(path).map_err(|e| {
            PersistenceError::ConnectionError(format!("cannot open SQLite database {path}: {e}"))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if !path.contains(":memory:") && !path.contains("mode=memory") {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        debug!(path, "opened physical SQLite connection");
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_prefixes_are_stripped() {
        assert_eq!(SqliteConnector::database_path("jdbc:sqlite:app.db"), "app.db");
        assert_eq!(SqliteConnector::database_path("sqlite://data/app.db"), "data/app.db");
        assert_eq!(SqliteConnector::database_path("file:x?mode=memory"), "file:x?mode=memory");
    }
}
