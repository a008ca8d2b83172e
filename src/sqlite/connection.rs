use std::fmt;
use std::thread;
use std::time::Duration;

use crate::connection::DbConnection;
use crate::error::PersistenceError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::params::Params;
use super::query::build_result_set;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

pub(crate) fn rollback_with_busy_retries(
    conn: &rusqlite::Connection,
) -> Result<(), PersistenceError> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        match conn.execute_batch("ROLLBACK") {
            Ok(()) => return Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(delay);
            }
            Err(other) => return Err(PersistenceError::SqliteError(other)),
        }
    }

    Err(PersistenceError::ConnectionError(
        "rollback retries exhausted".into(),
    ))
}

/// rusqlite connection with JDBC-style auto-commit.
///
/// With auto-commit disabled the next statement opens a transaction (`BEGIN`), which stays
/// open until `commit`, `rollback` or re-enabling auto-commit.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    auto_commit: bool,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn,
            auto_commit: true,
        }
    }

    /// Borrow the raw rusqlite connection for work the runtime does not model.
    #[must_use]
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_if_needed(&mut self) -> Result<(), PersistenceError> {
        if !self.auto_commit && !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn run_dml(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, PersistenceError> {
        self.begin_if_needed()?;
        let converted = Params::convert(params);
        let mut stmt = self.conn.prepare_cached(sql)?;
        let affected = stmt.execute(&converted.as_refs()[..])?;
        Ok(affected)
    }
}

impl DbConnection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PersistenceError> {
        let run = |this: &mut Self| -> Result<ResultSet, PersistenceError> {
            this.begin_if_needed()?;
            let converted = Params::convert(params);
            let mut stmt = this.conn.prepare_cached(sql)?;
            build_result_set(&mut stmt, converted.as_values())
        };
        run(self).map_err(|e| e.with_sql(sql))
    }

    fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, PersistenceError> {
        self.run_dml(sql, params).map_err(|e| e.with_sql(sql))
    }

    fn execute_returning_key(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(usize, Option<RowValues>), PersistenceError> {
        let affected = self.run_dml(sql, params).map_err(|e| e.with_sql(sql))?;
        let key = (affected > 0).then(|| RowValues::Int(self.conn.last_insert_rowid()));
        Ok((affected, key))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), PersistenceError> {
        if auto_commit && self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<(), PersistenceError> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PersistenceError> {
        if self.in_transaction() {
            rollback_with_busy_retries(&self.conn)?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), PersistenceError> {
        self.conn
            .close()
            .map_err(|(_, err)| PersistenceError::SqliteError(err))
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("conn", &self.conn)
            .field("auto_commit", &self.auto_commit)
            .finish()
    }
}
