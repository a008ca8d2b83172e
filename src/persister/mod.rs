//! SQL generation and execution for mapped entities.

mod loader;
pub(crate) mod sql;

pub(crate) use loader::Loader;

use std::cell::RefCell;

use tracing::info;

use crate::connection::DbConnection;
use crate::error::PersistenceError;
use crate::schema::{Entity, EntityDescriptor, EntityRef, descriptor};
use crate::types::{EntityId, RowValues};

/// Builds, logs and runs the CRUD statements of mapped entities.
///
/// Holds no per-entity state; the only setting is whether generated statements are logged
/// (at `INFO`, target `sql_persistence::sql`). Entities returned by one call to a `find_*`
/// method share instances, but separate calls load separate instances.
///
/// ```rust,no_run
/// # use sql_persistence::prelude::*;
/// # #[derive(Default)] struct Product { id: Option<i64> }
/// # impl Entity for Product {
/// #     fn mapping() -> EntityMapping<Self> {
/// #         EntityMapping::new().generated_id("id", |p: &Product| p.id, |p, v| p.id = v)
/// #     }
/// # }
/// # fn demo(conn: &mut dyn DbConnection) -> Result<(), PersistenceError> {
/// let persister = EntityPersister::new(true);
/// let product = Product::default().into_ref();
/// persister.insert(conn, &product)?;
/// let id = product.borrow().id.unwrap();
/// assert!(persister.find_by_id::<Product>(conn, id)?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityPersister {
    show_sql: bool,
}

fn expect_single(operation: &'static str, actual: usize) -> Result<(), PersistenceError> {
    if actual == 1 {
        Ok(())
    } else {
        Err(PersistenceError::RowCount {
            operation,
            expected: 1,
            actual,
        })
    }
}

fn borrow_error<T>(desc: &EntityDescriptor<T>) -> PersistenceError {
    PersistenceError::state(format!("{} entity is already borrowed", desc.type_name()))
}

fn null_id<T>(desc: &EntityDescriptor<T>, operation: &str) -> PersistenceError {
    PersistenceError::state(format!(
        "ID field is null: cannot {operation} {} entity",
        desc.type_name()
    ))
}

impl EntityPersister {
    #[must_use]
    pub fn new(show_sql: bool) -> Self {
        Self { show_sql }
    }

    #[must_use]
    pub fn show_sql(&self) -> bool {
        self.show_sql
    }

    pub(crate) fn log_sql(&self, sql: &str) {
        if self.show_sql {
            info!(target: "sql_persistence::sql", "{sql}");
        }
    }

    fn loader<'a>(&self, conn: &'a mut dyn DbConnection) -> Loader<'a> {
        Loader::new(*self, conn, None, None)
    }

    /// Load the row of `T` with identifier `id`.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the query fails or the row cannot be mapped.
    pub fn find_by_id<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
        id: impl Into<EntityId>,
    ) -> Result<Option<EntityRef<T>>, PersistenceError> {
        self.loader(conn).load_by_id::<T>(&id.into().to_value())
    }

    /// Load the single row whose `field` equals `value`.
    ///
    /// # Errors
    /// Returns `PersistenceError::NonUniqueResult` if more than one row matches.
    pub fn find_one<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
        field: &str,
        value: RowValues,
    ) -> Result<Option<EntityRef<T>>, PersistenceError> {
        let desc = descriptor::<T>()?;
        let column = desc.column_for(field)?.column();
        self.loader(conn).find_one(&desc, column, &value)
    }

    /// # Errors
    /// Returns `PersistenceError` if the query fails or a row cannot be mapped.
    pub fn find_all<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
    ) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        let desc = descriptor::<T>()?;
        self.loader(conn).find_all(&desc)
    }

    /// Load every row whose `field` equals `value`.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the query fails or a row cannot be mapped.
    pub fn find_all_by<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
        field: &str,
        value: RowValues,
    ) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        let desc = descriptor::<T>()?;
        let column = desc.column_for(field)?.column();
        self.loader(conn).find_all_by(&desc, column, &value)
    }

    /// Insert `entity` and assign the generated identifier, if the mapping declares one.
    ///
    /// # Errors
    /// Fails if a related entity has no identifier, the statement fails or does not insert
    /// exactly one row.
    pub fn insert<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
        entity: &RefCell<T>,
    ) -> Result<(), PersistenceError> {
        let desc = descriptor::<T>()?;
        let (sql, params) = {
            let value = entity.try_borrow().map_err(|_| borrow_error(&desc))?;
            let mut columns = Vec::new();
            let mut params = Vec::new();
            for column in desc.columns().iter().filter(|c| !c.is_generated()) {
                columns.push(column.column());
                params.push(column.value_of(&value)?);
            }
            (sql::insert(desc.table(), &columns), params)
        };

        self.log_sql(&sql);
        let (affected, key) = conn.execute_returning_key(&sql, &params)?;
        expect_single("insert", affected)?;

        if desc.id_column().is_generated() {
            let key = key.ok_or_else(|| {
                PersistenceError::Mapping(format!(
                    "no generated key returned for {}",
                    desc.type_name()
                ))
            })?;
            let mut value = entity.try_borrow_mut().map_err(|_| borrow_error(&desc))?;
            desc.set_id(&mut value, key)?;
        }
        Ok(())
    }

    /// Write every non-identifier column of `entity`.
    ///
    /// # Errors
    /// Fails for an unset identifier, a failing statement, or a row count other than one.
    pub fn update<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
        entity: &RefCell<T>,
    ) -> Result<(), PersistenceError> {
        let desc = descriptor::<T>()?;
        let (sql, params) = {
            let value = entity.try_borrow().map_err(|_| borrow_error(&desc))?;
            let id = desc.id_value(&value);
            if id.is_null() {
                return Err(null_id(&desc, "update"));
            }
            let mut columns = Vec::new();
            let mut params = Vec::new();
            for column in desc.columns().iter().filter(|c| !c.is_identifier()) {
                columns.push(column.column());
                params.push(column.value_of(&value)?);
            }
            if columns.is_empty() {
                return Ok(());
            }
            params.push(id);
            (
                sql::update_by_id(desc.table(), &columns, desc.id_column().column()),
                params,
            )
        };

        self.log_sql(&sql);
        let affected = conn.execute(&sql, &params)?;
        expect_single("update", affected)
    }

    /// Delete the row of `entity`.
    ///
    /// # Errors
    /// Fails for an unset identifier, a failing statement, or a row count other than one.
    pub fn delete<T: Entity>(
        &self,
        conn: &mut dyn DbConnection,
        entity: &RefCell<T>,
    ) -> Result<(), PersistenceError> {
        let desc = descriptor::<T>()?;
        let id = {
            let value = entity.try_borrow().map_err(|_| borrow_error(&desc))?;
            desc.id_value(&value)
        };
        if id.is_null() {
            return Err(null_id(&desc, "delete"));
        }

        let sql = sql::delete_by_id(desc.table(), desc.id_column().column());
        self.log_sql(&sql);
        let affected = conn.execute(&sql, &[id])?;
        expect_single("delete", affected)
    }
}
