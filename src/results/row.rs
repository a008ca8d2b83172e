use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PersistenceError;
use crate::types::RowValues;

/// A row from a database query result
///
/// This struct represents a single row from a database query result,
/// with access to both the column names and the values.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a new database row
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );

        Self {
            column_names,
            rows,
            column_index_cache: cache,
        }
    }

    /// Get the index of a column by name.
    ///
    /// Exact matches win; otherwise the first ASCII case-insensitive match is returned, since
    /// some engines report unquoted identifiers upper-cased.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }

        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value that a mapping requires to be present.
    ///
    /// # Errors
    /// Returns `PersistenceError::Mapping` when the column is absent from the row.
    pub fn get_required(&self, column_name: &str) -> Result<&RowValues, PersistenceError> {
        self.get(column_name).ok_or_else(|| {
            PersistenceError::Mapping(format!(
                "column [{column_name}] not found in result set {:?}",
                self.column_names
            ))
        })
    }
}
