use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a single `RowValue` to a rusqlite `Value`.
///
/// Temporal values are stored as ISO-8601 text, the format `SQLite`'s date functions expect.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Date(d) => Value::Text(d.format("%F").to_string()),
        RowValues::Time(t) => Value::Text(t.format("%T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Unified `SQLite` parameter container.
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert row values into `SQLite` parameter values.
    #[must_use]
    pub fn convert(params: &[RowValues]) -> Self {
        Params(params.iter().map(row_value_to_sqlite_value).collect())
    }

    /// Borrow the underlying values.
    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }

    /// Build a borrowed params slice suitable for rusqlite execution.
    #[must_use]
    pub fn as_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.0.iter().map(|v| v as &dyn rusqlite::ToSql).collect()
    }
}
