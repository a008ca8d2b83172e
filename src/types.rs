use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

use crate::error::PersistenceError;

/// Values that can be stored in a database row or used as statement parameters.
///
/// Every mapped field travels through this enum: snapshots are `Vec<RowValues>`, generated
/// keys come back as a `RowValues`, and the SQL adapter binds them positionally.
/// ```rust
/// use sql_persistence::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("Tesla".into()),
///     RowValues::Null,
/// ];
/// assert!(params[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Fractional seconds of any precision, space or ISO separator
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowValues::Date(value) => Some(*value),
            RowValues::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            RowValues::Time(value) => Some(*value),
            RowValues::Text(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Name of the variant, used in conversion error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "INTEGER",
            RowValues::Float(_) => "FLOAT",
            RowValues::Text(_) => "TEXT",
            RowValues::Bool(_) => "BOOLEAN",
            RowValues::Timestamp(_) => "TIMESTAMP",
            RowValues::Date(_) => "DATE",
            RowValues::Time(_) => "TIME",
            RowValues::Null => "NULL",
            RowValues::JSON(_) => "JSON",
            RowValues::Blob(_) => "BLOB",
        }
    }
}

/// Identifier value of an entity, usable as a hash key.
///
/// `RowValues` cannot be hashed (it carries floats), so identity-map keys narrow the
/// identifier to the kinds a primary key can sensibly hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    /// Build an identifier from a column value. `Ok(None)` means the identifier is unset.
    ///
    /// # Errors
    /// Returns `PersistenceError::TypeConversion` for values that cannot identify a row.
    pub fn from_value(value: &RowValues) -> Result<Option<Self>, PersistenceError> {
        match value {
            RowValues::Null => Ok(None),
            RowValues::Int(i) => Ok(Some(EntityId::Int(*i))),
            RowValues::Text(s) => Ok(Some(EntityId::Text(s.clone()))),
            other => Err(PersistenceError::conversion(other.type_name(), "identifier")),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> RowValues {
        match self {
            EntityId::Int(i) => RowValues::Int(*i),
            EntityId::Text(s) => RowValues::Text(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{i}"),
            EntityId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Int(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        EntityId::Int(i64::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}

/// Relation fetch strategy for one-to-many collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchType {
    /// Query the collection when its owner is loaded.
    Eager,
    /// Defer the query until the collection is first read.
    #[default]
    Lazy,
}

/// Kind of an entity relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
}
