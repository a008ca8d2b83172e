//! Conversions between Rust field types and [`RowValues`].
//!
//! Reading is lenient only where the storage format requires it: SQLite keeps dates and
//! times as text, booleans as integers and may hand back an integer for a REAL column.
//! Any other mismatch is a `TypeConversion` error.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

use crate::error::PersistenceError;
use crate::types::RowValues;

/// A Rust type that can be stored in a mapped column.
pub trait SqlValue: Sized {
    /// Type name used in conversion errors.
    const TYPE_NAME: &'static str;

    /// Convert the field value into a statement parameter.
    fn to_row_value(&self) -> RowValues;

    /// Convert a column value read from a row.
    ///
    /// # Errors
    /// Returns `PersistenceError::TypeConversion` when the column value does not fit.
    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError>;
}

fn mismatch<T: SqlValue>(value: &RowValues) -> PersistenceError {
    PersistenceError::conversion(value.type_name(), T::TYPE_NAME)
}

impl SqlValue for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn to_row_value(&self) -> RowValues {
        RowValues::Int(*self)
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::Int(i) => Ok(i),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl SqlValue for i32 {
    const TYPE_NAME: &'static str = "i32";

    fn to_row_value(&self) -> RowValues {
        RowValues::Int(i64::from(*self))
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::Int(i) => {
                i32::try_from(i).map_err(|_| PersistenceError::conversion("INTEGER", "i32"))
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl SqlValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn to_row_value(&self) -> RowValues {
        RowValues::Float(*self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::Int(i) => Ok(i as f64),
            other => other.as_float().ok_or_else(|| mismatch::<Self>(&other)),
        }
    }
}

impl SqlValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn to_row_value(&self) -> RowValues {
        RowValues::Float(f64::from(*self))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::Int(i) => Ok(i as f32),
            other => other
                .as_float()
                .map(|f| f as f32)
                .ok_or_else(|| mismatch::<Self>(&other)),
        }
    }
}

impl SqlValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn to_row_value(&self) -> RowValues {
        RowValues::Bool(*self)
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        value.as_bool().copied().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl SqlValue for String {
    const TYPE_NAME: &'static str = "String";

    fn to_row_value(&self) -> RowValues {
        RowValues::Text(self.clone())
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::Text(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl SqlValue for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn to_row_value(&self) -> RowValues {
        RowValues::Timestamp(*self)
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        value.as_timestamp().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl SqlValue for NaiveDate {
    const TYPE_NAME: &'static str = "NaiveDate";

    fn to_row_value(&self) -> RowValues {
        RowValues::Date(*self)
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        value.as_date().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl SqlValue for NaiveTime {
    const TYPE_NAME: &'static str = "NaiveTime";

    fn to_row_value(&self) -> RowValues {
        RowValues::Time(*self)
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        value.as_time().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl SqlValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn to_row_value(&self) -> RowValues {
        RowValues::Blob(self.clone())
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        value
            .as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl SqlValue for JsonValue {
    const TYPE_NAME: &'static str = "serde_json::Value";

    fn to_row_value(&self) -> RowValues {
        RowValues::JSON(self.clone())
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::JSON(json) => Ok(json),
            RowValues::Text(s) => {
                serde_json::from_str(&s).map_err(|_| PersistenceError::conversion("TEXT", "JSON"))
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<V: SqlValue> SqlValue for Option<V> {
    const TYPE_NAME: &'static str = V::TYPE_NAME;

    fn to_row_value(&self) -> RowValues {
        self.as_ref().map_or(RowValues::Null, SqlValue::to_row_value)
    }

    fn from_row_value(value: RowValues) -> Result<Self, PersistenceError> {
        match value {
            RowValues::Null => Ok(None),
            other => V::from_row_value(other).map(Some),
        }
    }
}
