//! Module: value::sql
//! Responsibility: encoding values into SQLite storage classes and back.
//! Boundary: the only place that knows the on-disk representation of a type.

use super::{CoercionError, DataType, Value};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};

impl Value {
    /// Storage encoding: decimals and temporal values are fixed-format text,
    /// booleans are 0/1 integers. Decimals stay text on disk; a NUMERIC
    /// column would round them through REAL.
    #[must_use]
    pub fn to_sql_value(&self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Text(text) => SqlValue::Text(text.clone()),
            Self::Integer(n) => SqlValue::Integer(*n),
            Self::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            Self::Decimal(_) | Self::Date(_) | Self::DateTime(_) => {
                SqlValue::Text(self.to_string())
            }
        }
    }

    /// Decode a stored value as `ty`. Storage-class drift (a numeric column
    /// holding text, a REAL in a NUMERIC column) is tolerated as long as the
    /// content converts cleanly.
    pub fn from_sql_ref(raw: ValueRef<'_>, ty: DataType) -> Result<Self, CoercionError> {
        let as_text = match raw {
            ValueRef::Null => return Ok(Self::Null),
            ValueRef::Integer(n) => match ty {
                DataType::Integer => return Ok(Self::Integer(n)),
                DataType::Boolean => return Ok(Self::Boolean(n != 0)),
                _ => n.to_string(),
            },
            ValueRef::Real(r) => format_real(r),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ValueRef::Blob(_) => return Err(CoercionError::new("<blob>", ty)),
        };

        match ty {
            DataType::String | DataType::Text => Ok(Self::Text(as_text)),
            _ => Self::parse(&as_text, ty, None),
        }
    }

    pub fn from_sql_value(raw: &SqlValue, ty: DataType) -> Result<Self, CoercionError> {
        Self::from_sql_ref(ValueRef::from(raw), ty)
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_sql_value()))
    }
}

// f64 Display is the shortest round-trip form and never uses an exponent.
fn format_real(r: f64) -> String {
    format!("{r}")
}
