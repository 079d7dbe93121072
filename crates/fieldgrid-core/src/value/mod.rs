//! Module: value
//! Responsibility: the typed value model shared by fields, criteria and cells.
//! Does not own: SQL rendering of predicates or field resolution.
//! Boundary: every literal entering the engine is coerced here first.

mod coercion;
mod format;
mod sql;


use chrono::{NaiveDate, NaiveDateTime};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};
use thiserror::Error as ThisError;

pub use format::CellFormat;

///
/// CONSTANTS
///

/// Canonical storage format for dates.
pub const DATE_STORAGE_FORMAT: &str = "%Y-%m-%d";

/// Canonical storage format for datetimes (UTC, second precision).
pub const DATETIME_STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

///
/// DataType
///
/// Semantic type of an addressable field. Custom definitions persist the
/// lowercase tag; native fields declare it statically.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[display("string")]
    String,
    #[display("text")]
    Text,
    #[display("integer")]
    Integer,
    #[display("decimal")]
    Decimal,
    #[display("date")]
    Date,
    #[display("datetime")]
    DateTime,
    #[display("boolean")]
    Boolean,
}

impl DataType {
    pub const ALL: [Self; 7] = [
        Self::String,
        Self::Text,
        Self::Integer,
        Self::Decimal,
        Self::Date,
        Self::DateTime,
        Self::Boolean,
    ];

    /// Stable tag persisted in `custom_definitions.data_type`.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.tag() == tag)
    }

    /// Column of `custom_values` holding values of this type.
    #[must_use]
    pub const fn value_column(self) -> &'static str {
        match self {
            Self::String => "string_value",
            Self::Text => "text_value",
            Self::Integer => "integer_value",
            Self::Decimal => "decimal_value",
            Self::Date => "date_value",
            Self::DateTime => "datetime_value",
            Self::Boolean => "boolean_value",
        }
    }

    #[must_use]
    pub const fn family(self) -> TypeFamily {
        match self {
            Self::String | Self::Text => TypeFamily::Textual,
            Self::Integer | Self::Decimal => TypeFamily::Numeric,
            Self::Date | Self::DateTime => TypeFamily::Temporal,
            Self::Boolean => TypeFamily::Boolean,
        }
    }
}

///
/// TypeFamily
///
/// Coarse grouping used by the operator table to decide applicability.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TypeFamily {
    Textual,
    Numeric,
    Temporal,
    Boolean,
}

///
/// CoercionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("cannot coerce '{value}' to {expected}")]
pub struct CoercionError {
    pub value: String,
    pub expected: DataType,
}

impl CoercionError {
    pub(crate) fn new(value: impl Into<String>, expected: DataType) -> Self {
        Self {
            value: value.into(),
            expected,
        }
    }
}

///
/// Value
///
/// Null is the absence of a value: an unset custom field or a NULL column.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, or text that is empty after trimming.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Parse a user literal into a value of `ty`.
    ///
    /// `scale` truncates decimals toward zero; see [`Value::coerce`].
    pub fn parse(literal: &str, ty: DataType, scale: Option<u32>) -> Result<Self, CoercionError> {
        coercion::parse_literal(literal, ty, scale)
    }

    /// Convert to `ty`.
    ///
    /// Lossless widening (integer to decimal, date to datetime) is accepted.
    /// Narrowing that would lose information is a [`CoercionError`], with one
    /// documented exception: a decimal with a declared `scale` is truncated
    /// toward zero to that many fractional digits.
    pub fn coerce(&self, ty: DataType, scale: Option<u32>) -> Result<Self, CoercionError> {
        coercion::coerce_value(self, ty, scale)
    }

    /// Order two values of the same variant. Mixed numeric variants compare
    /// numerically; anything else mixed is unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Decimal(a), Self::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Canonical text rendering, also used for text operators on
    /// non-text values.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(text) => f.write_str(text),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Date(d) => write!(f, "{}", d.format(DATE_STORAGE_FORMAT)),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_STORAGE_FORMAT)),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
