//! Module: value::coercion
//! Responsibility: literal parsing and cross-type conversion rules.
//! Does not own: storage encoding (see `value::sql`).

use super::{CoercionError, DATE_STORAGE_FORMAT, DataType, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::str::FromStr;

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub(super) fn parse_literal(
    literal: &str,
    ty: DataType,
    scale: Option<u32>,
) -> Result<Value, CoercionError> {
    let trimmed = literal.trim();

    match ty {
        // text keeps its original spacing
        DataType::String | DataType::Text => Ok(Value::Text(literal.to_string())),
        _ if trimmed.is_empty() => Ok(Value::Null),
        DataType::Integer => parse_integer(trimmed),
        DataType::Decimal => parse_decimal(trimmed).map(|d| Value::Decimal(apply_scale(d, scale))),
        DataType::Date => parse_date(trimmed).map(Value::Date),
        DataType::DateTime => parse_datetime(trimmed).map(Value::DateTime),
        DataType::Boolean => parse_boolean(trimmed).map(Value::Boolean),
    }
}

pub(super) fn coerce_value(
    value: &Value,
    ty: DataType,
    scale: Option<u32>,
) -> Result<Value, CoercionError> {
    let mismatch = || CoercionError::new(value.to_string(), ty);

    match (value, ty) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Text(text), _) => parse_literal(text, ty, scale),

        (Value::Integer(_) | Value::Decimal(_), DataType::String | DataType::Text) => {
            Ok(Value::Text(value.to_string()))
        }
        (Value::Integer(n), DataType::Integer) => Ok(Value::Integer(*n)),
        (Value::Integer(n), DataType::Decimal) => {
            Ok(Value::Decimal(apply_scale(Decimal::from(*n), scale)))
        }
        (Value::Decimal(d), DataType::Decimal) => Ok(Value::Decimal(apply_scale(*d, scale))),
        (Value::Decimal(d), DataType::Integer) => decimal_to_integer(*d).ok_or_else(mismatch),

        (Value::Date(d), DataType::Date) => Ok(Value::Date(*d)),
        (Value::Date(d), DataType::DateTime) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
        (Value::DateTime(dt), DataType::DateTime) => Ok(Value::DateTime(*dt)),
        (Value::Date(_) | Value::DateTime(_), DataType::String | DataType::Text) => {
            Ok(Value::Text(value.to_string()))
        }

        (Value::Boolean(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
        (Value::Boolean(b), DataType::String | DataType::Text) => Ok(Value::Text(b.to_string())),

        _ => Err(mismatch()),
    }
}

fn parse_integer(text: &str) -> Result<Value, CoercionError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::Integer(n));
    }

    // "12.0" is an integer written as a decimal
    parse_decimal(text)
        .ok()
        .and_then(decimal_to_integer)
        .ok_or_else(|| CoercionError::new(text, DataType::Integer))
}

fn parse_decimal(text: &str) -> Result<Decimal, CoercionError> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| CoercionError::new(text, DataType::Decimal))
}

fn parse_date(text: &str) -> Result<NaiveDate, CoercionError> {
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_STORAGE_FORMAT) {
        return Ok(date);
    }

    // a datetime literal narrows to its date only when it is exactly midnight
    parse_datetime(text)
        .ok()
        .filter(|dt| dt.time() == NaiveTime::MIN)
        .map(|dt| dt.date())
        .ok_or_else(|| CoercionError::new(text, DataType::Date))
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, CoercionError> {
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }

    NaiveDate::parse_from_str(text, DATE_STORAGE_FORMAT)
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| CoercionError::new(text, DataType::DateTime))
}

fn parse_boolean(text: &str) -> Result<bool, CoercionError> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(CoercionError::new(text, DataType::Boolean)),
    }
}

fn decimal_to_integer(d: Decimal) -> Option<Value> {
    if d.fract().is_zero() {
        d.to_i64().map(Value::Integer)
    } else {
        None
    }
}

// Truncation toward zero, not rounding: "12.349" at scale 2 stores 12.34.
fn apply_scale(d: Decimal, scale: Option<u32>) -> Decimal {
    match scale {
        Some(scale) if d.scale() > scale => d.trunc_with_scale(scale),
        _ => d,
    }
}
