//! Module: store
//! Responsibility: the relational store binding: connection ownership, the
//! engine-owned tables, custom definitions, custom values and records.
//! Does not own: business schema migrations (the host application does).

pub mod custom;
pub mod definition;
pub mod record;
pub mod schema;

#[cfg(test)]
mod tests;

use crate::value::{CoercionError, DataType};
use regex::Regex;
use rusqlite::{Connection, ErrorCode, functions::FunctionFlags, types::ValueRef};
use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error as ThisError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("custom definition {definition_id} expects {expected}, got '{value}'")]
    TypeMismatch {
        definition_id: i64,
        value: String,
        expected: DataType,
    },

    #[error("custom definition {id} not found")]
    DefinitionNotFound { id: i64 },

    #[error("custom definition {id} is still referenced by {values} value(s)")]
    DefinitionInUse { id: i64, values: u64 },

    #[error("{module} record {id} not found")]
    RecordNotFound { module: String, id: i64 },

    #[error("stored data is corrupt: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}

///
/// Database
///
/// One SQLite connection behind a mutex. All engine access funnels through
/// `with_conn`, so statements from concurrent callers never interleave on the
/// connection.
///

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, registering the `regexp` function the
    /// compiler relies on.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        register_regexp(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Create the engine-owned tables if they do not exist.
    pub fn install_engine_schema(&self) -> Result<(), StoreError> {
        self.execute_batch(schema::ENGINE_SCHEMA)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Run `f` with exclusive use of the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }
}

/// Quote an SQL identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

// `x REGEXP y` calls regexp(y, x). Compiled patterns are cached per statement
// as auxiliary data; NULL text never matches.
fn register_regexp(conn: &Connection) -> Result<(), StoreError> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |raw| -> Result<_, BoxError> {
                Ok(Regex::new(raw.as_str()?)?)
            })?;

            let matched = match ctx.get_raw(1) {
                ValueRef::Null | ValueRef::Blob(_) => false,
                ValueRef::Text(bytes) => pattern.is_match(&String::from_utf8_lossy(bytes)),
                ValueRef::Integer(n) => pattern.is_match(&n.to_string()),
                ValueRef::Real(r) => pattern.is_match(&r.to_string()),
            };

            Ok(matched)
        },
    )?;

    Ok(())
}
