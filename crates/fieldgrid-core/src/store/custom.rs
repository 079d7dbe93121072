//! Module: store::custom
//! Responsibility: the typed custom value table (one row per entity and
//! definition) and its upsert discipline.
//! Does not own: deferring writes for unsaved owners (see `store::record`).
//!
//! Invariant: at most one row per (customizable_id, customizable_type,
//! custom_definition_id); the unique constraint is authoritative and a
//! violation on insert is recovered by updating the existing row.

use crate::{
    obs::sink::{self, MetricsEvent},
    store::{Database, StoreError, is_constraint_violation},
    value::{DataType, Value},
};
use rusqlite::{
    Connection, OptionalExtension, Row, params, params_from_iter, types::Value as SqlValue,
};
use std::collections::BTreeMap;

// Keeps `IN (...)` lists well below SQLite's bound-parameter limit.
pub(crate) const ID_CHUNK: usize = 500;

const VALUE_COLUMNS: &str = "string_value, text_value, integer_value, decimal_value, \
                             date_value, datetime_value, boolean_value";

/// Custom values of one entity, keyed by definition id.
pub type CustomValues = BTreeMap<i64, Value>;

///
/// UpsertOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The insert raced another writer; the existing row was updated instead.
    Recovered,
    /// A null write removed the row.
    Cleared,
}

///
/// CustomValueStore
///

#[derive(Clone, Copy)]
pub struct CustomValueStore<'a> {
    db: &'a Database,
}

impl<'a> CustomValueStore<'a> {
    #[must_use]
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Value of one definition for one entity, `None` when never set.
    pub fn get(
        &self,
        entity_id: i64,
        entity_type: &str,
        definition_id: i64,
    ) -> Result<Option<Value>, StoreError> {
        let mut loaded = self
            .db
            .with_conn(|conn| load_rows(conn, entity_type, &[entity_id], Some(definition_id)))?;

        Ok(loaded
            .remove(&entity_id)
            .and_then(|mut values| values.remove(&definition_id)))
    }

    /// Upsert one value, coercing it to the definition's declared type.
    /// Writing `Value::Null` removes the row.
    pub fn set(
        &self,
        entity_id: i64,
        entity_type: &str,
        definition_id: i64,
        value: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        self.db
            .with_conn(|conn| upsert(conn, entity_id, entity_type, definition_id, value))
    }

    /// Every custom value of one entity.
    pub fn load_all(&self, entity_id: i64, entity_type: &str) -> Result<CustomValues, StoreError> {
        let mut loaded = self.load_for(entity_type, &[entity_id])?;

        Ok(loaded.remove(&entity_id).unwrap_or_default())
    }

    /// Custom values for a batch of entities of one module.
    pub fn load_for(
        &self,
        entity_type: &str,
        entity_ids: &[i64],
    ) -> Result<BTreeMap<i64, CustomValues>, StoreError> {
        self.db
            .with_conn(|conn| load_rows(conn, entity_type, entity_ids, None))
    }

    /// Number of stored values referencing a definition.
    pub fn count_for_definition(&self, definition_id: i64) -> Result<u64, StoreError> {
        let count: i64 = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM custom_values WHERE custom_definition_id = ?1",
                [definition_id],
                |row| row.get(0),
            )?)
        })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Remove every value owned by an entity.
    pub fn delete_owner(&self, entity_id: i64, entity_type: &str) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| delete_owner(conn, entity_id, entity_type))
    }
}

pub(crate) fn delete_owner(
    conn: &Connection,
    entity_id: i64,
    entity_type: &str,
) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM custom_values WHERE customizable_id = ?1 AND customizable_type = ?2",
        params![entity_id, entity_type],
    )?)
}

pub(crate) fn upsert(
    conn: &Connection,
    entity_id: i64,
    entity_type: &str,
    definition_id: i64,
    value: &Value,
) -> Result<UpsertOutcome, StoreError> {
    let data_type = definition_type(conn, definition_id)?;
    let value = value
        .coerce(data_type, None)
        .map_err(|err| StoreError::TypeMismatch {
            definition_id,
            value: err.value,
            expected: err.expected,
        })?;

    if value.is_null() {
        conn.execute(
            "DELETE FROM custom_values
             WHERE customizable_id = ?1 AND customizable_type = ?2 AND custom_definition_id = ?3",
            params![entity_id, entity_type, definition_id],
        )?;
        return Ok(UpsertOutcome::Cleared);
    }

    let columns = column_values(data_type, &value);
    let outcome = if update_row(conn, entity_id, entity_type, definition_id, &columns)? {
        UpsertOutcome::Updated
    } else {
        insert_or_recover(conn, entity_id, entity_type, definition_id, &columns)?
    };
    sink::record(MetricsEvent::CustomValueWritten);

    Ok(outcome)
}

// Insert, treating a unique-constraint violation as "the value already
// exists" and updating instead.
pub(super) fn insert_or_recover(
    conn: &Connection,
    entity_id: i64,
    entity_type: &str,
    definition_id: i64,
    columns: &[SqlValue],
) -> Result<UpsertOutcome, StoreError> {
    match insert_row(conn, entity_id, entity_type, definition_id, columns) {
        Ok(()) => Ok(UpsertOutcome::Inserted),
        Err(err) if is_constraint_violation(&err) => {
            tracing::debug!(
                entity_id,
                entity_type,
                definition_id,
                "custom value already exists, updating instead"
            );
            update_row(conn, entity_id, entity_type, definition_id, columns)?;
            sink::record(MetricsEvent::UpsertRecovered);

            Ok(UpsertOutcome::Recovered)
        }
        Err(err) => Err(err.into()),
    }
}

fn definition_type(conn: &Connection, definition_id: i64) -> Result<DataType, StoreError> {
    let tag: Option<String> = conn
        .query_row(
            "SELECT data_type FROM custom_definitions WHERE id = ?1",
            [definition_id],
            |row| row.get(0),
        )
        .optional()?;

    let tag = tag.ok_or(StoreError::DefinitionNotFound { id: definition_id })?;
    DataType::from_tag(&tag).ok_or_else(|| {
        StoreError::corrupt(format!(
            "custom definition {definition_id} has unknown data type '{tag}'"
        ))
    })
}

// One entry per value column in `DataType::ALL` order; only the column of
// `data_type` is populated.
pub(super) fn column_values(data_type: DataType, value: &Value) -> Vec<SqlValue> {
    DataType::ALL
        .iter()
        .map(|ty| {
            if *ty == data_type {
                value.to_sql_value()
            } else {
                SqlValue::Null
            }
        })
        .collect()
}

fn update_row(
    conn: &Connection,
    entity_id: i64,
    entity_type: &str,
    definition_id: i64,
    columns: &[SqlValue],
) -> Result<bool, StoreError> {
    let assignments = DataType::ALL
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("{} = ?{}", ty.value_column(), i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE custom_values SET {assignments}
         WHERE customizable_id = ?1 AND customizable_type = ?2 AND custom_definition_id = ?3"
    );

    let args = [
        SqlValue::Integer(entity_id),
        SqlValue::Text(entity_type.to_string()),
        SqlValue::Integer(definition_id),
    ]
    .into_iter()
    .chain(columns.iter().cloned());

    Ok(conn.execute(&sql, params_from_iter(args))? > 0)
}

fn insert_row(
    conn: &Connection,
    entity_id: i64,
    entity_type: &str,
    definition_id: i64,
    columns: &[SqlValue],
) -> rusqlite::Result<()> {
    let sql = format!(
        "INSERT INTO custom_values
         (customizable_id, customizable_type, custom_definition_id, {VALUE_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    );

    let args = [
        SqlValue::Integer(entity_id),
        SqlValue::Text(entity_type.to_string()),
        SqlValue::Integer(definition_id),
    ]
    .into_iter()
    .chain(columns.iter().cloned());

    conn.execute(&sql, params_from_iter(args))?;

    Ok(())
}

pub(crate) fn load_rows(
    conn: &Connection,
    entity_type: &str,
    entity_ids: &[i64],
    definition_id: Option<i64>,
) -> Result<BTreeMap<i64, CustomValues>, StoreError> {
    let mut out: BTreeMap<i64, CustomValues> = BTreeMap::new();

    for chunk in entity_ids.chunks(ID_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let definition_filter = if definition_id.is_some() {
            " AND v.custom_definition_id = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT v.customizable_id, v.custom_definition_id, d.data_type, {VALUE_COLUMNS}
             FROM custom_values v
             JOIN custom_definitions d ON d.id = v.custom_definition_id
             WHERE v.customizable_type = ? AND v.customizable_id IN ({placeholders}){definition_filter}"
        );

        let args = std::iter::once(SqlValue::Text(entity_type.to_string()))
            .chain(chunk.iter().map(|id| SqlValue::Integer(*id)))
            .chain(definition_id.map(SqlValue::Integer));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), decode_value_row)?;
        for row in rows {
            let (entity, definition, value) = row??;
            out.entry(entity).or_default().insert(definition, value);
        }
    }

    Ok(out)
}

fn decode_value_row(row: &Row<'_>) -> rusqlite::Result<Result<(i64, i64, Value), StoreError>> {
    let entity: i64 = row.get(0)?;
    let definition: i64 = row.get(1)?;
    let tag: String = row.get(2)?;

    let Some(index) = DataType::ALL.iter().position(|ty| ty.tag() == tag) else {
        return Ok(Err(StoreError::corrupt(format!(
            "custom definition {definition} has unknown data type '{tag}'"
        ))));
    };
    let data_type = DataType::ALL[index];
    let raw = row.get_ref(3 + index)?;

    Ok(Value::from_sql_ref(raw, data_type)
        .map(|value| (entity, definition, value))
        .map_err(StoreError::from))
}
