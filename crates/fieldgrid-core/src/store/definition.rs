//! Module: store::definition
//! Responsibility: persistence of user-authored custom field definitions.
//! Does not own: turning definitions into field descriptors (see `catalog`).

use crate::{
    store::{Database, StoreError, custom::CustomValueStore},
    value::DataType,
};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

const SELECT_DEFINITION: &str =
    "SELECT id, label, data_type, module_type, display_rank FROM custom_definitions";

///
/// CustomDefinition
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CustomDefinition {
    pub id: i64,
    pub label: String,
    pub data_type: DataType,
    /// Module name owning the field.
    pub module_type: String,
    pub rank: i64,
}

impl CustomDefinition {
    // Outer error: the row could not be read. Inner error: it decoded to
    // something the engine does not understand.
    fn decode(row: &Row<'_>) -> rusqlite::Result<Result<Self, StoreError>> {
        let id: i64 = row.get(0)?;
        let tag: String = row.get(2)?;
        let Some(data_type) = DataType::from_tag(&tag) else {
            return Ok(Err(StoreError::corrupt(format!(
                "custom definition {id} has unknown data type '{tag}'"
            ))));
        };

        Ok(Ok(Self {
            id,
            label: row.get(1)?,
            data_type,
            module_type: row.get(3)?,
            rank: row.get(4)?,
        }))
    }
}

///
/// NewCustomDefinition
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NewCustomDefinition {
    pub label: String,
    pub data_type: DataType,
    pub module_type: String,
    pub rank: i64,
}

impl NewCustomDefinition {
    #[must_use]
    pub fn new(
        module_type: impl Into<String>,
        label: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            label: label.into(),
            data_type,
            module_type: module_type.into(),
            rank: 0,
        }
    }

    #[must_use]
    pub const fn with_rank(mut self, rank: i64) -> Self {
        self.rank = rank;
        self
    }
}

///
/// DefinitionStore
///

#[derive(Clone, Copy)]
pub struct DefinitionStore<'a> {
    db: &'a Database,
}

impl<'a> DefinitionStore<'a> {
    #[must_use]
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: &NewCustomDefinition) -> Result<CustomDefinition, StoreError> {
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO custom_definitions (label, data_type, module_type, display_rank)
                 VALUES (?1, ?2, ?3, ?4)",
                params![new.label, new.data_type.tag(), new.module_type, new.rank],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::debug!(
            id,
            module = %new.module_type,
            label = %new.label,
            "custom definition created"
        );

        Ok(CustomDefinition {
            id,
            label: new.label.clone(),
            data_type: new.data_type,
            module_type: new.module_type.clone(),
            rank: new.rank,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<CustomDefinition>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_DEFINITION} WHERE id = ?1"),
                [id],
                CustomDefinition::decode,
            )
            .optional()?
            .transpose()
        })
    }

    pub fn require(&self, id: i64) -> Result<CustomDefinition, StoreError> {
        self.get(id)?.ok_or(StoreError::DefinitionNotFound { id })
    }

    /// Every definition, ordered by (module, rank, id).
    pub fn list(&self) -> Result<Vec<CustomDefinition>, StoreError> {
        self.query_many(
            &format!("{SELECT_DEFINITION} ORDER BY module_type, display_rank, id"),
            &[],
        )
    }

    /// Definitions of one module, ordered by (rank, id).
    pub fn list_for_module(&self, module: &str) -> Result<Vec<CustomDefinition>, StoreError> {
        self.query_many(
            &format!("{SELECT_DEFINITION} WHERE module_type = ?1 ORDER BY display_rank, id"),
            &[&module],
        )
    }

    pub fn update_label(&self, id: i64, label: &str) -> Result<(), StoreError> {
        self.update(id, "UPDATE custom_definitions SET label = ?1 WHERE id = ?2", &label)
    }

    pub fn update_rank(&self, id: i64, rank: i64) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE custom_definitions SET display_rank = ?1 WHERE id = ?2",
            &rank,
        )
    }

    /// Delete a definition. Refused while any value still references it.
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let values = CustomValueStore::new(self.db).count_for_definition(id)?;
        if values > 0 {
            return Err(StoreError::DefinitionInUse { id, values });
        }

        let deleted = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM custom_definitions WHERE id = ?1", [id])?)
        })?;
        if deleted == 0 {
            return Err(StoreError::DefinitionNotFound { id });
        }

        tracing::debug!(id, "custom definition deleted");

        Ok(())
    }

    fn update(&self, id: i64, sql: &str, value: &dyn rusqlite::ToSql) -> Result<(), StoreError> {
        let changed = self
            .db
            .with_conn(|conn| Ok(conn.execute(sql, params![value, id])?))?;

        if changed == 0 {
            Err(StoreError::DefinitionNotFound { id })
        } else {
            Ok(())
        }
    }

    fn query_many(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<CustomDefinition>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(args, CustomDefinition::decode)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }

            Ok(out)
        })
    }
}
