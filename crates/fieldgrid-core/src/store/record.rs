//! Module: store::record
//! Responsibility: loading and saving entity rows with their custom values.
//! Does not own: business schemas; tables are created by the host.
//!
//! Save order is fixed: the owner row is written first and its id assigned,
//! then pending custom values are upserted, all in one transaction.

use crate::{
    model::{module::ModuleDescriptor, record::Record},
    store::{
        Database, StoreError,
        custom::{self, CustomValues, ID_CHUNK},
        quote_ident,
    },
};
use rusqlite::{
    Connection, OptionalExtension, Statement, params_from_iter, types::Value as SqlValue,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// RecordStore
///

#[derive(Clone, Copy)]
pub struct RecordStore<'a> {
    db: &'a Database,
}

impl<'a> RecordStore<'a> {
    #[must_use]
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn load(
        &self,
        module: &'static ModuleDescriptor,
        id: i64,
    ) -> Result<Option<Record>, StoreError> {
        Ok(self.load_many(module, &[id])?.into_iter().next())
    }

    pub fn require(
        &self,
        module: &'static ModuleDescriptor,
        id: i64,
    ) -> Result<Record, StoreError> {
        self.load(module, id)?.ok_or_else(|| StoreError::RecordNotFound {
            module: module.name.to_string(),
            id,
        })
    }

    /// Load records in the requested order. Ids without a live row are
    /// skipped.
    pub fn load_many(
        &self,
        module: &'static ModuleDescriptor,
        ids: &[i64],
    ) -> Result<Vec<Record>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.db.with_conn(|conn| {
            let mut by_id = BTreeMap::new();
            for chunk in ids.chunks(ID_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT * FROM {} WHERE id IN ({placeholders})",
                    quote_ident(module.table)
                );
                let mut stmt = conn.prepare(&sql)?;
                for (id, columns) in read_rows(&mut stmt, chunk.iter().copied())? {
                    by_id.insert(id, columns);
                }
            }

            let found: Vec<i64> = by_id.keys().copied().collect();
            let mut custom = custom::load_rows(conn, module.name, &found, None)?;

            Ok(ids
                .iter()
                .filter_map(|id| {
                    let columns = by_id.get(id)?.clone();
                    let values = custom.remove(id).unwrap_or_default();
                    Some(Record::loaded(module, *id, columns, values))
                })
                .collect())
        })
    }

    /// Children of `parent_id` in `child`, ordered by id.
    pub fn children(
        &self,
        child: &'static ModuleDescriptor,
        parent_id: i64,
    ) -> Result<Vec<Record>, StoreError> {
        let Some(link) = &child.parent else {
            return Ok(Vec::new());
        };

        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY id",
                quote_ident(child.table),
                quote_ident(link.foreign_key)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = read_rows(&mut stmt, std::iter::once(parent_id))?;

            let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
            let mut custom = custom::load_rows(conn, child.name, &ids, None)?;

            Ok(rows
                .into_iter()
                .map(|(id, columns)| {
                    let values: CustomValues = custom.remove(&id).unwrap_or_default();
                    Record::loaded(child, id, columns, values)
                })
                .collect())
        })
    }

    pub fn exists(&self, module: &'static ModuleDescriptor, id: i64) -> Result<bool, StoreError> {
        Ok(!self.live_ids(module, &[id])?.is_empty())
    }

    /// The subset of `ids` that still has a row.
    pub fn live_ids(
        &self,
        module: &'static ModuleDescriptor,
        ids: &[i64],
    ) -> Result<BTreeSet<i64>, StoreError> {
        self.db.with_conn(|conn| {
            let mut live = BTreeSet::new();
            for chunk in ids.chunks(ID_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT id FROM {} WHERE id IN ({placeholders})",
                    quote_ident(module.table)
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get(0))?;
                for id in rows {
                    live.insert(id?);
                }
            }

            Ok(live)
        })
    }

    /// Id of the first row (lowest id) whose `column` equals `value`,
    /// optionally restricted to children of `parent_id`.
    pub fn find_by_column(
        &self,
        module: &'static ModuleDescriptor,
        column: &str,
        value: &SqlValue,
        parent_id: Option<i64>,
    ) -> Result<Option<i64>, StoreError> {
        let mut sql = format!(
            "SELECT id FROM {} WHERE {} = ?1",
            quote_ident(module.table),
            quote_ident(column)
        );
        let mut args = vec![value.clone()];
        if let (Some(parent_id), Some(link)) = (parent_id, &module.parent) {
            sql.push_str(&format!(" AND {} = ?2", quote_ident(link.foreign_key)));
            args.push(SqlValue::Integer(parent_id));
        }
        sql.push_str(" ORDER BY id LIMIT 1");

        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, params_from_iter(args), |row| row.get(0))
                .optional()?)
        })
    }

    /// Persist dirty columns, then pending custom values, in one
    /// transaction. Returns the record id.
    pub fn save(&self, record: &mut Record) -> Result<i64, StoreError> {
        if record.is_persisted() && !record.has_pending_writes() {
            return record
                .id()
                .ok_or_else(|| StoreError::corrupt("persisted record without id"));
        }

        let id = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let id = write_row(&tx, record)?;
            for (definition_id, value) in record.pending_custom() {
                custom::upsert(&tx, id, record.module().name, definition_id, value)?;
            }
            tx.commit()?;

            Ok(id)
        })?;
        record.mark_saved(id);

        tracing::debug!(module = record.module().name, id, "record saved");

        Ok(id)
    }

    /// Delete a row and its custom values. Returns whether a row existed.
    pub fn delete(&self, module: &'static ModuleDescriptor, id: i64) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            custom::delete_owner(&tx, id, module.name)?;
            let deleted = tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", quote_ident(module.table)),
                [id],
            )?;
            tx.commit()?;

            Ok(deleted > 0)
        })
    }
}

fn write_row(conn: &Connection, record: &Record) -> Result<i64, StoreError> {
    let table = quote_ident(record.module().table);
    let dirty = record.dirty_columns();

    if let Some(id) = record.id() {
        if !dirty.is_empty() {
            let assignments = dirty
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("{} = ?{}", quote_ident(name), i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {table} SET {assignments} WHERE id = ?{}",
                dirty.len() + 1
            );
            let args = dirty
                .into_iter()
                .map(|(_, value)| value)
                .chain(std::iter::once(SqlValue::Integer(id)));

            let changed = conn.execute(&sql, params_from_iter(args))?;
            if changed == 0 {
                return Err(StoreError::RecordNotFound {
                    module: record.module().name.to_string(),
                    id,
                });
            }
        }

        return Ok(id);
    }

    if dirty.is_empty() {
        conn.execute(&format!("INSERT INTO {table} DEFAULT VALUES"), [])?;
    } else {
        let names = dirty
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; dirty.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({names}) VALUES ({placeholders})");

        conn.execute(&sql, params_from_iter(dirty.into_iter().map(|(_, v)| v)))?;
    }

    Ok(conn.last_insert_rowid())
}

fn read_rows(
    stmt: &mut Statement<'_>,
    args: impl Iterator<Item = i64>,
) -> Result<Vec<(i64, BTreeMap<String, SqlValue>)>, StoreError> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let id_index = names
        .iter()
        .position(|name| name == "id")
        .ok_or_else(|| StoreError::corrupt("entity table has no id column"))?;

    let mut rows = stmt.query(params_from_iter(args))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(id_index)?;
        let mut columns = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            if i != id_index {
                columns.insert(name.clone(), row.get::<_, SqlValue>(i)?);
            }
        }
        out.push((id, columns));
    }

    Ok(out)
}
