//! Module: model::record
//! Responsibility: one untyped entity row plus its custom values and staged
//! writes.
//! Does not own: persistence (see `store::record`).

use crate::{model::module::ModuleDescriptor, value::Value};
use rusqlite::types::Value as SqlValue;
use std::collections::{BTreeMap, BTreeSet};

///
/// RecordRef
///
/// Lightweight identity of a persisted record.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RecordRef {
    pub module: &'static str,
    pub id: i64,
}

///
/// Record
///
/// Column values are kept in storage form; field descriptors decode them on
/// read. Writes are staged: dirty columns and pending custom values are only
/// persisted by `RecordStore::save`, which inserts the owner first.
///

#[derive(Clone, Debug)]
pub struct Record {
    module: &'static ModuleDescriptor,
    id: Option<i64>,
    columns: BTreeMap<String, SqlValue>,
    custom: BTreeMap<i64, Value>,
    dirty: BTreeSet<String>,
    pending_custom: BTreeMap<i64, Value>,
}

impl Record {
    /// A new, unsaved root-level record.
    #[must_use]
    pub const fn new(module: &'static ModuleDescriptor) -> Self {
        Self {
            module,
            id: None,
            columns: BTreeMap::new(),
            custom: BTreeMap::new(),
            dirty: BTreeSet::new(),
            pending_custom: BTreeMap::new(),
        }
    }

    /// A new, unsaved record nested under `parent_id`.
    #[must_use]
    pub fn new_child(module: &'static ModuleDescriptor, parent_id: i64) -> Self {
        let mut record = Self::new(module);
        if let Some(link) = &module.parent {
            record.set_column(link.foreign_key, SqlValue::Integer(parent_id));
        }

        record
    }

    pub(crate) const fn loaded(
        module: &'static ModuleDescriptor,
        id: i64,
        columns: BTreeMap<String, SqlValue>,
        custom: BTreeMap<i64, Value>,
    ) -> Self {
        Self {
            module,
            id: Some(id),
            columns,
            custom,
            dirty: BTreeSet::new(),
            pending_custom: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn module(&self) -> &'static ModuleDescriptor {
        self.module
    }

    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn record_ref(&self) -> Option<RecordRef> {
        self.id.map(|id| RecordRef {
            module: self.module.name,
            id,
        })
    }

    /// Id of the owning parent row, read from the foreign key column.
    #[must_use]
    pub fn parent_id(&self) -> Option<i64> {
        let link = self.module.parent.as_ref()?;
        match self.columns.get(link.foreign_key)? {
            SqlValue::Integer(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&SqlValue> {
        self.columns.get(name)
    }

    pub fn set_column(&mut self, name: &str, value: SqlValue) {
        self.columns.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
    }

    /// Custom value for a definition; staged values shadow loaded ones.
    #[must_use]
    pub fn custom_value(&self, definition_id: i64) -> Option<&Value> {
        self.pending_custom
            .get(&definition_id)
            .or_else(|| self.custom.get(&definition_id))
    }

    pub fn stage_custom(&mut self, definition_id: i64, value: Value) {
        self.pending_custom.insert(definition_id, value);
    }

    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        !self.dirty.is_empty() || !self.pending_custom.is_empty()
    }

    pub(crate) fn dirty_columns(&self) -> Vec<(String, SqlValue)> {
        self.dirty
            .iter()
            .map(|name| {
                let value = self.columns.get(name).cloned().unwrap_or(SqlValue::Null);
                (name.clone(), value)
            })
            .collect()
    }

    pub(crate) fn pending_custom(&self) -> impl Iterator<Item = (i64, &Value)> {
        self.pending_custom.iter().map(|(id, value)| (*id, value))
    }

    // Called by the store once the row and its custom values are durable.
    pub(crate) fn mark_saved(&mut self, id: i64) {
        self.id = Some(id);
        self.dirty.clear();
        let pending = std::mem::take(&mut self.pending_custom);
        self.custom.extend(pending);
    }
}
