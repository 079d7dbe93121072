//! Module: export::import
//! Responsibility: writing tabular rows back into records of one module.
//! Does not own: file parsing (see `export::csv`).
//!
//! Every cell goes through the field descriptors, so coercion and deferred
//! custom-value insertion behave exactly as for any other write.

use crate::{
    catalog::FieldCatalog,
    export::{
        ExportError,
        csv::{CsvOptions, read_table},
    },
    model::{
        FieldError,
        field::{FieldAccess, FieldDescriptor},
        module::ModuleDescriptor,
        record::Record,
    },
    store::{Database, record::RecordStore},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{io::Read, sync::Arc};

///
/// ImportSpec
///
/// Which fields the cells map to, in cell order, and how rows find existing
/// records.
///

#[derive(Clone, Debug)]
pub struct ImportSpec {
    module: &'static ModuleDescriptor,
    fields: Vec<Arc<FieldDescriptor>>,
    key: Option<usize>,
    parent_id: Option<i64>,
}

impl ImportSpec {
    /// Resolve each column id against `module`'s own fields.
    pub fn new<S: AsRef<str>>(
        catalog: &FieldCatalog,
        module: &str,
        columns: &[S],
    ) -> Result<Self, FieldError> {
        let descriptor = catalog.modules().require(module)?;
        let fields = columns
            .iter()
            .map(|uid| catalog.resolve(module, uid.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            module: descriptor,
            fields,
            key: None,
            parent_id: None,
        })
    }

    /// Match rows to existing records on a native column.
    pub fn with_key(mut self, uid: &str) -> Result<Self, ExportError> {
        let index = self
            .fields
            .iter()
            .position(|f| f.uid == uid && !f.is_custom())
            .ok_or_else(|| ExportError::KeyNotNative {
                field: uid.to_string(),
            })?;
        self.key = Some(index);

        Ok(self)
    }

    /// Nest new records under `parent_id`, and scope key lookups to it.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub const fn module(&self) -> &'static ModuleDescriptor {
        self.module
    }

    #[must_use]
    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }
}

///
/// ImportAction
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ImportAction {
    Inserted,
    Updated,
}

///
/// RowFailure
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RowFailure {
    /// 1-based data row number.
    pub line: u64,
    pub message: String,
}

///
/// ImportReport
///
/// Outcome of a batch. `ids` lists every saved record in row order and can
/// seed a batch cursor.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImportReport {
    pub ids: Vec<i64>,
    pub inserted: u64,
    pub updated: u64,
    pub failures: Vec<RowFailure>,
}

///
/// RecordImporter
///

pub struct RecordImporter<'a> {
    records: RecordStore<'a>,
}

impl<'a> RecordImporter<'a> {
    #[must_use]
    pub const fn new(db: &'a Database) -> Self {
        Self {
            records: RecordStore::new(db),
        }
    }

    /// Import one row. Blank cells leave the field untouched. A cell that
    /// fails coercion aborts the row before anything is written.
    pub fn import_row(
        &self,
        spec: &ImportSpec,
        cells: &[String],
    ) -> Result<(i64, ImportAction), ExportError> {
        if cells.len() != spec.fields.len() {
            return Err(ExportError::CellCount {
                line: 0,
                expected: spec.fields.len(),
                found: cells.len(),
            });
        }

        let (mut record, action) = match self.find_existing(spec, cells)? {
            Some(id) => (self.records.require(spec.module, id)?, ImportAction::Updated),
            None => {
                let record = match spec.parent_id {
                    Some(parent_id) => Record::new_child(spec.module, parent_id),
                    None => Record::new(spec.module),
                };
                (record, ImportAction::Inserted)
            }
        };

        for (field, cell) in spec.fields.iter().zip(cells) {
            if cell.trim().is_empty() {
                continue;
            }
            field.write(&mut record, &Value::from(cell.as_str()))?;
        }

        let id = self.records.save(&mut record)?;

        Ok((id, action))
    }

    /// Import many rows. Rows that fail coercion are reported and skipped;
    /// storage failures abort the batch.
    pub fn import_rows(
        &self,
        spec: &ImportSpec,
        rows: &[Vec<String>],
    ) -> Result<ImportReport, ExportError> {
        let mut report = ImportReport::default();

        for (index, cells) in rows.iter().enumerate() {
            let line = index as u64 + 1;
            match self.import_row(spec, cells) {
                Ok((id, action)) => {
                    report.ids.push(id);
                    match action {
                        ImportAction::Inserted => report.inserted += 1,
                        ImportAction::Updated => report.updated += 1,
                    }
                }
                Err(ExportError::Field(err)) => {
                    tracing::warn!(
                        module = spec.module.name,
                        line,
                        error = %err,
                        "import row rejected"
                    );
                    report.failures.push(RowFailure {
                        line,
                        message: err.to_string(),
                    });
                }
                Err(ExportError::CellCount {
                    expected, found, ..
                }) => {
                    return Err(ExportError::CellCount {
                        line,
                        expected,
                        found,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            module = spec.module.name,
            inserted = report.inserted,
            updated = report.updated,
            failed = report.failures.len(),
            "import finished"
        );

        Ok(report)
    }

    /// Import a headed CSV file whose header cells are field ids.
    pub fn import_csv<R: Read>(
        &self,
        catalog: &FieldCatalog,
        module: &str,
        input: R,
        options: CsvOptions,
        key: Option<&str>,
        parent_id: Option<i64>,
    ) -> Result<ImportReport, ExportError> {
        let table = read_table(input, options)?;
        let mut spec = ImportSpec::new(catalog, module, &table.headers)?;
        if let Some(key) = key {
            spec = spec.with_key(key)?;
        }
        if let Some(parent_id) = parent_id {
            spec = spec.with_parent(parent_id);
        }

        self.import_rows(&spec, &table.rows)
    }

    fn find_existing(
        &self,
        spec: &ImportSpec,
        cells: &[String],
    ) -> Result<Option<i64>, ExportError> {
        let Some(index) = spec.key else {
            return Ok(None);
        };
        let (Some(field), Some(cell)) = (spec.fields.get(index), cells.get(index)) else {
            return Ok(None);
        };
        let FieldAccess::Native(native) = &field.access else {
            return Ok(None);
        };
        if cell.trim().is_empty() {
            return Ok(None);
        }

        let key = field.parse(cell)?;

        Ok(self.records.find_by_column(
            spec.module,
            native.column,
            &key.to_sql_value(),
            spec.parent_id,
        )?)
    }
}
