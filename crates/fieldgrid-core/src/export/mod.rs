//! Module: export
//! Responsibility: flattening a module chain into aligned rows, and the file
//! formats built on those rows (CSV out, row import in).
//! Does not own: the traversal itself (see `walk`).
//!
//! Field id strings are the wire format between rows and files: a header
//! written by `csv` names fields by label, an import header names them by id.

pub mod csv;
pub mod import;


use crate::{
    catalog::FieldCatalog,
    model::{
        FieldError,
        chain::ModuleChain,
        field::FieldDescriptor,
        module::ModuleDescriptor,
        record::RecordRef,
    },
    obs::sink::{self, MetricsEvent},
    store::{Database, StoreError},
    value::CellFormat,
    walk::{CancelToken, ChainVisitor, ChainWalk, Lineage, WalkError},
};
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// ExportError
///

#[derive(Debug, ThisError)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("row {line} has {found} cell(s), expected {expected}")]
    CellCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("key field '{field}' must be a native field of the imported module")]
    KeyNotNative { field: String },
}

///
/// Row
///
/// One flattened output row. Cells follow the column order of the plan.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Row {
    pub cells: Vec<String>,
    /// Deepest record that produced this row.
    pub leaf: Option<RecordRef>,
}

///
/// ExportPlan
///
/// Resolved columns plus the chain they need. Columns may belong to the root
/// module or any module nested below it.
///

#[derive(Clone, Debug)]
pub struct ExportPlan {
    root: &'static ModuleDescriptor,
    chain: ModuleChain,
    fields: Vec<Arc<FieldDescriptor>>,
}

impl ExportPlan {
    pub fn new<S: AsRef<str>>(
        catalog: &FieldCatalog,
        module: &str,
        columns: &[S],
    ) -> Result<Self, FieldError> {
        let modules = catalog.modules();
        let root = modules.require(module)?;
        let snapshot = catalog.snapshot();

        let mut chain = ModuleChain::starting_at(root);
        let mut fields = Vec::with_capacity(columns.len());
        for uid in columns {
            let uid = uid.as_ref();
            let field = snapshot
                .find_any(uid)
                .ok_or_else(|| FieldError::UnknownFieldId {
                    module: root.name.to_string(),
                    field: uid.to_string(),
                })?;

            if !modules.is_at_or_below(field.module, root) {
                return Err(FieldError::FieldNotInChain {
                    field: uid.to_string(),
                    module: field.module.name.to_string(),
                });
            }
            chain.add(modules, field.module)?;
            fields.push(field);
        }

        Ok(Self {
            root,
            chain,
            fields,
        })
    }

    #[must_use]
    pub const fn root(&self) -> &'static ModuleDescriptor {
        self.root
    }

    #[must_use]
    pub const fn chain(&self) -> &ModuleChain {
        &self.chain
    }

    #[must_use]
    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    /// Header labels, resolved now so label overrides apply.
    #[must_use]
    pub fn headers(&self, catalog: &FieldCatalog) -> Vec<String> {
        self.fields.iter().map(|f| catalog.label(f)).collect()
    }
}

///
/// Materializer
///

pub struct Materializer<'a> {
    db: &'a Database,
    format: &'a CellFormat,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Materializer<'a> {
    #[must_use]
    pub const fn new(db: &'a Database, format: &'a CellFormat) -> Self {
        Self {
            db,
            format,
            cancel: None,
        }
    }

    #[must_use]
    pub const fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Rows for every root id, in order. Missing roots are skipped.
    pub fn materialize(
        &self,
        plan: &ExportPlan,
        root_ids: &[i64],
    ) -> Result<Vec<Row>, ExportError> {
        let mut visitor = RowCollector {
            fields: &plan.fields,
            format: self.format,
            rows: Vec::new(),
        };

        let mut walk = ChainWalk::new(self.db, &plan.chain);
        if let Some(cancel) = self.cancel {
            walk = walk.with_cancel(cancel);
        }
        let stats = walk.walk_ids(root_ids, &mut visitor)?;

        sink::record(MetricsEvent::RowsMaterialized {
            module: plan.root.name,
            rows: stats.rows,
        });
        tracing::debug!(
            module = plan.root.name,
            roots = stats.roots,
            rows = stats.rows,
            "rows materialized"
        );

        Ok(visitor.rows)
    }
}

///
/// RowCollector
///
/// Walk strategy: one formatted row per leaf.
///

struct RowCollector<'p> {
    fields: &'p [Arc<FieldDescriptor>],
    format: &'p CellFormat,
    rows: Vec<Row>,
}

impl ChainVisitor for RowCollector<'_> {
    fn leaf_row(&mut self, lineage: &Lineage<'_>) -> Result<(), WalkError> {
        let mut cells = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let cell = match lineage.record(field.module.name) {
                Some(record) => field.read(record)?.format_cell(self.format),
                None => String::new(),
            };
            cells.push(cell);
        }

        self.rows.push(Row {
            cells,
            leaf: lineage.leaf().and_then(|record| record.record_ref()),
        });

        Ok(())
    }
}
