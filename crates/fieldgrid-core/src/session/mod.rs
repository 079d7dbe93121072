//! Module: session
//! Responsibility: one engine instance wired from config, and the access
//! checks in front of every caller-facing operation.
//! Does not own: permission policy; callers pass in an `AccessDecision`.
//!
//! Definition changes always reload the catalog before returning, so no
//! later call in the same session sees stale labels or field lists.

#[cfg(test)]
mod tests;

use crate::{
    catalog::{FieldCatalog, LabelSource},
    cursor::{CursorHandle, CursorStore, CursorTarget},
    error::Error,
    export::{
        ExportPlan, Materializer, Row,
        csv::{CsvOptions, write_rows},
        import::{ImportReport, RecordImporter},
    },
    model::{
        field::{FieldDescriptor, NativeFieldModel},
        module::{ModuleDescriptor, ModuleRegistry},
    },
    query::{CompiledQuery, OperatorTable, QueryCompiler, SearchSetup},
    store::{
        Database,
        definition::{CustomDefinition, DefinitionStore, NewCustomDefinition},
    },
    validate::{RuleValidator, ValidationRule, Violation},
    value::CellFormat,
    walk::CancelToken,
};
use fieldgrid_config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::{
    io::{Read, Write},
    sync::Arc,
};

///
/// AccessDecision
///
/// What the caller may do, decided outside the engine.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessDecision {
    pub can_view: bool,
    pub can_edit: bool,
}

impl AccessDecision {
    pub const VIEW: Self = Self {
        can_view: true,
        can_edit: false,
    };
    pub const EDIT: Self = Self {
        can_view: true,
        can_edit: true,
    };
    pub const NONE: Self = Self {
        can_view: false,
        can_edit: false,
    };

    fn require_view(self, action: &'static str) -> Result<(), Error> {
        if self.can_view {
            Ok(())
        } else {
            Err(denied(action, "view"))
        }
    }

    fn require_edit(self, action: &'static str) -> Result<(), Error> {
        if self.can_edit {
            Ok(())
        } else {
            Err(denied(action, "edit"))
        }
    }
}

fn denied(action: &'static str, permission: &'static str) -> Error {
    tracing::warn!(action, permission, "access denied");

    Error::Unauthorized { action, permission }
}

///
/// Session
///

pub struct Session {
    db: Arc<Database>,
    catalog: FieldCatalog,
    operators: OperatorTable,
    cursors: CursorStore,
    config: EngineConfig,
    format: CellFormat,
}

impl Session {
    /// Wire an engine over `db`. Installs the engine tables if missing and
    /// loads the current custom definitions.
    pub fn new(
        db: Arc<Database>,
        modules: Arc<ModuleRegistry>,
        natives: &'static [NativeFieldModel],
        config: EngineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let format = CellFormat::from_config(&config.export)?;

        db.install_engine_schema()?;
        let catalog = FieldCatalog::new(
            Arc::clone(&modules),
            natives,
            config.catalog.custom_field_prefix.clone(),
        )?;
        catalog.reload(&db)?;

        let cursors = CursorStore::new(Arc::clone(&db), modules, config.cursor.clone());

        Ok(Self {
            db,
            catalog,
            operators: OperatorTable::builtin(),
            cursors,
            config,
            format,
        })
    }

    #[must_use]
    pub fn with_label_source(mut self, labels: Arc<dyn LabelSource>) -> Self {
        self.catalog = self.catalog.with_label_source(labels);
        self
    }

    /// Replace the operator table, e.g. with one holding extra templates.
    #[must_use]
    pub fn with_operators(mut self, operators: OperatorTable) -> Self {
        self.operators = operators;
        self
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub const fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn cell_format(&self) -> &CellFormat {
        &self.format
    }

    pub fn module(&self, name: &str) -> Result<&'static ModuleDescriptor, Error> {
        Ok(self.catalog.modules().require(name)?)
    }

    /// Every field of `module` in display order.
    pub fn fields(&self, module: &str) -> Result<Vec<Arc<FieldDescriptor>>, Error> {
        Ok(self.catalog.list(module)?)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    pub fn compile(&self, setup: &SearchSetup) -> Result<CompiledQuery, Error> {
        let compiler = QueryCompiler::new(
            &self.catalog,
            &self.operators,
            &self.config.search.list_separator,
        );

        Ok(compiler.compile(setup)?)
    }

    /// Run a search setup afresh and position its cursor on the first live
    /// result. `cursor` resumes a previous result instead.
    pub fn search(
        &self,
        access: AccessDecision,
        owner: i64,
        setup: &SearchSetup,
    ) -> Result<CursorHandle<'_>, Error> {
        access.require_view("search")?;
        let module = self.module(&setup.module)?;
        let query = self.compile(setup)?;

        let handle = self
            .cursors
            .open(owner, CursorTarget::Search(setup.id), module)?;
        handle.execute(module, &query)?;

        Ok(handle)
    }

    /// A cursor over an explicit id list, kept in the given order.
    pub fn open_batch(
        &self,
        access: AccessDecision,
        owner: i64,
        batch_id: i64,
        module: &str,
        ids: &[i64],
    ) -> Result<CursorHandle<'_>, Error> {
        access.require_view("open batch")?;
        let module = self.module(module)?;

        let handle = self
            .cursors
            .open(owner, CursorTarget::Batch(batch_id), module)?;
        handle.execute(module, &CompiledQuery::for_batch(module, ids))?;

        Ok(handle)
    }

    /// Reopen a cursor as it was last persisted, without re-running it.
    pub fn cursor(
        &self,
        access: AccessDecision,
        owner: i64,
        target: CursorTarget,
        module: &str,
    ) -> Result<CursorHandle<'_>, Error> {
        access.require_view("open cursor")?;
        let module = self.module(module)?;

        Ok(self.cursors.open(owner, target, module)?)
    }

    pub fn discard_cursor(&self, owner: i64, target: CursorTarget) -> Result<(), Error> {
        Ok(self.cursors.discard(owner, target)?)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub fn export_plan<S: AsRef<str>>(
        &self,
        module: &str,
        columns: &[S],
    ) -> Result<ExportPlan, Error> {
        Ok(ExportPlan::new(&self.catalog, module, columns)?)
    }

    pub fn materialize(
        &self,
        access: AccessDecision,
        plan: &ExportPlan,
        root_ids: &[i64],
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Row>, Error> {
        access.require_view("export")?;
        let mut materializer = Materializer::new(&self.db, &self.format);
        if let Some(cancel) = cancel {
            materializer = materializer.with_cancel(cancel);
        }

        Ok(materializer.materialize(plan, root_ids)?)
    }

    /// Rows for a cursor's whole result. The cursor position is untouched.
    pub fn materialize_cursor(
        &self,
        access: AccessDecision,
        plan: &ExportPlan,
        cursor: &CursorHandle<'_>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Row>, Error> {
        access.require_view("export")?;
        let ids = cursor.ids()?;

        self.materialize(access, plan, &ids, cancel)
    }

    /// Write a cursor's rows as CSV with label headers. Returns data rows
    /// written.
    pub fn export_csv<W: Write>(
        &self,
        access: AccessDecision,
        plan: &ExportPlan,
        cursor: &CursorHandle<'_>,
        out: W,
        cancel: Option<&CancelToken>,
    ) -> Result<u64, Error> {
        let rows = self.materialize_cursor(access, plan, cursor, cancel)?;
        let headers = plan.headers(&self.catalog);

        Ok(write_rows(out, &headers, &rows, self.csv_options()?)?)
    }

    fn csv_options(&self) -> Result<CsvOptions, Error> {
        Ok(CsvOptions::default().with_delimiter(self.config.export.delimiter_byte()?))
    }

    // ------------------------------------------------------------------
    // Import and validation
    // ------------------------------------------------------------------

    /// Import a CSV whose header cells are field ids of `module`.
    pub fn import_csv<R: Read>(
        &self,
        access: AccessDecision,
        module: &str,
        input: R,
        key: Option<&str>,
        parent_id: Option<i64>,
    ) -> Result<ImportReport, Error> {
        access.require_edit("import")?;

        Ok(RecordImporter::new(&self.db).import_csv(
            &self.catalog,
            module,
            input,
            self.csv_options()?,
            key,
            parent_id,
        )?)
    }

    pub fn validate(
        &self,
        access: AccessDecision,
        module: &str,
        root_id: i64,
        rules: &[ValidationRule],
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Violation>, Error> {
        access.require_view("validate")?;
        let mut validator = RuleValidator::new(&self.catalog, &self.db);
        if let Some(cancel) = cancel {
            validator = validator.with_cancel(cancel);
        }

        Ok(validator.validate(module, root_id, rules)?)
    }

    // ------------------------------------------------------------------
    // Custom definitions
    // ------------------------------------------------------------------

    pub fn definitions(&self, module: &str) -> Result<Vec<CustomDefinition>, Error> {
        Ok(DefinitionStore::new(&self.db).list_for_module(module)?)
    }

    pub fn create_definition(
        &self,
        access: AccessDecision,
        new: &NewCustomDefinition,
    ) -> Result<CustomDefinition, Error> {
        access.require_edit("create definition")?;
        self.module(&new.module_type)?;

        let definition = DefinitionStore::new(&self.db).create(new)?;
        self.reload_catalog()?;
        tracing::info!(
            id = definition.id,
            module = %definition.module_type,
            "custom definition created"
        );

        Ok(definition)
    }

    pub fn rename_definition(
        &self,
        access: AccessDecision,
        id: i64,
        label: &str,
    ) -> Result<(), Error> {
        access.require_edit("rename definition")?;
        DefinitionStore::new(&self.db).update_label(id, label)?;

        self.reload_catalog()
    }

    pub fn rerank_definition(
        &self,
        access: AccessDecision,
        id: i64,
        rank: i64,
    ) -> Result<(), Error> {
        access.require_edit("rerank definition")?;
        DefinitionStore::new(&self.db).update_rank(id, rank)?;

        self.reload_catalog()
    }

    /// Refused while any value still references the definition.
    pub fn delete_definition(&self, access: AccessDecision, id: i64) -> Result<(), Error> {
        access.require_edit("delete definition")?;
        DefinitionStore::new(&self.db).delete(id)?;

        self.reload_catalog()
    }

    fn reload_catalog(&self) -> Result<(), Error> {
        let version = self.catalog.reload(&self.db)?;
        tracing::debug!(version, "catalog reloaded");

        Ok(())
    }
}
