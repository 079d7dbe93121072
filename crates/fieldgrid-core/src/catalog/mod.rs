//! Module: catalog
//! Responsibility: resolving field ids to descriptors, native and custom.
//! Does not own: persisting definitions (see `store::definition`).
//! Boundary: readers always see one complete snapshot; a refresh swaps the
//! whole snapshot at once.


use crate::{
    model::{
        FieldError,
        chain::ModuleChain,
        field::{FieldDescriptor, NativeFieldModel},
        module::{ModuleDescriptor, ModuleRegistry},
    },
    store::{
        Database, StoreError,
        definition::{CustomDefinition, DefinitionStore},
    },
};
use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

///
/// LabelSource
///
/// External label/localization lookup. Consulted on every label request so
/// overrides take effect without a catalog refresh.
///

pub trait LabelSource: Send + Sync {
    fn label(&self, module: &str, uid: &str) -> Option<String>;
}

///
/// CatalogSnapshot
///
/// Immutable view of every field, per module, at one catalog version.
///

#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    version: u64,
    by_module: BTreeMap<&'static str, Vec<Arc<FieldDescriptor>>>,
}

impl CatalogSnapshot {
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Fields of `module`: natives in declaration order, then customs by
    /// (rank, id).
    #[must_use]
    pub fn fields(&self, module: &str) -> &[Arc<FieldDescriptor>] {
        self.by_module.get(module).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn find(&self, module: &str, uid: &str) -> Option<Arc<FieldDescriptor>> {
        self.fields(module).iter().find(|f| f.uid == uid).cloned()
    }

    /// Owning module's field with this uid, searching every module.
    #[must_use]
    pub fn find_any(&self, uid: &str) -> Option<Arc<FieldDescriptor>> {
        self.by_module
            .values()
            .flat_map(|fields| fields.iter())
            .find(|f| f.uid == uid)
            .cloned()
    }
}

///
/// FieldCatalog
///

pub struct FieldCatalog {
    modules: Arc<ModuleRegistry>,
    natives: &'static [NativeFieldModel],
    prefix: String,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    labels: Option<Arc<dyn LabelSource>>,
}

impl FieldCatalog {
    /// Build a catalog holding only native fields. Every native field must
    /// belong to a registered module and carry a unique uid.
    pub fn new(
        modules: Arc<ModuleRegistry>,
        natives: &'static [NativeFieldModel],
        prefix: impl Into<String>,
    ) -> Result<Self, FieldError> {
        let prefix = prefix.into();
        let snapshot = build_snapshot(&modules, natives, &prefix, &[], 0)?;

        Ok(Self {
            modules,
            natives,
            prefix,
            snapshot: RwLock::new(Arc::new(snapshot)),
            labels: None,
        })
    }

    #[must_use]
    pub fn with_label_source(mut self, labels: Arc<dyn LabelSource>) -> Self {
        self.labels = Some(labels);
        self
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    #[must_use]
    pub fn custom_prefix(&self) -> &str {
        &self.prefix
    }

    /// Uid of the custom field backed by a definition.
    #[must_use]
    pub fn custom_uid(&self, definition_id: i64) -> String {
        format!("{}{definition_id}", self.prefix)
    }

    /// Current snapshot. Holders keep a consistent view across refreshes.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Rebuild custom descriptors from `definitions` and swap the snapshot.
    pub fn refresh(&self, definitions: &[CustomDefinition]) -> Result<u64, FieldError> {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let version = guard.version() + 1;
        let next = build_snapshot(&self.modules, self.natives, &self.prefix, definitions, version)?;
        *guard = Arc::new(next);

        tracing::debug!(version, definitions = definitions.len(), "field catalog refreshed");

        Ok(version)
    }

    /// Refresh from the definitions currently stored.
    pub fn reload(&self, db: &Database) -> Result<u64, StoreError> {
        let definitions = DefinitionStore::new(db).list()?;

        self.refresh(&definitions).map_err(|err| StoreError::corrupt(err.to_string()))
    }

    /// Resolve a field that must belong to `module`.
    pub fn resolve(&self, module: &str, uid: &str) -> Result<Arc<FieldDescriptor>, FieldError> {
        self.modules.require(module)?;

        self.snapshot()
            .find(module, uid)
            .ok_or_else(|| FieldError::UnknownFieldId {
                module: module.to_string(),
                field: uid.to_string(),
            })
    }

    /// Resolve a field owned by any module of `chain`.
    pub fn resolve_in_chain(
        &self,
        chain: &ModuleChain,
        uid: &str,
    ) -> Result<Arc<FieldDescriptor>, FieldError> {
        let snapshot = self.snapshot();
        if let Some(field) = chain.iter().find_map(|m| snapshot.find(m.name, uid)) {
            return Ok(field);
        }

        match snapshot.find_any(uid) {
            Some(field) => Err(FieldError::FieldNotInChain {
                field: uid.to_string(),
                module: field.module.name.to_string(),
            }),
            None => Err(FieldError::UnknownFieldId {
                module: chain.root().map_or("", |m| m.name).to_string(),
                field: uid.to_string(),
            }),
        }
    }

    /// Every field of `module`.
    pub fn list(&self, module: &str) -> Result<Vec<Arc<FieldDescriptor>>, FieldError> {
        self.modules.require(module)?;

        Ok(self.snapshot().fields(module).to_vec())
    }

    /// Display label: the external source when it has one, else the
    /// descriptor's own.
    #[must_use]
    pub fn label(&self, field: &FieldDescriptor) -> String {
        self.labels
            .as_ref()
            .and_then(|source| source.label(field.module.name, &field.uid))
            .unwrap_or_else(|| field.label.clone())
    }
}

fn build_snapshot(
    modules: &ModuleRegistry,
    natives: &'static [NativeFieldModel],
    prefix: &str,
    definitions: &[CustomDefinition],
    version: u64,
) -> Result<CatalogSnapshot, FieldError> {
    let mut by_module: BTreeMap<&'static str, Vec<Arc<FieldDescriptor>>> = BTreeMap::new();

    for native in natives {
        let module = modules.require(native.module.name)?;
        let fields = by_module.entry(module.name).or_default();
        if fields.iter().any(|f| f.uid == native.uid) {
            return Err(FieldError::DuplicateFieldId {
                module: module.name.to_string(),
                field: native.uid.to_string(),
            });
        }
        fields.push(Arc::new(FieldDescriptor::native(native)));
    }

    let mut customs: Vec<&CustomDefinition> = definitions.iter().collect();
    customs.sort_by_key(|def| (def.rank, def.id));

    for def in customs {
        let Some(module) = modules.get(&def.module_type) else {
            tracing::warn!(
                definition = def.id,
                module = %def.module_type,
                "skipping custom definition for unregistered module"
            );
            continue;
        };

        by_module
            .entry(module.name)
            .or_default()
            .push(Arc::new(custom_descriptor(module, prefix, def)));
    }

    Ok(CatalogSnapshot { version, by_module })
}

fn custom_descriptor(
    module: &'static ModuleDescriptor,
    prefix: &str,
    def: &CustomDefinition,
) -> FieldDescriptor {
    FieldDescriptor::custom(
        format!("{prefix}{}", def.id),
        module,
        def.label.clone(),
        def.data_type,
        def.id,
        def.rank,
    )
}
