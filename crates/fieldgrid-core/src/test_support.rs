//! In-memory fixture shared by unit tests: Product → Classification →
//! TariffRecord, plus Variant as a sibling of Classification.

use crate::{
    catalog::FieldCatalog,
    model::{
        field::NativeFieldModel,
        module::{ModuleDescriptor, ModuleRegistry},
        record::Record,
    },
    store::{
        Database,
        definition::{CustomDefinition, DefinitionStore, NewCustomDefinition},
        record::RecordStore,
    },
    value::{DataType, Value},
};
use std::sync::Arc;

pub static PRODUCT: ModuleDescriptor = ModuleDescriptor::root("Product", "Product", "products");
pub static CLASSIFICATION: ModuleDescriptor = ModuleDescriptor::child(
    "Classification",
    "Classification",
    "classifications",
    "Product",
    "product_id",
);
pub static TARIFF_RECORD: ModuleDescriptor = ModuleDescriptor::child(
    "TariffRecord",
    "TariffRecord",
    "tariff_records",
    "Classification",
    "classification_id",
);
pub static VARIANT: ModuleDescriptor =
    ModuleDescriptor::child("Variant", "Variant", "variants", "Product", "product_id");

pub static NATIVE_FIELDS: &[NativeFieldModel] = &[
    NativeFieldModel::new(
        "prod_uid",
        &PRODUCT,
        "Unique Identifier",
        "unique_identifier",
        DataType::String,
    ),
    NativeFieldModel::new("prod_name", &PRODUCT, "Name", "name", DataType::String),
    NativeFieldModel::new("prod_created", &PRODUCT, "Created", "created_at", DataType::DateTime),
    NativeFieldModel::new("prod_units", &PRODUCT, "Units", "units", DataType::Integer),
    NativeFieldModel::new("prod_active", &PRODUCT, "Active", "active", DataType::Boolean),
    NativeFieldModel::new(
        "class_country",
        &CLASSIFICATION,
        "Country",
        "country_iso",
        DataType::String,
    ),
    NativeFieldModel::new(
        "class_effective",
        &CLASSIFICATION,
        "Effective",
        "effective_date",
        DataType::Date,
    ),
    NativeFieldModel::new("hts_1", &TARIFF_RECORD, "HTS 1", "hts_1", DataType::String),
    NativeFieldModel::new("hts_line", &TARIFF_RECORD, "Line", "line_number", DataType::Integer),
    NativeFieldModel::new(
        "hts_rate",
        &TARIFF_RECORD,
        "Rate",
        "rate",
        DataType::Decimal,
    )
    .with_scale(4),
    NativeFieldModel::new("var_code", &VARIANT, "Variant Code", "code", DataType::String),
];

const BUSINESS_SCHEMA: &str = r"
CREATE TABLE products (
    id                INTEGER PRIMARY KEY,
    unique_identifier TEXT,
    name              TEXT,
    created_at        TEXT,
    units             INTEGER,
    active            INTEGER
);
CREATE TABLE classifications (
    id              INTEGER PRIMARY KEY,
    product_id      INTEGER NOT NULL REFERENCES products (id),
    country_iso     TEXT,
    effective_date  TEXT
);
CREATE TABLE tariff_records (
    id                 INTEGER PRIMARY KEY,
    classification_id  INTEGER NOT NULL REFERENCES classifications (id),
    hts_1              TEXT,
    line_number        INTEGER,
    rate               TEXT
);
CREATE TABLE variants (
    id          INTEGER PRIMARY KEY,
    product_id  INTEGER NOT NULL REFERENCES products (id),
    code        TEXT
);
";

///
/// Fixture
///

pub struct Fixture {
    pub db: Arc<Database>,
    pub modules: Arc<ModuleRegistry>,
    pub catalog: FieldCatalog,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::open_in_memory()
            .expect("in-memory database should open")
            .shared();
        db.install_engine_schema()
            .expect("engine schema should install");
        db.execute_batch(BUSINESS_SCHEMA)
            .expect("business schema should install");

        let modules = Arc::new(
            ModuleRegistry::with_modules([&PRODUCT, &CLASSIFICATION, &TARIFF_RECORD, &VARIANT])
                .expect("fixture modules should register"),
        );
        let catalog = FieldCatalog::new(modules.clone(), NATIVE_FIELDS, "*cf_")
            .expect("fixture catalog should build");

        Self {
            db,
            modules,
            catalog,
        }
    }

    pub fn records(&self) -> RecordStore<'_> {
        RecordStore::new(&self.db)
    }

    /// Create a custom definition and refresh the catalog.
    pub fn define(&self, module: &str, label: &str, ty: DataType) -> CustomDefinition {
        let def = DefinitionStore::new(&self.db)
            .create(&NewCustomDefinition::new(module, label, ty))
            .expect("definition should be created");
        self.catalog
            .reload(&self.db)
            .expect("catalog should reload");

        def
    }

    /// Save a new record with the given field values.
    pub fn insert(
        &self,
        module: &'static ModuleDescriptor,
        parent: Option<i64>,
        values: &[(&str, Value)],
    ) -> i64 {
        let mut record = match parent {
            Some(parent_id) => Record::new_child(module, parent_id),
            None => Record::new(module),
        };
        for (uid, value) in values {
            let field = self
                .catalog
                .resolve(module.name, uid)
                .expect("fixture field should resolve");
            field
                .write(&mut record, value)
                .expect("fixture value should coerce");
        }

        self.records()
            .save(&mut record)
            .expect("fixture record should save")
    }

    pub fn product(&self, uid: &str) -> i64 {
        self.insert(&PRODUCT, None, &[("prod_uid", Value::from(uid))])
    }

    pub fn classification(&self, product: i64, country: &str) -> i64 {
        self.insert(
            &CLASSIFICATION,
            Some(product),
            &[("class_country", Value::from(country))],
        )
    }

    pub fn tariff(&self, classification: i64, hts: &str) -> i64 {
        self.insert(
            &TARIFF_RECORD,
            Some(classification),
            &[("hts_1", Value::from(hts))],
        )
    }
}
