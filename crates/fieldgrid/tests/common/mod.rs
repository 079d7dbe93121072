#![allow(dead_code)]

use fieldgrid::prelude::*;
use fieldgrid::core::store::record::RecordStore;
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

pub static NATIVE_FIELDS: &[NativeFieldModel] = &[
    NativeFieldModel::new(
        "prod_uid",
        &PRODUCT,
        "Unique Identifier",
        "unique_identifier",
        DataType::String,
    ),
    NativeFieldModel::new("prod_desc", &PRODUCT, "Description", "description", DataType::Text),
    NativeFieldModel::new("prod_units", &PRODUCT, "Units", "units", DataType::Integer),
    NativeFieldModel::new(
        "prod_weight",
        &PRODUCT,
        "Weight",
        "weight",
        DataType::Decimal,
    )
    .with_scale(4),
    NativeFieldModel::new("prod_launch", &PRODUCT, "Launch", "launch_date", DataType::Date),
    NativeFieldModel::new("prod_updated", &PRODUCT, "Updated", "updated_at", DataType::DateTime),
    NativeFieldModel::new("prod_active", &PRODUCT, "Active", "active", DataType::Boolean),
    NativeFieldModel::new(
        "class_country",
        &CLASSIFICATION,
        "Country",
        "country_iso",
        DataType::String,
    ),
    NativeFieldModel::new("hts_1", &TARIFF_RECORD, "HTS 1", "hts_1", DataType::String),
];

const BUSINESS_SCHEMA: &str = r"
CREATE TABLE products (
    id                INTEGER PRIMARY KEY,
    unique_identifier TEXT,
    description       TEXT,
    units             INTEGER,
    weight            TEXT,
    launch_date       TEXT,
    updated_at        TEXT,
    active            INTEGER
);
CREATE TABLE classifications (
    id          INTEGER PRIMARY KEY,
    product_id  INTEGER NOT NULL REFERENCES products (id),
    country_iso TEXT
);
CREATE TABLE tariff_records (
    id                INTEGER PRIMARY KEY,
    classification_id INTEGER NOT NULL REFERENCES classifications (id),
    hts_1             TEXT
);
";

///
/// Harness
///
/// An in-memory store with the business tables, plus a session over it.
///

pub struct Harness {
    pub db: Arc<Database>,
    pub modules: Arc<ModuleRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        let db = Database::open_in_memory()
            .expect("in-memory database should open")
            .shared();
        db.install_engine_schema()
            .expect("engine schema should install");
        db.execute_batch(BUSINESS_SCHEMA)
            .expect("business schema should install");

        let modules = Arc::new(
            ModuleRegistry::with_modules([&PRODUCT, &CLASSIFICATION, &TARIFF_RECORD])
                .expect("modules should register"),
        );

        Self { db, modules }
    }

    pub fn session(&self) -> Session {
        fieldgrid::open(
            Arc::clone(&self.db),
            Arc::clone(&self.modules),
            NATIVE_FIELDS,
            EngineConfig::default(),
        )
        .expect("session should open")
    }

    pub fn records(&self) -> RecordStore<'_> {
        RecordStore::new(&self.db)
    }

    pub fn insert(
        &self,
        session: &Session,
        module: &'static ModuleDescriptor,
        parent: Option<i64>,
        values: &[(&str, Value)],
    ) -> i64 {
        let mut record = match parent {
            Some(parent_id) => Record::new_child(module, parent_id),
            None => Record::new(module),
        };
        for (uid, value) in values {
            session
                .catalog()
                .resolve(module.name, uid)
                .expect("field should resolve")
                .write(&mut record, value)
                .expect("value should coerce");
        }

        self.records()
            .save(&mut record)
            .expect("record should save")
    }
}
