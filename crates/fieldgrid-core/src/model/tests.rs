use crate::{
    model::{
        FieldError,
        chain::ModuleChain,
        module::{ModuleDescriptor, ModuleRegistry},
        record::Record,
    },
    test_support::{CLASSIFICATION, Fixture, PRODUCT, TARIFF_RECORD, VARIANT},
    value::{DataType, Value},
};
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

static ORPHAN: ModuleDescriptor =
    ModuleDescriptor::child("Orphan", "Orphan", "orphans", "Missing", "missing_id");

fn registry() -> ModuleRegistry {
    ModuleRegistry::with_modules([&PRODUCT, &CLASSIFICATION, &TARIFF_RECORD, &VARIANT])
        .expect("fixture modules should register")
}

fn names(modules: &[&'static ModuleDescriptor]) -> Vec<&'static str> {
    modules.iter().map(|m| m.name).collect()
}

fn chain_of(registry: &ModuleRegistry, adds: &[&'static ModuleDescriptor]) -> ModuleChain {
    let mut chain = ModuleChain::new();
    for module in adds {
        chain.add(registry, module).expect("add should succeed");
    }

    chain
}

#[test]
fn register_requires_known_parent() {
    let mut registry = ModuleRegistry::new();

    let err = registry
        .register(&ORPHAN)
        .expect_err("unknown parent should be rejected");
    assert_eq!(
        err,
        FieldError::UnknownModule {
            module: "Missing".to_string()
        }
    );
}

#[test]
fn adding_a_leaf_pulls_in_its_ancestors() {
    let registry = registry();
    let chain = chain_of(&registry, &[&TARIFF_RECORD]);

    assert_eq!(
        chain.iter().map(|m| m.name).collect::<Vec<_>>(),
        vec!["Product", "Classification", "TariffRecord"]
    );
    assert_eq!(chain.alias("TariffRecord").as_deref(), Some("m2"));
}

#[test]
fn child_modules_are_contiguous_descendants() {
    let registry = registry();
    let chain = chain_of(&registry, &[&PRODUCT, &CLASSIFICATION, &VARIANT, &TARIFF_RECORD]);

    // TariffRecord is placed inside Classification's subtree, before Variant.
    assert_eq!(
        chain.iter().map(|m| m.name).collect::<Vec<_>>(),
        vec!["Product", "Classification", "TariffRecord", "Variant"]
    );
    assert_eq!(
        names(&chain.child_modules("Product")),
        vec!["Classification", "TariffRecord", "Variant"]
    );
    assert_eq!(names(&chain.child_modules("Classification")), vec!["TariffRecord"]);
    assert_eq!(
        names(&chain.direct_children("Product")),
        vec!["Classification", "Variant"]
    );
    assert!(chain.child_modules("Variant").is_empty());
}

#[test]
fn ancestors_run_from_the_root_down() {
    let registry = registry();
    let chain = chain_of(&registry, &[&TARIFF_RECORD]);

    assert_eq!(
        names(&chain.ancestors("TariffRecord")),
        vec!["Product", "Classification"]
    );
    assert_eq!(chain.depth("TariffRecord"), 2);
    assert_eq!(chain.depth("Product"), 0);
    assert!(chain.descends_from("TariffRecord", "Product"));
    assert!(!chain.descends_from("Product", "TariffRecord"));
}

#[test]
fn default_chain_follows_registration_order() {
    let chain = registry()
        .default_chain("Product")
        .expect("default chain should build");

    assert_eq!(
        chain.iter().map(|m| m.name).collect::<Vec<_>>(),
        vec!["Product", "Classification", "TariffRecord", "Variant"]
    );
}

#[test]
fn default_chain_of_a_child_module_starts_at_that_module() {
    let chain = registry()
        .default_chain("Classification")
        .expect("default chain should build");

    assert_eq!(
        chain.iter().map(|m| m.name).collect::<Vec<_>>(),
        vec!["Classification", "TariffRecord"]
    );
    assert_eq!(chain.alias("Classification").as_deref(), Some("m0"));
    assert!(chain.ancestors("Classification").is_empty());
}

#[test]
fn native_write_then_read_is_identity() {
    let fx = Fixture::new();
    let created = NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(14, 5, 0))
        .expect("datetime should be valid");
    let cases = [
        ("prod_uid", Value::from("ABC-1")),
        ("prod_created", Value::DateTime(created)),
        ("prod_units", Value::Integer(-12)),
        ("prod_active", Value::Boolean(false)),
    ];

    let mut record = Record::new(&PRODUCT);
    for (uid, value) in &cases {
        let field = fx.catalog.resolve("Product", uid).expect("field should resolve");
        field.write(&mut record, value).expect("write should succeed");
    }
    let id = fx.records().save(&mut record).expect("save should succeed");
    let loaded = fx.records().require(&PRODUCT, id).expect("record should load");

    for (uid, value) in &cases {
        let field = fx.catalog.resolve("Product", uid).expect("field should resolve");
        assert_eq!(&field.read(&loaded).expect("read should succeed"), value, "{uid}");
    }
}

#[test]
fn decimal_write_truncates_to_declared_scale() {
    let fx = Fixture::new();
    let product = fx.product("P1");
    let class = fx.classification(product, "US");
    let rate = fx
        .catalog
        .resolve("TariffRecord", "hts_rate")
        .expect("field should resolve");

    let mut record = Record::new_child(&TARIFF_RECORD, class);
    rate.write(&mut record, &Value::from("0.123456"))
        .expect("write should succeed");
    let id = fx.records().save(&mut record).expect("save should succeed");
    let loaded = fx
        .records()
        .require(&TARIFF_RECORD, id)
        .expect("record should load");

    assert_eq!(
        rate.read(&loaded).expect("read should succeed"),
        Value::Decimal(Decimal::from_str("0.1234").expect("decimal should parse"))
    );
}

#[test]
fn write_reports_type_mismatch_with_field_and_value() {
    let fx = Fixture::new();
    let units = fx
        .catalog
        .resolve("Product", "prod_units")
        .expect("field should resolve");
    let mut record = Record::new(&PRODUCT);

    let err = units
        .write(&mut record, &Value::from("twelve"))
        .expect_err("text should not coerce to integer");

    assert_eq!(
        err,
        FieldError::TypeMismatch {
            field: "prod_units".to_string(),
            value: "twelve".to_string(),
            expected: DataType::Integer,
        }
    );
    assert!(!record.has_pending_writes());
}

#[test]
fn field_refuses_records_of_another_module() {
    let fx = Fixture::new();
    let hts = fx
        .catalog
        .resolve("TariffRecord", "hts_1")
        .expect("field should resolve");
    let record = Record::new(&PRODUCT);

    assert!(matches!(
        hts.read(&record),
        Err(FieldError::UnknownFieldId { .. })
    ));
}

#[test]
fn staged_custom_value_shadows_loaded_one() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Origin", DataType::String);
    let field = fx
        .catalog
        .resolve("Product", &format!("*cf_{}", def.id))
        .expect("field should resolve");
    let id = fx.insert(&PRODUCT, None, &[(field.uid.as_str(), Value::from("CN"))]);

    let mut record = fx.records().require(&PRODUCT, id).expect("record should load");
    field
        .write(&mut record, &Value::from("VN"))
        .expect("write should stage");

    assert_eq!(field.read(&record).expect("read should succeed"), Value::from("VN"));
    assert!(record.has_pending_writes());
}

#[test]
fn new_child_sets_the_foreign_key() {
    let record = Record::new_child(&CLASSIFICATION, 42);

    assert_eq!(record.parent_id(), Some(42));
    assert!(!record.is_persisted());
}

fn module_strategy() -> impl Strategy<Value = &'static ModuleDescriptor> {
    prop_oneof![
        Just(&PRODUCT),
        Just(&CLASSIFICATION),
        Just(&TARIFF_RECORD),
        Just(&VARIANT),
    ]
}

proptest! {
    #[test]
    fn repeated_add_is_a_no_op(
        adds in prop::collection::vec(module_strategy(), 1..8),
        again in module_strategy(),
    ) {
        let registry = registry();
        let mut chain = chain_of(&registry, &adds);
        chain.add(&registry, again).expect("add should succeed");
        let once = chain.clone();
        chain.add(&registry, again).expect("add should succeed");

        prop_assert_eq!(&chain, &once);
        for module in chain.iter() {
            prop_assert_eq!(
                names(&chain.child_modules(module.name)),
                names(&once.child_modules(module.name))
            );
        }
    }

    #[test]
    fn every_module_follows_its_parent(adds in prop::collection::vec(module_strategy(), 1..8)) {
        let registry = registry();
        let chain = chain_of(&registry, &adds);

        for (pos, module) in chain.iter().enumerate() {
            if let Some(parent) = module.parent_name() {
                let parent_pos = chain.position(parent).expect("parent should be in the chain");
                prop_assert!(parent_pos < pos);
            }
            let children = chain.child_modules(module.name);
            for (offset, child) in children.iter().enumerate() {
                prop_assert_eq!(chain.position(child.name), Some(pos + 1 + offset));
            }
        }
    }
}
