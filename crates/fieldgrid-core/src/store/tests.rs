use super::*;
use crate::{
    model::record::Record,
    obs::{metrics_report, metrics_reset_all},
    store::{
        custom::{CustomValueStore, UpsertOutcome, column_values, insert_or_recover},
        definition::{DefinitionStore, NewCustomDefinition},
    },
    test_support::{CLASSIFICATION, Fixture, PRODUCT},
    value::{DataType, Value},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

fn value_rows(fx: &Fixture, definition_id: i64) -> u64 {
    CustomValueStore::new(&fx.db)
        .count_for_definition(definition_id)
        .expect("count should succeed")
}

#[test]
fn regexp_function_matches_and_ignores_null() {
    let fx = Fixture::new();
    let matches: Vec<bool> = fx
        .db
        .with_conn(|conn| {
            Ok(vec![
                conn.query_row("SELECT 'ABC-123' REGEXP '^[A-Z]+-\\d+$'", [], |r| r.get(0))?,
                conn.query_row("SELECT 'abc' REGEXP '^[0-9]+$'", [], |r| r.get(0))?,
                conn.query_row("SELECT COALESCE(NULL REGEXP 'a', 0)", [], |r| r.get(0))?,
                conn.query_row("SELECT 42 REGEXP '^4'", [], |r| r.get(0))?,
            ])
        })
        .expect("regexp queries should run");

    assert_eq!(matches, vec![true, false, false, true]);
}

#[test]
fn invalid_regexp_is_a_query_error() {
    let fx = Fixture::new();
    let result = fx.db.with_conn(|conn| {
        Ok(conn.query_row::<bool, _, _>("SELECT 'a' REGEXP '('", [], |r| r.get(0))?)
    });

    assert!(matches!(result, Err(StoreError::Sqlite(_))));
}

#[test]
fn quote_ident_escapes_quotes() {
    assert_eq!(quote_ident("name"), "\"name\"");
    assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
}

#[test]
fn definitions_list_by_rank_then_id() {
    let fx = Fixture::new();
    let store = DefinitionStore::new(&fx.db);
    let late = store
        .create(&NewCustomDefinition::new("Product", "Late", DataType::String).with_rank(5))
        .expect("create should succeed");
    let early = store
        .create(&NewCustomDefinition::new("Product", "Early", DataType::Date).with_rank(1))
        .expect("create should succeed");
    store
        .create(&NewCustomDefinition::new("Classification", "Other", DataType::Integer))
        .expect("create should succeed");

    let ids: Vec<i64> = store
        .list_for_module("Product")
        .expect("list should succeed")
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec![early.id, late.id]);

    store.update_rank(late.id, 0).expect("re-rank should succeed");
    store
        .update_label(late.id, "Renamed")
        .expect("rename should succeed");

    let first = &store.list_for_module("Product").expect("list should succeed")[0];
    assert_eq!(first.id, late.id);
    assert_eq!(first.label, "Renamed");
    assert_eq!(first.data_type, DataType::String);
}

#[test]
fn updating_a_missing_definition_is_not_found() {
    let fx = Fixture::new();
    let err = DefinitionStore::new(&fx.db)
        .update_label(99, "x")
        .expect_err("missing definition should fail");

    assert!(matches!(err, StoreError::DefinitionNotFound { id: 99 }));
}

#[test]
fn delete_is_refused_while_values_exist() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Origin", DataType::String);
    let product = fx.product("P1");
    CustomValueStore::new(&fx.db)
        .set(product, "Product", def.id, &Value::from("CN"))
        .expect("set should succeed");

    let err = DefinitionStore::new(&fx.db)
        .delete(def.id)
        .expect_err("delete should be refused");
    assert!(matches!(err, StoreError::DefinitionInUse { values: 1, .. }));

    CustomValueStore::new(&fx.db)
        .set(product, "Product", def.id, &Value::Null)
        .expect("clear should succeed");
    DefinitionStore::new(&fx.db)
        .delete(def.id)
        .expect("delete should succeed once unused");
    assert!(
        DefinitionStore::new(&fx.db)
            .get(def.id)
            .expect("get should succeed")
            .is_none()
    );
}

#[test]
fn second_write_replaces_the_first() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Reviewed", DataType::Date);
    let product = fx.product("P1");
    let store = CustomValueStore::new(&fx.db);

    let first = store
        .set(product, "Product", def.id, &Value::from("2020-01-01"))
        .expect("first write should succeed");
    let second = store
        .set(product, "Product", def.id, &Value::from("2021-06-30"))
        .expect("second write should succeed");

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Updated);
    assert_eq!(value_rows(&fx, def.id), 1);
    assert_eq!(
        store
            .get(product, "Product", def.id)
            .expect("get should succeed"),
        Some(Value::Date(
            NaiveDate::from_ymd_opt(2021, 6, 30).expect("date should be valid")
        ))
    );
}

#[test]
fn constraint_violation_on_insert_becomes_update() {
    metrics_reset_all();
    let fx = Fixture::new();
    let def = fx.define("Product", "Units", DataType::Integer);
    let product = fx.product("P1");
    let store = CustomValueStore::new(&fx.db);
    store
        .set(product, "Product", def.id, &Value::Integer(1))
        .expect("write should succeed");

    let outcome = fx
        .db
        .with_conn(|conn| {
            insert_or_recover(
                conn,
                product,
                "Product",
                def.id,
                &column_values(DataType::Integer, &Value::Integer(2)),
            )
        })
        .expect("racing insert should recover");

    assert_eq!(outcome, UpsertOutcome::Recovered);
    assert_eq!(value_rows(&fx, def.id), 1);
    assert_eq!(
        store
            .get(product, "Product", def.id)
            .expect("get should succeed"),
        Some(Value::Integer(2))
    );
    assert_eq!(metrics_report().ops.upserts_recovered, 1);
}

#[test]
fn custom_write_coerces_to_the_definition_type() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Weight", DataType::Decimal);
    let product = fx.product("P1");
    let store = CustomValueStore::new(&fx.db);

    store
        .set(product, "Product", def.id, &Value::from("1,250.75"))
        .expect("decimal text should coerce");
    assert_eq!(
        store
            .get(product, "Product", def.id)
            .expect("get should succeed"),
        Some(Value::Decimal(
            Decimal::from_str("1250.75").expect("decimal should parse")
        ))
    );

    let err = store
        .set(product, "Product", def.id, &Value::from("heavy"))
        .expect_err("non-numeric text should be rejected");
    assert!(matches!(
        err,
        StoreError::TypeMismatch {
            definition_id,
            ref value,
            expected: DataType::Decimal,
        } if definition_id == def.id && value == "heavy"
    ));
    assert_eq!(
        crate::error::Error::from(err).class(),
        crate::error::ErrorClass::InvalidInput
    );
}

#[test]
fn high_precision_decimals_round_trip_exactly() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Weight", DataType::Decimal);
    let product = fx.product("P1");
    let store = CustomValueStore::new(&fx.db);
    let precise = Decimal::from_str("1234567890.123456789").expect("decimal should parse");

    store
        .set(product, "Product", def.id, &Value::Decimal(precise))
        .expect("set should succeed");
    assert_eq!(
        store
            .get(product, "Product", def.id)
            .expect("get should succeed"),
        Some(Value::Decimal(precise))
    );

    let second = Decimal::from_str("-0.000000000000000001").expect("decimal should parse");
    store
        .set(product, "Product", def.id, &Value::Decimal(second))
        .expect("second set should succeed");
    assert_eq!(value_rows(&fx, def.id), 1);
    assert_eq!(
        store
            .get(product, "Product", def.id)
            .expect("get should succeed"),
        Some(Value::Decimal(second))
    );
}

#[test]
fn values_are_scoped_by_entity_type() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Flag", DataType::Boolean);
    let store = CustomValueStore::new(&fx.db);
    store
        .set(7, "Product", def.id, &Value::Boolean(true))
        .expect("set should succeed");

    assert_eq!(
        store.get(7, "Classification", def.id).expect("get should succeed"),
        None
    );
    assert_eq!(
        store.load_all(7, "Product").expect("load should succeed")[&def.id],
        Value::Boolean(true)
    );
}

#[test]
fn save_defers_custom_values_until_the_owner_exists() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Origin", DataType::String);
    let field = fx
        .catalog
        .resolve("Product", &format!("*cf_{}", def.id))
        .expect("custom field should resolve");

    let mut record = Record::new(&PRODUCT);
    field
        .write(&mut record, &Value::from("VN"))
        .expect("write should stage");
    assert_eq!(value_rows(&fx, def.id), 0);

    let id = fx.records().save(&mut record).expect("save should succeed");

    assert_eq!(record.id(), Some(id));
    assert!(!record.has_pending_writes());
    let loaded = fx
        .records()
        .require(&PRODUCT, id)
        .expect("record should load");
    assert_eq!(
        field.read(&loaded).expect("read should succeed"),
        Value::from("VN")
    );
}

#[test]
fn load_many_preserves_order_and_skips_missing() {
    let fx = Fixture::new();
    let a = fx.product("A");
    let b = fx.product("B");
    let c = fx.product("C");

    let ids: Vec<i64> = fx
        .records()
        .load_many(&PRODUCT, &[c, 999, a, b])
        .expect("load should succeed")
        .iter()
        .filter_map(Record::id)
        .collect();

    assert_eq!(ids, vec![c, a, b]);
}

#[test]
fn children_are_ordered_by_id() {
    let fx = Fixture::new();
    let product = fx.product("P1");
    let other = fx.product("P2");
    let first = fx.classification(product, "US");
    fx.classification(other, "CA");
    let second = fx.classification(product, "MX");

    let children: Vec<i64> = fx
        .records()
        .children(&CLASSIFICATION, product)
        .expect("children should load")
        .iter()
        .filter_map(Record::id)
        .collect();

    assert_eq!(children, vec![first, second]);
}

#[test]
fn update_only_touches_dirty_columns() {
    let fx = Fixture::new();
    let id = fx.insert(
        &PRODUCT,
        None,
        &[("prod_uid", Value::from("P1")), ("prod_name", Value::from("Widget"))],
    );

    let mut record = fx.records().require(&PRODUCT, id).expect("record should load");
    let name = fx
        .catalog
        .resolve("Product", "prod_name")
        .expect("field should resolve");
    name.write(&mut record, &Value::from("Gadget"))
        .expect("write should stage");
    fx.records().save(&mut record).expect("save should succeed");

    let reloaded = fx.records().require(&PRODUCT, id).expect("record should load");
    let uid = fx
        .catalog
        .resolve("Product", "prod_uid")
        .expect("field should resolve");
    assert_eq!(uid.read(&reloaded).expect("read should succeed"), Value::from("P1"));
    assert_eq!(
        name.read(&reloaded).expect("read should succeed"),
        Value::from("Gadget")
    );
}

#[test]
fn delete_removes_row_and_custom_values() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Origin", DataType::String);
    let product = fx.product("P1");
    CustomValueStore::new(&fx.db)
        .set(product, "Product", def.id, &Value::from("CN"))
        .expect("set should succeed");

    assert!(fx.records().delete(&PRODUCT, product).expect("delete should succeed"));
    let exists = fx
        .records()
        .exists(&PRODUCT, product)
        .expect("existence check should succeed");
    assert!(!exists);
    assert_eq!(value_rows(&fx, def.id), 0);
}
