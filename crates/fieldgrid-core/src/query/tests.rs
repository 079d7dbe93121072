use super::*;
use crate::{
    model::FieldError,
    query::{
        compile::escape_like,
        operator::{OperatorError, OperatorKind},
        plan::SqlParam,
    },
    store::custom::CustomValueStore,
    test_support::{CLASSIFICATION, Fixture, PRODUCT},
    value::{DataType, TypeFamily, Value},
};

fn run(fx: &Fixture, setup: &SearchSetup) -> Vec<i64> {
    run_with(fx, &OperatorTable::builtin(), setup)
}

fn run_with(fx: &Fixture, operators: &OperatorTable, setup: &SearchSetup) -> Vec<i64> {
    QueryCompiler::new(&fx.catalog, operators, "\n")
        .compile(setup)
        .expect("search should compile")
        .ids(&fx.db)
        .expect("search should execute")
}

fn compile_err(fx: &Fixture, setup: &SearchSetup) -> CompileError {
    QueryCompiler::new(&fx.catalog, &OperatorTable::builtin(), "\n")
        .compile(setup)
        .expect_err("search should not compile")
}

fn products() -> SearchSetup {
    SearchSetup::new(1, "Product")
}

#[test]
fn custom_equals_excludes_entities_without_a_value() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Reviewed", DataType::Date);
    let uid = format!("*cf_{}", def.id);
    let with = fx.insert(&PRODUCT, None, &[(uid.as_str(), Value::from("2020-01-01"))]);
    let without = fx.product("P2");

    assert_eq!(run(&fx, &products().with_criterion(&uid, "eq", "2020-01-01")), vec![with]);
    assert_eq!(run(&fx, &products().with_criterion(&uid, "null", "")), vec![without]);
    assert_eq!(run(&fx, &products().with_criterion(&uid, "notnull", "")), vec![with]);
    assert_eq!(
        run(&fx, &products().with_criterion(&uid, "nq", "2020-01-01")),
        vec![without]
    );
}

#[test]
fn negated_native_operators_include_nulls() {
    let fx = Fixture::new();
    let named = fx.insert(&PRODUCT, None, &[("prod_name", Value::from("Widget"))]);
    let unnamed = fx.product("P2");

    assert_eq!(
        run(&fx, &products().with_criterion("prod_name", "nq", "Widget")),
        vec![unnamed]
    );
    assert_eq!(
        run(&fx, &products().with_criterion("prod_name", "nc", "idg")),
        vec![unnamed]
    );
    assert_eq!(
        run(&fx, &products().with_criterion("prod_name", "co", "idg")),
        vec![named]
    );
}

#[test]
fn empty_text_counts_as_blank() {
    let fx = Fixture::new();
    let empty = fx.insert(&PRODUCT, None, &[("prod_name", Value::from(""))]);
    let missing = fx.product("P2");
    let named = fx.insert(&PRODUCT, None, &[("prod_name", Value::from("Widget"))]);

    assert_eq!(
        run(&fx, &products().with_criterion("prod_name", "null", "")),
        vec![empty, missing]
    );
    assert_eq!(
        run(&fx, &products().with_criterion("prod_name", "notnull", "")),
        vec![named]
    );
}

#[test]
fn text_operators_on_numbers_match_the_rendering() {
    let fx = Fixture::new();
    let hit = fx.insert(&PRODUCT, None, &[("prod_units", Value::Integer(1250))]);
    fx.insert(&PRODUCT, None, &[("prod_units", Value::Integer(9125))]);

    assert_eq!(run(&fx, &products().with_criterion("prod_units", "sw", "12")), vec![hit]);
    assert_eq!(run(&fx, &products().with_criterion("prod_units", "ew", "50")), vec![hit]);
}

#[test]
fn like_wildcards_in_literals_are_escaped() {
    let fx = Fixture::new();
    let literal = fx.insert(&PRODUCT, None, &[("prod_name", Value::from("50%_off"))]);
    fx.insert(&PRODUCT, None, &[("prod_name", Value::from("50 and off"))]);

    assert_eq!(
        run(&fx, &products().with_criterion("prod_name", "co", "%_")),
        vec![literal]
    );
    assert_eq!(escape_like("a%b_c\\"), "a\\%b\\_c\\\\");
}

#[test]
fn child_criteria_join_once_and_return_each_root_once() {
    let fx = Fixture::new();
    let product = fx.product("P1");
    fx.insert(
        &CLASSIFICATION,
        Some(product),
        &[("class_effective", Value::from("2021-01-01"))],
    );
    fx.insert(
        &CLASSIFICATION,
        Some(product),
        &[("class_effective", Value::from("2022-01-01"))],
    );
    let old = fx.product("P2");
    fx.insert(
        &CLASSIFICATION,
        Some(old),
        &[("class_effective", Value::from("1999-01-01"))],
    );

    let setup = products().with_criterion("class_effective", "gt", "2020-06-30");
    let query = QueryCompiler::new(&fx.catalog, &OperatorTable::builtin(), "\n")
        .compile(&setup)
        .expect("search should compile");

    assert_eq!(query.sql.matches("LEFT JOIN").count(), 1);
    assert_eq!(query.ids(&fx.db).expect("search should execute"), vec![product]);
}

#[test]
fn grandchild_criteria_pull_in_the_intermediate_join() {
    let fx = Fixture::new();
    let product = fx.product("P1");
    let class = fx.classification(product, "US");
    fx.tariff(class, "8471.30");
    let other = fx.product("P2");

    let setup = products().with_criterion("hts_1", "sw", "8471");
    let query = QueryCompiler::new(&fx.catalog, &OperatorTable::builtin(), "\n")
        .compile(&setup)
        .expect("search should compile");

    assert!(query.sql.contains("LEFT JOIN \"classifications\" m1 ON m1.\"product_id\" = m0.id"));
    assert!(
        query
            .sql
            .contains("LEFT JOIN \"tariff_records\" m2 ON m2.\"classification_id\" = m1.id")
    );
    assert_eq!(query.ids(&fx.db).expect("search should execute"), vec![product]);
    assert_ne!(product, other);
}

#[test]
fn in_list_splits_on_the_separator_and_ignores_blanks() {
    let fx = Fixture::new();
    let a = fx.product("A");
    fx.product("B");
    let c = fx.product("C");

    assert_eq!(
        run(&fx, &products().with_criterion("prod_uid", "in", "A\n\n  \n")),
        vec![a]
    );
    assert_eq!(
        run(&fx, &products().with_criterion("prod_uid", "in", " C \nA")),
        vec![a, c]
    );
    assert_eq!(run(&fx, &products().with_criterion("prod_uid", "in", "\n")), Vec::<i64>::new());
}

#[test]
fn regexp_matches_through_the_registered_function() {
    let fx = Fixture::new();
    let hit = fx.product("AB-12");
    let miss = fx.product("ab12");

    assert_eq!(
        run(&fx, &products().with_criterion("prod_uid", "regexp", "^[A-Z]{2}-\\d+$")),
        vec![hit]
    );
    assert_eq!(
        run(&fx, &products().with_criterion("prod_uid", "notregexp", "^[A-Z]{2}-\\d+$")),
        vec![miss]
    );
}

#[test]
fn operator_applicability_is_checked() {
    let fx = Fixture::new();

    let err = compile_err(&fx, &products().with_criterion("prod_active", "regexp", "t"));
    assert_eq!(
        err,
        CompileError::UnsupportedOperator {
            field: "prod_active".to_string(),
            operator: "regexp".to_string(),
            data_type: DataType::Boolean,
        }
    );

    let err = compile_err(&fx, &products().with_criterion("prod_uid", "gt", "A"));
    assert!(matches!(err, CompileError::UnsupportedOperator { .. }));

    let non_text = [
        ("prod_units", DataType::Integer),
        ("prod_created", DataType::DateTime),
    ];
    for (field, data_type) in non_text {
        let err = compile_err(&fx, &products().with_criterion(field, "regexp", "^1"));
        assert_eq!(
            err,
            CompileError::UnsupportedOperator {
                field: field.to_string(),
                operator: "regexp".to_string(),
                data_type,
            }
        );
    }
}

#[test]
fn compile_errors_are_surfaced() {
    let fx = Fixture::new();

    assert_eq!(
        compile_err(&fx, &products().with_criterion("prod_uid", "between", "A")),
        CompileError::UnknownOperator {
            operator: "between".to_string()
        }
    );
    assert!(matches!(
        compile_err(&fx, &products().with_criterion("nope", "eq", "A")),
        CompileError::Field(FieldError::UnknownFieldId { .. })
    ));
    assert!(matches!(
        compile_err(&fx, &products().with_criterion("prod_units", "eq", "many")),
        CompileError::Field(FieldError::TypeMismatch { .. })
    ));
    assert!(matches!(
        compile_err(&fx, &products().with_criterion("prod_units", "gt", " ")),
        CompileError::MissingValue { .. }
    ));
    assert!(matches!(
        compile_err(&fx, &products().with_criterion("prod_uid", "regexp", "(")),
        CompileError::InvalidPattern { .. }
    ));
}

#[test]
fn sorts_apply_by_rank_with_id_tiebreak() {
    let fx = Fixture::new();
    let b1 = fx.insert(
        &PRODUCT,
        None,
        &[("prod_name", Value::from("B")), ("prod_units", Value::Integer(1))],
    );
    let a = fx.insert(
        &PRODUCT,
        None,
        &[("prod_name", Value::from("A")), ("prod_units", Value::Integer(5))],
    );
    let b2 = fx.insert(
        &PRODUCT,
        None,
        &[("prod_name", Value::from("B")), ("prod_units", Value::Integer(9))],
    );

    let setup = products()
        .with_sort(SortCriterion::desc("prod_units", 2))
        .with_sort(SortCriterion::asc("prod_name", 1));
    assert_eq!(run(&fx, &setup), vec![a, b2, b1]);

    let same = products()
        .with_sort(SortCriterion::asc("prod_name", 0))
        .with_sort(SortCriterion::asc("prod_uid", 1));
    assert_eq!(run(&fx, &same), vec![a, b1, b2]);
}

#[test]
fn custom_sort_keys_share_one_join() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Priority", DataType::Integer);
    let uid = format!("*cf_{}", def.id);
    let low = fx.insert(&PRODUCT, None, &[(uid.as_str(), Value::Integer(1))]);
    let high = fx.insert(&PRODUCT, None, &[(uid.as_str(), Value::Integer(7))]);

    let setup = products()
        .with_sort(SortCriterion::desc(&uid, 0))
        .with_sort(SortCriterion::asc(&uid, 1));
    let query = QueryCompiler::new(&fx.catalog, &OperatorTable::builtin(), "\n")
        .compile(&setup)
        .expect("search should compile");

    assert_eq!(query.sql.matches("LEFT JOIN custom_values").count(), 1);
    assert_eq!(query.ids(&fx.db).expect("search should execute"), vec![high, low]);
}

#[test]
fn sorting_by_a_child_field_does_not_duplicate_roots() {
    let fx = Fixture::new();
    let p1 = fx.product("P1");
    fx.classification(p1, "ZA");
    fx.classification(p1, "AU");
    let p2 = fx.product("P2");
    fx.classification(p2, "CN");

    let asc = products().with_sort(SortCriterion::asc("class_country", 0));
    let desc = products().with_sort(SortCriterion::desc("class_country", 0));

    // P1 sorts by "AU" ascending and by "ZA" descending.
    assert_eq!(run(&fx, &asc), vec![p1, p2]);
    assert_eq!(run(&fx, &desc), vec![p1, p2]);
}

#[test]
fn fingerprint_tracks_sql_and_bindings() {
    let fx = Fixture::new();
    let operators = OperatorTable::builtin();
    let compiler = QueryCompiler::new(&fx.catalog, &operators, "\n");
    let compile = |value: &str| {
        compiler
            .compile(&products().with_criterion("prod_uid", "eq", value))
            .expect("search should compile")
    };

    assert_eq!(compile("A").fingerprint, compile("A").fingerprint);
    assert_ne!(compile("A").fingerprint, compile("B").fingerprint);
    assert_eq!(compile("A").fingerprint.len(), 64);
}

#[test]
fn count_and_page_window_the_ids() {
    let fx = Fixture::new();
    let ids: Vec<i64> = (0..5).map(|i| fx.product(&format!("P{i}"))).collect();
    let query = QueryCompiler::new(&fx.catalog, &OperatorTable::builtin(), "\n")
        .compile(&products())
        .expect("search should compile");

    assert_eq!(query.count(&fx.db).expect("count should succeed"), 5);
    assert_eq!(
        query.page(&fx.db, 2, 2).expect("page should succeed"),
        ids[2..4].to_vec()
    );
    assert!(query.page(&fx.db, 5, 2).expect("page should succeed").is_empty());
}

#[test]
fn batch_query_keeps_the_batch_order() {
    let fx = Fixture::new();
    let a = fx.product("A");
    let b = fx.product("B");
    let c = fx.product("C");

    let query = CompiledQuery::for_batch(&PRODUCT, &[c, a, b]);
    assert_eq!(query.ids(&fx.db).expect("batch should execute"), vec![c, a, b]);

    let empty = CompiledQuery::for_batch(&PRODUCT, &[]);
    assert!(empty.ids(&fx.db).expect("batch should execute").is_empty());
}

#[test]
fn registered_template_operators_compile() {
    let fx = Fixture::new();
    let mut operators = OperatorTable::builtin();
    operators
        .register(OperatorSpec::template(
            "ieq",
            "Equals (any case)",
            "lower({column}) = lower(?)",
            &[TypeFamily::Textual],
        ))
        .expect("template should register");
    let upper = fx.product("LONGER");
    fx.product("SHORT");

    assert_eq!(
        run_with(&fx, &operators, &products().with_criterion("prod_uid", "ieq", "longer")),
        vec![upper]
    );
}

#[test]
fn operator_registration_is_validated() {
    let mut operators = OperatorTable::builtin();

    assert_eq!(
        operators.register(OperatorSpec::new("eq", "Again", OperatorKind::Equals, &[])),
        Err(OperatorError::Duplicate("eq".to_string()))
    );
    assert!(matches!(
        operators.register(OperatorSpec::template("bad", "Bad", "length(x) > ?", &[])),
        Err(OperatorError::BadTemplate { .. })
    ));
    assert!(
        operators
            .for_family(TypeFamily::Boolean)
            .all(|op| op.code != "regexp")
    );
}

#[test]
fn criteria_on_custom_child_fields_are_scoped_to_the_child() {
    let fx = Fixture::new();
    let def = fx.define("Classification", "Ruling", DataType::String);
    let product = fx.product("P1");
    let class = fx.classification(product, "US");
    CustomValueStore::new(&fx.db)
        .set(class, "Classification", def.id, &Value::from("NY N123"))
        .expect("set should succeed");
    // Same definition id stored against a Product must not match.
    let decoy = fx.product("P2");
    CustomValueStore::new(&fx.db)
        .set(decoy, "Product", def.id, &Value::from("NY N123"))
        .expect("set should succeed");

    let uid = format!("*cf_{}", def.id);
    assert_eq!(run(&fx, &products().with_criterion(&uid, "sw", "NY")), vec![product]);
}

#[test]
fn decimal_params_bind_as_text() {
    assert_eq!(
        SqlParam::from_value(&Value::Decimal(rust_decimal::Decimal::new(125, 1))),
        SqlParam::Text("12.5".to_string())
    );
    assert_eq!(SqlParam::from_value(&Value::Boolean(true)), SqlParam::Integer(1));
}

#[test]
fn custom_decimals_compare_and_sort_by_numeric_value() {
    let fx = Fixture::new();
    let def = fx.define("Product", "Weight", DataType::Decimal);
    let uid = format!("*cf_{}", def.id);
    let light = fx.insert(&PRODUCT, None, &[(uid.as_str(), Value::from("9.5"))]);
    let heavy = fx.insert(&PRODUCT, None, &[(uid.as_str(), Value::from("10.25"))]);

    // Stored as text, "10.25" < "9.5"; numerically it is the heavier one.
    assert_eq!(run(&fx, &products().with_criterion(&uid, "gt", "9.75")), vec![heavy]);
    assert_eq!(run(&fx, &products().with_criterion(&uid, "eq", "9.50")), vec![light]);
    assert_eq!(
        run(&fx, &products().with_sort(SortCriterion::asc(&uid, 0))),
        vec![light, heavy]
    );
    assert_eq!(
        run(&fx, &products().with_sort(SortCriterion::desc(&uid, 0))),
        vec![heavy, light]
    );
}
