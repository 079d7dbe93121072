use super::*;
use crate::{
    error::ErrorClass,
    query::SortCriterion,
    test_support::{Fixture, NATIVE_FIELDS},
    value::DataType,
};

fn session(fx: &Fixture, config: &str) -> Session {
    let config = EngineConfig::from_toml_str(config).expect("config should parse");

    Session::new(Arc::clone(&fx.db), Arc::clone(&fx.modules), NATIVE_FIELDS, config)
        .expect("session should build")
}

fn by_uid(id: i64) -> SearchSetup {
    SearchSetup::new(id, "Product").with_sort(SortCriterion::asc("prod_uid", 0))
}

#[test]
fn viewing_and_editing_are_checked_separately() {
    let fx = Fixture::new();
    let session = session(&fx, "");

    let err = session
        .search(AccessDecision::NONE, 1, &by_uid(1))
        .err()
        .expect("search without view should fail");
    assert_eq!(err.class(), ErrorClass::Unauthorized);

    let err = session
        .import_csv(AccessDecision::VIEW, "Product", "prod_uid\nX\n".as_bytes(), None, None)
        .expect_err("import without edit should fail");
    assert!(matches!(
        err,
        Error::Unauthorized {
            action: "import",
            permission: "edit"
        }
    ));

    let err = session
        .create_definition(
            AccessDecision::VIEW,
            &NewCustomDefinition::new("Product", "Origin", DataType::String),
        )
        .expect_err("definition change without edit should fail");
    assert_eq!(err.class(), ErrorClass::Unauthorized);
}

#[test]
fn search_positions_the_cursor_and_exports_with_the_configured_delimiter() {
    let fx = Fixture::new();
    let b = fx.product("B");
    let a = fx.product("A");
    fx.classification(a, "US");
    fx.classification(a, "CA");
    let session = session(&fx, "[export]\ndelimiter = \";\"\n");

    let cursor = session
        .search(AccessDecision::VIEW, 7, &by_uid(1))
        .expect("search should run");
    assert_eq!(cursor.total_count().expect("count should read"), 2);
    assert_eq!(cursor.current().expect("current should read"), Some(a));
    assert_eq!(cursor.move_next().expect("move should succeed"), Some(b));

    let plan = session
        .export_plan("Product", &["prod_uid", "class_country"])
        .expect("plan should resolve");
    let mut out = Vec::new();
    let written = session
        .export_csv(AccessDecision::VIEW, &plan, &cursor, &mut out, None)
        .expect("export should succeed");

    assert_eq!(written, 3);
    assert_eq!(
        String::from_utf8(out).expect("csv should be utf-8"),
        "Unique Identifier;Country\nA;US\nA;CA\nB;\n"
    );
    assert_eq!(cursor.position(), 1);
}

#[test]
fn searching_again_sees_new_rows_and_starts_over() {
    let fx = Fixture::new();
    let a = fx.product("A");
    let session = session(&fx, "");

    let cursor = session
        .search(AccessDecision::VIEW, 3, &by_uid(1))
        .expect("search should run");
    assert_eq!(cursor.total_count().expect("count should read"), 1);
    drop(cursor);

    let b = fx.product("B");
    let cursor = session
        .search(AccessDecision::VIEW, 3, &by_uid(1))
        .expect("search should run again");
    assert_eq!(cursor.total_count().expect("count should read"), 2);
    assert_eq!(cursor.current().expect("current should read"), Some(a));
    assert_eq!(cursor.move_next().expect("move should succeed"), Some(b));

    let again = session
        .search(AccessDecision::VIEW, 3, &by_uid(1))
        .expect("search should run a third time");
    assert_eq!(again.position(), 0);
    assert_eq!(cursor.position(), 0);
}

#[test]
fn definition_changes_are_visible_immediately() {
    let fx = Fixture::new();
    let session = session(&fx, "");

    let def = session
        .create_definition(
            AccessDecision::EDIT,
            &NewCustomDefinition::new("Product", "Origin", DataType::String),
        )
        .expect("definition should be created");
    let uid = session.catalog().custom_uid(def.id);

    let field = session
        .catalog()
        .resolve("Product", &uid)
        .expect("new field should resolve");
    assert_eq!(session.catalog().label(&field), "Origin");

    session
        .rename_definition(AccessDecision::EDIT, def.id, "Country of Origin")
        .expect("rename should succeed");
    let field = session
        .catalog()
        .resolve("Product", &uid)
        .expect("renamed field should resolve");
    assert_eq!(session.catalog().label(&field), "Country of Origin");

    let last = session
        .fields("Product")
        .expect("fields should list")
        .last()
        .map(|f| f.uid.clone());
    assert_eq!(last, Some(uid.clone()));

    session
        .delete_definition(AccessDecision::EDIT, def.id)
        .expect("unused definition should delete");
    assert!(session.catalog().resolve("Product", &uid).is_err());
}

#[test]
fn definitions_in_use_cannot_be_deleted() {
    let fx = Fixture::new();
    let session = session(&fx, "");
    let def = session
        .create_definition(
            AccessDecision::EDIT,
            &NewCustomDefinition::new("Product", "Origin", DataType::String),
        )
        .expect("definition should be created");
    let uid = session.catalog().custom_uid(def.id);

    session
        .import_csv(
            AccessDecision::EDIT,
            "Product",
            format!("prod_uid,{uid}\nP-1,CN\n").as_bytes(),
            None,
            None,
        )
        .expect("import should succeed");

    let err = session
        .delete_definition(AccessDecision::EDIT, def.id)
        .expect_err("referenced definition should stay");
    assert_eq!(err.class(), ErrorClass::Conflict);

    let err = session
        .create_definition(
            AccessDecision::EDIT,
            &NewCustomDefinition::new("Nowhere", "Ghost", DataType::String),
        )
        .expect_err("unknown module should be refused");
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[test]
fn cancelled_export_leaves_the_cursor_alone() {
    let fx = Fixture::new();
    fx.product("A");
    fx.product("B");
    let session = session(&fx, "");
    let cursor = session
        .search(AccessDecision::VIEW, 1, &by_uid(2))
        .expect("search should run");
    cursor.move_next().expect("move should succeed");

    let plan = session
        .export_plan("Product", &["prod_uid"])
        .expect("plan should resolve");
    let token = CancelToken::new();
    token.cancel();

    let err = session
        .materialize_cursor(AccessDecision::VIEW, &plan, &cursor, Some(&token))
        .expect_err("cancelled export should fail");

    assert!(err.is_cancelled());
    assert_eq!(cursor.position(), 1);
}

#[test]
fn validation_runs_through_the_session() {
    let fx = Fixture::new();
    let p = fx.product("P-1");
    let session = session(&fx, "");

    let violations = session
        .validate(
            AccessDecision::VIEW,
            "Product",
            p,
            &[ValidationRule::required("prod_name")],
            None,
        )
        .expect("validation should run");

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].message, "Name is required.");
}

#[test]
fn batch_cursors_follow_the_given_order() {
    let fx = Fixture::new();
    let a = fx.product("A");
    let b = fx.product("B");
    let session = session(&fx, "");

    let cursor = session
        .open_batch(AccessDecision::VIEW, 1, 5, "Product", &[b, a])
        .expect("batch should open");
    assert_eq!(cursor.ids().expect("ids should read"), vec![b, a]);

    drop(cursor);
    let reopened = session
        .cursor(AccessDecision::VIEW, 1, CursorTarget::Batch(5), "Product")
        .expect("cursor should reopen");
    assert_eq!(reopened.current().expect("current should read"), Some(b));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let fx = Fixture::new();
    let mut config = EngineConfig::default();
    config.cursor.page_size = 0;

    let err = Session::new(Arc::clone(&fx.db), Arc::clone(&fx.modules), NATIVE_FIELDS, config)
        .err()
        .expect("zero page size should be refused");

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.class(), ErrorClass::InvalidInput);
}
