//! End-to-end tests for requests rejected before any substrate I/O.

use crate::e2e_tests::helpers::TestDb;
use crate::error::Error;
use crate::query::Op;
use crate::types::{Value, record};

fn seeded() -> TestDb {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada"), (2, 40, "bob")]);
    test
}

fn assert_no_io(test: &TestDb, cursors: u64, gets: u64) {
    assert_eq!(test.substrate_cursors(), cursors);
    assert_eq!(test.substrate_gets(), gets);
}

#[test]
fn test_unindexed_predicate() {
    let test = seeded();
    let (cursors, gets) = (test.substrate_cursors(), test.substrate_gets());

    let err = test
        .block_on(test.db.query("people").eq("name", "ada").all())
        .expect_err("name is not indexed");
    assert!(matches!(err, Error::UnindexedField { ref field, .. } if field == "name"));

    let err = test
        .block_on(test.db.remove("people").filter("name", Op::Gt, "a").exec())
        .expect_err("remove plans the same way");
    assert!(matches!(err, Error::UnindexedField { .. }));
    assert_no_io(&test, cursors, gets);
}

#[test]
fn test_conflicting_predicates() {
    let test = seeded();
    let (cursors, gets) = (test.substrate_cursors(), test.substrate_gets());
    let err = test
        .block_on(test.db.query("people").eq("age", 30).gt("age", 10).all())
        .expect_err("equality plus range on one field");
    assert!(matches!(err, Error::ConflictingPredicates { ref field, .. } if field == "age"));
    assert_no_io(&test, cursors, gets);
}

#[test]
fn test_unkeyable_predicate_value() {
    let test = seeded();
    for value in [Value::Null, Value::Boolean(true), Value::Number(f64::NAN)] {
        let err = test
            .block_on(test.db.query("people").eq("age", value).all())
            .expect_err("not a key");
        assert!(matches!(err, Error::InvalidKey { .. }));
    }
}

#[test]
fn test_unknown_store() {
    let test = seeded();
    let err = test
        .block_on(test.db.query("pets").all())
        .expect_err("pets is undeclared");
    assert!(matches!(err, Error::UnknownStore(ref store) if store == "pets"));
}

#[test]
fn test_patch_on_primary_key_rejected_before_writes() {
    let test = seeded();
    let (cursors, gets) = (test.substrate_cursors(), test.substrate_gets());
    let err = test
        .block_on(
            test.db
                .update("people", record([("id", Value::from(9))]))
                .exec(),
        )
        .expect_err("primary key in patch");
    assert!(matches!(err, Error::Schema(_)));
    assert_no_io(&test, cursors, gets);
}

#[test]
fn test_requests_after_close() {
    let test = seeded();
    test.db.close();
    assert!(!test.db.is_open());

    let err = test
        .block_on(test.db.query("people").all())
        .expect_err("closed");
    assert!(matches!(err, Error::NotOpen));
    let err = test
        .block_on(test.db.put("people", record([("id", Value::from(3))])))
        .expect_err("closed");
    assert!(matches!(err, Error::NotOpen));
}

#[test]
fn test_unique_index_violation_surfaces_from_substrate() {
    let test = seeded();
    let mut clash = record([("id", Value::from(3)), ("age", Value::from(1))]);
    clash.insert("email".to_owned(), Value::from("ada1@example.com"));
    let err = test
        .block_on(test.db.put("people", clash))
        .expect_err("email taken");
    assert!(matches!(
        err,
        Error::Substrate(crate::storage::SubstrateError::ConstraintViolation { .. })
    ));
}
