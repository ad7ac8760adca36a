//! End-to-end tests for ordering by secondary indexes and for intersecting
//! several predicate scans.

use crate::e2e_tests::helpers::{TestDb, ints, ok};
use crate::error::Error;

fn seeded() -> TestDb {
    let test = TestDb::new();
    test.put_people(&[
        (1, 30, "ada"),
        (2, 20, "bob"),
        (3, 30, "cy"),
        (4, 45, "dee"),
        (5, 20, "eve"),
    ]);
    test
}

#[test]
fn test_order_by_index_ascending_and_descending() {
    let test = seeded();
    let asc = ok(test.block_on(test.db.query("people").asc("age").all()));
    assert_eq!(ints(&asc, "id"), vec![2, 5, 1, 3, 4]);

    let desc = ok(test.block_on(test.db.query("people").desc("age").all()));
    assert_eq!(ints(&desc, "id"), vec![4, 3, 1, 5, 2]);
}

/// Primary-key predicates filter an index-ordered walk.
#[test]
fn test_primary_predicate_filters_index_walk() {
    let test = seeded();
    let records = ok(test.block_on(
        test.db
            .query("people")
            .gte("id", 3)
            .desc("age")
            .all(),
    ));
    assert_eq!(ints(&records, "id"), vec![4, 3, 5]);
}

/// Index predicates filter a primary-key-ordered walk.
#[test]
fn test_index_predicates_intersect() {
    let test = seeded();
    let records = ok(test.block_on(
        test.db
            .query("people")
            .eq("age", 30)
            .gt("id", 1)
            .all(),
    ));
    assert_eq!(ints(&records, "id"), vec![3]);

    let records = ok(test.block_on(
        test.db
            .query("people")
            .gte("age", 20)
            .lt("age", 40)
            .eq("email", "eve5@example.com")
            .all(),
    ));
    assert_eq!(ints(&records, "id"), vec![5]);
}

/// An empty auxiliary scan ends the request before the ordering walk.
#[test]
fn test_disjoint_predicates_return_nothing() {
    let test = seeded();
    let records = ok(test.block_on(
        test.db
            .query("people")
            .eq("age", 45)
            .eq("email", "ada1@example.com")
            .all(),
    ));
    assert!(records.is_empty());
}

#[test]
fn test_order_by_unindexed_field_rejected() {
    let test = seeded();
    let err = test
        .block_on(test.db.query("people").asc("name").all())
        .expect_err("name is payload");
    assert!(matches!(err, Error::OrderField { ref field, .. } if field == "name"));
}

#[test]
fn test_order_by_inner_composite_component_rejected() {
    let test = TestDb::new();
    test.put_events(&[(1, 1, "a")]);
    let err = test
        .block_on(test.db.query("events").desc("seq").all())
        .expect_err("seq is not the leading component");
    assert!(matches!(err, Error::OrderField { ref field, .. } if field == "seq"));
}
