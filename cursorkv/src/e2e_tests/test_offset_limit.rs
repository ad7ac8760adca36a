//! End-to-end tests for ordering with offset and limit.

use crate::e2e_tests::helpers::{TestDb, id, ints, ok};

fn seeded() -> TestDb {
    let test = TestDb::new();
    test.put_people(&[
        (1, 40, "ada"),
        (2, 25, "bob"),
        (3, 31, "cy"),
        (4, 25, "dee"),
        (5, 19, "eve"),
        (6, 52, "fay"),
    ]);
    test
}

#[test]
fn test_offset_then_limit() {
    let test = seeded();
    let records = ok(test.block_on(test.db.query("people").offset(2).limit(3).all()));
    assert_eq!(ints(&records, "id"), vec![3, 4, 5]);
}

#[test]
fn test_offset_applies_after_filters() {
    let test = seeded();
    let records = ok(test.block_on(
        test.db
            .query("people")
            .gte("age", 25)
            .asc("age")
            .offset(1)
            .limit(2)
            .all(),
    ));
    // Ages 25, 25, 31, 40, 52 in index order; ties by primary key.
    assert_eq!(ints(&records, "id"), vec![4, 3]);
}

#[test]
fn test_descending_limit() {
    let test = seeded();
    let keys = ok(test.block_on(test.db.query("people").desc("id").limit(2).keys()));
    assert_eq!(keys, vec![id(6), id(5)]);
}

#[test]
fn test_limit_zero_opens_no_cursor() {
    let test = seeded();
    let cursors = test.substrate_cursors();
    let records = ok(test.block_on(test.db.query("people").limit(0).all()));
    assert!(records.is_empty());
    assert_eq!(test.substrate_cursors(), cursors);
}

#[test]
fn test_offset_past_end_is_empty() {
    let test = seeded();
    let records = ok(test.block_on(test.db.query("people").offset(6).all()));
    assert!(records.is_empty());
}

#[test]
fn test_one_and_count() {
    let test = seeded();
    let oldest = ok(test.block_on(test.db.query("people").desc("age").one()));
    assert_eq!(oldest.map(|r| ints(&[r], "id")), Some(vec![6]));

    let nobody = ok(test.block_on(test.db.query("people").gt("age", 99).one()));
    assert!(nobody.is_none());

    let count = ok(test.block_on(test.db.query("people").eq("age", 25).count()));
    assert_eq!(count, 2);
}

/// Counting and key listing skip hydration entirely.
#[test]
fn test_keys_do_not_hydrate() {
    let test = TestDb::with_capacity(1);
    test.put_people(&[(1, 30, "a"), (2, 31, "b"), (3, 32, "c")]);
    let gets = test.substrate_gets();

    let keys = ok(test.block_on(test.db.query("people").gte("age", 31).keys()));
    assert_eq!(keys, vec![id(2), id(3)]);
    let count = ok(test.block_on(test.db.query("people").count()));
    assert_eq!(count, 3);
    assert_eq!(test.substrate_gets(), gets);
}

/// Twenty matches paged five at a time; the last page is cut short.
fn twenty_adults() -> TestDb {
    let test = TestDb::new();
    let rows: Vec<(i32, i32, &str)> = (1..=20).map(|n| (n, 20 + n, "p")).collect();
    test.put_people(&rows);
    test.put_people(&[(21, 5, "kid"), (22, 6, "kid")]);
    test
}

#[test]
fn test_middle_page() {
    let test = twenty_adults();
    let records = ok(test.block_on(
        test.db
            .query("people")
            .gte("age", 18)
            .asc("age")
            .offset(5)
            .limit(5)
            .all(),
    ));
    assert_eq!(ints(&records, "id"), vec![6, 7, 8, 9, 10]);
}

#[test]
fn test_truncated_tail_page() {
    let test = twenty_adults();
    let records = ok(test.block_on(
        test.db
            .query("people")
            .gte("age", 18)
            .asc("age")
            .offset(18)
            .limit(5)
            .all(),
    ));
    assert_eq!(ints(&records, "id"), vec![19, 20]);

    let keys = ok(test.block_on(test.db.query("people").gte("age", 18).offset(18).limit(5).keys()));
    assert_eq!(keys, vec![id(19), id(20)]);
}
