//! End-to-end tests for update and remove requests.

use crate::e2e_tests::helpers::{TestDb, day_key, day_seq, id, ints, ok};
use crate::types::{Value, record};

fn seeded() -> TestDb {
    let test = TestDb::new();
    test.put_people(&[
        (1, 30, "ada"),
        (2, 20, "bob"),
        (3, 35, "cy"),
        (4, 50, "dee"),
    ]);
    test
}

#[test]
fn test_update_patches_matches_only() {
    let test = seeded();
    let patch = record([("name", Value::from("senior")), ("bio", Value::from("x"))]);
    let updated = ok(test.block_on(test.db.update("people", patch).gte("age", 35).exec()));
    assert_eq!(updated, 2);

    let records = ok(test.block_on(test.db.query("people").all()));
    let names: Vec<Option<&str>> = records
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(
        names,
        vec![Some("ada"), Some("bob"), Some("senior"), Some("senior")]
    );
    assert!(records[2].contains_key("bio"));
    assert!(!records[0].contains_key("bio"));
}

/// Three of ten rows change; an unfiltered read sees exactly those three
/// patched and the other seven untouched.
#[test]
fn test_update_three_of_ten() {
    let test = TestDb::new();
    let rows: Vec<(i32, i32, &str)> = (1..=10).map(|n| (n, 20 + n, "p")).collect();
    test.put_people(&rows);

    let updated = ok(test.block_on(
        test.db
            .update("people", record([("name", Value::from("patched"))]))
            .gt("age", 27)
            .exec(),
    ));
    assert_eq!(updated, 3);

    let records = ok(test.block_on(test.db.query("people").all()));
    assert_eq!(records.len(), 10);
    let patched: Vec<i32> = records
        .iter()
        .filter(|r| r.get("name").and_then(Value::as_str) == Some("patched"))
        .flat_map(|r| ints(std::slice::from_ref(r), "id"))
        .collect();
    assert_eq!(patched, vec![8, 9, 10]);
}

/// Patching an indexed field moves the row in index order.
#[test]
fn test_update_indexed_field_reorders() {
    let test = seeded();
    let updated = ok(test.block_on(
        test.db
            .update("people", record([("age", Value::from(10))]))
            .eq("id", 4)
            .exec(),
    ));
    assert_eq!(updated, 1);

    let youngest = ok(test.block_on(test.db.query("people").asc("age").one()));
    assert_eq!(youngest.map(|r| ints(&[r], "id")), Some(vec![4]));
    let count = ok(test.block_on(test.db.query("people").eq("age", 50).count()));
    assert_eq!(count, 0);
}

/// Offset and limit select which matches an update touches.
#[test]
fn test_update_respects_pagination() {
    let test = seeded();
    let updated = ok(test.block_on(
        test.db
            .update("people", record([("name", Value::from("z"))]))
            .desc("age")
            .offset(1)
            .limit(2)
            .exec(),
    ));
    assert_eq!(updated, 2);
    let renamed = ok(test.block_on(test.db.get_many("people", &[id(1), id(3)])));
    assert!(
        renamed
            .iter()
            .all(|r| r.get("name") == Some(&Value::from("z")))
    );
}

#[test]
fn test_update_without_matches_writes_nothing() {
    let test = seeded();
    let puts = test.db.substrate().put_count();
    let updated = ok(test.block_on(
        test.db
            .update("people", record([("name", Value::from("x"))]))
            .gt("age", 90)
            .exec(),
    ));
    assert_eq!(updated, 0);
    assert_eq!(test.db.substrate().put_count(), puts);
}

#[test]
fn test_remove_returns_keys_in_order() {
    let test = seeded();
    let removed = ok(test.block_on(test.db.remove("people").lt("age", 35).desc("age").exec()));
    assert_eq!(removed, vec![id(1), id(2)]);

    let left = ok(test.block_on(test.db.query("people").keys()));
    assert_eq!(left, vec![id(3), id(4)]);
    assert_eq!(test.db.substrate().row_count("people"), Some(2));
}

#[test]
fn test_remove_by_composite_prefix() {
    let test = TestDb::new();
    test.put_events(&[(1, 1, "a"), (2, 1, "b"), (2, 2, "c"), (3, 1, "d")]);

    let removed = ok(test.block_on(test.db.remove("events").eq("day", 2).exec()));
    assert_eq!(removed, vec![day_key(2, 1), day_key(2, 2)]);

    let left = ok(test.block_on(test.db.query("events").all()));
    assert_eq!(day_seq(&left), vec![(1, 1), (3, 1)]);
}

#[test]
fn test_remove_everything_then_reinsert() {
    let test = seeded();
    let removed = ok(test.block_on(test.db.remove("people").exec()));
    assert_eq!(removed.len(), 4);
    assert_eq!(ok(test.block_on(test.db.query("people").count())), 0);

    test.put_people(&[(1, 30, "ada")]);
    let again = ok(test.block_on(test.db.get("people", &id(1))));
    assert!(again.is_some());
}
