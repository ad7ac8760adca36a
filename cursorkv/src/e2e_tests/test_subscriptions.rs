//! End-to-end tests for change events emitted by writes.

use crate::e2e_tests::helpers::{TestDb, id, ok};
use crate::subscription::{ChangeAction, ChangePayload};
use crate::testing::person;
use crate::types::{Value, record};

#[test]
fn test_put_emits_add_with_record() {
    let test = TestDb::new();
    let (events, _sub) = test.record_events("people-add");
    test.put_people(&[(1, 30, "ada")]);

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name(), "people-add");
    assert_eq!(events[0].action, ChangeAction::Add);
    assert_eq!(events[0].payload, ChangePayload::Records(vec![person(1, 30, "ada")]));
}

#[test]
fn test_put_all_emits_one_event() {
    let test = TestDb::new();
    let (events, _sub) = test.record_events("people-add");
    let keys = ok(test.block_on(test.db.put_all(
        "people",
        vec![person(1, 30, "ada"), person(2, 31, "bob")],
    )));
    assert_eq!(keys, vec![id(1), id(2)]);

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0].payload, ChangePayload::Records(r) if r.len() == 2));
}

/// A batch stopped by a failing row still reports the rows written before it.
#[test]
fn test_put_all_partial_failure_emits_written_rows() {
    let test = TestDb::new();
    let (events, _sub) = test.record_events("people-add");
    let mut duplicate_email = person(3, 33, "cy");
    duplicate_email.insert("email".to_owned(), Value::from("ada1@example.com"));

    let result = test.block_on(test.db.put_all(
        "people",
        vec![person(1, 30, "ada"), duplicate_email, person(4, 34, "dee")],
    ));
    assert!(result.is_err());
    assert_eq!(test.db.substrate().row_count("people"), Some(1));

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, ChangePayload::Records(vec![person(1, 30, "ada")]));
}

#[test]
fn test_update_emits_patch() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada"), (2, 40, "bob")]);
    let (events, _sub) = test.record_events("people-update");

    let patch = record([("name", Value::from("x"))]);
    ok(test.block_on(test.db.update("people", patch.clone()).gt("age", 35).exec()));
    // No match, no event.
    ok(test.block_on(test.db.update("people", patch.clone()).gt("age", 99).exec()));

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, ChangePayload::Patch(patch));
}

#[test]
fn test_remove_emits_keys() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada"), (2, 40, "bob")]);
    let (events, _sub) = test.record_events("people-remove");

    ok(test.block_on(test.db.remove("people").eq("id", 2).exec()));
    ok(test.block_on(test.db.remove("people").eq("id", 7).exec()));

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, ChangePayload::Keys(vec![id(2)]));
}

#[test]
fn test_events_are_per_store_and_action() {
    let test = TestDb::new();
    let (people, _a) = test.record_events("people-add");
    let (removals, _b) = test.record_events("people-remove");
    test.put_events(&[(1, 1, "open")]);
    test.put_people(&[(1, 30, "ada")]);

    assert_eq!(people.lock().expect("events").len(), 1);
    assert!(removals.lock().expect("events").is_empty());
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let test = TestDb::new();
    let (kept, _kept_sub) = test.record_events("people-add");
    let (dropped, dropped_sub) = test.record_events("people-add");

    test.put_people(&[(1, 30, "ada")]);
    assert!(dropped_sub.unsubscribe());
    test.put_people(&[(2, 31, "bob")]);

    assert_eq!(kept.lock().expect("events").len(), 2);
    assert_eq!(dropped.lock().expect("events").len(), 1);
}

#[test]
fn test_close_detaches_handlers() {
    let test = TestDb::new();
    let (events, sub) = test.record_events("people-add");
    test.db.close();
    ok(test.block_on(test.db.open()));
    test.put_people(&[(1, 30, "ada")]);

    assert!(events.lock().expect("events").is_empty());
    assert!(!sub.unsubscribe());
}
