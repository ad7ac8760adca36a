//! End-to-end tests for the record cache: hits, eviction and coherence
//! with writes.

use crate::e2e_tests::helpers::{TestDb, id, ints, ok};
use crate::types::{Value, record};

#[test]
fn test_writes_populate_cache() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada"), (2, 31, "bob")]);
    assert_eq!(test.db.cache_len().expect("cache"), 2);

    let gets = test.substrate_gets();
    let records = ok(test.block_on(test.db.query("people").all()));
    assert_eq!(ints(&records, "id"), vec![1, 2]);
    assert_eq!(test.substrate_gets(), gets);
}

#[test]
fn test_least_recently_used_is_evicted() {
    let test = TestDb::with_capacity(2);
    test.put_people(&[(1, 30, "ada"), (2, 31, "bob")]);

    // Touch 1 so that 2 is the eviction candidate.
    ok(test.block_on(test.db.get("people", &id(1))));
    test.put_people(&[(3, 32, "cy")]);

    assert!(test.db.is_cached("people", &id(1)).expect("cache"));
    assert!(!test.db.is_cached("people", &id(2)).expect("cache"));
    assert!(test.db.is_cached("people", &id(3)).expect("cache"));
    assert_eq!(test.db.cache_len().expect("cache"), 2);
}

/// A miss is read once from the substrate, then served from the cache.
#[test]
fn test_miss_fills_cache() {
    let test = TestDb::with_capacity(1);
    test.put_people(&[(1, 30, "ada"), (2, 31, "bob")]);
    assert!(!test.db.is_cached("people", &id(1)).expect("cache"));

    let gets = test.substrate_gets();
    let first = ok(test.block_on(test.db.get("people", &id(1))));
    assert_eq!(test.substrate_gets(), gets + 1);
    let second = ok(test.block_on(test.db.get("people", &id(1))));
    assert_eq!(test.substrate_gets(), gets + 1);
    assert_eq!(first, second);
}

/// Reads after an update see the patched record, cached or not.
#[test]
fn test_update_refreshes_cached_record() {
    let test = TestDb::with_capacity(2);
    test.put_people(&[(1, 30, "ada"), (2, 31, "bob"), (3, 32, "cy")]);

    let updated = ok(test.block_on(
        test.db
            .update("people", record([("name", Value::from("zed"))]))
            .exec(),
    ));
    assert_eq!(updated, 3);

    for key in [id(1), id(2), id(3)] {
        let read = ok(test.block_on(test.db.get("people", &key)));
        assert_eq!(
            read.and_then(|r| r.get("name").cloned()),
            Some(Value::from("zed"))
        );
    }
}

#[test]
fn test_remove_evicts_cached_record() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada"), (2, 31, "bob")]);
    assert!(test.db.is_cached("people", &id(1)).expect("cache"));

    ok(test.block_on(test.db.remove("people").eq("id", 1).exec()));
    assert!(!test.db.is_cached("people", &id(1)).expect("cache"));
    assert_eq!(ok(test.block_on(test.db.get("people", &id(1)))), None);
}

/// Two stores never share cache entries for equal keys.
#[test]
fn test_cache_is_keyed_by_store() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada")]);
    assert!(test.db.is_cached("people", &id(1)).expect("cache"));
    assert!(!test.db.is_cached("events", &id(1)).expect("cache"));
}

/// Missing keys are dropped from hydrated results without error.
#[test]
fn test_get_many_skips_missing() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada"), (3, 32, "cy")]);
    let records = ok(test.block_on(test.db.get_many("people", &[id(3), id(2), id(1)])));
    assert_eq!(ints(&records, "id"), vec![3, 1]);
}

#[test]
fn test_close_clears_cache() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada")]);
    test.db.close();
    assert_eq!(test.db.cache_len().expect("cache"), 0);

    ok(test.block_on(test.db.open()));
    let gets = test.substrate_gets();
    let read = ok(test.block_on(test.db.get("people", &id(1))));
    assert!(read.is_some());
    assert_eq!(test.substrate_gets(), gets + 1);
}
