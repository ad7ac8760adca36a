//! End-to-end tests for payload encoding through the database.

use std::sync::Arc;

use crate::codec::{BoxError, CodecDirection, PayloadCodec};
use crate::database::DatabaseOptions;
use crate::e2e_tests::helpers::{TestDb, id, ints, ok};
use crate::error::Error;
use crate::storage::{StoredRecord, Substrate};
use crate::types::{PAYLOAD_FIELD, Record, StoreSchema, Value, record};

/// Binary and nested values survive the JSON payload on the way back from
/// the substrate.
#[test]
fn test_payload_round_trip_from_substrate() {
    let test = TestDb::with_capacity(1);
    let mut original = crate::testing::person(1, 30, "ada");
    original.insert("avatar".to_owned(), Value::bytes(vec![0u8, 127, 255]));
    original.insert(
        "tags".to_owned(),
        Value::List(vec![Value::from("x"), Value::bytes(vec![1u8])]),
    );
    ok(test.block_on(test.db.put("people", original.clone())));
    // Push the record out of the cache.
    test.put_people(&[(2, 31, "bob")]);

    let read = ok(test.block_on(test.db.get("people", &id(1))));
    assert_eq!(read, Some(original));
}

/// A buffer map written by the caller reads back as bytes whether the
/// record comes from the cache or from the substrate after eviction.
#[test]
fn test_cached_record_matches_refetched_record() {
    let test = TestDb::with_capacity(1);
    let mut written = crate::testing::person(1, 30, "ada");
    written.insert(
        "blob".to_owned(),
        Value::Map(record([
            ("type", Value::from("Buffer")),
            ("data", Value::List(vec![Value::from(1), Value::from(2)])),
        ])),
    );
    ok(test.block_on(test.db.put("people", written)));

    let cached = ok(test.block_on(test.db.get("people", &id(1))));
    test.put_people(&[(2, 31, "bob")]);
    assert!(!test.db.is_cached("people", &id(1)).expect("cache"));
    let refetched = ok(test.block_on(test.db.get("people", &id(1))));

    assert_eq!(cached, refetched);
    assert_eq!(
        refetched.and_then(|r| r.get("blob").cloned()),
        Some(Value::bytes(vec![1u8, 2]))
    );
}

/// Payload floats read back bit for bit after a trip through the substrate.
#[test]
fn test_payload_floats_survive_eviction() {
    let test = TestDb::with_capacity(1);
    let mut written = crate::testing::person(1, 30, "ada");
    written.insert("score".to_owned(), Value::Number(125.220_588_285_016_15));
    ok(test.block_on(test.db.put("people", written.clone())));
    test.put_people(&[(2, 31, "bob")]);

    let read = ok(test.block_on(test.db.get("people", &id(1))));
    assert_eq!(read, Some(written));
}

/// Only indexed fields and the payload reach the substrate.
#[test]
fn test_stored_record_is_split() {
    let test = TestDb::new();
    test.put_people(&[(1, 30, "ada")]);

    let stored = ok(test
        .block_on(test.db.substrate().get("people", &id(1)))
        .map_err(Error::from))
    .expect("row stored");
    let mut fields: Vec<&str> = stored.fields().keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec![PAYLOAD_FIELD, "age", "email", "id"]);
}

/// Stores without encoding keep every field as is.
#[test]
fn test_unencoded_store_passes_through() {
    let test = TestDb::new();
    test.put_events(&[(1, 1, "open")]);
    let stored: Option<StoredRecord> = ok(test
        .block_on(
            test.db
                .substrate()
                .get("events", &crate::e2e_tests::helpers::day_key(1, 1)),
        )
        .map_err(Error::from));
    assert!(stored.is_some_and(|s| s.get(PAYLOAD_FIELD).is_none() && s.get("kind").is_some()));
}

struct RejectingCodec;

impl PayloadCodec for RejectingCodec {
    fn encode(&self, payload: &Record) -> Result<Value, BoxError> {
        if payload.contains_key("secret") {
            return Err("secrets are not encodable".into());
        }
        Ok(Value::from(Record::clone(payload)))
    }

    fn decode(&self, payload: &Value) -> Result<Record, BoxError> {
        match payload {
            Value::Map(fields) if !fields.contains_key("poison") => Ok(fields.clone()),
            _ => Err("poisoned payload".into()),
        }
    }
}

fn custom_codec_db() -> TestDb {
    TestDb::with_options(
        DatabaseOptions::new("codec")
            .with_store(StoreSchema::new("notes", ["id"]).index("rank").with_encoding())
            .with_codec(Arc::new(RejectingCodec))
            .with_cache_capacity(1),
    )
}

#[test]
fn test_custom_codec_is_used() {
    let test = custom_codec_db();
    let note = record([
        ("id", Value::from(1)),
        ("rank", Value::from(5)),
        ("body", Value::from("hello")),
    ]);
    ok(test.block_on(test.db.put("notes", note.clone())));
    ok(test.block_on(test.db.put("notes", record([("id", Value::from(2)), ("rank", Value::from(1))]))));

    let records = ok(test.block_on(test.db.query("notes").asc("rank").all()));
    assert_eq!(ints(&records, "id"), vec![2, 1]);
    assert_eq!(records[1], note);
}

#[test]
fn test_encode_failure_names_store_and_direction() {
    let test = custom_codec_db();
    let err = test
        .block_on(test.db.put(
            "notes",
            record([("id", Value::from(1)), ("secret", Value::from("s"))]),
        ))
        .expect_err("encode fails");
    match err {
        Error::Codec(e) => {
            assert_eq!(e.store, "notes");
            assert_eq!(e.direction, CodecDirection::Encode);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(test.db.substrate().put_count(), 0);
}

#[test]
fn test_decode_failure_fails_whole_read() {
    let test = custom_codec_db();
    ok(test.block_on(test.db.put(
        "notes",
        record([("id", Value::from(1)), ("poison", Value::from(true))]),
    )));
    ok(test.block_on(test.db.put("notes", record([("id", Value::from(2))]))));

    let err = test
        .block_on(test.db.query("notes").all())
        .expect_err("record 1 cannot be decoded");
    assert!(matches!(
        err,
        Error::Codec(ref e) if e.direction == CodecDirection::Decode
    ));
}
