//! Payload codec and the adapter that splits records around it.
//!
//! With encoding enabled for a store, a record is stored as its indexed
//! fields verbatim plus one `$payload` field holding the codec output for
//! everything else. Indexed fields never go through the codec, so the
//! substrate can still order and range-scan them.
//!
//! Codecs may serialise binary data into a tagged map
//! (`{"type": "Buffer", "data": [..]}`). Decoding normalises that form back
//! into `Value::Bytes` at any depth.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as Json};

use crate::storage::StoredRecord;
use crate::types::{PAYLOAD_FIELD, Record, StoreLayout, Value};

/// Boxed error returned by codec implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Encodes the non-indexed part of a record into one opaque value.
///
/// Implementations must be pure and deterministic.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &Record) -> Result<Value, BoxError>;
    fn decode(&self, payload: &Value) -> Result<Record, BoxError>;
}

/// JSON text codec. Produces `Value::Bytes` holding UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode(&self, payload: &Record) -> Result<Value, BoxError> {
        let mut object = JsonMap::new();
        for (field, value) in payload {
            object.insert(field.as_str().to_owned(), to_json(value)?);
        }
        Ok(Value::Bytes(serde_json::to_vec(&Json::Object(object))?))
    }

    fn decode(&self, payload: &Value) -> Result<Record, BoxError> {
        let Value::Bytes(bytes) = payload else {
            return Err(format!("expected bytes payload, found {}", payload.type_name()).into());
        };
        match serde_json::from_slice::<Json>(bytes)? {
            Json::Object(object) => Ok(object
                .into_iter()
                .map(|(field, value)| (field, from_json(value)))
                .collect()),
            other => Err(format!("expected a JSON object payload, found {other}").into()),
        }
    }
}

/// Convert a value to JSON. Bytes become a buffer map; NaN and infinities
/// fail.
pub(crate) fn to_json(value: &Value) -> Result<Json, BoxError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Number(n) => Json::Number(
            JsonNumber::from_f64(*n).ok_or_else(|| format!("{n} cannot be encoded as JSON"))?,
        ),
        Value::String(s) => Json::String(s.as_str().to_owned()),
        Value::Bytes(bytes) => {
            let mut buffer = JsonMap::new();
            buffer.insert("type".into(), Json::String("Buffer".into()));
            buffer.insert(
                "data".into(),
                Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            );
            Json::Object(buffer)
        }
        Value::List(items) => Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Map(fields) => {
            let mut object = JsonMap::new();
            for (field, value) in fields {
                object.insert(field.as_str().to_owned(), to_json(value)?);
            }
            Json::Object(object)
        }
    })
}

/// Structural conversion. Buffer maps stay maps until `normalize`.
pub(crate) fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(b),
        Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        Json::Object(object) => Value::Map(
            object
                .into_iter()
                .map(|(field, value)| (field, from_json(value)))
                .collect(),
        ),
    }
}

/// Turn serialised buffer maps back into `Value::Bytes`, recursively.
#[must_use]
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Map(fields) => match buffer_bytes(&fields) {
            Some(bytes) => Value::Bytes(bytes),
            None => Value::Map(
                fields
                    .into_iter()
                    .map(|(field, value)| (field, normalize(value)))
                    .collect(),
            ),
        },
        Value::List(items) => Value::List(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

/// The record a decode would rebuild from `record`, without running the
/// codec. Non-indexed fields of an encoded store are normalised.
#[must_use]
pub fn normalize_record(layout: &StoreLayout, record: Record) -> Record {
    if !layout.encoding() {
        return record;
    }
    record
        .into_iter()
        .map(|(field, value)| {
            if layout.is_indexed(&field) {
                (field, value)
            } else {
                (field, normalize(value))
            }
        })
        .collect()
}

fn buffer_bytes(fields: &BTreeMap<String, Value>) -> Option<Vec<u8>> {
    if fields.len() != 2 || fields.get("type")?.as_str()? != "Buffer" {
        return None;
    }
    let Value::List(data) = fields.get("data")? else {
        return None;
    };
    data.iter()
        .map(|item| {
            let n = item.as_number()?;
            if n.fract() == 0.0 && (0.0..=255.0).contains(&n) {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Some(n as u8)
            } else {
                None
            }
        })
        .collect()
}

/// Which way a codec call was going when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDirection {
    Encode,
    Decode,
}

impl fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encode"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// A codec failure for one store.
#[derive(Debug)]
pub struct CodecError {
    pub store: String,
    pub direction: CodecDirection,
    pub source: BoxError,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} payload for store '{}': {}",
            self.direction, self.store, self.source
        )
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Applies a `PayloadCodec` according to each store's layout.
#[derive(Clone)]
pub struct CodecAdapter {
    codec: Arc<dyn PayloadCodec>,
}

impl fmt::Debug for CodecAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecAdapter").finish_non_exhaustive()
    }
}

impl Default for CodecAdapter {
    fn default() -> Self {
        Self::new(Arc::new(JsonCodec))
    }
}

impl CodecAdapter {
    #[must_use]
    pub fn new(codec: Arc<dyn PayloadCodec>) -> Self {
        Self { codec }
    }

    /// Split `record` into indexed fields and an encoded payload.
    ///
    /// # Post-conditions
    ///
    /// - every indexed field of `record` is present unchanged
    /// - with encoding enabled, no non-indexed field is present except
    ///   `$payload`
    pub fn encode(&self, layout: &StoreLayout, record: &Record) -> Result<StoredRecord, CodecError> {
        if !layout.encoding() {
            return Ok(StoredRecord::new(record.clone()));
        }
        let mut stored = Record::new();
        let mut payload = Record::new();
        for (field, value) in record {
            let target = if layout.is_indexed(field) {
                &mut stored
            } else {
                &mut payload
            };
            target.insert(field.as_str().to_owned(), value.clone());
        }
        let encoded = self
            .codec
            .encode(&payload)
            .map_err(|source| codec_error(layout, CodecDirection::Encode, source))?;
        stored.insert(PAYLOAD_FIELD.to_owned(), encoded);
        Ok(StoredRecord::new(stored))
    }

    /// Rebuild the logical record. Indexed fields win over payload fields.
    pub fn decode(&self, layout: &StoreLayout, stored: StoredRecord) -> Result<Record, CodecError> {
        let mut fields = stored.into_fields();
        if !layout.encoding() {
            return Ok(fields);
        }
        let payload = fields.remove(PAYLOAD_FIELD).ok_or_else(|| {
            codec_error(
                layout,
                CodecDirection::Decode,
                format!("stored record has no '{PAYLOAD_FIELD}' field").into(),
            )
        })?;
        let decoded = self
            .codec
            .decode(&payload)
            .map_err(|source| codec_error(layout, CodecDirection::Decode, source))?;

        let mut record: Record = decoded
            .into_iter()
            .map(|(field, value)| (field, normalize(value)))
            .collect();
        for (field, value) in fields {
            if layout.is_indexed(&field) {
                record.insert(field, value);
            }
        }
        Ok(record)
    }
}

fn codec_error(layout: &StoreLayout, direction: CodecDirection, source: BoxError) -> CodecError {
    CodecError {
        store: layout.name().to_owned(),
        direction,
        source,
    }
}
