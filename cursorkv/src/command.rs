//! JSON command driver.
//!
//! One JSON object per request, tagged by `op`:
//!
//! ```text
//! {"op": "put",    "store": "people", "record": {"id": 1, "age": 30}}
//! {"op": "get",    "store": "people", "key": 1}
//! {"op": "query",  "store": "people", "filters": [{"field": "age", "op": ">", "value": 20}],
//!                  "orderBy": "age", "descending": true, "offset": 0, "limit": 10}
//! {"op": "count",  "store": "people", "filters": [...]}
//! {"op": "update", "store": "people", "patch": {"bio": "x"}, "filters": [...]}
//! {"op": "remove", "store": "people", "filters": [...]}
//! ```
//!
//! Composite keys are JSON arrays. Binary values use the buffer form
//! `{"type": "Buffer", "data": [..]}` in both directions.
//!
//! Every request yields one response: `{"ok": true, "result": ...}` or
//! `{"ok": false, "error": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};

use crate::codec::{from_json, normalize, to_json};
use crate::database::Database;
use crate::error::Error;
use crate::query::predicate::{Op, Predicate};
use crate::query::scan::Selection;
use crate::storage::{Direction, Substrate};
use crate::types::{Key, KeyPart, Record, Value};

/// Filter, order and pagination fields shared by read and write commands.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionArgs {
    #[serde(default)]
    pub filters: Vec<FilterArgs>,
    pub order_by: Option<String>,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterArgs {
    pub field: String,
    pub op: Op,
    pub value: Json,
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Command {
    Put {
        store: String,
        record: JsonMap<String, Json>,
    },
    Get {
        store: String,
        key: Json,
    },
    Query {
        store: String,
        #[serde(flatten)]
        selection: SelectionArgs,
    },
    Count {
        store: String,
        #[serde(flatten)]
        selection: SelectionArgs,
    },
    Update {
        store: String,
        patch: JsonMap<String, Json>,
        #[serde(flatten)]
        selection: SelectionArgs,
    },
    Remove {
        store: String,
        #[serde(flatten)]
        selection: SelectionArgs,
    },
}

/// The reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    #[must_use]
    pub const fn ok(result: Json) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Render as one line of JSON.
    #[must_use]
    pub fn to_line(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"ok":false,"error":"unencodable response: {e}"}}"#))
    }
}

/// Parse and run one line of input.
pub async fn execute_line<S: Substrate>(db: &Database<S>, line: &str) -> Response {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => execute(db, command).await,
        Err(e) => Response::error(format!("invalid command: {e}")),
    }
}

/// Run one command.
pub async fn execute<S: Substrate>(db: &Database<S>, command: Command) -> Response {
    match run(db, command).await {
        Ok(result) => Response::ok(result),
        Err(e) => Response::error(e.to_string()),
    }
}

async fn run<S: Substrate>(db: &Database<S>, command: Command) -> Result<Json, Error> {
    match command {
        Command::Put { store, record } => {
            let key = db.put(&store, record_from_json(record)).await?;
            Ok(key_to_json(&key))
        }
        Command::Get { store, key } => {
            let key = key_from_json(&store, key)?;
            let record = db.get(&store, &key).await?;
            Ok(record.as_ref().map_or(Json::Null, record_to_json))
        }
        Command::Query { store, selection } => {
            let selection = selection_from_args(&store, selection)?;
            let records = db.query(store).with_selection(selection).all().await?;
            Ok(Json::Array(records.iter().map(record_to_json).collect()))
        }
        Command::Count { store, selection } => {
            let selection = selection_from_args(&store, selection)?;
            let count = db.query(store).with_selection(selection).count().await?;
            Ok(Json::from(count))
        }
        Command::Update {
            store,
            patch,
            selection,
        } => {
            let selection = selection_from_args(&store, selection)?;
            let updated = db
                .update(store, record_from_json(patch))
                .with_selection(selection)
                .exec()
                .await?;
            Ok(Json::from(updated))
        }
        Command::Remove { store, selection } => {
            let selection = selection_from_args(&store, selection)?;
            let removed = db.remove(store).with_selection(selection).exec().await?;
            Ok(Json::Array(removed.iter().map(key_to_json).collect()))
        }
    }
}

fn selection_from_args(store: &str, args: SelectionArgs) -> Result<Selection, Error> {
    let predicates = args
        .filters
        .into_iter()
        .map(|filter| {
            let value = value_from_json(filter.value);
            if KeyPart::from_value(&value).is_none() {
                return Err(Error::InvalidKey {
                    store: store.to_owned(),
                    field: filter.field,
                });
            }
            Ok(Predicate {
                field: filter.field,
                op: filter.op,
                value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Selection {
        predicates,
        order_by: args.order_by,
        direction: if args.descending {
            Direction::Descending
        } else {
            Direction::Ascending
        },
        offset: args.offset,
        limit: args.limit,
    })
}

fn value_from_json(json: Json) -> Value {
    normalize(from_json(json))
}

fn value_to_json(value: &Value) -> Json {
    to_json(value).unwrap_or(Json::Null)
}

fn record_from_json(object: JsonMap<String, Json>) -> Record {
    object
        .into_iter()
        .map(|(field, value)| (field, value_from_json(value)))
        .collect()
}

fn record_to_json(record: &Record) -> Json {
    Json::Object(
        record
            .iter()
            .map(|(field, value)| (field.as_str().to_owned(), value_to_json(value)))
            .collect(),
    )
}

/// A scalar is a one-part key; an array is a composite key.
fn key_from_json(store: &str, json: Json) -> Result<Key, Error> {
    let invalid = || Error::InvalidKey {
        store: store.to_owned(),
        field: "key".to_owned(),
    };
    let values: Vec<Value> = match json {
        Json::Array(items) => items.into_iter().map(value_from_json).collect(),
        scalar => vec![value_from_json(scalar)],
    };
    values
        .iter()
        .map(|value| KeyPart::from_value(value).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()
        .map(Key::new)
}

fn key_to_json(key: &Key) -> Json {
    value_to_json(&key.to_value())
}
