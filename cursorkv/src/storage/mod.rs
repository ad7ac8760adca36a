//! Storage substrate boundary.
//!
//! The query layer never touches storage directly. It talks to an ordered,
//! cursor-addressable key-value substrate through the `Substrate` and
//! `Cursor` traits defined here. Every call is asynchronous and atomic on its
//! own; no transaction spans several calls.
//!
//! `MemoryStore` is the in-process reference implementation.
//!
//! # Scan ranges
//!
//! - `All`: every entry of the source
//! - `Only(key)`: entries whose key equals `key`
//! - `Bounded { lower, upper }`: entries between two optional bounds
//!
//! A prefix range over composite keys is `Bounded` from `[prefix]`
//! (inclusive) to `[prefix, Max]` (inclusive).

use std::fmt;
use std::future::Future;
use std::ops::Bound;
use std::sync::Arc;

use crate::types::{Key, KeyPart, Record, StoreSchema, Value};

mod memory;

pub use memory::{MemoryCursor, MemoryStore};

/// Cursor walk direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// What a cursor walks: the primary-key space or a named secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::disallowed_methods)] // Clone needed to build one scan per filter
pub enum ScanSource {
    Primary,
    Index(String),
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Index(field) => write!(f, "index:{field}"),
        }
    }
}

/// One side of a bounded range.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::disallowed_methods)] // Clone needed when merging bounds
pub struct KeyBound {
    pub key: Key,
    pub exclusive: bool,
}

impl KeyBound {
    #[must_use]
    pub const fn inclusive(key: Key) -> Self {
        Self {
            key,
            exclusive: false,
        }
    }

    #[must_use]
    pub const fn exclusive(key: Key) -> Self {
        Self {
            key,
            exclusive: true,
        }
    }

    fn as_bound(&self) -> Bound<&Key> {
        if self.exclusive {
            Bound::Excluded(&self.key)
        } else {
            Bound::Included(&self.key)
        }
    }
}

/// A key range to scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(clippy::disallowed_methods)] // Clone needed to log plans
pub enum ScanRange {
    #[default]
    All,
    Only(Key),
    Bounded {
        lower: Option<KeyBound>,
        upper: Option<KeyBound>,
    },
}

impl ScanRange {
    /// Every composite key that starts with `prefix`.
    #[must_use]
    pub fn prefix(prefix: Key) -> Self {
        let upper = prefix.with(KeyPart::Max);
        Self::Bounded {
            lower: Some(KeyBound::inclusive(prefix)),
            upper: Some(KeyBound::inclusive(upper)),
        }
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == key,
            Self::Bounded { lower, upper } => {
                let above = lower.as_ref().is_none_or(|b| {
                    if b.exclusive {
                        key > &b.key
                    } else {
                        key >= &b.key
                    }
                });
                let below = upper.as_ref().is_none_or(|b| {
                    if b.exclusive {
                        key < &b.key
                    } else {
                        key <= &b.key
                    }
                });
                above && below
            }
        }
    }

    /// Whether no key can satisfy the range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All | Self::Only(_) => false,
            Self::Bounded {
                lower: Some(lower),
                upper: Some(upper),
            } => {
                lower.key > upper.key
                    || (lower.key == upper.key && (lower.exclusive || upper.exclusive))
            }
            Self::Bounded { .. } => false,
        }
    }

    /// The range as `std::ops::Bound`s, for `BTreeMap::range`.
    ///
    /// Callers must check `is_empty` first; `BTreeMap::range` panics on
    /// inverted bounds.
    #[must_use]
    pub fn as_bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        match self {
            Self::All => (Bound::Unbounded, Bound::Unbounded),
            Self::Only(key) => (Bound::Included(key), Bound::Included(key)),
            Self::Bounded { lower, upper } => (
                lower.as_ref().map_or(Bound::Unbounded, KeyBound::as_bound),
                upper.as_ref().map_or(Bound::Unbounded, KeyBound::as_bound),
            ),
        }
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(key) => write!(f, "only({key})"),
            Self::Bounded { lower, upper } => {
                match lower {
                    Some(b) if b.exclusive => write!(f, "({}", b.key)?,
                    Some(b) => write!(f, "[{}", b.key)?,
                    None => write!(f, "(-inf")?,
                }
                write!(f, "..")?;
                match upper {
                    Some(b) if b.exclusive => write!(f, "{})", b.key),
                    Some(b) => write!(f, "{}]", b.key),
                    None => write!(f, "+inf)"),
                }
            }
        }
    }
}

/// The on-substrate form of a record.
///
/// With payload encoding enabled this holds the indexed fields plus
/// `PAYLOAD_FIELD`; otherwise it is the logical record unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(clippy::disallowed_methods)] // Clone needed for substrate snapshots
pub struct StoredRecord(Record);

impl StoredRecord {
    #[must_use]
    pub const fn new(fields: Record) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    #[must_use]
    pub const fn fields(&self) -> &Record {
        &self.0
    }

    #[must_use]
    pub fn into_fields(self) -> Record {
        self.0
    }
}

/// One position of a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::disallowed_methods)] // Clone needed for cursor snapshots
pub struct CursorEntry {
    /// The key in the walked source (index value for index cursors).
    pub key: Key,
    /// The primary key of the record at this position.
    pub primary_key: Key,
}

/// A directional cursor over a scan range.
pub trait Cursor: Send {
    /// Advance the cursor. Returns `None` once exhausted.
    fn next(&mut self) -> impl Future<Output = Result<Option<CursorEntry>, SubstrateError>> + Send;
}

/// An ordered key-value substrate with one store per record type.
pub trait Substrate: Send + Sync {
    type Cursor: Cursor;

    /// Open the database, creating any missing stores and indexes.
    ///
    /// Fails if a declared store is still missing afterwards, or if `version`
    /// is lower than the version already opened.
    fn open(
        &self,
        name: &str,
        version: u32,
        schemas: &[StoreSchema],
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send;

    /// Insert or overwrite a record, returning its primary key.
    fn put(
        &self,
        store: &str,
        record: StoredRecord,
    ) -> impl Future<Output = Result<Key, SubstrateError>> + Send;

    /// Delete a record by primary key. Deleting a missing key is not an error.
    fn delete(
        &self,
        store: &str,
        key: &Key,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send;

    /// Fetch a record by primary key.
    fn get(
        &self,
        store: &str,
        key: &Key,
    ) -> impl Future<Output = Result<Option<StoredRecord>, SubstrateError>> + Send;

    /// Open a cursor over `source` restricted to `range`.
    fn open_cursor(
        &self,
        store: &str,
        source: &ScanSource,
        range: &ScanRange,
        direction: Direction,
    ) -> impl Future<Output = Result<Self::Cursor, SubstrateError>> + Send;

    /// Release the connection. Later calls fail with `NotOpen`.
    fn close(&self);
}

/// A shared substrate, so several handles can open the same data in turn.
impl<S: Substrate> Substrate for Arc<S> {
    type Cursor = S::Cursor;

    fn open(
        &self,
        name: &str,
        version: u32,
        schemas: &[StoreSchema],
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send {
        S::open(self, name, version, schemas)
    }

    fn put(
        &self,
        store: &str,
        record: StoredRecord,
    ) -> impl Future<Output = Result<Key, SubstrateError>> + Send {
        S::put(self, store, record)
    }

    fn delete(
        &self,
        store: &str,
        key: &Key,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send {
        S::delete(self, store, key)
    }

    fn get(
        &self,
        store: &str,
        key: &Key,
    ) -> impl Future<Output = Result<Option<StoredRecord>, SubstrateError>> + Send {
        S::get(self, store, key)
    }

    fn open_cursor(
        &self,
        store: &str,
        source: &ScanSource,
        range: &ScanRange,
        direction: Direction,
    ) -> impl Future<Output = Result<Self::Cursor, SubstrateError>> + Send {
        S::open_cursor(self, store, source, range, direction)
    }

    fn close(&self) {
        S::close(self);
    }
}

/// Errors reported by a substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    /// The substrate has not been opened, or was closed.
    NotOpen,
    /// No store with this name exists.
    StoreNotFound(String),
    /// No index on this field exists in the store.
    IndexNotFound { store: String, index: String },
    /// A record's primary key is missing or not a valid key.
    InvalidKey { store: String, field: String },
    /// A unique index already holds this value for another key.
    ConstraintViolation { store: String, index: String },
    /// Opening with a lower version than the stored one.
    VersionDowngrade { current: u32, requested: u32 },
    /// Internal lock was poisoned.
    LockPoisoned,
    /// Any other I/O failure.
    Io(String),
}

impl fmt::Display for SubstrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "substrate is not open"),
            Self::StoreNotFound(store) => write!(f, "store '{store}' not found"),
            Self::IndexNotFound { store, index } => {
                write!(f, "index '{index}' not found in store '{store}'")
            }
            Self::InvalidKey { store, field } => {
                write!(f, "record for '{store}' has a missing or invalid key field '{field}'")
            }
            Self::ConstraintViolation { store, index } => {
                write!(f, "unique index '{index}' of store '{store}' already holds this value")
            }
            Self::VersionDowngrade { current, requested } => write!(
                f,
                "cannot open version {requested}: database is already at version {current}"
            ),
            Self::LockPoisoned => write!(f, "substrate lock poisoned"),
            Self::Io(message) => write!(f, "I/O error: {message}"),
        }
    }
}

impl std::error::Error for SubstrateError {}
