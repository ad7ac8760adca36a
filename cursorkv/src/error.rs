//! Crate-level error type.
//!
//! Planner errors (`UnindexedField` through `InvalidKey`) are always raised
//! before any substrate I/O. A key missing from the substrate during
//! hydration is not an error; a substrate fault is.

use std::fmt;

use crate::cache::CacheError;
use crate::codec::CodecError;
use crate::storage::SubstrateError;
use crate::types::SchemaError;

#[derive(Debug)]
pub enum Error {
    /// A schema declaration or a schema-dependent request is invalid.
    Schema(SchemaError),
    /// The database has not been opened, or was closed.
    NotOpen,
    /// The request names a store that was not declared.
    UnknownStore(String),
    /// A predicate targets a field that is neither primary key nor index.
    UnindexedField { store: String, field: String },
    /// Composite-key predicates skip a component. `field` is the skipped one.
    NonContiguousPredicate { store: String, field: String },
    /// A composite-key predicate follows a ranged component.
    RangeMidComposite { store: String, field: String },
    /// Ordering on a field that cannot drive a cursor.
    OrderField { store: String, field: String },
    /// A field carries predicates that cannot be combined into one range.
    ConflictingPredicates { store: String, field: String },
    /// A key value is not keyable (NaN, null, boolean, list or map).
    InvalidKey { store: String, field: String },
    Codec(CodecError),
    Substrate(SubstrateError),
    Cache(CacheError),
    /// An internal lock was poisoned by a panicking thread.
    LockPoisoned,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::NotOpen => write!(f, "database is not open"),
            Self::UnknownStore(store) => write!(f, "unknown store '{store}'"),
            Self::UnindexedField { store, field } => {
                write!(f, "field '{field}' of store '{store}' is not indexed")
            }
            Self::NonContiguousPredicate { store, field } => write!(
                f,
                "predicates on the primary key of '{store}' skip component '{field}'"
            ),
            Self::RangeMidComposite { store, field } => write!(
                f,
                "predicate on '{field}' of store '{store}' follows a range predicate"
            ),
            Self::OrderField { store, field } => {
                write!(f, "cannot order store '{store}' by '{field}'")
            }
            Self::ConflictingPredicates { store, field } => write!(
                f,
                "predicates on '{field}' of store '{store}' cannot be combined"
            ),
            Self::InvalidKey { store, field } => {
                write!(f, "value for '{field}' of store '{store}' is not a valid key")
            }
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Substrate(e) => write!(f, "substrate error: {e}"),
            Self::Cache(e) => write!(f, "cache error: {e}"),
            Self::LockPoisoned => write!(f, "internal lock poisoned"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Substrate(e) => Some(e),
            Self::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<SubstrateError> for Error {
    fn from(e: SubstrateError) -> Self {
        match e {
            SubstrateError::NotOpen => Self::NotOpen,
            SubstrateError::InvalidKey { store, field } => Self::InvalidKey { store, field },
            other => Self::Substrate(other),
        }
    }
}

impl From<CacheError> for Error {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
