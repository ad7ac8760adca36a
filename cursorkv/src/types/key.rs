//! Canonical key representation shared by the planner, the scan engine and
//! the cache.
//!
//! # Ordering
//!
//! `KeyPart` has a total order: `Number < String < Bytes < Max`.
//! Numbers compare by IEEE total order with `-0.0` folded into `0.0`.
//! `Max` is the sentinel used to close prefix ranges; it sorts after every
//! real value and is never produced from a `Value`.
//!
//! A `Key` is a sequence of parts compared lexicographically. A strict prefix
//! sorts before any of its extensions, so `[0, 10]` < `[0, 10, "k"]` <
//! `[0, 10, Max]`.
//!
//! # Canonical encoding
//!
//! `CanonicalKey` is an order-preserving byte encoding of a `Key`:
//!
//! - `Number`: tag `0x10`, then the sign-flipped big-endian IEEE bits (8 bytes)
//! - `String`: tag `0x20`, escaped UTF-8 bytes, terminator `0x00 0x01`
//! - `Bytes`: tag `0x30`, escaped bytes, terminator `0x00 0x01`
//! - `Max`: tag `0xF0`
//!
//! Inside a variable-length part every `0x00` byte is written as `0x00 0xFF`,
//! so the terminator never occurs within a part.
//!
//! # Invariants
//!
//! - `a.cmp(&b) == a.canonical().cmp(&b.canonical())` for all keys
//! - `a == b` iff `a.canonical() == b.canonical()`

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::value::{Record, Value};

const TAG_NUMBER: u8 = 0x10;
const TAG_STRING: u8 = 0x20;
const TAG_BYTES: u8 = 0x30;
const TAG_MAX: u8 = 0xF0;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// A single key component.
#[derive(Debug, Clone)]
#[allow(clippy::disallowed_methods)] // Clone needed to build bounds from predicate values
pub enum KeyPart {
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Sorts after every real value. Only appears in scan bounds.
    Max,
}

impl KeyPart {
    /// Convert a logical value into a key part.
    ///
    /// Returns `None` for values that cannot be keys: null, booleans, lists,
    /// maps and NaN.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if !n.is_nan() => Some(Self::Number(fold_zero(*n))),
            Value::String(s) => Some(Self::String(s.as_str().to_owned())),
            Value::Bytes(b) => Some(Self::Bytes(b.to_vec())),
            _ => None,
        }
    }

    /// Convert this part back into a logical value.
    ///
    /// The sentinel has no logical counterpart and maps to `Value::Null`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(*n),
            Self::String(s) => Value::String(s.as_str().to_owned()),
            Self::Bytes(b) => Value::Bytes(b.to_vec()),
            Self::Max => Value::Null,
        }
    }

    /// Returns true for the `Max` sentinel.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::Max)
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => TAG_NUMBER,
            Self::String(_) => TAG_STRING,
            Self::Bytes(_) => TAG_BYTES,
            Self::Max => TAG_MAX,
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.rank());
        match self {
            Self::Number(n) => buf.extend_from_slice(&encode_number(*n)),
            Self::String(s) => encode_escaped(s.as_bytes(), buf),
            Self::Bytes(b) => encode_escaped(b, buf),
            Self::Max => {}
        }
    }
}

/// `-0.0` and `0.0` are the same key.
fn fold_zero(n: f64) -> f64 {
    if n == 0.0 { 0.0 } else { n }
}

/// Order-preserving encoding of an `f64` (matches `f64::total_cmp`).
fn encode_number(n: f64) -> [u8; 8] {
    let bits = fold_zero(n).to_bits();
    let flipped = if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1u64 << 63)
    };
    flipped.to_be_bytes()
}

fn encode_escaped(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        if b == ESCAPE {
            buf.push(ESCAPE);
            buf.push(ESCAPED_ZERO);
        } else {
            buf.push(b);
        }
    }
    buf.push(ESCAPE);
    buf.push(TERMINATOR);
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => fold_zero(*a).total_cmp(&fold_zero(*b)),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Self::Number(n) => state.write_u64(fold_zero(*n).to_bits()),
            Self::String(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Max => {}
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Max => write!(f, "MAX"),
        }
    }
}

impl From<f64> for KeyPart {
    fn from(n: f64) -> Self {
        Self::Number(fold_zero(n))
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// A primary key, index key or scan bound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[allow(clippy::disallowed_methods)] // Clone needed for cursor snapshots and removed-key lists
pub struct Key(Vec<KeyPart>);

impl Key {
    /// Create a key from its parts.
    #[must_use]
    pub const fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Create a one-part key.
    #[must_use]
    pub fn single(part: impl Into<KeyPart>) -> Self {
        Self(vec![part.into()])
    }

    /// The key's parts in order.
    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty key (only used as an unbounded prefix).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new key with `part` appended.
    #[must_use]
    pub fn with(&self, part: KeyPart) -> Self {
        let mut parts = self.0.to_vec();
        parts.push(part);
        Self(parts)
    }

    /// Extract a key from a record following a key path.
    ///
    /// # Errors
    ///
    /// Returns the name of the first field that is missing or not keyable.
    pub fn from_record(record: &Record, fields: &[String]) -> Result<Self, String> {
        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            let part = record
                .get(field)
                .and_then(KeyPart::from_value)
                .ok_or_else(|| field.as_str().to_owned())?;
            parts.push(part);
        }
        Ok(Self(parts))
    }

    /// The logical value of this key: the bare part for one-part keys, a
    /// list otherwise.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self.0.as_slice() {
            [single] => single.to_value(),
            parts => Value::List(parts.iter().map(KeyPart::to_value).collect()),
        }
    }

    /// Order-preserving byte encoding of this key.
    #[must_use]
    pub fn canonical(&self) -> CanonicalKey {
        let mut buf = Vec::with_capacity(self.0.len() * 10);
        for part in &self.0 {
            part.encode_into(&mut buf);
        }
        CanonicalKey(buf)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            parts => {
                write!(f, "[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<KeyPart> for Key {
    fn from(part: KeyPart) -> Self {
        Self(vec![part])
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::single(n)
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Self::single(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::single(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::single(s)
    }
}

/// Canonical byte form of a `Key`, used for set membership and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(clippy::disallowed_methods)] // Clone needed for cache keys
pub struct CanonicalKey(Vec<u8>);

impl CanonicalKey {
    /// The encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
