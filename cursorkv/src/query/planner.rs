//! Range planner: turns predicates into a single scan range.
//!
//! Predicates are grouped per field into `FieldBounds` first. A field may
//! carry one equality, or at most one lower (`>`, `>=`) and one upper
//! (`<`, `<=`) bound.
//!
//! # Composite primary keys
//!
//! Predicates must form a contiguous run of equalities from the first key
//! component, optionally followed by one ranged component:
//!
//! ```text
//! key [id, age, karma]
//!   id == 5, age == 3, karma == 7   -> only([5, 3, 7])
//!   id == 5, age == 3               -> [5, 3] ..= [5, 3, Max]
//!   id == 5, age > 3                -> ([5, 3, Max] ..= [5, Max]]
//!   id == 5, karma == 7             -> error: age skipped
//!   id > 0, age == 25               -> error: predicate after a range
//! ```
//!
//! Nothing here performs I/O, so every planner error surfaces before the
//! substrate is touched.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::query::predicate::{Op, Predicate};
use crate::storage::{KeyBound, ScanRange};
use crate::types::{Key, KeyPart};

/// One side of a per-field range.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::disallowed_methods)] // Clone needed to build bound keys
pub struct PartBound {
    pub value: KeyPart,
    pub exclusive: bool,
}

/// All predicates on one field, merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBounds {
    pub eq: Option<KeyPart>,
    pub lower: Option<PartBound>,
    pub upper: Option<PartBound>,
}

impl FieldBounds {
    /// Whether the field carries a range rather than an equality.
    #[must_use]
    pub const fn is_range(&self) -> bool {
        self.eq.is_none() && (self.lower.is_some() || self.upper.is_some())
    }

    fn add(&mut self, op: Op, value: KeyPart) -> std::result::Result<(), ()> {
        let slot = match op {
            Op::Eq if self.lower.is_none() && self.upper.is_none() && self.eq.is_none() => {
                self.eq = Some(value);
                return Ok(());
            }
            Op::Eq => return Err(()),
            _ if self.eq.is_some() => return Err(()),
            Op::Gt | Op::Gte => &mut self.lower,
            Op::Lt | Op::Lte => &mut self.upper,
        };
        if slot.is_some() {
            return Err(());
        }
        *slot = Some(PartBound {
            value,
            exclusive: op.is_exclusive(),
        });
        Ok(())
    }
}

/// Grouped predicates, keyed by field name.
pub type BoundsByField = BTreeMap<String, FieldBounds>;

/// Merge predicates per field, converting values to key parts.
///
/// # Errors
///
/// - `InvalidKey` if a predicate value is not keyable
/// - `ConflictingPredicates` if a field's predicates cannot form one range
pub fn group<'a>(
    store: &str,
    predicates: impl IntoIterator<Item = &'a Predicate>,
) -> Result<BoundsByField> {
    let mut grouped = BoundsByField::new();
    for predicate in predicates {
        let value = KeyPart::from_value(&predicate.value).ok_or_else(|| Error::InvalidKey {
            store: store.to_owned(),
            field: predicate.field.as_str().to_owned(),
        })?;
        grouped
            .entry(predicate.field.as_str().to_owned())
            .or_default()
            .add(predicate.op, value)
            .map_err(|()| Error::ConflictingPredicates {
                store: store.to_owned(),
                field: predicate.field.as_str().to_owned(),
            })?;
    }
    Ok(grouped)
}

/// Plan the primary-key range for `bounds`.
///
/// `bounds` must only hold primary-key fields.
///
/// # Errors
///
/// - `RangeMidComposite` if a predicate follows a ranged component
/// - `NonContiguousPredicate` if a component is skipped
pub fn plan_primary(store: &str, primary_key: &[String], bounds: &BoundsByField) -> Result<ScanRange> {
    let mut prefix = Vec::with_capacity(primary_key.len());
    let mut ranged: Option<&FieldBounds> = None;
    let mut stop = None;

    for (position, field) in primary_key.iter().enumerate() {
        match bounds.get(field) {
            Some(FieldBounds { eq: Some(value), .. }) => prefix.push(value.clone()),
            Some(field_bounds) => {
                ranged = Some(field_bounds);
                stop = Some(position);
                break;
            }
            None => {
                stop = Some(position);
                break;
            }
        }
    }

    if let Some(position) = stop {
        let later = primary_key[position + 1..]
            .iter()
            .find(|field| bounds.contains_key(field.as_str()));
        if let Some(later) = later {
            let field = if ranged.is_some() {
                later
            } else {
                &primary_key[position]
            };
            let field = field.as_str().to_owned();
            let store = store.to_owned();
            return Err(if ranged.is_some() {
                Error::RangeMidComposite { store, field }
            } else {
                Error::NonContiguousPredicate { store, field }
            });
        }
    }

    let Some(ranged) = ranged else {
        let range = if prefix.len() == primary_key.len() {
            ScanRange::Only(Key::new(prefix))
        } else if prefix.is_empty() {
            ScanRange::All
        } else {
            ScanRange::prefix(Key::new(prefix))
        };
        return Ok(range);
    };

    if primary_key.len() == 1 {
        return Ok(single_part_range(ranged));
    }

    let prefix = Key::new(prefix);
    let lower = match &ranged.lower {
        Some(bound) if bound.exclusive => Some(KeyBound::exclusive(
            prefix.with(bound.value.clone()).with(KeyPart::Max),
        )),
        Some(bound) => Some(KeyBound::inclusive(prefix.with(bound.value.clone()))),
        None if prefix.is_empty() => None,
        None => Some(KeyBound::inclusive(prefix.clone())),
    };
    let upper = match &ranged.upper {
        Some(bound) if bound.exclusive => {
            Some(KeyBound::exclusive(prefix.with(bound.value.clone())))
        }
        Some(bound) => Some(KeyBound::inclusive(
            prefix.with(bound.value.clone()).with(KeyPart::Max),
        )),
        None if prefix.is_empty() => None,
        None => Some(KeyBound::inclusive(prefix.with(KeyPart::Max))),
    };
    Ok(ScanRange::Bounded { lower, upper })
}

/// Plan the range over a secondary index. No bounds means a full scan.
#[must_use]
pub fn plan_index(bounds: Option<&FieldBounds>) -> ScanRange {
    match bounds {
        None => ScanRange::All,
        Some(FieldBounds { eq: Some(value), .. }) => ScanRange::Only(Key::from(value.clone())),
        Some(bounds) => single_part_range(bounds),
    }
}

fn single_part_range(bounds: &FieldBounds) -> ScanRange {
    let to_key_bound = |bound: &PartBound| KeyBound {
        key: Key::from(bound.value.clone()),
        exclusive: bound.exclusive,
    };
    ScanRange::Bounded {
        lower: bounds.lower.as_ref().map(to_key_bound),
        upper: bounds.upper.as_ref().map(to_key_bound),
    }
}
