//! Scan and intersect engine.
//!
//! One cursor (the ordering cursor) walks the field the results are sorted
//! by. Every other predicated field is scanned up front into a set of
//! canonical primary keys; a row survives only if its primary key is in all
//! of those sets (AND semantics).
//!
//! # Pre-conditions
//!
//! - the plan was produced by `plan` for the same store layout
//!
//! # Post-conditions
//!
//! - keys come back in ordering-cursor order; ties on an index value are
//!   broken by primary key, reversed for descending walks
//! - at most `limit` keys, after skipping `offset` matches

use std::collections::HashSet;
use std::fmt;

use futures::future::try_join_all;

use crate::error::{Error, Result};
use crate::query::planner::{self, BoundsByField};
use crate::query::predicate::Predicate;
use crate::storage::{Cursor, Direction, ScanRange, ScanSource, Substrate};
use crate::types::{CanonicalKey, FieldRole, Key, StoreLayout};

/// Filter, order and pagination of one request.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed so builders can be reused
pub struct Selection {
    pub predicates: Vec<Predicate>,
    /// Defaults to the first primary-key component.
    pub order_by: Option<String>,
    pub direction: Direction,
    pub offset: usize,
    /// `None` means unbounded.
    pub limit: Option<usize>,
}

/// One range over one source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::disallowed_methods)] // Clone needed to log plans
pub struct SourceScan {
    pub source: ScanSource,
    pub range: ScanRange,
}

impl fmt::Display for SourceScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.range)
    }
}

/// A fully planned request. Built without I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub store: String,
    pub cursor: SourceScan,
    pub direction: Direction,
    /// Auxiliary scans whose primary keys restrict the cursor walk.
    pub filters: Vec<SourceScan>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Plan `selection` against `layout`.
///
/// # Errors
///
/// - `UnindexedField` for a predicate on a field that is neither primary
///   key nor index
/// - `OrderField` when ordering by a non-leading primary-key component or
///   an unindexed field
/// - any error of `planner::group`, `planner::plan_primary`
pub fn plan(layout: &StoreLayout, selection: &Selection) -> Result<ScanPlan> {
    let store = layout.name();
    for predicate in &selection.predicates {
        if !layout.is_indexed(&predicate.field) {
            return Err(Error::UnindexedField {
                store: store.to_owned(),
                field: predicate.field.as_str().to_owned(),
            });
        }
    }

    let order_field = selection
        .order_by
        .as_deref()
        .or_else(|| layout.primary_key().first().map(String::as_str))
        .unwrap_or_default();
    let order_role = layout.role(order_field);

    let (primary, mut secondary): (BoundsByField, BoundsByField) =
        planner::group(store, &selection.predicates)?
            .into_iter()
            .partition(|(field, _)| layout.is_primary(field));

    let mut filters = Vec::new();
    let cursor = match order_role {
        Some(FieldRole::PrimaryKey { position: 0 }) => SourceScan {
            source: ScanSource::Primary,
            range: planner::plan_primary(store, layout.primary_key(), &primary)?,
        },
        Some(FieldRole::Index { .. }) => {
            let own = secondary.remove(order_field);
            if !primary.is_empty() {
                filters.push(SourceScan {
                    source: ScanSource::Primary,
                    range: planner::plan_primary(store, layout.primary_key(), &primary)?,
                });
            }
            SourceScan {
                source: ScanSource::Index(order_field.to_owned()),
                range: planner::plan_index(own.as_ref()),
            }
        }
        Some(FieldRole::PrimaryKey { .. }) | None => {
            return Err(Error::OrderField {
                store: store.to_owned(),
                field: order_field.to_owned(),
            });
        }
    };

    for (field, bounds) in &secondary {
        filters.push(SourceScan {
            source: ScanSource::Index(field.as_str().to_owned()),
            range: planner::plan_index(Some(bounds)),
        });
    }

    Ok(ScanPlan {
        store: store.to_owned(),
        cursor,
        direction: selection.direction,
        filters,
        offset: selection.offset,
        limit: selection.limit,
    })
}

/// Run `plan` and return matching primary keys in cursor order.
pub async fn execute<S: Substrate>(substrate: &S, plan: &ScanPlan) -> Result<Vec<Key>> {
    if plan.limit == Some(0) || plan.cursor.range.is_empty() {
        return Ok(Vec::new());
    }
    tracing::debug!(
        "scanning '{}': cursor {} {}, {} filter(s), offset {}, limit {:?}",
        plan.store,
        plan.cursor,
        plan.direction,
        plan.filters.len(),
        plan.offset,
        plan.limit
    );

    let filter_sets = try_join_all(
        plan.filters
            .iter()
            .map(|scan| collect_primary_keys(substrate, &plan.store, scan)),
    )
    .await?;
    if filter_sets.iter().any(HashSet::is_empty) {
        tracing::debug!("a filter on '{}' matched nothing", plan.store);
        return Ok(Vec::new());
    }

    let mut cursor = substrate
        .open_cursor(
            &plan.store,
            &plan.cursor.source,
            &plan.cursor.range,
            plan.direction,
        )
        .await?;

    let mut keys = Vec::new();
    let mut skipped = 0;
    while let Some(entry) = cursor.next().await? {
        if !filter_sets.is_empty() {
            let canonical = entry.primary_key.canonical();
            if !filter_sets.iter().all(|set| set.contains(&canonical)) {
                continue;
            }
        }
        if skipped < plan.offset {
            skipped += 1;
            continue;
        }
        keys.push(entry.primary_key);
        if plan.limit.is_some_and(|limit| keys.len() >= limit) {
            break;
        }
    }
    Ok(keys)
}

async fn collect_primary_keys<S: Substrate>(
    substrate: &S,
    store: &str,
    scan: &SourceScan,
) -> Result<HashSet<CanonicalKey>> {
    let mut set = HashSet::new();
    if scan.range.is_empty() {
        return Ok(set);
    }
    let mut cursor = substrate
        .open_cursor(store, &scan.source, &scan.range, Direction::Ascending)
        .await?;
    while let Some(entry) = cursor.next().await? {
        set.insert(entry.primary_key.canonical());
    }
    Ok(set)
}

/// Plan and run in one step.
pub async fn select_keys<S: Substrate>(
    substrate: &S,
    layout: &StoreLayout,
    selection: &Selection,
) -> Result<Vec<Key>> {
    let plan = plan(layout, selection)?;
    execute(substrate, &plan).await
}
