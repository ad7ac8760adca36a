//! Query planning and execution.
//!
//! - `predicate`: filter predicates
//! - `planner`: predicates to a single scan range
//! - `scan`: ordering cursor walk intersected with auxiliary scans
//! - `hydrate`: primary keys to records through the cache
//! - `builder`: immutable request builders handed out by `Database`

pub mod builder;
pub mod hydrate;
pub mod planner;
pub mod predicate;
pub mod scan;

pub use builder::{Query, Remove, Update};
pub use planner::{FieldBounds, PartBound};
pub use predicate::{Op, Predicate};
pub use scan::{ScanPlan, Selection, SourceScan};
