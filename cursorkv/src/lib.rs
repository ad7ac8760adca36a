// Life of a request:
// 1. A builder (`Query`, `Update`, `Remove`) collects predicates, order and
//    pagination
// 2. The planner turns them into one ordering scan plus auxiliary scans,
//    without touching the substrate
// 3. The executor walks the ordering cursor and keeps keys present in every
//    auxiliary scan
// 4. Reads hydrate the keys through the LRU cache; writes go to the
//    substrate first, then refresh or evict the cache, then emit a change
//    event
//
// System components:
//  - Ordered key-value substrate (`storage`)
//  - Query planner and cursor intersection (`query`)
//  - Record cache (`cache`)
//  - Change events (`subscription`)

pub mod cache;
pub mod codec;
pub mod command;
pub mod config;
pub mod database;
pub mod error;
pub mod query;
pub mod storage;
pub mod subscription;
pub mod types;


pub use database::{Database, DatabaseOptions};
pub use error::{Error, Result};
pub use query::{Op, Predicate, Query, Remove, Update};
pub use storage::{MemoryStore, Substrate};
pub use subscription::{ChangeAction, ChangeEvent, ChangePayload, Subscription};
pub use types::{Key, KeyPart, Record, StoreSchema, Value, record};
