//! In-memory ordered substrate.
//!
//! Each store keeps its rows in a `BTreeMap<Key, StoredRecord>` ordered by
//! primary key, and each secondary index in a `BTreeMap<Key, BTreeSet<Key>>`
//! mapping index value to the primary keys holding it. Index cursors
//! therefore yield entries ordered by index value, ties broken by primary key.
//!
//! Cursors snapshot their entries when opened, so a mutation during a walk
//! never affects the walk.
//!
//! State survives `close()`: reopening with the same or a higher version sees
//! the same rows, which is how schema migrations are exercised.
//!
//! # Invariants
//!
//! - every index entry points at an existing row whose field holds the
//!   entry's value
//! - a unique index maps each value to at most one primary key
//! - rows whose index field is missing or not keyable have no index entry

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::storage::{
    Cursor, CursorEntry, Direction, ScanRange, ScanSource, StoredRecord, Substrate,
    SubstrateError,
};
use crate::types::{Key, KeyPart, StoreSchema, Value};

/// In-memory implementation of `Substrate`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    stats: MemoryStats,
}

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    name: Option<String>,
    version: u32,
    stores: HashMap<String, StoreData>,
}

#[derive(Debug)]
struct StoreData {
    schema: StoreSchema,
    rows: BTreeMap<Key, StoredRecord>,
    indexes: HashMap<String, IndexData>,
    next_auto_key: u64,
}

#[derive(Debug, Default)]
struct IndexData {
    unique: bool,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

/// Operation counters, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryStats {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    cursors: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served.
    #[must_use]
    pub fn get_count(&self) -> u64 {
        self.stats.gets.load(Ordering::Relaxed)
    }

    /// Number of `put` calls served.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.stats.puts.load(Ordering::Relaxed)
    }

    /// Number of `delete` calls served.
    #[must_use]
    pub fn delete_count(&self) -> u64 {
        self.stats.deletes.load(Ordering::Relaxed)
    }

    /// Number of cursors opened.
    #[must_use]
    pub fn cursor_count(&self) -> u64 {
        self.stats.cursors.load(Ordering::Relaxed)
    }

    /// Number of rows in `store`, or `None` if it does not exist.
    #[must_use]
    pub fn row_count(&self, store: &str) -> Option<usize> {
        let state = self.state.lock().ok()?;
        state.stores.get(store).map(|data| data.rows.len())
    }

    /// The version the store was last opened with (0 if never opened).
    #[must_use]
    pub fn version(&self) -> u32 {
        self.state.lock().map_or(0, |state| state.version)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, SubstrateError> {
        self.state.lock().map_err(|_| SubstrateError::LockPoisoned)
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, MemoryState>, SubstrateError> {
        let state = self.lock()?;
        if !state.open {
            return Err(SubstrateError::NotOpen);
        }
        Ok(state)
    }
}

impl MemoryState {
    fn store_mut(&mut self, store: &str) -> Result<&mut StoreData, SubstrateError> {
        self.stores
            .get_mut(store)
            .ok_or_else(|| SubstrateError::StoreNotFound(store.to_owned()))
    }

    fn store(&self, store: &str) -> Result<&StoreData, SubstrateError> {
        self.stores
            .get(store)
            .ok_or_else(|| SubstrateError::StoreNotFound(store.to_owned()))
    }

    /// Create missing stores, reconcile indexes of existing ones.
    fn migrate(&mut self, schemas: &[StoreSchema]) {
        for schema in schemas {
            match self.stores.get_mut(&schema.name) {
                None => {
                    tracing::debug!("creating store '{}'", schema.name);
                    self.stores
                        .insert(schema.name.as_str().to_owned(), StoreData::new(schema));
                }
                Some(existing) if existing.schema.primary_key != schema.primary_key => {
                    tracing::warn!(
                        "primary key of store '{}' changed; recreating it empty",
                        schema.name
                    );
                    *existing = StoreData::new(schema);
                }
                Some(existing) => existing.reconcile(schema),
            }
        }
    }
}

impl StoreData {
    fn new(schema: &StoreSchema) -> Self {
        let indexes = schema
            .indexes
            .iter()
            .map(|index| {
                (
                    index.field.as_str().to_owned(),
                    IndexData {
                        unique: index.unique,
                        entries: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self {
            schema: schema.clone(),
            rows: BTreeMap::new(),
            indexes,
            next_auto_key: 1,
        }
    }

    /// Bring indexes in line with `schema`, building new ones from the rows.
    fn reconcile(&mut self, schema: &StoreSchema) {
        self.indexes
            .retain(|field, _| schema.find_index(field).is_some());
        for index in &schema.indexes {
            if let Some(existing) = self.indexes.get_mut(&index.field) {
                existing.unique = index.unique;
                continue;
            }
            tracing::debug!("building index '{}' on '{}'", index.field, schema.name);
            let mut data = IndexData {
                unique: index.unique,
                entries: BTreeMap::new(),
            };
            for (key, row) in &self.rows {
                if let Some(value) = index_value(row, &index.field) {
                    data.entries.entry(value).or_default().insert(key.clone());
                }
            }
            self.indexes.insert(index.field.as_str().to_owned(), data);
        }
        self.schema = schema.clone();
    }

    /// Resolve the record's primary key, generating one when allowed.
    fn resolve_key(&mut self, record: &mut StoredRecord) -> Result<Key, SubstrateError> {
        match Key::from_record(record.fields(), &self.schema.primary_key) {
            Ok(key) => {
                if self.schema.auto_increment {
                    self.bump_auto_key(&key);
                }
                Ok(key)
            }
            Err(field) if self.schema.auto_increment && record.get(&field).is_none() => {
                let generated = self.next_auto_key;
                self.next_auto_key += 1;
                #[allow(clippy::cast_precision_loss)]
                let number = generated as f64;
                record.insert(field, Value::Number(number));
                Ok(Key::single(number))
            }
            Err(field) => Err(SubstrateError::InvalidKey {
                store: self.schema.name.as_str().to_owned(),
                field,
            }),
        }
    }

    /// Explicit numeric keys move the generator past them.
    fn bump_auto_key(&mut self, key: &Key) {
        if let [KeyPart::Number(n)] = key.parts() {
            if *n >= 1.0 && n.is_finite() {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let floor = n.floor() as u64;
                self.next_auto_key = self.next_auto_key.max(floor.saturating_add(1));
            }
        }
    }

    fn check_unique(&self, key: &Key, record: &StoredRecord) -> Result<(), SubstrateError> {
        for (field, index) in &self.indexes {
            if !index.unique {
                continue;
            }
            let Some(value) = index_value(record, field) else {
                continue;
            };
            let taken = index
                .entries
                .get(&value)
                .is_some_and(|keys| keys.iter().any(|existing| existing != key));
            if taken {
                return Err(SubstrateError::ConstraintViolation {
                    store: self.schema.name.as_str().to_owned(),
                    index: field.as_str().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn unindex(&mut self, key: &Key, record: &StoredRecord) {
        for (field, index) in &mut self.indexes {
            if let Some(value) = index_value(record, field) {
                if let Some(keys) = index.entries.get_mut(&value) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.entries.remove(&value);
                    }
                }
            }
        }
    }

    fn reindex(&mut self, key: &Key, record: &StoredRecord) {
        for (field, index) in &mut self.indexes {
            if let Some(value) = index_value(record, field) {
                index.entries.entry(value).or_default().insert(key.clone());
            }
        }
    }

    fn scan(
        &self,
        source: &ScanSource,
        range: &ScanRange,
    ) -> Result<Vec<CursorEntry>, SubstrateError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        match source {
            ScanSource::Primary => Ok(self
                .rows
                .range::<Key, _>(range.as_bounds())
                .map(|(key, _)| CursorEntry {
                    key: key.clone(),
                    primary_key: key.clone(),
                })
                .collect()),
            ScanSource::Index(field) => {
                let index =
                    self.indexes
                        .get(field)
                        .ok_or_else(|| SubstrateError::IndexNotFound {
                            store: self.schema.name.as_str().to_owned(),
                            index: field.as_str().to_owned(),
                        })?;
                Ok(index
                    .entries
                    .range::<Key, _>(range.as_bounds())
                    .flat_map(|(value, keys)| {
                        keys.iter().map(move |primary_key| CursorEntry {
                            key: value.clone(),
                            primary_key: primary_key.clone(),
                        })
                    })
                    .collect())
            }
        }
    }
}

/// The one-part index key of `field`, if the record holds a keyable value.
fn index_value(record: &StoredRecord, field: &str) -> Option<Key> {
    record
        .get(field)
        .and_then(KeyPart::from_value)
        .map(Key::from)
}

impl Substrate for MemoryStore {
    type Cursor = MemoryCursor;

    async fn open(
        &self,
        name: &str,
        version: u32,
        schemas: &[StoreSchema],
    ) -> Result<(), SubstrateError> {
        let mut state = self.lock()?;
        if version < state.version {
            return Err(SubstrateError::VersionDowngrade {
                current: state.version,
                requested: version,
            });
        }
        if version > state.version {
            state.migrate(schemas);
        }
        for schema in schemas {
            state.store(&schema.name)?;
        }
        state.name = Some(name.to_owned());
        state.version = version;
        state.open = true;
        tracing::info!(
            "opened memory substrate '{name}' at version {version} with {} stores",
            state.stores.len()
        );
        Ok(())
    }

    async fn put(&self, store: &str, mut record: StoredRecord) -> Result<Key, SubstrateError> {
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock_open()?;
        let data = state.store_mut(store)?;
        let key = data.resolve_key(&mut record)?;
        data.check_unique(&key, &record)?;
        if let Some(previous) = data.rows.remove(&key) {
            data.unindex(&key, &previous);
        }
        data.reindex(&key, &record);
        data.rows.insert(key.clone(), record);
        Ok(key)
    }

    async fn delete(&self, store: &str, key: &Key) -> Result<(), SubstrateError> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock_open()?;
        let data = state.store_mut(store)?;
        if let Some(previous) = data.rows.remove(key) {
            data.unindex(key, &previous);
        }
        Ok(())
    }

    async fn get(&self, store: &str, key: &Key) -> Result<Option<StoredRecord>, SubstrateError> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        let state = self.lock_open()?;
        Ok(state.store(store)?.rows.get(key).cloned())
    }

    async fn open_cursor(
        &self,
        store: &str,
        source: &ScanSource,
        range: &ScanRange,
        direction: Direction,
    ) -> Result<MemoryCursor, SubstrateError> {
        self.stats.cursors.fetch_add(1, Ordering::Relaxed);
        let state = self.lock_open()?;
        let mut entries = state.store(store)?.scan(source, range)?;
        if direction == Direction::Descending {
            entries.reverse();
        }
        Ok(MemoryCursor {
            entries: entries.into_iter(),
        })
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.open = false;
        }
    }
}

/// A snapshot cursor over `MemoryStore` entries.
#[derive(Debug)]
pub struct MemoryCursor {
    entries: std::vec::IntoIter<CursorEntry>,
}

impl Cursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<CursorEntry>, SubstrateError> {
        Ok(self.entries.next())
    }
}
