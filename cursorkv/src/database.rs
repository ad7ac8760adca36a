//! Database handle: schemas, cache, codec and change events over a
//! substrate.
//!
//! # Read path
//!
//! `query(store)` builds a `Query`. Running it plans the scan (no I/O),
//! walks the ordering cursor intersected with auxiliary scans, then hydrates
//! the surviving keys through the cache.
//!
//! # Write path
//!
//! Every write goes to the substrate first. Only after the substrate accepts
//! a row is the cache refreshed (put/update) or evicted (remove), so a
//! cached record never differs from the stored one.
//!
//! Multi-row mutations are a sequence of independent single-row writes. A
//! failure mid-batch leaves earlier rows written; the event for those rows is
//! still emitted before the error is returned.
//!
//! # Concurrency
//!
//! The handle is `Send + Sync` and is meant to be shared through `Arc`.
//! The cache sits behind one `Mutex`, the catalog behind an `RwLock`; neither
//! is held across an await point.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::cache::{CacheKey, DEFAULT_CACHE_CAPACITY, LruCache, RecordCache};
use crate::codec::{self, CodecAdapter, JsonCodec, PayloadCodec};
use crate::error::{Error, Result};
use crate::query::builder::{Query, Remove, Update};
use crate::query::hydrate::Hydrator;
use crate::query::scan::{self, Selection};
use crate::storage::Substrate;
use crate::subscription::{ChangeAction, ChangeEvent, ChangePayload, EventBus, Subscription};
use crate::types::{Catalog, Key, Record, SchemaError, StoreLayout, StoreSchema};

/// Construction options for a `Database`.
#[derive(Clone)]
#[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
pub struct DatabaseOptions {
    pub name: String,
    pub version: u32,
    pub stores: Vec<StoreSchema>,
    pub codec: Arc<dyn PayloadCodec>,
    pub cache_capacity: usize,
}

impl fmt::Debug for DatabaseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseOptions")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("stores", &self.stores)
            .field("cache_capacity", &self.cache_capacity)
            .finish_non_exhaustive()
    }
}

impl DatabaseOptions {
    /// Version 1, no stores, JSON payload codec, default cache capacity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            stores: Vec::new(),
            codec: Arc::new(JsonCodec),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_store(mut self, schema: StoreSchema) -> Self {
        self.stores.push(schema);
        self
    }

    #[must_use]
    pub fn with_stores(mut self, schemas: impl IntoIterator<Item = StoreSchema>) -> Self {
        self.stores.extend(schemas);
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// A database handle over substrate `S`.
pub struct Database<S: Substrate> {
    substrate: S,
    name: String,
    version: u32,
    stores: Vec<StoreSchema>,
    codec: CodecAdapter,
    /// `None` until `open`, and again after `close`.
    catalog: RwLock<Option<Arc<Catalog>>>,
    cache: Mutex<RecordCache>,
    events: Arc<EventBus>,
}

impl<S: Substrate> fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<S: Substrate> Database<S> {
    /// Create a closed handle.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cache` if `options.cache_capacity` is 0.
    pub fn new(substrate: S, options: DatabaseOptions) -> Result<Self> {
        let cache = LruCache::new(options.cache_capacity)?;
        Ok(Self {
            substrate,
            name: options.name,
            version: options.version,
            stores: options.stores,
            codec: CodecAdapter::new(options.codec),
            catalog: RwLock::new(None),
            cache: Mutex::new(cache),
            events: EventBus::new(),
        })
    }

    /// Validate the schemas and open the substrate.
    ///
    /// # Post-conditions
    ///
    /// - every declared store exists in the substrate
    /// - the resolved catalog is installed; requests stop failing with
    ///   `NotOpen`
    pub async fn open(&self) -> Result<()> {
        let catalog = Catalog::build(&self.stores)?;
        self.substrate
            .open(&self.name, self.version, &self.stores)
            .await?;
        *self.catalog.write().map_err(|_| Error::LockPoisoned)? = Some(Arc::new(catalog));
        tracing::info!(
            "opened database '{}' (version {}, {} stores)",
            self.name,
            self.version,
            self.stores.len()
        );
        Ok(())
    }

    /// Close the substrate, clear the cache and drop every subscription.
    pub fn close(&self) {
        self.substrate.close();
        if let Ok(mut catalog) = self.catalog.write() {
            *catalog = None;
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.events.clear();
        tracing::info!("closed database '{}'", self.name);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.catalog
            .read()
            .is_ok_and(|catalog| catalog.is_some())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// The underlying substrate.
    #[must_use]
    pub const fn substrate(&self) -> &S {
        &self.substrate
    }

    /// The declared schema of `store`.
    pub fn schema(&self, store: &str) -> Result<StoreSchema> {
        Ok(self.layout(store)?.schema().clone())
    }

    /// Write one record, returning its primary key.
    ///
    /// Auto-increment keys are filled into the cached and emitted record.
    pub async fn put(&self, store: &str, record: Record) -> Result<Key> {
        let layout = self.layout(store)?;
        let (key, record) = self.write(&layout, record).await?;
        self.notify(store, ChangeAction::Add, ChangePayload::Records(vec![record]));
        Ok(key)
    }

    /// Write records in order, emitting one event for all of them.
    pub async fn put_all(&self, store: &str, records: Vec<Record>) -> Result<Vec<Key>> {
        let layout = self.layout(store)?;
        let mut keys = Vec::with_capacity(records.len());
        let mut written = Vec::with_capacity(records.len());
        let mut outcome = Ok(());
        for record in records {
            match self.write(&layout, record).await {
                Ok((key, record)) => {
                    keys.push(key);
                    written.push(record);
                }
                Err(e) => {
                    tracing::warn!(
                        "put_all on '{store}' failed after {} record(s): {e}",
                        written.len()
                    );
                    outcome = Err(e);
                    break;
                }
            }
        }
        if !written.is_empty() {
            self.notify(store, ChangeAction::Add, ChangePayload::Records(written));
        }
        outcome.map(|()| keys)
    }

    /// Fetch one record by primary key.
    pub async fn get(&self, store: &str, key: &Key) -> Result<Option<Record>> {
        let records = self.get_many(store, std::slice::from_ref(key)).await?;
        Ok(records.into_iter().next())
    }

    /// Fetch records by primary key, in order. Missing keys are skipped.
    pub async fn get_many(&self, store: &str, keys: &[Key]) -> Result<Vec<Record>> {
        let layout = self.layout(store)?;
        self.hydrator().hydrate(&layout, keys).await
    }

    /// Start a read request.
    pub fn query(&self, store: impl Into<String>) -> Query<'_, S> {
        Query::new(self, store)
    }

    /// Start an update applying `patch` to every match.
    pub fn update(&self, store: impl Into<String>, patch: Record) -> Update<'_, S> {
        Update::new(self, store, patch)
    }

    /// Start a remove request.
    pub fn remove(&self, store: impl Into<String>) -> Remove<'_, S> {
        Remove::new(self, store)
    }

    /// Register `handler` for events named `"{store}-{action}"`.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(event, handler)
    }

    /// Number of cached records.
    pub fn cache_len(&self) -> Result<usize> {
        Ok(self.cache()?.len())
    }

    /// Whether a record is cached. Does not change recency.
    pub fn is_cached(&self, store: &str, key: &Key) -> Result<bool> {
        Ok(self.cache()?.contains(&cache_key(store, key)))
    }

    pub(crate) async fn select_keys(&self, store: &str, selection: &Selection) -> Result<Vec<Key>> {
        let layout = self.layout(store)?;
        scan::select_keys(&self.substrate, &layout, selection).await
    }

    pub(crate) async fn select_records(
        &self,
        store: &str,
        selection: &Selection,
    ) -> Result<Vec<Record>> {
        let layout = self.layout(store)?;
        let keys = scan::select_keys(&self.substrate, &layout, selection).await?;
        self.hydrator().hydrate(&layout, &keys).await
    }

    pub(crate) async fn apply_update(
        &self,
        store: &str,
        patch: &Record,
        selection: &Selection,
    ) -> Result<usize> {
        let layout = self.layout(store)?;
        if let Some(field) = patch.keys().find(|field| layout.is_primary(field)) {
            return Err(SchemaError::PrimaryKeyInPatch {
                store: store.to_owned(),
                field: field.as_str().to_owned(),
            }
            .into());
        }

        let keys = scan::select_keys(&self.substrate, &layout, selection).await?;
        let records = self.hydrator().hydrate(&layout, &keys).await?;

        let mut updated = 0;
        let mut outcome = Ok(());
        for mut record in records {
            record.extend(patch.iter().map(|(k, v)| (k.as_str().to_owned(), v.clone())));
            match self.write(&layout, record).await {
                Ok(_) => updated += 1,
                Err(e) => {
                    tracing::warn!("update on '{store}' failed after {updated} record(s): {e}");
                    outcome = Err(e);
                    break;
                }
            }
        }
        if updated > 0 {
            self.notify(store, ChangeAction::Update, ChangePayload::Patch(patch.clone()));
        }
        outcome.map(|()| updated)
    }

    pub(crate) async fn apply_remove(&self, store: &str, selection: &Selection) -> Result<Vec<Key>> {
        let layout = self.layout(store)?;
        let keys = scan::select_keys(&self.substrate, &layout, selection).await?;

        let mut removed = Vec::with_capacity(keys.len());
        let mut outcome = Ok(());
        for key in keys {
            match self.substrate.delete(store, &key).await {
                Ok(()) => {
                    self.cache()?.delete(&cache_key(store, &key));
                    removed.push(key);
                }
                Err(e) => {
                    tracing::warn!(
                        "remove on '{store}' failed after {} record(s): {e}",
                        removed.len()
                    );
                    outcome = Err(e.into());
                    break;
                }
            }
        }
        if !removed.is_empty() {
            self.notify(store, ChangeAction::Remove, ChangePayload::Keys(removed.clone()));
        }
        outcome.map(|()| removed)
    }

    /// Encode and store one record, then refresh its cache entry.
    ///
    /// The cached copy is normalised the way a decode would be, so it reads
    /// the same before and after eviction.
    async fn write(&self, layout: &StoreLayout, record: Record) -> Result<(Key, Record)> {
        let stored = self.codec.encode(layout, &record)?;
        let key = self.substrate.put(layout.name(), stored).await?;
        let mut record = codec::normalize_record(layout, record);
        for (field, part) in layout.primary_key().iter().zip(key.parts()) {
            record
                .entry(field.as_str().to_owned())
                .or_insert_with(|| part.to_value());
        }
        let evicted = self
            .cache()?
            .set(cache_key(layout.name(), &key), record.clone());
        if let Some(((store, _), _)) = evicted {
            tracing::trace!("evicted a '{store}' record from the cache");
        }
        Ok((key, record))
    }

    fn layout(&self, store: &str) -> Result<Arc<StoreLayout>> {
        let catalog = self.catalog.read().map_err(|_| Error::LockPoisoned)?;
        let catalog = catalog.as_ref().ok_or(Error::NotOpen)?;
        catalog
            .get(store)
            .ok_or_else(|| Error::UnknownStore(store.to_owned()))
    }

    fn cache(&self) -> Result<MutexGuard<'_, RecordCache>> {
        self.cache.lock().map_err(|_| Error::LockPoisoned)
    }

    const fn hydrator(&self) -> Hydrator<'_, S> {
        Hydrator {
            substrate: &self.substrate,
            cache: &self.cache,
            codec: &self.codec,
        }
    }

    fn notify(&self, store: &str, action: ChangeAction, payload: ChangePayload) {
        self.events.emit(&ChangeEvent {
            store: store.to_owned(),
            action,
            payload,
        });
    }
}

fn cache_key(store: &str, key: &Key) -> CacheKey {
    (store.to_owned(), key.canonical())
}
