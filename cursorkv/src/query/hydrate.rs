//! Hydration: primary keys to records, cache first.
//!
//! 1. One pass over the cache under a single lock splits keys into hits and
//!    misses.
//! 2. Misses are fetched from the substrate concurrently.
//! 3. Fetched rows are decoded and inserted into the cache.
//!
//! Keys the substrate no longer holds are dropped from the output. Any
//! substrate or codec failure fails the whole call. Output order follows the
//! input keys.

use std::sync::Mutex;

use futures::future::try_join_all;

use crate::cache::RecordCache;
use crate::codec::CodecAdapter;
use crate::error::{Error, Result};
use crate::storage::Substrate;
use crate::types::{Key, Record, StoreLayout};

/// Everything hydration needs besides the keys.
pub struct Hydrator<'a, S> {
    pub substrate: &'a S,
    pub cache: &'a Mutex<RecordCache>,
    pub codec: &'a CodecAdapter,
}

impl<S: Substrate> Hydrator<'_, S> {
    /// Load the records for `keys`, in order.
    pub async fn hydrate(&self, layout: &StoreLayout, keys: &[Key]) -> Result<Vec<Record>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let store = layout.name();

        let mut slots = self.lookup(store, keys)?;
        let misses: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_none().then_some(i))
            .collect();
        let hits = keys.len() - misses.len();

        let fetched = try_join_all(
            misses
                .iter()
                .map(|&i| self.substrate.get(store, &keys[i])),
        )
        .await?;

        let mut loaded = Vec::with_capacity(fetched.len());
        for (&i, stored) in misses.iter().zip(fetched) {
            if let Some(stored) = stored {
                loaded.push((i, self.codec.decode(layout, stored)?));
            }
        }
        self.fill(store, keys, &loaded)?;

        tracing::debug!(
            "hydrated {} key(s) from '{store}': {hits} cache hit(s), {} miss(es), {} absent",
            keys.len(),
            misses.len(),
            misses.len() - loaded.len()
        );

        for (i, record) in loaded {
            slots[i] = Some(record);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn lookup(&self, store: &str, keys: &[Key]) -> Result<Vec<Option<Record>>> {
        let mut cache = self.cache.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(keys
            .iter()
            .map(|key| {
                cache
                    .get(&(store.to_owned(), key.canonical()))
                    .cloned()
            })
            .collect())
    }

    fn fill(&self, store: &str, keys: &[Key], loaded: &[(usize, Record)]) -> Result<()> {
        let mut cache = self.cache.lock().map_err(|_| Error::LockPoisoned)?;
        for (i, record) in loaded {
            let evicted = cache.set((store.to_owned(), keys[*i].canonical()), record.clone());
            if let Some(((evicted_store, _), _)) = evicted {
                tracing::trace!("evicted a '{evicted_store}' record from the cache");
            }
        }
        Ok(())
    }
}
