//! Capacity-bounded LRU cache.
//!
//! # Design
//!
//! - A `HashMap` gives O(1) lookups
//! - Each entry carries `prev`/`next` keys forming a doubly-linked list in
//!   recency order (head = most recently used, tail = least recently used)
//! - Eviction happens synchronously inside `set`, one entry at a time
//!
//! The cache is not internally synchronized. The database wraps it in a
//! single `Mutex`, since `get` reorders the list and is therefore a write.
//!
//! # Invariants
//!
//! - `len() <= capacity()` after every public call
//! - The list visits every entry exactly once
//! - `capacity()` is fixed at construction and always > 0

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::types::{CanonicalKey, Record};

/// Default number of records kept by a database cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache key: a store name and a canonical primary key.
pub type CacheKey = (String, CanonicalKey);

/// The cache type owned by a database handle.
pub type RecordCache = LruCache<CacheKey, Record>;

struct Entry<K, V> {
    value: V,
    prev: Option<K>,
    next: Option<K>,
}

/// An LRU cache with a fixed capacity.
pub struct LruCache<K, V> {
    entries: HashMap<K, Entry<K, V>>,
    /// Most recently used.
    head: Option<K>,
    /// Least recently used.
    tail: Option<K>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ZeroCapacity` if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            entries: HashMap::with_capacity(capacity.min(4096)),
            head: None,
            tail: None,
            capacity,
        })
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Look up `key` without changing recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Whether `key` is cached. Does not change recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace `key`, marking it most recently used.
    ///
    /// Returns the evicted entry if the insert pushed the cache over capacity.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            self.touch(&key);
            return None;
        }

        self.entries.insert(
            key.clone(),
            Entry {
                value,
                prev: None,
                next: None,
            },
        );
        self.push_front(&key);

        if self.entries.len() > self.capacity {
            return self.pop_back();
        }
        None
    }

    /// Remove `key`, returning its value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.unlink(key);
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = None;
        self.tail = None;
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    #[must_use]
    pub fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.entries.len());
        let mut cursor = self.head.clone();
        while let Some(key) = cursor {
            cursor = self.entries.get(&key).and_then(|entry| entry.next.clone());
            keys.push(key);
        }
        keys
    }

    fn touch(&mut self, key: &K) {
        if self.head.as_ref() == Some(key) {
            return;
        }
        self.unlink(key);
        self.push_front(key);
    }

    /// Detach `key` from the list. The entry stays in the map.
    fn unlink(&mut self, key: &K) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        let prev = entry.prev.take();
        let next = entry.next.take();

        match &prev {
            Some(p) => {
                if let Some(prev_entry) = self.entries.get_mut(p) {
                    prev_entry.next.clone_from(&next);
                }
            }
            None => self.head.clone_from(&next),
        }
        match &next {
            Some(n) => {
                if let Some(next_entry) = self.entries.get_mut(n) {
                    next_entry.prev.clone_from(&prev);
                }
            }
            None => self.tail = prev,
        }
    }

    /// Attach a detached `key` at the head.
    fn push_front(&mut self, key: &K) {
        let old_head = self.head.replace(key.clone());
        match &old_head {
            Some(h) => {
                if let Some(head_entry) = self.entries.get_mut(h) {
                    head_entry.prev = Some(key.clone());
                }
            }
            None => self.tail = Some(key.clone()),
        }
        if let Some(entry) = self.entries.get_mut(key) {
            entry.prev = None;
            entry.next = old_head;
        }
    }

    fn pop_back(&mut self) -> Option<(K, V)> {
        let key = self.tail.clone()?;
        self.unlink(&key);
        self.entries.remove(&key).map(|entry| (key, entry.value))
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Errors constructing a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// Capacity must be a positive integer.
    ZeroCapacity,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "cache capacity must be a positive integer"),
        }
    }
}

impl std::error::Error for CacheError {}
