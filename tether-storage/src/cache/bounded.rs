//! Capacity-bounded strategy with least-recently-used eviction.

use std::num::NonZeroUsize;

use lru::LruCache;
use tether_core::{CacheKey, ErasedEntity};

use super::traits::CacheStrategy;

/// Bounded map holding strong references.
///
/// Both `get` and `put` count as a use. When a `put` of a new key would exceed
/// the capacity, the least recently used entry is evicted.
pub struct LruStrategy {
    entries: LruCache<CacheKey, ErasedEntity>,
}

impl LruStrategy {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.cap()
    }
}

impl CacheStrategy for LruStrategy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn get(&mut self, key: &CacheKey) -> Option<ErasedEntity> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CacheKey, entity: ErasedEntity) -> Option<CacheKey> {
        let inserted = key.clone();
        match self.entries.push(key, entity) {
            Some((displaced, _)) if displaced != inserted => Some(displaced),
            _ => None,
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<ErasedEntity> {
        self.entries.pop(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&mut self) -> usize {
        self.entries.len()
    }
}
