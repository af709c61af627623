//! Reference-holding strategies: strong and weak maps.

use std::collections::HashMap;
use std::sync::Arc;

use tether_core::{CacheKey, ErasedEntity, WeakErasedEntity};

use super::traits::CacheStrategy;

/// Unbounded map holding strong references.
///
/// Entries live until removed or cleared. This is the only strategy whose
/// retention is fully under the cache owner's control.
#[derive(Default)]
pub struct StrongStrategy {
    entries: HashMap<CacheKey, ErasedEntity>,
}

impl StrongStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStrategy for StrongStrategy {
    fn name(&self) -> &'static str {
        "strong"
    }

    fn get(&mut self, key: &CacheKey) -> Option<ErasedEntity> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CacheKey, entity: ErasedEntity) -> Option<CacheKey> {
        self.entries.insert(key, entity);
        None
    }

    fn remove(&mut self, key: &CacheKey) -> Option<ErasedEntity> {
        self.entries.remove(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&mut self) -> usize {
        self.entries.len()
    }
}

/// Entry count below which `put` never sweeps dead entries.
const WEAK_SWEEP_FLOOR: usize = 64;

/// Map of weak references.
///
/// The cache never keeps an instance alive on its own: once the last caller
/// handle is dropped the entry is dead. Dead entries are pruned on the next
/// `get` of that key, on `len`, and by `put` whenever the map has doubled
/// since the last sweep.
pub struct WeakStrategy {
    entries: HashMap<CacheKey, WeakErasedEntity>,
    sweep_at: usize,
}

impl Default for WeakStrategy {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: WEAK_SWEEP_FLOOR,
        }
    }
}

impl WeakStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.sweep_at = (self.entries.len() * 2).max(WEAK_SWEEP_FLOOR);
    }
}

impl CacheStrategy for WeakStrategy {
    fn name(&self) -> &'static str {
        "weak"
    }

    fn get(&mut self, key: &CacheKey) -> Option<ErasedEntity> {
        let live = self.entries.get(key)?.upgrade();
        if live.is_none() {
            self.entries.remove(key);
        }
        live
    }

    fn put(&mut self, key: CacheKey, entity: ErasedEntity) -> Option<CacheKey> {
        self.entries.insert(key, Arc::downgrade(&entity));
        if self.entries.len() >= self.sweep_at {
            self.prune();
        }
        None
    }

    fn remove(&mut self, key: &CacheKey) -> Option<ErasedEntity> {
        self.entries.remove(key).and_then(|weak| weak.upgrade())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }
}
