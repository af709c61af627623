//! Cache strategy trait and usage statistics.
//!
//! This module defines the trait that retention strategies implement. The
//! binding and data-access logic only ever talk to this trait, never to a
//! concrete strategy.

use tether_core::{CacheKey, ErasedEntity};

/// Retention strategy behind an [`ObjectCache`](super::ObjectCache).
///
/// Strategies store type-erased handles keyed by [`CacheKey`]. They are only
/// ever called with the owning cache's mutex held, so they take `&mut self`
/// and need no locking of their own.
pub trait CacheStrategy: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Look up a live entry. May update recency or prune a dead entry.
    fn get(&mut self, key: &CacheKey) -> Option<ErasedEntity>;

    /// Associate `key` with `entity`, replacing any previous association.
    ///
    /// Returns the key of an entry evicted to make room, if any. Replacing the
    /// entry under `key` itself is not an eviction.
    fn put(&mut self, key: CacheKey, entity: ErasedEntity) -> Option<CacheKey>;

    /// Remove and return the live entry under `key`.
    fn remove(&mut self, key: &CacheKey) -> Option<ErasedEntity>;

    /// Drop every entry.
    fn clear(&mut self);

    /// Number of live entries.
    fn len(&mut self) -> usize;

    fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

/// Counters kept by an [`ObjectCache`](super::ObjectCache) since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Typed lookups that returned a live instance
    pub hits: u64,
    /// Typed lookups that found nothing
    pub misses: u64,
    /// Calls to `put`, including replacements
    pub insertions: u64,
    /// Entries pushed out by a bounded strategy
    pub evictions: u64,
    /// Live entries at the time the snapshot was taken
    pub entry_count: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups served from the cache; 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.lookups(), 4);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
