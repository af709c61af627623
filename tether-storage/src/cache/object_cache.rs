//! The object cache: typed access to a strategy behind one mutex.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use tether_core::{
    BindingError, CacheConfig, CacheStrategyKind, Entity, EntityKey, EntityKind, Managed,
    StorageError, TetherResult,
};

use super::binding::{Bound, CacheBinding};
use super::bounded::LruStrategy;
use super::reference::{StrongStrategy, WeakStrategy};
use super::traits::{CacheStats, CacheStrategy};

struct CacheState {
    binding: Option<CacheBinding>,
    strategy: Box<dyn CacheStrategy>,
    stats: CacheStats,
    /// Data-access handles currently using the cache
    attached: usize,
}

impl CacheState {
    fn ensure<T: Entity>(&self) -> TetherResult<()> {
        CacheBinding::ensure(&self.binding, T::kind())
    }
}

/// Identity map from primary key to the live instance of one entity type.
///
/// Shared between handles as `Arc<ObjectCache>`. Every operation, including
/// the binding check, runs under a single mutex.
pub struct ObjectCache {
    state: Mutex<CacheState>,
    strategy_name: &'static str,
    backfill_on_bind: bool,
}

impl ObjectCache {
    /// Create an unbound cache over the given strategy.
    pub fn new(strategy: impl CacheStrategy + 'static) -> Self {
        let strategy_name = strategy.name();
        Self {
            state: Mutex::new(CacheState {
                binding: None,
                strategy: Box::new(strategy),
                stats: CacheStats::default(),
                attached: 0,
            }),
            strategy_name,
            backfill_on_bind: false,
        }
    }

    /// Unbounded cache holding strong references.
    pub fn strong() -> Self {
        Self::new(StrongStrategy::new())
    }

    /// Cache that never keeps an instance alive on its own.
    pub fn weak() -> Self {
        Self::new(WeakStrategy::new())
    }

    /// Cache holding at most `capacity` instances.
    pub fn lru(capacity: NonZeroUsize) -> Self {
        Self::new(LruStrategy::new(capacity))
    }

    /// Build a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> TetherResult<Self> {
        config.validate()?;
        let cache = match config.strategy {
            CacheStrategyKind::Strong => Self::strong(),
            CacheStrategyKind::Weak => Self::weak(),
            CacheStrategyKind::Lru { capacity } => {
                // validate() rejected zero
                let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
                Self::lru(capacity)
            }
        };
        Ok(cache.with_backfill(config.backfill_on_bind))
    }

    /// Load every persisted row when a data-access handle first binds this cache.
    pub fn with_backfill(mut self, enabled: bool) -> Self {
        self.backfill_on_bind = enabled;
        self
    }

    /// Whether a fresh bind loads every persisted row.
    pub fn backfill_on_bind(&self) -> bool {
        self.backfill_on_bind
    }

    /// Name of the retention strategy, as used in logs.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy_name
    }

    fn lock(&self) -> TetherResult<MutexGuard<'_, CacheState>> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned.into())
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Bind the cache to entity type `T`.
    ///
    /// Binding to the type already served is a no-op. Binding a cache that
    /// serves another type fails with [`BindingError::AlreadyBound`] and
    /// changes nothing.
    pub fn bind<T: Entity>(&self) -> TetherResult<Bound> {
        let mut state = self.lock()?;
        self.acquire::<T>(&mut state)
    }

    fn acquire<T: Entity>(&self, state: &mut CacheState) -> TetherResult<Bound> {
        let bound = CacheBinding::acquire(&mut state.binding, T::kind())?;
        if bound == Bound::Fresh {
            state.attached = 0;
            tracing::debug!(
                entity = %T::kind(),
                strategy = self.strategy_name,
                "Object cache bound"
            );
        }
        Ok(bound)
    }

    /// Drop every entry and the binding. Returns the binding that was released.
    ///
    /// Handles still attached see the cache as released and stop using it.
    pub fn unbind(&self) -> TetherResult<Option<CacheBinding>> {
        let mut state = self.lock()?;
        Ok(Self::release(&mut state))
    }

    fn release(state: &mut CacheState) -> Option<CacheBinding> {
        state.strategy.clear();
        state.attached = 0;
        let released = state.binding.take();
        if let Some(binding) = &released {
            tracing::debug!(entity = %binding.kind, "Object cache unbound");
        }
        released
    }

    /// Bind to `T` and register one more data-access handle using the cache.
    pub fn attach<T: Entity>(&self) -> TetherResult<Bound> {
        let mut state = self.lock()?;
        let bound = self.acquire::<T>(&mut state)?;
        state.attached += 1;
        Ok(bound)
    }

    /// Unregister one data-access handle of `T`.
    ///
    /// The last handle to detach unbinds and clears the cache. Returns whether
    /// that happened. A cache not bound to `T` is left alone.
    pub fn detach<T: Entity>(&self) -> TetherResult<bool> {
        let mut state = self.lock()?;
        if state.ensure::<T>().is_err() {
            return Ok(false);
        }
        state.attached = state.attached.saturating_sub(1);
        if state.attached > 0 {
            tracing::trace!(
                entity = %T::kind(),
                remaining = state.attached,
                "Object cache handle detached"
            );
            return Ok(false);
        }
        Self::release(&mut state);
        Ok(true)
    }

    /// Number of data-access handles currently attached.
    pub fn attached_handles(&self) -> TetherResult<usize> {
        Ok(self.lock()?.attached)
    }

    /// The current binding, if any.
    pub fn binding(&self) -> TetherResult<Option<CacheBinding>> {
        Ok(self.lock()?.binding)
    }

    /// Entity type currently served, if any.
    pub fn bound_kind(&self) -> TetherResult<Option<EntityKind>> {
        Ok(self.lock()?.binding.map(|binding| binding.kind))
    }

    pub fn is_bound_to<T: Entity>(&self) -> TetherResult<bool> {
        Ok(self.bound_kind()? == Some(T::kind()))
    }

    /// Fail unless the cache currently serves `T`.
    pub fn ensure_bound<T: Entity>(&self) -> TetherResult<()> {
        self.lock()?.ensure::<T>()
    }

    // ------------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------------

    /// The cached instance for `id`, if present.
    pub fn get<T: Entity>(&self, id: &T::Id) -> TetherResult<Option<Managed<T>>> {
        let mut state = self.lock()?;
        state.ensure::<T>()?;
        let key = id.cache_key();
        match state.strategy.get(&key) {
            Some(erased) => {
                let entity = Managed::from_erased(erased).ok_or_else(|| mismatch::<T>(&state))?;
                state.stats.hits += 1;
                tracing::trace!(entity = %T::kind(), key = %key, "Object cache hit");
                Ok(Some(entity))
            }
            None => {
                state.stats.misses += 1;
                tracing::trace!(entity = %T::kind(), key = %key, "Object cache miss");
                Ok(None)
            }
        }
    }

    /// Associate `id` with `entity`, replacing any previous instance.
    pub fn put<T: Entity>(&self, id: &T::Id, entity: &Managed<T>) -> TetherResult<()> {
        let mut state = self.lock()?;
        state.ensure::<T>()?;
        let evicted = state.strategy.put(id.cache_key(), entity.erase());
        state.stats.insertions += 1;
        if let Some(evicted) = evicted {
            state.stats.evictions += 1;
            tracing::debug!(
                entity = %T::kind(),
                key = %evicted,
                strategy = self.strategy_name,
                "Object cache evicted entry"
            );
        }
        Ok(())
    }

    /// Evict and return the instance cached under `id`.
    pub fn remove<T: Entity>(&self, id: &T::Id) -> TetherResult<Option<Managed<T>>> {
        let mut state = self.lock()?;
        state.ensure::<T>()?;
        match state.strategy.remove(&id.cache_key()) {
            Some(erased) => Managed::from_erased(erased)
                .map(Some)
                .ok_or_else(|| mismatch::<T>(&state)),
            None => Ok(None),
        }
    }

    /// Evict every entry. The binding is kept.
    pub fn clear(&self) -> TetherResult<()> {
        self.lock()?.strategy.clear();
        Ok(())
    }

    /// Number of entries currently present.
    pub fn size(&self) -> TetherResult<usize> {
        Ok(self.lock()?.strategy.len())
    }

    /// Usage counters plus the current entry count.
    pub fn stats(&self) -> TetherResult<CacheStats> {
        let mut state = self.lock()?;
        let entry_count = state.strategy.len() as u64;
        let mut stats = state.stats.clone();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("strategy", &self.strategy_name)
            .field("backfill_on_bind", &self.backfill_on_bind)
            .finish_non_exhaustive()
    }
}

fn mismatch<T: Entity>(state: &CacheState) -> tether_core::TetherError {
    let requested = T::kind();
    let bound = state.binding.map(|b| b.kind).unwrap_or(requested);
    BindingError::TypeMismatch { bound, requested }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::TetherError;
    use tether_test_utils::{Foo, WithId};

    fn bound_strong() -> ObjectCache {
        let cache = ObjectCache::strong();
        cache.bind::<Foo>().unwrap();
        cache
    }

    #[test]
    fn test_get_after_put_returns_same_instance() {
        let cache = bound_strong();
        let foo = Managed::new(Foo::new("hello", 12312321));
        cache.put(&"hello".to_string(), &foo).unwrap();

        let found = cache.get::<Foo>(&"hello".to_string()).unwrap().unwrap();
        assert!(found.same_instance(&foo));
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_put_replaces_previous_instance() {
        let cache = bound_strong();
        let first = Managed::new(Foo::new("k", 1));
        let second = Managed::new(Foo::new("k", 2));
        cache.put(&"k".to_string(), &first).unwrap();
        cache.put(&"k".to_string(), &second).unwrap();

        let found = cache.get::<Foo>(&"k".to_string()).unwrap().unwrap();
        assert!(found.same_instance(&second));
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_remove_returns_prior_value() {
        let cache = bound_strong();
        let foo = Managed::new(Foo::new("k", 1));
        cache.put(&"k".to_string(), &foo).unwrap();

        let removed = cache.remove::<Foo>(&"k".to_string()).unwrap().unwrap();
        assert!(removed.same_instance(&foo));
        assert!(cache.remove::<Foo>(&"k".to_string()).unwrap().is_none());
        assert!(cache.get::<Foo>(&"k".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_clear_keeps_binding() {
        let cache = bound_strong();
        cache
            .put(&"a".to_string(), &Managed::new(Foo::new("a", 1)))
            .unwrap();
        cache
            .put(&"b".to_string(), &Managed::new(Foo::new("b", 2)))
            .unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.size().unwrap(), 0);
        assert!(cache.is_bound_to::<Foo>().unwrap());
    }

    #[test]
    fn test_unbound_cache_rejects_typed_operations() {
        let cache = ObjectCache::strong();
        let err = cache.get::<Foo>(&"a".to_string()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(matches!(
            err,
            TetherError::Binding(BindingError::NotBound { .. })
        ));
    }

    #[test]
    fn test_typed_operation_for_other_type_fails() {
        let cache = bound_strong();
        let with_id = Managed::new(WithId::with_id(1, "stuff"));

        let err = cache.put(&1, &with_id).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(cache.get::<WithId>(&1).unwrap_err().is_invalid_argument());
        assert!(cache.remove::<WithId>(&1).unwrap_err().is_invalid_argument());
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn test_bind_is_exclusive() {
        let cache = bound_strong();
        assert_eq!(cache.bind::<Foo>().unwrap(), Bound::Existing);

        let err = cache.bind::<WithId>().unwrap_err();
        assert!(matches!(
            err,
            TetherError::Binding(BindingError::AlreadyBound { .. })
        ));
        assert_eq!(cache.bound_kind().unwrap(), Some(Foo::kind()));
    }

    #[test]
    fn test_unbind_clears_and_allows_rebind() {
        let cache = bound_strong();
        cache
            .put(&"a".to_string(), &Managed::new(Foo::new("a", 1)))
            .unwrap();

        let released = cache.unbind().unwrap().unwrap();
        assert_eq!(released.kind, Foo::kind());
        assert_eq!(cache.size().unwrap(), 0);
        assert!(cache.binding().unwrap().is_none());

        assert_eq!(cache.bind::<WithId>().unwrap(), Bound::Fresh);
        assert!(cache.is_bound_to::<WithId>().unwrap());
    }

    #[test]
    fn test_weak_cache_forgets_dropped_instances() {
        let cache = ObjectCache::weak();
        cache.bind::<Foo>().unwrap();
        let foo = Managed::new(Foo::new("k", 1));
        cache.put(&"k".to_string(), &foo).unwrap();
        assert_eq!(cache.size().unwrap(), 1);
        assert_eq!(foo.handle_count(), 1);

        drop(foo);
        assert_eq!(cache.size().unwrap(), 0);
        assert!(cache.get::<Foo>(&"k".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_lru_cache_counts_evictions() {
        let cache = ObjectCache::lru(NonZeroUsize::new(1).unwrap());
        cache.bind::<Foo>().unwrap();
        cache
            .put(&"a".to_string(), &Managed::new(Foo::new("a", 1)))
            .unwrap();
        cache
            .put(&"b".to_string(), &Managed::new(Foo::new("b", 2)))
            .unwrap();

        assert!(cache.get::<Foo>(&"a".to_string()).unwrap().is_none());
        assert!(cache.get::<Foo>(&"b".to_string()).unwrap().is_some());

        let stats = cache.stats().unwrap();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.insertions, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_from_config() {
        let cache = ObjectCache::from_config(
            &CacheConfig::new()
                .with_strategy(CacheStrategyKind::Lru { capacity: 8 })
                .with_backfill(true),
        )
        .unwrap();
        assert_eq!(cache.strategy_name(), "lru");
        assert!(cache.backfill_on_bind());

        let weak = ObjectCache::from_config(&CacheConfig::default()).unwrap();
        assert_eq!(weak.strategy_name(), "weak");
        assert!(!weak.backfill_on_bind());

        let err = ObjectCache::from_config(
            &CacheConfig::new().with_strategy(CacheStrategyKind::Lru { capacity: 0 }),
        )
        .unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[test]
    fn test_concurrent_puts_to_distinct_keys_are_not_lost() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(bound_strong());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..50 {
                        let key = format!("{}-{}", t, i);
                        let foo = Managed::new(Foo::new(&key, i));
                        cache.put(&key, &foo).unwrap();
                        kept.push(foo);
                    }
                    kept
                })
            })
            .collect();

        let kept: Vec<Managed<Foo>> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(cache.size().unwrap(), 400);
        for foo in &kept {
            let found = cache.get::<Foo>(&foo.read().id.clone()).unwrap().unwrap();
            assert!(found.same_instance(foo));
        }
    }
}
