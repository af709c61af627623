//! Caching data-access handle.
//!
//! A [`Dao`] forwards every operation to its [`EntityStore`] and, when an
//! [`ObjectCache`] is bound, keeps that cache consistent with storage so that
//! every caller sees one live instance per primary key:
//!
//! - reads hand out the cached instance when there is one, and cache what
//!   they load otherwise
//! - `update` copies the new field values onto the cached instance in place
//! - `update_id` re-keys the cached instance
//! - deletes evict
//!
//! The cache is only touched after storage reports success. Compound steps
//! (read-then-mutate, remove-then-reinsert) are not atomic with respect to
//! other callers working on the same key.

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use tether_core::{
    BindingError, CacheConfig, Entity, EntityKey, Managed, StorageError, TableDescriptor,
    TetherError, TetherResult,
};

use crate::cache::{Bound, ObjectCache};
use crate::store::{EntityStore, InMemoryStore};

/// Result of [`Dao::create_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOrUpdateStatus {
    pub created: bool,
    pub updated: bool,
    pub lines_changed: usize,
}

/// Data-access handle for entity type `T`.
pub struct Dao<T: Entity, S: EntityStore<T> = InMemoryStore<T>> {
    store: S,
    table: TableDescriptor,
    cache: RwLock<Option<Arc<ObjectCache>>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Dao<T, InMemoryStore<T>> {
    /// Handle over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<T: Entity, S: EntityStore<T>> Dao<T, S> {
    /// Handle over `store` with caching disabled.
    pub fn new(store: S) -> Self {
        Self {
            store,
            table: T::table(),
            cache: RwLock::new(None),
            _entity: PhantomData,
        }
    }

    /// The store every operation is forwarded to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mapping metadata of `T`.
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    // ========================================================================
    // CACHE ENABLE / DISABLE
    // ========================================================================

    /// Enable caching with `cache`, or disable it with `None`.
    ///
    /// - An unbound cache is bound to `T` and, if it was built with backfill,
    ///   loaded with every persisted row.
    /// - A cache already bound to `T` is accepted as is, and may be shared
    ///   with other handles of `T`.
    /// - A cache bound to another type is rejected with an invalid-argument
    ///   error; neither this handle nor the cache changes.
    /// - `None` detaches this handle from its cache. The last handle to detach
    ///   unbinds and clears it; other handles sharing it keep caching.
    ///
    /// Types without a primary-key field are rejected with
    /// [`StorageError::NoPrimaryKey`] before the binding is attempted.
    pub fn set_object_cache(&self, cache: Option<Arc<ObjectCache>>) -> TetherResult<()> {
        let mut slot = self.cache.write().map_err(|_| StorageError::LockPoisoned)?;

        let Some(cache) = cache else {
            if let Some(previous) = slot.take() {
                previous.detach::<T>()?;
                tracing::debug!(entity = %T::kind(), "Object cache disabled");
            }
            return Ok(());
        };

        self.table.id_field()?;
        if let Some(current) = slot.as_ref() {
            if Arc::ptr_eq(current, &cache) && cache.is_bound_to::<T>()? {
                return Ok(());
            }
        }

        let bound = cache.attach::<T>().inspect_err(|e| {
            tracing::warn!(entity = %T::kind(), error = %e, "Object cache refused");
        })?;

        if bound == Bound::Fresh && cache.backfill_on_bind() {
            if let Err(e) = self.backfill(&cache) {
                cache.unbind()?;
                return Err(e);
            }
        }

        if let Some(previous) = slot.replace(Arc::clone(&cache)) {
            if !Arc::ptr_eq(&previous, &cache) {
                previous.detach::<T>()?;
            }
        }
        tracing::debug!(
            entity = %T::kind(),
            strategy = cache.strategy_name(),
            "Object cache enabled"
        );
        Ok(())
    }

    /// Build a cache from `config`, bind it to this handle and return it.
    pub fn enable_object_cache(&self, config: &CacheConfig) -> TetherResult<Arc<ObjectCache>> {
        let cache = Arc::new(ObjectCache::from_config(config)?);
        self.set_object_cache(Some(Arc::clone(&cache)))?;
        Ok(cache)
    }

    /// The cache currently in use, if any.
    pub fn object_cache(&self) -> TetherResult<Option<Arc<ObjectCache>>> {
        Ok(self
            .cache
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone())
    }

    /// Evict every cached instance while keeping caching enabled.
    pub fn clear_object_cache(&self) -> TetherResult<()> {
        if let Some(cache) = self.active_cache()? {
            cache.clear()?;
        }
        Ok(())
    }

    fn backfill(&self, cache: &ObjectCache) -> TetherResult<()> {
        let mut loaded = 0usize;
        for row in self.store.load_all()? {
            if let Some(id) = row.id() {
                cache.put(&id, &Managed::new(row))?;
                loaded += 1;
            }
        }
        tracing::debug!(entity = %T::kind(), rows = loaded, "Object cache backfilled");
        Ok(())
    }

    /// The bound cache, validated for a cached operation on `T`.
    ///
    /// A cache that was unbound behind this handle's back counts as disabled
    /// and is dropped from the handle. Fails with `NoPrimaryKey` if `T` has no
    /// key and with an invalid-argument error if the cache now serves another
    /// type.
    fn active_cache(&self) -> TetherResult<Option<Arc<ObjectCache>>> {
        let Some(cache) = self.object_cache()? else {
            return Ok(None);
        };
        self.table.id_field()?;
        match cache.ensure_bound::<T>() {
            Ok(()) => Ok(Some(cache)),
            Err(TetherError::Binding(BindingError::NotBound { .. })) => {
                self.forget_released(&cache)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn forget_released(&self, cache: &Arc<ObjectCache>) -> TetherResult<()> {
        let mut slot = self.cache.write().map_err(|_| StorageError::LockPoisoned)?;
        if slot.as_ref().is_some_and(|held| Arc::ptr_eq(held, cache)) {
            *slot = None;
            tracing::debug!(
                entity = %T::kind(),
                "Object cache released elsewhere, caching disabled"
            );
        }
        Ok(())
    }

    fn require_id(&self, entity: &Managed<T>, operation: &str) -> TetherResult<T::Id> {
        self.table.id_field()?;
        entity.id().ok_or_else(|| {
            StorageError::MissingId {
                entity: self.table.entity_name().to_string(),
                operation: operation.to_string(),
            }
            .into()
        })
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Persist a new entity. The instance passed in becomes the cached one.
    pub fn create(&self, entity: &Managed<T>) -> TetherResult<usize> {
        let cache = self.active_cache()?;
        let rows = {
            let mut value = entity.write();
            self.store.create(&mut value)?
        };
        if let (Some(cache), true) = (cache, rows > 0) {
            if let Some(id) = entity.id() {
                cache.put(&id, entity)?;
            }
        }
        Ok(rows)
    }

    /// Look up an entity by key, serving the cached instance when present.
    pub fn query_for_id(&self, id: &T::Id) -> TetherResult<Option<Managed<T>>> {
        let cache = self.active_cache()?;
        if let Some(cache) = &cache {
            if let Some(cached) = cache.get::<T>(id)? {
                return Ok(Some(cached));
            }
        }

        let Some(row) = self.store.load(id)? else {
            return Ok(None);
        };
        let entity = Managed::new(row);
        if let Some(cache) = &cache {
            cache.put(id, &entity)?;
        }
        Ok(Some(entity))
    }

    /// Load every entity, substituting cached instances for rows already cached.
    pub fn query_for_all(&self) -> TetherResult<Vec<Managed<T>>> {
        let cache = self.active_cache()?;
        let rows = self.store.load_all()?;
        let Some(cache) = cache else {
            return Ok(rows.into_iter().map(Managed::new).collect());
        };

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(id) = row.id() else {
                results.push(Managed::new(row));
                continue;
            };
            match cache.get::<T>(&id)? {
                Some(cached) => results.push(cached),
                None => {
                    let entity = Managed::new(row);
                    cache.put(&id, &entity)?;
                    results.push(entity);
                }
            }
        }
        Ok(results)
    }

    /// Persist the entity's field values.
    ///
    /// If another instance is cached under the same key, the new values are
    /// copied onto it in place. The instance passed in is not modified.
    pub fn update(&self, entity: &Managed<T>) -> TetherResult<usize> {
        let cache = self.active_cache()?;
        let values = entity.snapshot();
        let rows = self.store.persist_update(&values)?;

        if let (Some(cache), true) = (cache, rows > 0) {
            let id = self.require_id(entity, "update")?;
            if let Some(cached) = cache.get::<T>(&id)? {
                if !cached.same_instance(entity) {
                    cached.write().apply_fields_from(&values);
                }
            }
        }
        Ok(rows)
    }

    /// Change the entity's primary key to `new_id`.
    ///
    /// The instance cached under the old key, if any, is re-keyed and cached
    /// under `new_id`. The instance passed in always receives the new key. If
    /// nothing was cached under the old key no cache entry is created.
    pub fn update_id(&self, entity: &Managed<T>, new_id: T::Id) -> TetherResult<usize> {
        let cache = self.active_cache()?;
        let old_id = self.require_id(entity, "update the id of")?;
        let rows = self.store.persist_key_change(&entity.snapshot(), &new_id)?;
        if rows == 0 {
            return Ok(0);
        }

        if let Some(cache) = cache {
            if let Some(cached) = cache.remove::<T>(&old_id)? {
                if !cached.same_instance(entity) {
                    cached.write().set_id(new_id.clone());
                }
                cache.put(&new_id, &cached)?;
                tracing::trace!(
                    entity = %T::kind(),
                    from = %old_id.cache_key(),
                    to = %new_id.cache_key(),
                    "Object cache entry re-keyed"
                );
            }
        }
        entity.write().set_id(new_id);
        Ok(rows)
    }

    /// Delete the entity's row and evict its key from the cache.
    ///
    /// Callers still holding the instance keep it; it is just no longer served.
    pub fn delete(&self, entity: &Managed<T>) -> TetherResult<usize> {
        let cache = self.active_cache()?;
        let rows = self.store.persist_delete(&entity.snapshot())?;
        if let (Some(cache), true) = (cache, rows > 0) {
            let id = self.require_id(entity, "delete")?;
            cache.remove::<T>(&id)?;
        }
        Ok(rows)
    }

    /// Delete the row with key `id` and evict it from the cache.
    pub fn delete_by_id(&self, id: &T::Id) -> TetherResult<usize> {
        let cache = self.active_cache()?;
        let rows = self.store.delete_by_id(id)?;
        if let (Some(cache), true) = (cache, rows > 0) {
            cache.remove::<T>(id)?;
        }
        Ok(rows)
    }

    /// Delete every row in `ids`. Returns the total rows affected.
    pub fn delete_ids(&self, ids: &[T::Id]) -> TetherResult<usize> {
        let mut rows = 0;
        for id in ids {
            rows += self.delete_by_id(id)?;
        }
        Ok(rows)
    }

    /// Reload the entity's row and copy the stored values onto it.
    ///
    /// A different instance cached under the same key is refreshed as well.
    /// Returns 0 if the row no longer exists.
    pub fn refresh(&self, entity: &Managed<T>) -> TetherResult<usize> {
        let cache = self.active_cache()?;
        let id = self.require_id(entity, "refresh")?;
        let Some(stored) = self.store.load(&id)? else {
            return Ok(0);
        };

        entity.write().apply_fields_from(&stored);
        if let Some(cache) = cache {
            if let Some(cached) = cache.get::<T>(&id)? {
                if !cached.same_instance(entity) {
                    cached.write().apply_fields_from(&stored);
                }
            }
        }
        Ok(1)
    }

    /// Create the entity if its key is unassigned or absent from storage,
    /// otherwise update it.
    pub fn create_or_update(&self, entity: &Managed<T>) -> TetherResult<CreateOrUpdateStatus> {
        let exists = match entity.id() {
            Some(id) => self.id_exists(&id)?,
            None => false,
        };
        if exists {
            let lines_changed = self.update(entity)?;
            Ok(CreateOrUpdateStatus {
                created: false,
                updated: true,
                lines_changed,
            })
        } else {
            let lines_changed = self.create(entity)?;
            Ok(CreateOrUpdateStatus {
                created: true,
                updated: false,
                lines_changed,
            })
        }
    }

    /// Return the stored instance for the entity's key, creating the entity
    /// when there is none.
    pub fn create_if_not_exists(&self, entity: &Managed<T>) -> TetherResult<Managed<T>> {
        if let Some(id) = entity.id() {
            if let Some(existing) = self.query_for_id(&id)? {
                return Ok(existing);
            }
        }
        self.create(entity)?;
        Ok(entity.clone())
    }

    /// Whether a row with key `id` exists. Never consults the cache.
    pub fn id_exists(&self, id: &T::Id) -> TetherResult<bool> {
        self.store.id_exists(id)
    }

    /// Number of stored rows. Never consults the cache.
    pub fn count_of(&self) -> TetherResult<usize> {
        self.store.count()
    }
}

/// Dropping a handle detaches it from its cache like `set_object_cache(None)`.
impl<T: Entity, S: EntityStore<T>> Drop for Dao<T, S> {
    fn drop(&mut self) {
        let slot = match self.cache.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cache) = slot.take() {
            if let Err(e) = cache.detach::<T>() {
                tracing::warn!(entity = %T::kind(), error = %e, "Object cache detach failed on drop");
            }
        }
    }
}

impl<T: Entity, S: EntityStore<T>> std::fmt::Debug for Dao<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("entity", &self.table.entity_name())
            .field("table", &self.table.table_name())
            .finish_non_exhaustive()
    }
}
