//! Storage collaborator: the row-level interface the caching handle sits in
//! front of, plus an in-memory implementation.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tether_core::{CacheKey, Entity, EntityKey, StorageError, TableDescriptor, TetherResult};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Row storage for one entity type.
///
/// Implementations persist values: every load deserializes a fresh record,
/// and none of these calls know about object caches. Counts are rows affected.
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Insert a row. Assigns the key when it is store-generated and unset.
    fn create(&self, entity: &mut T) -> TetherResult<usize>;

    /// Load one row by key.
    fn load(&self, id: &T::Id) -> TetherResult<Option<T>>;

    /// Load every row.
    fn load_all(&self) -> TetherResult<Vec<T>>;

    /// Write the entity's current field values to the row with its key.
    fn persist_update(&self, entity: &T) -> TetherResult<usize>;

    /// Move the entity's row from its current key to `new_id`.
    fn persist_key_change(&self, entity: &T, new_id: &T::Id) -> TetherResult<usize>;

    /// Delete the row with the entity's key.
    fn persist_delete(&self, entity: &T) -> TetherResult<usize>;

    /// Delete the row with key `id`.
    fn delete_by_id(&self, id: &T::Id) -> TetherResult<usize>;

    /// Number of rows.
    fn count(&self) -> TetherResult<usize>;

    /// Whether a row with key `id` exists.
    fn id_exists(&self, id: &T::Id) -> TetherResult<bool> {
        Ok(self.load(id)?.is_some())
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory row store.
///
/// Keyed rows are ordered by key, so `load_all` is deterministic. Rows of
/// key-less types are kept in insertion order and only reachable through
/// `load_all` and `count`.
#[derive(Debug)]
pub struct InMemoryStore<T: Entity> {
    table: TableDescriptor,
    rows: RwLock<BTreeMap<CacheKey, T>>,
    unkeyed: RwLock<Vec<T>>,
    sequence: AtomicI64,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> InMemoryStore<T> {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            table: T::table(),
            rows: RwLock::new(BTreeMap::new()),
            unkeyed: RwLock::new(Vec::new()),
            sequence: AtomicI64::new(0),
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    /// Clear all stored rows.
    pub fn clear(&self) -> TetherResult<()> {
        self.write_rows()?.clear();
        self.unkeyed.write().map_err(|_| StorageError::LockPoisoned)?.clear();
        Ok(())
    }

    fn read_rows(&self) -> TetherResult<RwLockReadGuard<'_, BTreeMap<CacheKey, T>>> {
        self.rows.read().map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write_rows(&self) -> TetherResult<RwLockWriteGuard<'_, BTreeMap<CacheKey, T>>> {
        self.rows.write().map_err(|_| StorageError::LockPoisoned.into())
    }

    fn entity_name(&self) -> String {
        self.table.entity_name().to_string()
    }

    /// Key of `entity` for a key-dependent operation.
    fn require_id(&self, entity: &T, operation: &str) -> TetherResult<T::Id> {
        self.table.id_field()?;
        entity.id().ok_or_else(|| {
            StorageError::MissingId {
                entity: self.entity_name(),
                operation: operation.to_string(),
            }
            .into()
        })
    }

    /// The key the next generated insert would receive. Nothing is reserved;
    /// `create` commits the sequence under the row lock once the insert is
    /// certain to succeed.
    fn peek_generated_id(&self) -> TetherResult<T::Id> {
        let insert_failed = |reason: String| StorageError::InsertFailed {
            entity: self.entity_name(),
            reason,
        };
        let next = self
            .sequence
            .load(Ordering::SeqCst)
            .checked_add(1)
            .ok_or_else(|| insert_failed("key sequence exhausted".to_string()))?;
        <T::Id as EntityKey>::from_sequence(next).ok_or_else(|| {
            insert_failed(format!("cannot generate a key from sequence value {}", next)).into()
        })
    }
}

impl<T: Entity> EntityStore<T> for InMemoryStore<T> {
    fn create(&self, entity: &mut T) -> TetherResult<usize> {
        let Ok(id_field) = self.table.id_field() else {
            self.unkeyed
                .write()
                .map_err(|_| StorageError::LockPoisoned)?
                .push(entity.clone());
            return Ok(1);
        };

        let mut rows = self.write_rows()?;
        let (id, generated) = match entity.id() {
            Some(id) => (id, false),
            None if id_field.generated_id => (self.peek_generated_id()?, true),
            None => {
                return Err(StorageError::MissingId {
                    entity: self.entity_name(),
                    operation: "create".to_string(),
                }
                .into())
            }
        };

        let key = id.cache_key();
        if rows.contains_key(&key) {
            return Err(StorageError::InsertFailed {
                entity: self.entity_name(),
                reason: format!("key {} already exists", key),
            }
            .into());
        }
        if let CacheKey::Int(n) = key {
            // keep generated keys clear of explicitly assigned ones
            self.sequence.fetch_max(n, Ordering::SeqCst);
        }
        if generated {
            entity.set_id(id);
        }
        rows.insert(key, entity.clone());
        Ok(1)
    }

    fn load(&self, id: &T::Id) -> TetherResult<Option<T>> {
        self.table.id_field()?;
        Ok(self.read_rows()?.get(&id.cache_key()).cloned())
    }

    fn load_all(&self) -> TetherResult<Vec<T>> {
        let mut all: Vec<T> = self.read_rows()?.values().cloned().collect();
        all.extend(
            self.unkeyed
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .iter()
                .cloned(),
        );
        Ok(all)
    }

    fn persist_update(&self, entity: &T) -> TetherResult<usize> {
        let id = self.require_id(entity, "update")?;
        let mut rows = self.write_rows()?;
        match rows.get_mut(&id.cache_key()) {
            Some(row) => {
                *row = entity.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn persist_key_change(&self, entity: &T, new_id: &T::Id) -> TetherResult<usize> {
        let old_id = self.require_id(entity, "update the id of")?;
        let old_key = old_id.cache_key();
        let new_key = new_id.cache_key();

        let mut rows = self.write_rows()?;
        if !rows.contains_key(&old_key) {
            return Ok(0);
        }
        if old_key != new_key && rows.contains_key(&new_key) {
            return Err(StorageError::UpdateFailed {
                entity: self.entity_name(),
                key: old_key.to_string(),
                reason: format!("key {} already exists", new_key),
            }
            .into());
        }

        let mut row = rows.remove(&old_key).unwrap_or_else(|| entity.clone());
        row.set_id(new_id.clone());
        if let CacheKey::Int(n) = new_key {
            self.sequence.fetch_max(n, Ordering::SeqCst);
        }
        rows.insert(new_key, row);
        Ok(1)
    }

    fn persist_delete(&self, entity: &T) -> TetherResult<usize> {
        let id = self.require_id(entity, "delete")?;
        self.delete_by_id(&id)
    }

    fn delete_by_id(&self, id: &T::Id) -> TetherResult<usize> {
        self.table.id_field()?;
        Ok(self.write_rows()?.remove(&id.cache_key()).map_or(0, |_| 1))
    }

    fn count(&self) -> TetherResult<usize> {
        let unkeyed = self
            .unkeyed
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .len();
        Ok(self.read_rows()?.len() + unkeyed)
    }

    fn id_exists(&self, id: &T::Id) -> TetherResult<bool> {
        self.table.id_field()?;
        Ok(self.read_rows()?.contains_key(&id.cache_key()))
    }
}
