//! Shared entity handles.
//!
//! A [`Managed<T>`] is the in-memory instance callers hold. Cloning a handle
//! clones the reference, not the record, so every clone observes in-place
//! updates made through any other clone. Two handles are the same instance
//! when [`Managed::same_instance`] holds.

use crate::Entity;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Type-erased strong reference to a managed instance.
pub type ErasedEntity = Arc<dyn Any + Send + Sync>;

/// Type-erased weak reference to a managed instance.
pub type WeakErasedEntity = Weak<dyn Any + Send + Sync>;

/// Shared, mutable handle to one entity instance.
pub struct Managed<T> {
    inner: Arc<RwLock<T>>,
}

impl<T: Entity> Managed<T> {
    /// Wrap a freshly built or freshly loaded record.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Shared access to the record.
    ///
    /// A poisoned lock is recovered: a record has no invariants a panicking
    /// writer could leave half-established.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the record.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current field values.
    pub fn snapshot(&self) -> T {
        self.read().clone()
    }

    /// Current primary-key value.
    pub fn id(&self) -> Option<T::Id> {
        self.read().id()
    }

    /// Pointer identity, not value equality.
    pub fn same_instance(&self, other: &Managed<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live strong handles to this instance (including caches).
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Erase the handle's type for storage in an object cache.
    pub fn erase(&self) -> ErasedEntity {
        self.inner.clone()
    }

    /// Recover a typed handle; `None` if the erased value is another type.
    pub fn from_erased(erased: ErasedEntity) -> Option<Self> {
        erased
            .downcast::<RwLock<T>>()
            .ok()
            .map(|inner| Self { inner })
    }
}

impl<T> Clone for Managed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> From<T> for Managed<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Entity + fmt::Debug> fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Managed").field(&*self.read()).finish()
    }
}
