//! Entity-type binding of an object cache.

use chrono::Utc;
use tether_core::{BindingError, EntityKind, TetherResult, Timestamp};

/// The entity type a cache currently serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBinding {
    /// Bound entity type
    pub kind: EntityKind,
    /// When the binding was established
    pub bound_at: Timestamp,
}

/// Outcome of a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// The cache was unbound and now serves the requested type.
    Fresh,
    /// The cache already served the requested type; nothing changed.
    Existing,
}

impl CacheBinding {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            bound_at: Utc::now(),
        }
    }

    /// Bind `slot` to `requested`.
    ///
    /// A slot bound to another type is left untouched and the bind fails.
    pub(crate) fn acquire(slot: &mut Option<CacheBinding>, requested: EntityKind) -> TetherResult<Bound> {
        match slot {
            None => {
                *slot = Some(CacheBinding::new(requested));
                Ok(Bound::Fresh)
            }
            Some(binding) if binding.kind == requested => Ok(Bound::Existing),
            Some(binding) => Err(BindingError::AlreadyBound {
                bound: binding.kind,
                requested,
            }
            .into()),
        }
    }

    /// Check that `slot` serves `requested` before a typed cache operation.
    pub(crate) fn ensure(slot: &Option<CacheBinding>, requested: EntityKind) -> TetherResult<()> {
        match slot {
            None => Err(BindingError::NotBound { requested }.into()),
            Some(binding) if binding.kind == requested => Ok(()),
            Some(binding) => Err(BindingError::TypeMismatch {
                bound: binding.kind,
                requested,
            }
            .into()),
        }
    }
}
