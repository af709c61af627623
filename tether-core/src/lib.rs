//! Tether Core - Entity Metadata and Shared Types
//!
//! Everything the object cache and the data-access layer agree on lives here:
//! key values, table/field descriptors, the `Entity` capability, the shared
//! `Managed<T>` handle, the error taxonomy and cache configuration.
//! This crate performs no I/O and holds no cache state.

pub mod config;
pub mod entity;
pub mod error;
pub mod handle;

pub use config::{CacheConfig, CacheStrategyKind, DEFAULT_LRU_CAPACITY};
pub use entity::{CacheKey, Entity, EntityKey, EntityKind, FieldDescriptor, NoKey, TableDescriptor};
pub use error::{BindingError, ConfigError, StorageError, TetherError, TetherResult};
pub use handle::{ErasedEntity, Managed, WeakErasedEntity};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
