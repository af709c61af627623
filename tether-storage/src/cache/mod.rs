//! Object cache with single-entity-type binding and pluggable retention.
//!
//! An [`ObjectCache`] maps primary keys to the live in-memory instance of an
//! entity, so every lookup through a cache-enabled [`Dao`](crate::Dao) hands
//! out the same [`Managed<T>`](tether_core::Managed) handle.
//!
//! # Binding
//!
//! A cache serves exactly one entity type at a time. The binding is recorded
//! inside the cache itself and guarded by the same mutex as the entries, so a
//! cache shared between handles can never mix keys of unrelated types that
//! happen to use the same key representation.
//!
//! # Retention
//!
//! How long entries live is decided by the [`CacheStrategy`] chosen at
//! construction:
//!
//! - [`StrongStrategy`]: until removed or cleared
//! - [`WeakStrategy`]: until every caller handle is dropped
//! - [`LruStrategy`]: until pushed out by newer entries past capacity
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(ObjectCache::strong());
//! dao.set_object_cache(Some(Arc::clone(&cache)))?;
//!
//! dao.create(&foo)?;
//! let found = dao.query_for_id(&"hello".to_string())?.unwrap();
//! assert!(found.same_instance(&foo));
//! ```

pub mod binding;
pub mod bounded;
pub mod object_cache;
pub mod reference;
pub mod traits;

pub use binding::{Bound, CacheBinding};
pub use bounded::LruStrategy;
pub use object_cache::ObjectCache;
pub use reference::{StrongStrategy, WeakStrategy};
pub use traits::{CacheStats, CacheStrategy};
