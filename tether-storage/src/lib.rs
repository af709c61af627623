//! Tether Storage - Object Cache and Caching Data Access
//!
//! The [`cache`] module holds the identity map; [`Dao`] keeps it in step with
//! an [`EntityStore`]. [`InMemoryStore`] is the bundled store used by tests
//! and by callers that do not need durable rows.

pub mod cache;
pub mod dao;
pub mod store;

pub use cache::{
    Bound, CacheBinding, CacheStats, CacheStrategy, LruStrategy, ObjectCache, StrongStrategy,
    WeakStrategy,
};
pub use dao::{CreateOrUpdateStatus, Dao};
pub use store::{EntityStore, InMemoryStore};
