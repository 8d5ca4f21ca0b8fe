//! Record cache for Sylva.
//!
//! [`CachingStore`] fronts any [`ObjectStore`](sylva_store::ObjectStore)
//! with a bounded LRU of decoded-ready records. Because records are
//! immutable and content-addressed, cached entries never need
//! invalidation; eviction is purely a memory bound.
//!
//! Errors are the store's own: [`CacheError`] is [`StoreError`].

pub mod caching;

pub use caching::{CacheStats, CachingStore};

pub use sylva_store::StoreError as CacheError;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
