//! In-memory read cache for catalog queries.
//!
//! This module provides:
//! - Namespaced entries with typed keys (one key constructor per read)
//! - Single-flight computation on a miss
//! - Time-to-live expiry and a global LRU entry bound
//! - Key and whole-namespace eviction that later reads always observe

mod keys;
mod layer;
mod traits;

pub use keys::{CacheKey, Namespace};
pub use layer::{ReadCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
pub use traits::{CachedValue, Cacheable};
