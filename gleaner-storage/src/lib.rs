//! Gleaner Storage - Expiring Document Cache
//!
//! Memoizes loader output in a single LMDB file so repeated fetches of the
//! same source skip the network. See [`cache`] for the record lifecycle.

pub mod cache;

pub use cache::{
    CacheBackend, CacheItem, CacheStats, CachedLoader, FingerprintCache, LmdbBackend,
    MemoryBackend, StoreOptions, Ttl,
};
