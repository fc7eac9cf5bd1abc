//! Fingerprint-keyed document cache.
//!
//! A loader's documents are stored in the bucket named by its `loader_type()`
//! under the key returned by its `hash()`. Records carry their creation time
//! and expire after a fixed TTL; expired records are never returned and are
//! deleted in the background the first time they are read.
//!
//! # Degrade to source
//!
//! The cache is an optimisation, never a point of failure. Unkeyable loaders,
//! unreadable records and failed writes are logged and the loader is called
//! as if the cache were absent.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(FingerprintCache::from_settings(&config.cache)?);
//! let loader = CachedLoader::new(transcript_loader, Arc::clone(&cache));
//! let docs = loader.load(&LoadContext::new()).await?;
//! ```

pub mod freshness;
pub mod item;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod read_through;
pub mod traits;

pub use freshness::Ttl;
pub use item::CacheItem;
pub use lmdb_backend::{LmdbBackend, StoreOptions};
pub use memory_backend::MemoryBackend;
pub use read_through::{CachedLoader, FingerprintCache};
pub use traits::{CacheBackend, CacheStats};
