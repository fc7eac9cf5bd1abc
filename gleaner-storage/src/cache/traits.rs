//! Cache backend trait and cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use gleaner_core::GleanerResult;

/// Bucketed byte store underneath [`FingerprintCache`](super::FingerprintCache).
///
/// Buckets are namespaces created on first write. Values are opaque to the
/// backend; the cache layer owns the record format.
///
/// Methods are blocking. Implementations must be safe for concurrent use:
/// reads may run in parallel, writes are serialized by the backend.
pub trait CacheBackend: Send + Sync + 'static {
    /// Read a value. A missing bucket or key is `Ok(None)`.
    fn get(&self, bucket: &str, key: &[u8]) -> GleanerResult<Option<Vec<u8>>>;

    /// Write a value, creating the bucket if needed. Replaces any previous value.
    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> GleanerResult<()>;

    /// Remove a value. Returns whether anything was removed.
    fn delete(&self, bucket: &str, key: &[u8]) -> GleanerResult<bool>;

    /// Remove a value only if `predicate` accepts its current bytes, checked
    /// and applied atomically.
    fn delete_if(
        &self,
        bucket: &str,
        key: &[u8],
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> GleanerResult<bool>;

    /// Remove every value in a bucket. Returns the number removed.
    fn clear_bucket(&self, bucket: &str) -> GleanerResult<u64>;

    /// Release the underlying resources.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the loader (includes expired and errors).
    pub misses: u64,
    /// Entries found past their TTL.
    pub expired: u64,
    /// Lookups that failed to read or decode and were treated as misses.
    pub read_errors: u64,
    /// Successful writes after a fresh load.
    pub writes: u64,
    /// Writes that failed and were skipped.
    pub write_errors: u64,
    /// Loads that skipped the cache because the loader could not be keyed.
    pub bypassed: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub expired: AtomicU64,
    pub read_errors: AtomicU64,
    pub writes: AtomicU64,
    pub write_errors: AtomicU64,
    pub bypassed: AtomicU64,
}

impl CacheCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
        }
    }
}
