//! In-memory cache backend with fault injection, for tests and ephemeral use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use gleaner_core::{GleanerResult, StorageError};

use super::traits::CacheBackend;

type Buckets = HashMap<String, HashMap<Vec<u8>, Vec<u8>>>;

/// Process-local backend. Nothing survives the process.
///
/// `fail_reads` / `fail_writes` make every subsequent read or write return a
/// storage error, which is how the cache's degrade-to-source paths are tested.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    buckets: RwLock<Buckets>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of entries in `bucket`.
    pub fn len(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .map(|b| b.get(bucket).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets
            .read()
            .map(|b| b.values().all(HashMap::is_empty))
            .unwrap_or(true)
    }

    /// Raw access that bypasses fault injection.
    pub fn raw_get(&self, bucket: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .ok()
            .and_then(|b| b.get(bucket).and_then(|entries| entries.get(key).cloned()))
    }

    /// Raw write that bypasses fault injection.
    pub fn raw_put(&self, bucket: &str, key: &[u8], value: &[u8]) {
        if let Ok(mut buckets) = self.buckets.write() {
            buckets
                .entry(bucket.to_string())
                .or_default()
                .insert(key.to_vec(), value.to_vec());
        }
    }

    fn check_reads(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Transaction {
                reason: "injected read failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Transaction {
                reason: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

fn poisoned() -> StorageError {
    StorageError::Transaction {
        reason: "memory backend lock poisoned".to_string(),
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, bucket: &str, key: &[u8]) -> GleanerResult<Option<Vec<u8>>> {
        self.check_reads()?;
        let buckets = self.buckets.read().map_err(|_| poisoned())?;
        Ok(buckets
            .get(bucket)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> GleanerResult<()> {
        self.check_writes()?;
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> GleanerResult<bool> {
        self.check_writes()?;
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        Ok(buckets
            .get_mut(bucket)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    fn delete_if(
        &self,
        bucket: &str,
        key: &[u8],
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> GleanerResult<bool> {
        self.check_writes()?;
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        let Some(entries) = buckets.get_mut(bucket) else {
            return Ok(false);
        };
        if entries.get(key).is_some_and(|v| predicate(v.as_slice())) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    fn clear_bucket(&self, bucket: &str) -> GleanerResult<u64> {
        self.check_writes()?;
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        Ok(buckets
            .remove(bucket)
            .map_or(0, |entries| entries.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty());
        backend.put("web", b"k", b"v").unwrap();
        assert_eq!(backend.get("web", b"k").unwrap().unwrap(), b"v");
        assert_eq!(backend.len("web"), 1);
        assert!(backend.delete("web", b"k").unwrap());
        assert!(backend.get("web", b"k").unwrap().is_none());
    }

    #[test]
    fn test_injected_failures() {
        let backend = MemoryBackend::new();
        backend.raw_put("web", b"k", b"v");

        backend.fail_reads(true);
        assert!(backend.get("web", b"k").is_err());
        assert_eq!(backend.raw_get("web", b"k").unwrap(), b"v");

        backend.fail_writes(true);
        assert!(backend.put("web", b"k2", b"v2").is_err());
        assert!(backend.raw_get("web", b"k2").is_none());

        backend.fail_reads(false);
        backend.fail_writes(false);
        backend.put("web", b"k2", b"v2").unwrap();
        assert_eq!(backend.get("web", b"k2").unwrap().unwrap(), b"v2");
    }

    #[test]
    fn test_delete_if_and_clear() {
        let backend = MemoryBackend::new();
        backend.put("reddit", b"a", b"1").unwrap();
        backend.put("reddit", b"b", b"2").unwrap();

        assert!(!backend.delete_if("reddit", b"a", &|v| v == b"2").unwrap());
        assert!(backend.delete_if("reddit", b"a", &|v| v == b"1").unwrap());
        assert_eq!(backend.clear_bucket("reddit").unwrap(), 1);
        assert_eq!(backend.len("reddit"), 0);
    }
}
