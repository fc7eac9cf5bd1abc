//! LMDB-backed cache storage.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep the whole cache in a
//! single memory-mapped file. Each bucket is a named LMDB database, created
//! on first write.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions with one writer and many concurrent
//! readers. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `put`, `delete`, `delete_if` and `clear_bucket`

use std::path::{Path, PathBuf};

use gleaner_core::{CacheSettings, GleanerResult, StorageError};
use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn};

use super::traits::CacheBackend;

/// Sizing options for the LMDB environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Maximum size of the memory map in megabytes.
    pub max_size_mb: usize,
    /// Maximum number of buckets (named databases).
    pub max_buckets: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_size_mb: 256,
            max_buckets: 64,
        }
    }
}

impl From<&CacheSettings> for StoreOptions {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_size_mb: settings.max_size_mb,
            max_buckets: settings.max_buckets,
        }
    }
}

fn txn_err(e: heed::Error) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

/// LMDB cache file.
///
/// # Example
///
/// ```ignore
/// let backend = LmdbBackend::open("/var/cache/gleaner/cache.db", StoreOptions::default())?;
/// backend.put("youtube", &key, &bytes)?;
/// let cached = backend.get("youtube", &key)?;
/// ```
pub struct LmdbBackend {
    env: Env,
    path: PathBuf,
}

impl LmdbBackend {
    /// Open (or create) the cache file at `path`.
    ///
    /// The parent directory is created if missing. LMDB also keeps a
    /// `<path>-lock` file next to the data file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parent directory cannot be created
    /// - The LMDB environment cannot be opened (including when this process
    ///   already has the same file open)
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> GleanerResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StorageError::from)?;
        }

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.max_size_mb * 1024 * 1024)
                .max_dbs(options.max_buckets)
                .flags(EnvFlags::NO_SUB_DIR)
                .open(path)
        }
        .map_err(|e| StorageError::EnvOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(path = %path.display(), "Opened cache file");

        Ok(Self {
            env,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` is present in `bucket`, regardless of freshness.
    pub fn contains(&self, bucket: &str, key: &[u8]) -> GleanerResult<bool> {
        Ok(self.get(bucket, key)?.is_some())
    }

    /// Number of entries stored in `bucket`.
    pub fn len(&self, bucket: &str) -> GleanerResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.open_bucket(&rtxn, bucket)? {
            Some(db) => Ok(db.len(&rtxn).map_err(txn_err)?),
            None => Ok(0),
        }
    }

    fn open_bucket(&self, txn: &RoTxn, bucket: &str) -> GleanerResult<Option<Database<Bytes, Bytes>>> {
        check_bucket_name(bucket)?;
        Ok(self
            .env
            .open_database::<Bytes, Bytes>(txn, Some(bucket))
            .map_err(txn_err)?)
    }
}

fn check_bucket_name(bucket: &str) -> Result<(), StorageError> {
    if bucket.is_empty() {
        return Err(StorageError::BucketName {
            bucket: bucket.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if bucket.contains('\0') {
        return Err(StorageError::BucketName {
            bucket: bucket.to_string(),
            reason: "must not contain NUL".to_string(),
        });
    }
    Ok(())
}

impl CacheBackend for LmdbBackend {
    fn get(&self, bucket: &str, key: &[u8]) -> GleanerResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let Some(db) = self.open_bucket(&rtxn, bucket)? else {
            return Ok(None);
        };
        let value = db.get(&rtxn, key).map_err(txn_err)?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> GleanerResult<()> {
        check_bucket_name(bucket)?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = self
            .env
            .create_database(&mut wtxn, Some(bucket))
            .map_err(txn_err)?;
        db.put(&mut wtxn, key, value).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> GleanerResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let Some(db) = self.open_bucket(&wtxn, bucket)? else {
            return Ok(false);
        };
        let deleted = db.delete(&mut wtxn, key).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn delete_if(
        &self,
        bucket: &str,
        key: &[u8],
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> GleanerResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let Some(db) = self.open_bucket(&wtxn, bucket)? else {
            return Ok(false);
        };
        let matches = match db.get(&wtxn, key).map_err(txn_err)? {
            Some(bytes) => predicate(bytes),
            None => false,
        };
        if !matches {
            return Ok(false);
        }
        let deleted = db.delete(&mut wtxn, key).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn clear_bucket(&self, bucket: &str) -> GleanerResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let Some(db) = self.open_bucket(&wtxn, bucket)? else {
            return Ok(0);
        };
        let removed = db.len(&wtxn).map_err(txn_err)?;
        db.clear(&mut wtxn).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    /// Close the environment, blocking until every clone of it is dropped.
    fn close(self) {
        tracing::debug!(path = %self.path.display(), "Closing cache file");
        self.env.prepare_for_closing().wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbBackend::open(temp_dir.path().join("cache.db"), StoreOptions::default())
            .expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[test]
    fn test_open_creates_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("cache.db");
        let backend = LmdbBackend::open(&path, StoreOptions::default()).unwrap();
        assert!(path.is_file());
        assert_eq!(backend.path(), path.as_path());
    }

    #[test]
    fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put("youtube", b"key-1", b"value-1").unwrap();

        let value = backend.get("youtube", b"key-1").unwrap();
        assert_eq!(value.as_deref(), Some(&b"value-1"[..]));
    }

    #[test]
    fn test_missing_bucket_and_key_are_clean_misses() {
        let (backend, _temp_dir) = create_test_backend();
        assert!(backend.get("never-written", b"k").unwrap().is_none());

        backend.put("web", b"a", b"1").unwrap();
        assert!(backend.get("web", b"b").unwrap().is_none());
    }

    #[test]
    fn test_buckets_are_isolated() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put("youtube", b"same-key", b"video").unwrap();
        backend.put("reddit", b"same-key", b"thread").unwrap();

        assert_eq!(backend.get("youtube", b"same-key").unwrap().unwrap(), b"video");
        assert_eq!(backend.get("reddit", b"same-key").unwrap().unwrap(), b"thread");
    }

    #[test]
    fn test_overwrite() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put("web", b"k", b"old").unwrap();
        backend.put("web", b"k", b"new").unwrap();
        assert_eq!(backend.get("web", b"k").unwrap().unwrap(), b"new");
        assert_eq!(backend.len("web").unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put("web", b"k", b"v").unwrap();
        assert!(backend.delete("web", b"k").unwrap());
        assert!(!backend.delete("web", b"k").unwrap());
        assert!(!backend.delete("no-such-bucket", b"k").unwrap());
        assert!(!backend.contains("web", b"k").unwrap());
    }

    #[test]
    fn test_delete_if_respects_predicate() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put("web", b"k", b"current").unwrap();

        assert!(!backend.delete_if("web", b"k", &|v| v == b"stale").unwrap());
        assert!(backend.contains("web", b"k").unwrap());

        assert!(backend.delete_if("web", b"k", &|v| v == b"current").unwrap());
        assert!(!backend.contains("web", b"k").unwrap());
    }

    #[test]
    fn test_clear_bucket() {
        let (backend, _temp_dir) = create_test_backend();
        for i in 0..5u8 {
            backend.put("reddit", &[i], b"reply").unwrap();
        }
        backend.put("youtube", b"k", b"video").unwrap();

        assert_eq!(backend.clear_bucket("reddit").unwrap(), 5);
        assert_eq!(backend.len("reddit").unwrap(), 0);
        assert!(backend.contains("youtube", b"k").unwrap());
        assert_eq!(backend.clear_bucket("missing").unwrap(), 0);
    }

    #[test]
    fn test_empty_bucket_name_is_rejected() {
        let (backend, _temp_dir) = create_test_backend();
        let err = backend.put("", b"k", b"v").unwrap_err();
        assert!(matches!(
            err,
            gleaner_core::GleanerError::Storage(StorageError::BucketName { .. })
        ));
    }

    #[test]
    fn test_reopen_after_close_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.db");

        let backend = LmdbBackend::open(&path, StoreOptions::default()).unwrap();
        backend.put("web", b"k", b"persisted").unwrap();
        backend.close();

        let reopened = LmdbBackend::open(&path, StoreOptions::default()).unwrap();
        assert_eq!(reopened.get("web", b"k").unwrap().unwrap(), b"persisted");
    }
}
