//! Read-through document cache keyed by loader fingerprints.
//!
//! [`FingerprintCache::load`] answers from the backend when a fresh record
//! exists and otherwise calls the loader and stores what it returns. Every
//! failure of the caching layer itself is logged and swallowed: the worst
//! outcome of a broken cache is an extra call to the source. Loader errors are
//! never swallowed.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gleaner_core::{
    CacheSettings, CacheableLoader, Document, GleanerError, GleanerResult, LoadContext,
    StorageError,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::freshness::Ttl;
use super::item::{encode_parts, now_millis, peek_created_at_millis, CacheItem};
use super::lmdb_backend::{LmdbBackend, StoreOptions};
use super::traits::{CacheBackend, CacheCounters, CacheStats};

/// Key for a loader's record. Its bucket is `loader_type()`, which must be non-empty.
fn cache_key<L: CacheableLoader + ?Sized>(loader: &L) -> GleanerResult<Vec<u8>> {
    let bucket = loader.loader_type();
    if bucket.is_empty() {
        return Err(StorageError::BucketName {
            bucket: String::new(),
            reason: "loader_type() returned an empty name".to_string(),
        }
        .into());
    }
    loader.hash()
}

/// Expiring, fingerprint-keyed cache in front of any [`CacheableLoader`].
///
/// Records are stored in the bucket named by `loader_type()` under the key
/// returned by `hash()`. Loaders with equal configuration share a record;
/// two different loaders whose hashes collide also share one, and the cache
/// does not try to tell them apart.
///
/// Concurrent loads for the same key are not coalesced: each one misses,
/// calls its loader, and the last write wins.
///
/// # Example
///
/// ```ignore
/// let cache = FingerprintCache::open("cache.db", Duration::from_secs(86_400), StoreOptions::default())?;
/// let docs = cache.load(&transcript_loader, &LoadContext::new()).await?;
/// cache.close().await;
/// ```
pub struct FingerprintCache<B: CacheBackend = LmdbBackend> {
    backend: Arc<B>,
    ttl: Ttl,
    counters: CacheCounters,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl FingerprintCache<LmdbBackend> {
    /// Open an LMDB-backed cache at `path`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        ttl: Duration,
        options: StoreOptions,
    ) -> GleanerResult<Self> {
        let backend = LmdbBackend::open(path, options)?;
        Ok(Self::with_backend(backend, ttl))
    }

    /// Open the cache described by the `[cache]` configuration table.
    pub fn from_settings(settings: &CacheSettings) -> GleanerResult<Self> {
        Self::open(&settings.path, settings.ttl(), StoreOptions::from(settings))
    }
}

impl<B: CacheBackend> FingerprintCache<B> {
    pub fn with_backend(backend: B, ttl: impl Into<Ttl>) -> Self {
        Self {
            backend: Arc::new(backend),
            ttl: ttl.into(),
            counters: CacheCounters::default(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Return the loader's documents, from the cache when fresh.
    ///
    /// # Errors
    ///
    /// Only errors returned by `loader.load()` are surfaced. Unkeyable
    /// loaders, unreadable or expired records, and failed writes all fall
    /// back to calling the loader.
    pub async fn load<L: CacheableLoader + ?Sized>(
        &self,
        loader: &L,
        ctx: &LoadContext,
    ) -> GleanerResult<Vec<Document>> {
        let bucket = loader.loader_type();
        let key = match cache_key(loader) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(bucket, error = %e, "Cannot key loader, bypassing cache");
                CacheCounters::bump(&self.counters.bypassed);
                return loader.load(ctx).await;
            }
        };

        if let Some(documents) = self.lookup(bucket, &key) {
            return Ok(documents);
        }

        let documents = loader.load(ctx).await?;
        self.persist(bucket, &key, &documents);
        Ok(documents)
    }

    /// Remove the record for `loader`, if any.
    pub fn invalidate<L: CacheableLoader + ?Sized>(&self, loader: &L) -> GleanerResult<bool> {
        let key = cache_key(loader)?;
        self.backend.delete(loader.loader_type(), &key)
    }

    /// Remove every record in `bucket`. Returns the number removed.
    pub fn invalidate_bucket(&self, bucket: &str) -> GleanerResult<u64> {
        self.backend.clear_bucket(bucket)
    }

    /// Wait for every scheduled expiry delete to finish.
    pub async fn wait_for_expirations(&self) {
        for handle in self.take_pending() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Expiry task did not complete");
            }
        }
    }

    /// Wait for background deletes, then release the backend.
    ///
    /// If a [`CachedLoader`] or other holder still shares the backend, it
    /// stays open until the last holder drops it.
    pub async fn close(self) {
        self.wait_for_expirations().await;
        match Arc::try_unwrap(self.backend) {
            Ok(backend) => {
                if let Err(e) = tokio::task::spawn_blocking(move || backend.close()).await {
                    tracing::warn!(error = %e, "Cache backend close did not complete");
                }
            }
            Err(_) => tracing::debug!("Cache backend still shared, deferring close"),
        }
    }

    fn lookup(&self, bucket: &str, key: &[u8]) -> Option<Vec<Document>> {
        let bytes = match self.backend.get(bucket, key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(bucket, key = %hex::encode(key), "Cache miss");
                CacheCounters::bump(&self.counters.misses);
                return None;
            }
            Err(e) => {
                self.read_failed(bucket, key, &e);
                return None;
            }
        };

        let item = match CacheItem::decode(bucket, &bytes) {
            Ok(item) => item,
            Err(e) => {
                self.read_failed(bucket, key, &e.into());
                return None;
            }
        };

        if !self.ttl.is_fresh(item.created_at, Utc::now()) {
            tracing::debug!(
                bucket,
                key = %hex::encode(key),
                created_at = %item.created_at,
                "Cache entry expired"
            );
            CacheCounters::bump(&self.counters.expired);
            CacheCounters::bump(&self.counters.misses);
            self.schedule_expiry(bucket, key, item.created_at.timestamp_millis());
            return None;
        }

        tracing::debug!(bucket, key = %hex::encode(key), "Cache hit");
        CacheCounters::bump(&self.counters.hits);
        Some(item.documents)
    }

    fn read_failed(&self, bucket: &str, key: &[u8], error: &GleanerError) {
        tracing::warn!(
            bucket,
            key = %hex::encode(key),
            error = %error,
            "Cache read failed, treating as miss"
        );
        CacheCounters::bump(&self.counters.read_errors);
        CacheCounters::bump(&self.counters.misses);
    }

    fn persist(&self, bucket: &str, key: &[u8], documents: &[Document]) {
        let result = encode_parts(documents, now_millis())
            .map_err(GleanerError::from)
            .and_then(|bytes| self.backend.put(bucket, key, &bytes));
        match result {
            Ok(()) => {
                tracing::debug!(bucket, key = %hex::encode(key), count = documents.len(), "Cached documents");
                CacheCounters::bump(&self.counters.writes);
            }
            Err(e) => {
                tracing::warn!(
                    bucket,
                    key = %hex::encode(key),
                    error = %e,
                    "Cache write failed, returning uncached documents"
                );
                CacheCounters::bump(&self.counters.write_errors);
            }
        }
    }

    /// Delete an expired record off the request path.
    ///
    /// The delete only applies while the stored header still carries
    /// `stale_millis`, so a fresh record written in the meantime survives.
    fn schedule_expiry(&self, bucket: &str, key: &[u8], stale_millis: i64) {
        let backend = Arc::clone(&self.backend);
        let bucket = bucket.to_string();
        let key = key.to_vec();
        let task = move || {
            let result = backend.delete_if(&bucket, &key, &|bytes| {
                peek_created_at_millis(bytes) == Some(stale_millis)
            });
            match result {
                Ok(removed) => {
                    tracing::debug!(bucket = %bucket, key = %hex::encode(&key), removed, "Expired entry cleanup")
                }
                Err(e) => tracing::warn!(
                    bucket = %bucket,
                    key = %hex::encode(&key),
                    error = %e,
                    "Failed to delete expired entry"
                ),
            }
        };

        match Handle::try_current() {
            Ok(handle) => {
                let join = handle.spawn_blocking(task);
                match self.pending.lock() {
                    Ok(mut pending) => {
                        pending.retain(|h| !h.is_finished());
                        pending.push(join);
                    }
                    Err(poisoned) => poisoned.into_inner().push(join),
                }
            }
            Err(_) => task(),
        }
    }

    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// A loader whose `load` goes through a shared [`FingerprintCache`].
///
/// Keeps the wrapped loader's hash and type, so a `CachedLoader` can be used
/// anywhere a plain loader is expected.
pub struct CachedLoader<L, B: CacheBackend = LmdbBackend> {
    inner: L,
    cache: Arc<FingerprintCache<B>>,
}

impl<L, B: CacheBackend> CachedLoader<L, B> {
    pub fn new(inner: L, cache: Arc<FingerprintCache<B>>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<FingerprintCache<B>> {
        &self.cache
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

#[async_trait]
impl<L: CacheableLoader, B: CacheBackend> CacheableLoader for CachedLoader<L, B> {
    async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        self.cache.load(&self.inner, ctx).await
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        self.inner.hash()
    }

    fn loader_type(&self) -> &str {
        self.inner.loader_type()
    }
}
