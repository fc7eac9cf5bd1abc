//! Gleaner Test Utilities
//!
//! Shared test infrastructure for the Gleaner workspace:
//! - Mock loaders with call counters and scripted failures
//! - Proptest generators for documents and metadata
//! - Fixtures for configuration and sample documents
//! - Tracing setup for tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

pub use gleaner_core::{
    fingerprint, CacheSettings, CacheableLoader, Document, FingerprintError, GleanerConfig,
    GleanerError, GleanerResult, LoadContext, LoadError, Metadata, ParallelSettings,
};

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn` so cache degrade paths are visible
/// in failing test output.
pub fn init_test_tracing() {
    let _ = gleaner_core::init_tracing("warn");
}

/// Shared call counter. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MOCK LOADERS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct SourceConfig<'a> {
    source: &'a str,
    loader_type: &'a str,
}

/// Loader that returns fixed documents and counts how often it is called.
///
/// Its hash is the fingerprint of `(source, loader_type)`, so two loaders
/// built with the same arguments share a cache record.
#[derive(Debug, Clone)]
pub struct CountingLoader {
    source: String,
    loader_type: String,
    documents: Vec<Document>,
    calls: CallCounter,
}

impl CountingLoader {
    pub fn new(loader_type: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let documents = vec![Document::new(format!("content of {}", source))
            .with_metadata("source", source.clone())];
        Self {
            source,
            loader_type: loader_type.into(),
            documents,
            calls: CallCounter::new(),
        }
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn counter(&self) -> CallCounter {
        self.calls.clone()
    }
}

#[async_trait]
impl CacheableLoader for CountingLoader {
    async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        self.calls.increment();
        ctx.ensure_active(&self.loader_type)?;
        Ok(self.documents.clone())
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        let config = SourceConfig {
            source: &self.source,
            loader_type: &self.loader_type,
        };
        Ok(fingerprint(&config)?.to_vec())
    }

    fn loader_type(&self) -> &str {
        &self.loader_type
    }
}

/// Loader whose `load` always fails with [`LoadError::RequestFailed`].
#[derive(Debug, Clone)]
pub struct FailingLoader {
    loader_type: String,
    reason: String,
    calls: CallCounter,
}

impl FailingLoader {
    pub fn new(loader_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            loader_type: loader_type.into(),
            reason: reason.into(),
            calls: CallCounter::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn error(&self) -> GleanerError {
        LoadError::RequestFailed {
            loader: self.loader_type.clone(),
            reason: self.reason.clone(),
        }
        .into()
    }
}

#[async_trait]
impl CacheableLoader for FailingLoader {
    async fn load(&self, _ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        self.calls.increment();
        Err(self.error())
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        Ok(fingerprint(&self.loader_type)?.to_vec())
    }

    fn loader_type(&self) -> &str {
        &self.loader_type
    }
}

/// Loader whose configuration cannot be fingerprinted.
///
/// Its parameters are keyed by tuples, which have no JSON object-key form,
/// so `hash()` fails with [`FingerprintError::Serialization`].
#[derive(Debug, Clone)]
pub struct UnhashableLoader {
    params: HashMap<(u32, u32), String>,
    calls: CallCounter,
}

impl UnhashableLoader {
    pub fn new() -> Self {
        let mut params = HashMap::new();
        params.insert((0, 30), "intro".to_string());
        Self {
            params,
            calls: CallCounter::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Default for UnhashableLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheableLoader for UnhashableLoader {
    async fn load(&self, _ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        self.calls.increment();
        Ok(vec![Document::new("uncacheable")])
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        Ok(fingerprint(&self.params)?.to_vec())
    }

    fn loader_type(&self) -> &str {
        "segments"
    }
}

/// Loader with a caller-chosen hash, for forcing key collisions.
#[derive(Debug, Clone)]
pub struct FixedHashLoader {
    loader_type: String,
    hash: Vec<u8>,
    documents: Vec<Document>,
    calls: CallCounter,
}

impl FixedHashLoader {
    pub fn new(loader_type: impl Into<String>, hash: &[u8], documents: Vec<Document>) -> Self {
        Self {
            loader_type: loader_type.into(),
            hash: hash.to_vec(),
            documents,
            calls: CallCounter::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait]
impl CacheableLoader for FixedHashLoader {
    async fn load(&self, _ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        self.calls.increment();
        Ok(self.documents.clone())
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        Ok(self.hash.clone())
    }

    fn loader_type(&self) -> &str {
        &self.loader_type
    }
}

/// Loader that sleeps before answering and stops early when its context is
/// cancelled or its deadline passes.
#[derive(Debug, Clone)]
pub struct SlowLoader {
    inner: CountingLoader,
    delay: Duration,
}

impl SlowLoader {
    pub fn new(inner: CountingLoader, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }

    fn cancelled(&self) -> GleanerError {
        self.inner.calls.increment();
        LoadError::Cancelled {
            loader: self.inner.loader_type.clone(),
        }
        .into()
    }
}

#[async_trait]
impl CacheableLoader for SlowLoader {
    async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        let wait = match ctx.deadline() {
            Some(deadline) => self
                .delay
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.delay,
        };
        tokio::select! {
            _ = ctx.token().cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(wait) => {
                if ctx.is_cancelled() {
                    return Err(self.cancelled());
                }
                self.inner.load(ctx).await
            }
        }
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        self.inner.hash()
    }

    fn loader_type(&self) -> &str {
        self.inner.loader_type()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for documents and metadata.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a metadata value: a scalar or a short array of strings.
    ///
    /// Floats are excluded so generated documents compare equal after a JSON
    /// round trip.
    pub fn arb_metadata_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,24}".prop_map(Value::from),
            prop::collection::vec("[a-z]{1,8}", 0..4).prop_map(Value::from),
        ]
    }

    pub fn arb_metadata() -> impl Strategy<Value = Metadata> {
        prop::collection::btree_map("[a-z_]{1,12}", arb_metadata_value(), 0..6)
    }

    /// Generate a document with a quarter-step score.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        (".{0,200}", arb_metadata(), 0u32..400).prop_map(|(content, metadata, quarters)| {
            Document {
                content,
                metadata,
                score: f64::from(quarters) / 4.0,
            }
        })
    }

    pub fn arb_documents(max_len: usize) -> impl Strategy<Value = Vec<Document>> {
        prop::collection::vec(arb_document(), 0..=max_len)
    }

    /// Generate a non-empty bucket name.
    pub fn arb_loader_type() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,15}"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common test scenarios.

    use super::*;

    /// A valid configuration with its cache file under `dir`.
    pub fn config_in(dir: &Path) -> GleanerConfig {
        GleanerConfig {
            cache: CacheSettings {
                path: dir.join("cache.db"),
                ttl_secs: 3600,
                max_size_mb: 16,
                max_buckets: 16,
            },
            parallel: ParallelSettings { batch_threads: 4 },
        }
    }

    /// Caption-like documents with increasing `start_ms`.
    pub fn caption_documents(count: usize) -> Vec<Document> {
        (0..count)
            .map(|i| {
                Document::new(format!("caption {}", i)).with_metadata("start_ms", (i as u64) * 1500)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_loader_counts_calls() {
        let loader = CountingLoader::new("web", "https://example.com");
        let counter = loader.counter();
        let ctx = LoadContext::new();

        let docs = loader.load(&ctx).await.unwrap();
        loader.clone().load(&ctx).await.unwrap();

        assert_eq!(docs, loader.documents());
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_counting_loader_hash_is_config_based() {
        let a = CountingLoader::new("web", "https://example.com");
        let b = CountingLoader::new("web", "https://example.com")
            .with_documents(vec![Document::new("different")]);
        let c = CountingLoader::new("web", "https://example.org");

        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        assert_ne!(a.hash().unwrap(), c.hash().unwrap());
    }

    #[test]
    fn test_unhashable_loader_fails_to_hash() {
        let err = UnhashableLoader::new().hash().unwrap_err();
        assert!(matches!(
            err,
            GleanerError::Fingerprint(FingerprintError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_loader() {
        let loader = FailingLoader::new("reddit", "rate limited");
        let err = loader.load(&LoadContext::new()).await.unwrap_err();
        assert_eq!(err, loader.error());
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_loader_observes_cancellation() {
        let loader = SlowLoader::new(
            CountingLoader::new("youtube", "dQw4w9WgXcQ"),
            Duration::from_secs(30),
        );
        let ctx = LoadContext::new();
        ctx.cancel();

        let err = loader.load(&ctx).await.unwrap_err();
        assert!(matches!(err, GleanerError::Load(LoadError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_slow_loader_observes_deadline() {
        let loader = SlowLoader::new(
            CountingLoader::new("youtube", "dQw4w9WgXcQ"),
            Duration::from_secs(30),
        );
        let ctx = LoadContext::new().with_timeout(Duration::from_millis(20));

        let started = Instant::now();
        let err = loader.load(&ctx).await.unwrap_err();

        assert!(matches!(err, GleanerError::Load(LoadError::Cancelled { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_loader_finishes_before_deadline() {
        let loader = SlowLoader::new(
            CountingLoader::new("youtube", "dQw4w9WgXcQ"),
            Duration::from_millis(10),
        );
        let ctx = LoadContext::new().with_timeout(Duration::from_secs(30));

        let docs = loader.load(&ctx).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_fixture_config_is_valid() {
        let config = fixtures::config_in(Path::new("/tmp/gleaner-test"));
        assert!(config.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_generated_documents_survive_json(docs in generators::arb_documents(8)) {
            let bytes = serde_json::to_vec(&docs).unwrap();
            let back: Vec<Document> = serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(back, docs);
        }
    }
}
