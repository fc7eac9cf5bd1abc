//! The capability contract every fetchable source implements.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::document::Document;
use crate::error::{GleanerResult, LoadError};

/// Cancellable operation context handed to [`CacheableLoader::load`].
///
/// Nothing in the cache or the executors interrupts a running load. Loaders
/// observe this context themselves, typically through [`LoadContext::ensure_active`]
/// between sub-requests.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context driven by an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// A context cancelled together with this one, sharing its deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`LoadError::Cancelled`] if the context is no longer active.
    pub fn ensure_active(&self, loader: &str) -> GleanerResult<()> {
        if self.is_cancelled() {
            return Err(LoadError::Cancelled {
                loader: loader.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// A source that can produce documents and describe its own identity.
///
/// # Implementation Requirements
///
/// - `hash()` must return identical bytes for loaders with equal
///   configuration. The cache trusts this and performs no collision checks.
/// - `loader_type()` must be non-empty and stable; it names the cache bucket.
/// - `load()` should honour the context's cancellation where it can.
#[async_trait]
pub trait CacheableLoader: Send + Sync {
    /// Fetch and normalize the source into documents.
    async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>>;

    /// Stable fingerprint of this loader's configuration.
    fn hash(&self) -> GleanerResult<Vec<u8>>;

    /// Namespace for this loader's cache entries.
    fn loader_type(&self) -> &str;
}

#[async_trait]
impl<L: CacheableLoader + ?Sized> CacheableLoader for Arc<L> {
    async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        (**self).load(ctx).await
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        (**self).hash()
    }

    fn loader_type(&self) -> &str {
        (**self).loader_type()
    }
}

#[async_trait]
impl<L: CacheableLoader + ?Sized> CacheableLoader for Box<L> {
    async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
        (**self).load(ctx).await
    }

    fn hash(&self) -> GleanerResult<Vec<u8>> {
        (**self).hash()
    }

    fn loader_type(&self) -> &str {
        (**self).loader_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::GleanerError;
    use serde::Serialize;

    #[derive(Serialize)]
    struct PageLoader {
        url: String,
    }

    #[async_trait]
    impl CacheableLoader for PageLoader {
        async fn load(&self, ctx: &LoadContext) -> GleanerResult<Vec<Document>> {
            ctx.ensure_active(self.loader_type())?;
            Ok(vec![Document::new(format!("body of {}", self.url))])
        }

        fn hash(&self) -> GleanerResult<Vec<u8>> {
            Ok(fingerprint(self)?.to_vec())
        }

        fn loader_type(&self) -> &str {
            "web"
        }
    }

    #[test]
    fn test_context_cancel_propagates_to_children() {
        let ctx = LoadContext::new();
        let child = ctx.child();
        assert!(!child.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_cancel_parent() {
        let ctx = LoadContext::new();
        let child = ctx.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_elapsed_deadline_counts_as_cancelled() {
        let ctx = LoadContext::new().with_timeout(Duration::ZERO);
        assert!(ctx.is_cancelled());
        let err = ctx.ensure_active("web").unwrap_err();
        assert!(matches!(err, GleanerError::Load(LoadError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_loader_through_arc_and_box() {
        let loader = Arc::new(PageLoader {
            url: "https://example.com".to_string(),
        });
        let boxed: Box<dyn CacheableLoader> = Box::new(PageLoader {
            url: "https://example.com".to_string(),
        });

        assert_eq!(loader.hash().unwrap(), boxed.hash().unwrap());
        assert_eq!(boxed.loader_type(), "web");

        let docs = loader.load(&LoadContext::new()).await.unwrap();
        assert_eq!(docs[0].content, "body of https://example.com");
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_load() {
        let loader = PageLoader {
            url: "https://example.com".to_string(),
        };
        let ctx = LoadContext::new();
        ctx.cancel();
        let err = loader.load(&ctx).await.unwrap_err();
        assert!(err.is_load_error());
    }
}
