//! Gleaner Core - Documents, Loaders, Fingerprints
//!
//! The shared vocabulary of the workspace: the [`Document`] every loader
//! produces, the [`CacheableLoader`] capability the cache consumes, the
//! [`fingerprint`] function loaders use to derive their cache keys, plus the
//! error taxonomy and configuration.

pub mod config;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod telemetry;

pub use config::{CacheSettings, GleanerConfig, ParallelSettings};
pub use document::{join_contents, Document, Metadata};
pub use error::{
    ConfigError, ExecutionError, FingerprintError, GleanerError, GleanerResult, LoadError,
    StorageError,
};
pub use fingerprint::{fingerprint, fingerprint_bytes, Fingerprint};
pub use loader::{CacheableLoader, LoadContext};
pub use telemetry::init_tracing;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
