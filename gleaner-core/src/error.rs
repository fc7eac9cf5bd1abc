//! Error types for Gleaner operations

use thiserror::Error;

/// Fingerprinting errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("Failed to serialize value for fingerprinting: {reason}")]
    Serialization { reason: String },
}

/// Cache storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open cache environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Failed to encode cache item: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode cache item in bucket {bucket}: {reason}")]
    Decode { bucket: String, reason: String },

    #[error("Invalid bucket name {bucket:?}: {reason}")]
    BucketName { bucket: String, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io {
            reason: e.to_string(),
        }
    }
}

/// Loader (source fetch) errors.
///
/// These are produced by loaders and always surface to the caller unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Request from {loader} failed: {reason}")]
    RequestFailed { loader: String, reason: String },

    #[error("Invalid content from {loader}: {reason}")]
    InvalidContent { loader: String, reason: String },

    #[error("Load cancelled for {loader}")]
    Cancelled { loader: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (set GLEANER_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failures of the execution engine itself, as opposed to task errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Task {index} panicked: {message}")]
    Panicked { index: usize, message: String },

    #[error("Task {index} was dropped before reporting a result")]
    Lost { index: usize },
}

/// Master error type for all Gleaner errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GleanerError {
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl GleanerError {
    /// True when the error originated in a loader rather than in the cache.
    pub fn is_load_error(&self) -> bool {
        matches!(self, GleanerError::Load(_))
    }
}

/// Result type alias for Gleaner operations.
pub type GleanerResult<T> = Result<T, GleanerError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_decode() {
        let err = StorageError::Decode {
            bucket: "youtube".to_string(),
            reason: "truncated header".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("youtube"));
        assert!(msg.contains("truncated header"));
    }

    #[test]
    fn test_load_error_display_request_failed() {
        let err = LoadError::RequestFailed {
            loader: "reddit".to_string(),
            reason: "429 Too Many Requests".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("reddit"));
        assert!(msg.contains("429"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "cache.ttl_secs",
            reason: "must be > 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("cache.ttl_secs"));
        assert!(msg.contains("must be > 0"));
    }

    #[test]
    fn test_execution_error_display_panicked() {
        let err = ExecutionError::Panicked {
            index: 3,
            message: "boom".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Task 3"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_io_error_converts_to_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = StorageError::from(io);
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_gleaner_error_from_variants() {
        let fingerprint = GleanerError::from(FingerprintError::Serialization {
            reason: "key must be a string".to_string(),
        });
        assert!(matches!(fingerprint, GleanerError::Fingerprint(_)));

        let storage = GleanerError::from(StorageError::Transaction {
            reason: "map full".to_string(),
        });
        assert!(matches!(storage, GleanerError::Storage(_)));
        assert!(!storage.is_load_error());

        let load = GleanerError::from(LoadError::Cancelled {
            loader: "web".to_string(),
        });
        assert!(load.is_load_error());

        let config = GleanerError::from(ConfigError::MissingConfigPath);
        assert!(matches!(config, GleanerError::Config(_)));

        let exec = GleanerError::from(ExecutionError::Lost { index: 0 });
        assert!(matches!(exec, GleanerError::Execution(_)));
    }
}
