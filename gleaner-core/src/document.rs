//! The normalized document produced by every loader.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Open metadata mapping (timestamps, authorship, source URL, ...).
///
/// Ordered so that serialization of a document is stable.
pub type Metadata = BTreeMap<String, Value>;

/// A unit of fetched content.
///
/// Documents are built once by a loader and never modified afterwards by the
/// cache or the executors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Ranking score. Zero unless a downstream stage assigns one.
    #[serde(default)]
    pub score: f64,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
            score: 0.0,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Look up a metadata value by key.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Concatenate the contents of `docs` in order, separated by `separator`.
pub fn join_contents(docs: &[Document], separator: &str) -> String {
    docs.iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}
