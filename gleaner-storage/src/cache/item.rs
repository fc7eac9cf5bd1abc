//! The persisted cache record and its byte format.
//!
//! Format: `[created_at: i64 millis, little-endian][JSON array of documents]`.
//! The fixed-width timestamp header lets expiry checks read the creation time
//! without decoding the documents.

use chrono::{DateTime, Utc};
use gleaner_core::{Document, StorageError, Timestamp};
use std::time::Duration;

const HEADER_LEN: usize = 8;

/// Documents stored for one `(bucket, key)` pair, plus when they were stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    pub documents: Vec<Document>,
    pub created_at: Timestamp,
}

impl CacheItem {
    /// A record created now, truncated to millisecond precision.
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            created_at: now_millis(),
        }
    }

    pub fn with_created_at(documents: Vec<Document>, created_at: Timestamp) -> Self {
        Self {
            documents,
            created_at,
        }
    }

    /// Age of the record at `now`; zero if `created_at` lies in the future.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        encode_parts(&self.documents, self.created_at)
    }

    pub fn decode(bucket: &str, bytes: &[u8]) -> Result<Self, StorageError> {
        let millis = peek_created_at_millis(bytes).ok_or_else(|| StorageError::Decode {
            bucket: bucket.to_string(),
            reason: format!("record shorter than {} byte header", HEADER_LEN),
        })?;
        let created_at =
            DateTime::from_timestamp_millis(millis).ok_or_else(|| StorageError::Decode {
                bucket: bucket.to_string(),
                reason: format!("timestamp out of range: {}", millis),
            })?;
        let documents: Vec<Document> =
            serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| StorageError::Decode {
                bucket: bucket.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            documents,
            created_at,
        })
    }
}

/// Encode documents without first building an owned [`CacheItem`].
///
/// Fails for documents with a NaN or infinite `score`: JSON stores those as
/// `null`, which would never decode back.
pub fn encode_parts(documents: &[Document], created_at: Timestamp) -> Result<Vec<u8>, StorageError> {
    if let Some((index, doc)) = documents
        .iter()
        .enumerate()
        .find(|(_, d)| !d.score.is_finite())
    {
        return Err(StorageError::Encode {
            reason: format!("document {} has non-finite score {}", index, doc.score),
        });
    }
    let body = serde_json::to_vec(documents).map_err(|e| StorageError::Encode {
        reason: e.to_string(),
    })?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&created_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Read the creation timestamp header, if present.
pub fn peek_created_at_millis(bytes: &[u8]) -> Option<i64> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

/// Current time at the precision the record format stores.
pub fn now_millis() -> Timestamp {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
