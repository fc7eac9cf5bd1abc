//! Time-to-live policy for cached documents.

use gleaner_core::Timestamp;
use std::time::Duration;

/// How long a cache entry stays fresh.
///
/// An entry whose age equals the TTL exactly is still fresh; only strictly
/// older entries are expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl(Duration);

impl Ttl {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Whether an entry created at `created_at` is still fresh at `now`.
    ///
    /// Entries stamped in the future (clock skew) count as age zero.
    pub fn is_fresh(&self, created_at: Timestamp, now: Timestamp) -> bool {
        let age = now
            .signed_duration_since(created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age <= self.0
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}
