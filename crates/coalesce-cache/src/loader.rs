use std::hash::Hash;
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;

use crate::error::CacheResult;

/// Milliseconds since the Unix epoch.
///
/// This is the clock all load results are stamped with. The cache computes
/// entry ages as `now_millis() - Loaded::timestamp`, so loaders producing
/// their own timestamps must use the same clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A value produced by a loader, together with the time at which the
/// producer considered it authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<V> {
    /// Unix timestamp in milliseconds, see [`now_millis`].
    pub timestamp: u64,
    /// The payload.
    pub value: V,
}

impl<V> Loaded<V> {
    /// Wraps `value` with the current time.
    pub fn now(value: V) -> Self {
        Loaded {
            timestamp: now_millis(),
            value,
        }
    }

    /// The age of this result at `now`, saturating to zero for timestamps
    /// from the future.
    pub fn age(&self, now: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.timestamp))
    }
}

/// Produces and persists values on behalf of the cache.
///
/// The cache treats implementations as opaque: values are never inspected,
/// errors are broadcast to waiters unchanged, and no retries are performed.
/// The cache guarantees at most one in-flight `load` per key; `store` is
/// invoked once per [`set`](crate::LoadingCache::set) call.
///
/// Values are cloned once per waiter, so anything expensive to copy should
/// be wrapped in an `Arc` by the implementation.
pub trait CacheLoader: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Produces a value for `key`.
    ///
    /// Called once per coalescing window; all concurrent readers of `key`
    /// share the outcome.
    fn load<'a>(&'a self, key: &'a Self::Key) -> BoxFuture<'a, CacheResult<Loaded<Self::Value>>>;

    /// Persists a caller-supplied value for `key` and returns the
    /// authoritative result, normally `Loaded::now(value)`.
    fn store<'a>(
        &'a self,
        key: &'a Self::Key,
        value: Self::Value,
    ) -> BoxFuture<'a, CacheResult<Loaded<Self::Value>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_saturates() {
        let loaded = Loaded {
            timestamp: 1_000,
            value: (),
        };
        assert_eq!(loaded.age(1_250), Duration::from_millis(250));
        assert_eq!(loaded.age(500), Duration::ZERO);
    }
}
