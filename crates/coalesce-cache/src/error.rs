use std::time::Duration;

use thiserror::Error;

/// An error produced while reading from or writing through the cache.
///
/// The enum is `Clone` and `Eq` so that a single outcome can be broadcast to
/// every waiter of an in-flight operation and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The per-request time budget elapsed before a result became available.
    ///
    /// This variant is generated by the cache itself, never by a loader. The
    /// underlying load keeps running and its result may still serve later
    /// callers.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The loader failed to produce a value.
    ///
    /// The attached string is the loader's error message, passed through
    /// verbatim to every waiter of the failed load.
    #[error("load failed: {0}")]
    LoadFailed(String),
    /// The loader failed to persist a value.
    #[error("store failed: {0}")]
    StoreFailed(String),
    /// An in-flight operation went away without producing a result.
    ///
    /// This only happens when a loader future panics.
    #[error("internal error")]
    InternalError,
}

impl CacheError {
    /// True if this error came from the cache's own request timer rather
    /// than from the loader.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::Timeout(_))
    }
}

/// Result of a cache operation, `Ok(T)` or the error shared by all waiters.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_distinguishable_from_loader_errors() {
        assert!(CacheError::Timeout(Duration::from_millis(200)).is_timeout());
        assert!(!CacheError::LoadFailed("gone".into()).is_timeout());
        assert!(!CacheError::StoreFailed("full".into()).is_timeout());
        assert!(!CacheError::InternalError.is_timeout());
    }

    #[test]
    fn messages_pass_through_verbatim() {
        let err = CacheError::LoadFailed("upstream returned 503".into());
        assert_eq!(err.to_string(), "load failed: upstream returned 503");
    }
}
