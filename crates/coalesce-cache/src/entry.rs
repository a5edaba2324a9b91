use std::time::Duration;

use futures::channel::oneshot;
use futures::future::Shared;

use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::loader::Loaded;

/// Age bucket of a cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    /// Young enough to serve as-is.
    Fresh,
    /// Still servable, but due for a refresh.
    Stale,
    /// Must not be served; readers block on a reload.
    Expired,
}

impl Freshness {
    /// Buckets `age` according to the configured windows.
    ///
    /// Both boundaries are inclusive on the younger side: an age of exactly
    /// `refresh_after` is still fresh, one of exactly `expire_after` is
    /// still stale.
    pub(crate) fn for_age(age: Duration, config: &CacheConfig) -> Self {
        if age <= config.refresh_after {
            Freshness::Fresh
        } else if age <= config.expire_after {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

/// The kind of operation occupying an entry's in-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Load,
    Store,
}

/// The channel waiters subscribe to for the outcome of an in-flight
/// operation. Cloning subscribes another waiter to the same completion.
pub(crate) type ResultChannel<V> = Shared<oneshot::Receiver<CacheResult<Loaded<V>>>>;

/// The single shared operation currently producing a new result for a key.
pub(crate) struct InFlight<V> {
    pub kind: OpKind,
    /// Identifies this operation so that its completion can detect having
    /// been superseded.
    pub seq: u64,
    /// Completion sink for load slots. A store that finishes first takes
    /// this out to settle the load's waiters with its own result. Store
    /// slots keep their sender inside the store task and leave this empty.
    pub sender: Option<oneshot::Sender<CacheResult<Loaded<V>>>>,
    pub channel: ResultChannel<V>,
}

/// Per-key cache state.
///
/// Created lazily on first use, mutated only under the coordinator's mutex,
/// never evicted.
pub(crate) struct Entry<V> {
    /// The last installed result, if any. May be arbitrarily old; the read
    /// path decides whether it is still usable.
    pub result: Option<Loaded<V>>,
    pub in_flight: Option<InFlight<V>>,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Entry {
            result: None,
            in_flight: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            refresh_after: Duration::from_millis(100),
            expire_after: Duration::from_millis(1000),
            ..Default::default()
        }
    }

    #[test]
    fn boundaries_are_inclusive_on_the_younger_side() {
        let config = config();

        assert_eq!(
            Freshness::for_age(Duration::ZERO, &config),
            Freshness::Fresh
        );
        assert_eq!(
            Freshness::for_age(Duration::from_millis(100), &config),
            Freshness::Fresh
        );
        assert_eq!(
            Freshness::for_age(Duration::from_millis(101), &config),
            Freshness::Stale
        );
        assert_eq!(
            Freshness::for_age(Duration::from_millis(1000), &config),
            Freshness::Stale
        );
        assert_eq!(
            Freshness::for_age(Duration::from_millis(1001), &config),
            Freshness::Expired
        );
    }
}
