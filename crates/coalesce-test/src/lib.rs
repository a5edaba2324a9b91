//! Helpers for testing the loading cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - The [`TestLoader`] embeds its load counter in every produced value, so
//!    asserting on payloads distinguishes coalesced requests (same payload)
//!    from repeated loads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use coalesce_cache::{CacheError, CacheLoader, CacheResult, Loaded};

/// Setup the test environment.
///
/// Initializes logs: the logger only captures output from the cache crate
/// and routes it through the test writer, so it is shown for failing tests
/// only.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("coalesce_cache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A loader with configurable latencies and failure injection.
///
/// Load payloads have the form `"{key} load #{n}"` where `n` counts `load`
/// invocations, so a test can tell from the payload alone which load
/// produced it. Stores echo the stored value back after `store_time`.
pub struct TestLoader {
    load_time: Duration,
    store_time: Duration,
    fail_loads: Mutex<Option<String>>,
    fail_stores: Mutex<Option<String>>,
    loads: AtomicUsize,
    stores: AtomicUsize,
}

impl Default for TestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLoader {
    pub fn new() -> Self {
        TestLoader {
            load_time: Duration::from_millis(50),
            store_time: Duration::from_millis(1),
            fail_loads: Mutex::new(None),
            fail_stores: Mutex::new(None),
            loads: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        }
    }

    pub fn with_load_time(mut self, load_time: Duration) -> Self {
        self.load_time = load_time;
        self
    }

    pub fn with_store_time(mut self, store_time: Duration) -> Self {
        self.store_time = store_time;
        self
    }

    /// Makes subsequent loads fail with the given message, after the
    /// configured `load_time`.
    pub fn fail_loads_with(&self, message: &str) {
        *self.fail_loads.lock() = Some(message.to_owned());
    }

    /// Makes subsequent loads succeed again.
    pub fn clear_load_failure(&self) {
        *self.fail_loads.lock() = None;
    }

    /// Makes subsequent stores fail with the given message, after the
    /// configured `store_time`.
    pub fn fail_stores_with(&self, message: &str) {
        *self.fail_stores.lock() = Some(message.to_owned());
    }

    /// Number of `load` invocations so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `store` invocations so far.
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl CacheLoader for TestLoader {
    type Key = String;
    type Value = String;

    fn load<'a>(&'a self, key: &'a String) -> BoxFuture<'a, CacheResult<Loaded<String>>> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::time::sleep(self.load_time).await;
            if let Some(message) = self.fail_loads.lock().clone() {
                return Err(CacheError::LoadFailed(message));
            }
            Ok(Loaded::now(format!("{key} load #{n}")))
        }
        .boxed()
    }

    fn store<'a>(
        &'a self,
        _key: &'a String,
        value: String,
    ) -> BoxFuture<'a, CacheResult<Loaded<String>>> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(self.store_time).await;
            if let Some(message) = self.fail_stores.lock().clone() {
                return Err(CacheError::StoreFailed(message));
            }
            Ok(Loaded::now(value))
        }
        .boxed()
    }
}
