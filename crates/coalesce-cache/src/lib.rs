//! # An asynchronous loading cache
//!
//! This crate provides [`LoadingCache`], a key→value store whose values are
//! produced on demand by a user-supplied [`CacheLoader`] and optionally
//! written through to it. It is built for callers that repeatedly request
//! the same derived value (expensive remote fetches, heavy computations) and
//! need a single shared in-flight computation per key, a short window of
//! reuse for fresh results, and well-defined timeout and error semantics.
//!
//! ## Request coalescing
//!
//! The central guarantee is at most one concurrent load per key: any number
//! of simultaneous [`get`](LoadingCache::get) calls on a cold key result in
//! exactly one [`CacheLoader::load`] invocation, and every caller receives
//! the same outcome. Internally each key owns a single in-flight slot whose
//! completion is teed out to all waiters; late arrivals subscribe to the
//! running operation instead of starting their own.
//!
//! ## Freshness windows
//!
//! Every cached result carries the timestamp at which its producer
//! considered it authoritative. Its age at read time puts it in one of three
//! buckets, bounded by [`CacheConfig::refresh_after`] and
//! [`CacheConfig::expire_after`]:
//!
//! - **fresh** — returned immediately, the loader is not consulted.
//! - **stale** — still returned immediately, but a background refresh is
//!   started (and deduplicated against an already-running one). A failing
//!   refresh is logged and suppressed; the stale value keeps serving until
//!   it expires or a refresh lands.
//! - **expired** — never returned. Readers block on the shared reload as if
//!   the entry were empty.
//!
//! ## Writes and the "store wins" rule
//!
//! [`set`](LoadingCache::set) pushes a value to the loader's
//! [`store`](CacheLoader::store) operation and installs the stored result.
//! A store races any in-flight load for the same key, and the store is
//! authoritative: when it finishes first, waiters of the load receive the
//! stored value and the load's eventual outcome, success or error, is
//! discarded. When the load finishes first its result is installed normally
//! and overwritten once the store lands. A failed store is reported to the
//! `set` caller alone and leaves the load undisturbed.
//!
//! ## Timeouts and errors
//!
//! Each `get` is bounded by [`CacheConfig::timeout`]. The timer is per
//! caller: a timed-out reader fails with [`CacheError::Timeout`] while the
//! underlying load keeps running, so later callers can still be served from
//! its result. Loader errors are broadcast unchanged to every waiter of the
//! failed operation and are never cached; the next read retries.
//!
//! ## Concurrency model
//!
//! All entry state lives under a mutex that is only held for synchronous
//! bookkeeping, never across an await point. Loads and stores run as
//! spawned tasks on the tokio runtime, so they are independent of any
//! individual caller's lifetime. Entries are independent across keys; the
//! cache imposes no cross-key ordering.

mod cache;
mod config;
mod entry;
mod error;
mod loader;
mod utils;

pub use cache::LoadingCache;
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use loader::{now_millis, CacheLoader, Loaded};
