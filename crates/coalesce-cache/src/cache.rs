use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::channel::oneshot;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::entry::{Entry, Freshness, InFlight, OpKind, ResultChannel};
use crate::error::{CacheError, CacheResult};
use crate::loader::{now_millis, CacheLoader, Loaded};
use crate::utils::CallOnDrop;

type EntryMap<K, V> = Arc<Mutex<HashMap<K, Entry<V>>>>;

/// An asynchronous loading cache.
///
/// Values are produced on demand by the configured [`CacheLoader`] and kept
/// per key together with their load timestamp. Concurrent readers of the
/// same key share a single in-flight load; results older than
/// [`refresh_after`](CacheConfig::refresh_after) are still served while a
/// refresh runs in the background, and results older than
/// [`expire_after`](CacheConfig::expire_after) make readers block on a
/// reload. Every read is bounded by the configured per-request
/// [`timeout`](CacheConfig::timeout).
///
/// Cloning the cache is cheap and shares all state.
pub struct LoadingCache<L: CacheLoader> {
    config: CacheConfig,
    loader: Arc<L>,
    entries: EntryMap<L::Key, L::Value>,
    /// Tags in-flight operations so completions can detect having been
    /// superseded.
    seq: Arc<AtomicU64>,
}

impl<L: CacheLoader> Clone for LoadingCache<L> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        LoadingCache {
            config: self.config.clone(),
            loader: Arc::clone(&self.loader),
            entries: Arc::clone(&self.entries),
            seq: Arc::clone(&self.seq),
        }
    }
}

impl<L: CacheLoader> fmt::Debug for LoadingCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .entries
            .try_lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("LoadingCache")
            .field("config", &self.config)
            .field("entries", &entries)
            .finish()
    }
}

impl<L: CacheLoader> LoadingCache<L> {
    /// Creates a cache backed by `loader`.
    ///
    /// A configuration with `expire_after < refresh_after` is corrected, see
    /// [`CacheConfig`].
    pub fn new(loader: L, config: CacheConfig) -> Self {
        LoadingCache {
            config: config.sanitize(),
            loader: Arc::new(loader),
            entries: Default::default(),
            seq: Default::default(),
        }
    }

    /// The configuration this cache was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The loader this cache was created with.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Looks up `key`, loading it if necessary.
    ///
    /// A fresh result resolves immediately. A stale result also resolves
    /// immediately, but kicks off a background refresh whose failure is
    /// logged and suppressed. An expired or missing result makes the caller
    /// wait on the key's single shared load; concurrent callers are
    /// deduplicated onto that load and all receive the same outcome.
    ///
    /// Waiting is bounded by the configured timeout. A timed-out caller gets
    /// [`CacheError::Timeout`]; the load itself keeps running and its result
    /// may serve later callers.
    pub async fn get(&self, key: L::Key) -> CacheResult<L::Value> {
        let channel = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_default();

            let store_in_flight =
                matches!(&entry.in_flight, Some(in_flight) if in_flight.kind == OpKind::Store);

            // An in-flight store supersedes the cached result, even a fresh
            // one: the caller attaches and gets the authoritative value.
            if !store_in_flight {
                if let Some(result) = &entry.result {
                    match Freshness::for_age(result.age(now_millis()), &self.config) {
                        Freshness::Fresh => {
                            tracing::trace!("serving fresh result");
                            return Ok(result.value.clone());
                        }
                        Freshness::Stale => {
                            let value = result.value.clone();
                            if entry.in_flight.is_none() {
                                tracing::trace!("serving stale result, refreshing");
                                let _ = self.spawn_load(entry, &key);
                            } else {
                                tracing::trace!("serving stale result, refresh under way");
                            }
                            return Ok(value);
                        }
                        Freshness::Expired => (),
                    }
                }
            }

            // Cold, expired, or a store in flight: share the pending
            // operation, starting a load if none exists.
            if let Some(in_flight) = &entry.in_flight {
                tracing::trace!(seq = in_flight.seq, "joining in-flight operation");
                in_flight.channel.clone()
            } else {
                self.spawn_load(entry, &key)
            }
        };

        match tokio::time::timeout(self.config.timeout, channel).await {
            Ok(Ok(outcome)) => outcome.map(|loaded| loaded.value),
            Ok(Err(_canceled)) => Err(CacheError::InternalError),
            Err(_elapsed) => Err(CacheError::Timeout(self.config.timeout)),
        }
    }

    /// Writes `value` through to the loader and installs the stored result.
    ///
    /// The store races any in-flight load for the same key. If the store
    /// finishes first, the load's waiters receive the stored value and the
    /// load's own outcome is discarded. If the load finishes first, its
    /// result is installed normally and overwritten when the store lands.
    /// A failed store is reported to this caller only and leaves an
    /// in-flight load undisturbed.
    ///
    /// Unlike [`get`](Self::get), `set` is not bounded by the configured
    /// timeout; it resolves when the store does.
    pub async fn set(&self, key: L::Key, value: L::Value) -> CacheResult<L::Value> {
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();
        let seq = self.next_seq();

        {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_default();
            if entry.in_flight.is_none() {
                // Slot the store so concurrent readers attach to it. With a
                // load already in the slot the store runs unslotted and takes
                // the load's waiters over when it succeeds.
                entry.in_flight = Some(InFlight {
                    kind: OpKind::Store,
                    seq,
                    sender: None,
                    channel: channel.clone(),
                });
            }
        }

        let this = self.clone();
        tokio::spawn(async move {
            let guard = CallOnDrop::new({
                let this = this.clone();
                let key = key.clone();
                move || this.abandon_in_flight(&key, seq)
            });

            let outcome = this.loader.store(&key, value).await;
            this.settle_store(&key, seq, sender, outcome);
            drop(guard);
        });

        match channel.await {
            Ok(outcome) => outcome.map(|loaded| loaded.value),
            Err(_canceled) => Err(CacheError::InternalError),
        }
    }

    /// Starts the shared load for `key` and installs it as the entry's
    /// in-flight operation.
    ///
    /// The load runs as its own task so that it keeps going when individual
    /// waiters give up; its completion settles every waiter attached to the
    /// returned channel.
    fn spawn_load(&self, entry: &mut Entry<L::Value>, key: &L::Key) -> ResultChannel<L::Value> {
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();
        let seq = self.next_seq();

        entry.in_flight = Some(InFlight {
            kind: OpKind::Load,
            seq,
            sender: Some(sender),
            channel: channel.clone(),
        });
        tracing::trace!(seq, "spawning load");

        let this = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let guard = CallOnDrop::new({
                let this = this.clone();
                let key = key.clone();
                move || this.abandon_in_flight(&key, seq)
            });

            let outcome = this.loader.load(&key).await;
            this.settle_load(&key, seq, outcome);
            drop(guard);
        });

        channel
    }

    /// Installs a finished load if it still owns the entry's in-flight slot.
    ///
    /// A load superseded by a store finds the slot gone; its outcome,
    /// success or error, is discarded wholesale since the waiters were
    /// already settled with the store's result.
    fn settle_load(&self, key: &L::Key, seq: u64, outcome: CacheResult<Loaded<L::Value>>) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };

        let sender = match entry.in_flight.take() {
            Some(mut in_flight) if in_flight.seq == seq => in_flight.sender.take(),
            other => {
                entry.in_flight = other;
                tracing::trace!(seq, "discarding superseded load result");
                return;
            }
        };

        match &outcome {
            Ok(loaded) => {
                tracing::debug!(seq, timestamp = loaded.timestamp, "installing load result");
                entry.result = Some(loaded.clone());
            }
            Err(error) => {
                // Errors are never cached. With a prior result still in
                // place this was a refresh; the old result stays and the
                // next stale read retries.
                tracing::warn!(seq, %error, "load failed");
            }
        }

        if let Some(sender) = sender {
            sender.send(outcome).ok();
        }
    }

    /// Installs a finished store and settles its waiters.
    ///
    /// A successful store is authoritative: it replaces the cached result
    /// unconditionally, and waiters of a concurrent in-flight load receive
    /// the stored value while the load's own outcome is left to be
    /// discarded. A failed store settles only its own waiters; an in-flight
    /// load keeps running and keeps its waiters.
    fn settle_store(
        &self,
        key: &L::Key,
        seq: u64,
        sender: oneshot::Sender<CacheResult<Loaded<L::Value>>>,
        outcome: CacheResult<Loaded<L::Value>>,
    ) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };

        match &outcome {
            Ok(loaded) => {
                tracing::debug!(seq, timestamp = loaded.timestamp, "installing stored value");
                entry.result = Some(loaded.clone());

                // Take over the slot unless another store owns it.
                let supersedes = matches!(
                    &entry.in_flight,
                    Some(in_flight) if in_flight.seq == seq || in_flight.kind == OpKind::Load
                );
                if supersedes {
                    if let Some(mut in_flight) = entry.in_flight.take() {
                        if let Some(load_sender) = in_flight.sender.take() {
                            tracing::trace!(
                                superseded = in_flight.seq,
                                "store settles waiters of in-flight load"
                            );
                            load_sender.send(outcome.clone()).ok();
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(seq, %error, "store failed");
                if matches!(&entry.in_flight, Some(in_flight) if in_flight.seq == seq) {
                    entry.in_flight = None;
                }
            }
        }

        sender.send(outcome).ok();
    }

    /// Clears the in-flight slot if `seq` still owns it, failing any
    /// waiters attached to it.
    ///
    /// This is the panic path: on orderly completion the slot has already
    /// been settled and this does nothing.
    fn abandon_in_flight(&self, key: &L::Key, seq: u64) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if matches!(&entry.in_flight, Some(in_flight) if in_flight.seq == seq) {
            if let Some(mut in_flight) = entry.in_flight.take() {
                tracing::error!(seq, "in-flight operation abandoned");
                if let Some(sender) = in_flight.sender.take() {
                    sender.send(Err(CacheError::InternalError)).ok();
                }
            }
        }
    }
}
