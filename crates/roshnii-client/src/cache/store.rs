//! Keyed resource cache with request de-duplication.
//!
//! # Overview
//!
//! Each key owns one slot holding the last fetched value, when it was
//! fetched, and at most one in-flight fetch. Concurrent readers of the same
//! missing or stale key await that single fetch.
//!
//! Every mutation of a slot (write, invalidate, remove, clear) gives the
//! slot a new generation drawn from one store-wide counter, so a slot
//! recreated after a removal never reuses a number an older fetch holds. A
//! fetch that completes under an older generation is handed to the readers
//! that awaited it but never written into the cache, so a response that was
//! in flight across a mutation cannot resurrect pre-mutation data.
//!
//! # Subscriptions
//!
//! [`CacheStore::subscribe`] registers a callback that fires with the new
//! value whenever the entry changes, and with `None` when it is removed.
//! Invalidating a key that has subscribers refetches it in the background;
//! keys nobody observes are refetched lazily on the next read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::key::{CacheKey, KeyPattern};
use super::value::{CacheResource, CacheValue};
use crate::error::Result;

/// Loads the authoritative value of a key from the server.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, key: &CacheKey) -> Result<CacheValue>;
}

type SharedFetch = Shared<BoxFuture<'static, Result<CacheValue>>>;

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

struct Slot {
    value: Option<CacheValue>,
    fetched_at: Option<Instant>,
    stale: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    notify: watch::Sender<Option<CacheValue>>,
    subscribers: usize,
}

impl Slot {
    fn new(generation: u64) -> Self {
        let (notify, _) = watch::channel(None);
        Self {
            value: None,
            fetched_at: None,
            stale: false,
            generation,
            in_flight: None,
            notify,
            subscribers: 0,
        }
    }

    fn is_fresh(&self, stale_time: Duration) -> bool {
        match (&self.value, self.fetched_at) {
            (Some(_), Some(at)) => !self.stale && at.elapsed() < stale_time,
            _ => false,
        }
    }

    fn set(&mut self, generation: u64, value: Option<CacheValue>) {
        self.generation = generation;
        self.in_flight = None;
        self.stale = false;
        self.fetched_at = value.as_ref().map(|_| Instant::now());
        self.value = value.clone();
        self.notify.send_replace(value);
    }

    fn mark_stale(&mut self, generation: u64) {
        self.generation = generation;
        self.in_flight = None;
        self.stale = true;
    }
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Option<CacheValue>,
    pub age: Option<Duration>,
    pub stale: bool,
    pub fetching: bool,
    pub subscribers: usize,
    pub generation: u64,
}

struct StoreInner {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    fetcher: Arc<dyn Fetcher>,
    stale_time: Duration,
    generations: AtomicU64,
}

impl StoreInner {
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn slot<'a>(&self, slots: &'a mut HashMap<CacheKey, Slot>, key: &CacheKey) -> &'a mut Slot {
        slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(self.next_generation()))
    }
}

#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    pub fn new(fetcher: Arc<dyn Fetcher>, stale_time: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                slots: Mutex::new(HashMap::new()),
                fetcher,
                stale_time,
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn stale_time(&self) -> Duration {
        self.inner.stale_time
    }

    /// Returns the cached value if fresh, otherwise joins or starts the
    /// single fetch for `key`.
    pub async fn read(&self, key: &CacheKey) -> Result<CacheValue> {
        let fetch = {
            let mut slots = self.inner.slots.lock();
            let slot = self.inner.slot(&mut slots, key);
            if slot.is_fresh(self.inner.stale_time) {
                if let Some(value) = &slot.value {
                    tracing::trace!(%key, "cache hit");
                    return Ok(value.clone());
                }
            }
            self.join_or_start(key, slot)
        };
        fetch.await
    }

    /// [`read`](Self::read) narrowed to a concrete resource type.
    pub async fn read_as<T: CacheResource>(&self, key: &CacheKey) -> Result<T> {
        T::from_cache_value(self.read(key).await?)
    }

    /// Cached value regardless of freshness. Never fetches.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheValue> {
        self.inner
            .slots
            .lock()
            .get(key)
            .and_then(|slot| slot.value.clone())
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let slots = self.inner.slots.lock();
        slots.get(key).map(|slot| CacheEntry {
            key: key.clone(),
            value: slot.value.clone(),
            age: slot.fetched_at.map(|at| at.elapsed()),
            stale: !slot.is_fresh(self.inner.stale_time),
            fetching: slot.in_flight.is_some(),
            subscribers: slot.subscribers,
            generation: slot.generation,
        })
    }

    pub fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|slot| slot.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` as fresh and notifies subscribers. Returns the new
    /// generation of the entry.
    pub fn write(&self, key: &CacheKey, value: CacheValue) -> u64 {
        let mut slots = self.inner.slots.lock();
        let slot = self.inner.slot(&mut slots, key);
        slot.set(self.inner.next_generation(), Some(value));
        tracing::debug!(%key, generation = slot.generation, "cache write");
        slot.generation
    }

    /// Atomically replaces the entry with `patch(current)`.
    ///
    /// Returns the previous value and the new generation, or `None` when
    /// `patch` declined to change anything.
    pub fn update<F>(&self, key: &CacheKey, patch: F) -> Option<(Option<CacheValue>, u64)>
    where
        F: FnOnce(Option<&CacheValue>) -> Option<CacheValue>,
    {
        let mut slots = self.inner.slots.lock();
        let slot = self.inner.slot(&mut slots, key);
        let next = patch(slot.value.as_ref())?;
        let previous = slot.value.clone();
        slot.set(self.inner.next_generation(), Some(next));
        Some((previous, slot.generation))
    }

    /// Puts `value` back only if nothing touched the entry since
    /// `generation`. Returns whether the entry was restored.
    pub fn restore(&self, key: &CacheKey, generation: u64, value: Option<CacheValue>) -> bool {
        let mut slots = self.inner.slots.lock();
        let Some(slot) = slots.get_mut(key) else {
            return false;
        };
        if slot.generation != generation {
            tracing::debug!(%key, expected = generation, actual = slot.generation, "restore skipped");
            return false;
        }
        slot.set(self.inner.next_generation(), value);
        true
    }

    /// Marks `key` stale. Returns whether an entry existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.invalidate_matching(&KeyPattern::Exact(key.clone())) > 0
    }

    /// Marks every entry matching `pattern` stale; observed entries are
    /// refetched in the background. Returns the number of entries touched.
    pub fn invalidate_matching(&self, pattern: &KeyPattern) -> usize {
        let (touched, observed) = {
            let mut slots = self.inner.slots.lock();
            let mut touched = 0;
            let mut observed = Vec::new();
            for (key, slot) in slots.iter_mut().filter(|(key, _)| pattern.matches(key)) {
                slot.mark_stale(self.inner.next_generation());
                touched += 1;
                if slot.subscribers > 0 {
                    observed.push(key.clone());
                }
            }
            (touched, observed)
        };

        tracing::debug!(%pattern, touched, refetching = observed.len(), "cache invalidate");
        for key in observed {
            self.refetch_in_background(&key);
        }
        touched
    }

    /// Drops the value of `key` without refetching; subscribers see `None`.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut slots = self.inner.slots.lock();
        let slot = slots.get_mut(key)?;
        let previous = slot.value.clone();
        slot.set(self.inner.next_generation(), None);
        if slot.subscribers == 0 {
            slots.remove(key);
        }
        tracing::debug!(%key, "cache remove");
        previous
    }

    /// Drops every value, cancelling in-flight fetches' writes.
    pub fn clear(&self) {
        let mut slots = self.inner.slots.lock();
        let count = slots.len();
        for slot in slots.values_mut() {
            slot.set(self.inner.next_generation(), None);
        }
        slots.retain(|_, slot| slot.subscribers > 0);
        tracing::debug!(count, "cache cleared");
    }

    /// Calls `callback` with the new value every time `key` changes.
    ///
    /// A missing or stale entry is fetched in the background. Dropping the
    /// returned [`Subscription`] stops the callbacks.
    pub fn subscribe<F>(&self, key: &CacheKey, callback: F) -> Subscription
    where
        F: Fn(Option<CacheValue>) + Send + Sync + 'static,
    {
        let (mut rx, needs_fetch) = {
            let mut slots = self.inner.slots.lock();
            let slot = self.inner.slot(&mut slots, key);
            slot.subscribers += 1;
            (
                slot.notify.subscribe(),
                !slot.is_fresh(self.inner.stale_time) && slot.in_flight.is_none(),
            )
        };

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                callback(value);
            }
        });

        if needs_fetch {
            self.refetch_in_background(key);
        }

        Subscription {
            store: Arc::downgrade(&self.inner),
            key: key.clone(),
            task: task.abort_handle(),
        }
    }

    fn refetch_in_background(&self, key: &CacheKey) {
        let fetch = {
            let mut slots = self.inner.slots.lock();
            let slot = self.inner.slot(&mut slots, key);
            self.join_or_start(key, slot)
        };
        let key = key.clone();
        tokio::spawn(async move {
            if let Err(err) = fetch.await {
                tracing::debug!(%key, error = %err, "background refetch failed");
            }
        });
    }

    fn join_or_start(&self, key: &CacheKey, slot: &mut Slot) -> SharedFetch {
        if let Some(in_flight) = &slot.in_flight {
            if in_flight.generation == slot.generation {
                tracing::trace!(%key, "joining in-flight fetch");
                return in_flight.fetch.clone();
            }
        }

        let generation = slot.generation;
        let fetcher = self.inner.fetcher.clone();
        // Weak: a fetch parked in its own slot must not keep the store alive.
        let store = Arc::downgrade(&self.inner);
        let fetch_key = key.clone();
        let fetch = async move {
            let result = fetcher.fetch(&fetch_key).await;
            if let Some(inner) = store.upgrade() {
                complete(&inner, &fetch_key, generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        tracing::debug!(%key, generation, "cache fetch");
        slot.in_flight = Some(InFlight {
            generation,
            fetch: fetch.clone(),
        });
        fetch
    }
}

fn complete(inner: &StoreInner, key: &CacheKey, generation: u64, result: &Result<CacheValue>) {
    let mut slots = inner.slots.lock();
    let Some(slot) = slots.get_mut(key) else {
        return;
    };
    if slot.generation != generation {
        tracing::debug!(%key, generation, current = slot.generation, "discarding superseded fetch");
        return;
    }
    match result {
        Ok(value) => {
            slot.set(inner.next_generation(), Some(value.clone()));
        }
        Err(err) => {
            slot.in_flight = None;
            tracing::debug!(%key, error = %err, "cache fetch failed");
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.len())
            .field("stale_time", &self.inner.stale_time)
            .finish()
    }
}

/// Live registration created by [`CacheStore::subscribe`].
pub struct Subscription {
    store: Weak<StoreInner>,
    key: CacheKey,
    task: AbortHandle,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(inner) = self.store.upgrade() {
            let mut slots = inner.slots.lock();
            if let Some(slot) = slots.get_mut(&self.key) {
                slot.subscribers = slot.subscribers.saturating_sub(1);
                if slot.subscribers == 0 && slot.value.is_none() && slot.in_flight.is_none() {
                    slots.remove(&self.key);
                }
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}
