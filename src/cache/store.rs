//! The keyed resource cache.
//!
//! Every key owns a slot holding the last applied value, its status and the
//! subscribers interested in it. All slots live behind one mutex so that a
//! batch invalidation is observed as a single step; callbacks always run after
//! the lock is released, with an immutable snapshot.
//!
//! Completions are applied and delivered under a separate dispatch lock, so
//! subscribers see versions in the order they were applied even when fetch
//! drivers finish on different worker threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use crate::domain::identity::IdentityContext;

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryStatus};
use super::fetcher::{FetchError, Fetcher};
use super::keys::ResourceKey;
use super::lock::mutex_lock;
use super::subscription::{SubscriberId, SubscriberRegistry, Subscription};

const SOURCE: &str = "cache::store";

const METRIC_FETCH_TOTAL: &str = "chirp_cache_fetch_total";
const METRIC_FETCH_MS: &str = "chirp_cache_fetch_ms";
const METRIC_COALESCED_TOTAL: &str = "chirp_cache_coalesced_total";
const METRIC_DISCARDED_TOTAL: &str = "chirp_cache_discarded_total";

type FetchResult<V> = Result<Arc<V>, FetchError>;
type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;
type Callback<V> = Arc<dyn Fn(&CacheEntry<V>) + Send + Sync>;
type Dispatch<V> = (CacheEntry<V>, Vec<Callback<V>>);

struct InFlight<V> {
    ticket: u64,
    future: SharedFetch<V>,
}

struct Slot<V> {
    entry: CacheEntry<V>,
    /// Last ticket handed to a fetch.
    issued: u64,
    /// Ticket of the last result written into `entry`.
    applied: u64,
    inflight: Option<InFlight<V>>,
    /// Invalidated after the outstanding fetch started.
    dirty: bool,
    /// Version last handed to subscribers.
    notified: u64,
    subscribers: Vec<(SubscriberId, Callback<V>)>,
}

impl<V> Slot<V> {
    fn new(key: ResourceKey) -> Self {
        Self {
            entry: CacheEntry::idle(key),
            issued: 0,
            applied: 0,
            inflight: None,
            dirty: false,
            notified: 0,
            subscribers: Vec::new(),
        }
    }

    fn needs_fetch(&self) -> bool {
        self.inflight.is_none() && matches!(self.entry.status, EntryStatus::Idle | EntryStatus::Stale)
    }

    fn callbacks(&self) -> Vec<Callback<V>> {
        self.subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    /// Write the result of fetch `ticket`, returning what to notify.
    fn apply(&mut self, ticket: u64, result: FetchResult<V>) -> Option<Dispatch<V>> {
        if ticket <= self.applied {
            if ticket < self.applied {
                counter!(METRIC_DISCARDED_TOTAL).increment(1);
                debug!(key = %self.entry.key, ticket, applied = self.applied, "Discarded superseded fetch result");
            }
            return None;
        }

        let latest = self
            .inflight
            .as_ref()
            .is_some_and(|inflight| inflight.ticket == ticket);

        match result {
            Ok(value) => {
                self.applied = ticket;
                self.entry.value = Some(value);
                self.entry.version += 1;
                self.entry.last_error = None;
                self.entry.updated_at = Some(OffsetDateTime::now_utc());
                if latest {
                    self.inflight = None;
                    self.entry.status = if self.dirty {
                        EntryStatus::Stale
                    } else {
                        EntryStatus::Fresh
                    };
                    self.dirty = false;
                }
                counter!(METRIC_FETCH_TOTAL, "outcome" => "ok").increment(1);
                debug!(
                    key = %self.entry.key,
                    ticket,
                    version = self.entry.version,
                    status = %self.entry.status,
                    "Fetch result applied"
                );
                if self.entry.version <= self.notified {
                    return None;
                }
                self.notified = self.entry.version;
                Some((self.entry.clone(), self.callbacks()))
            }
            Err(error) => {
                if !latest {
                    debug!(key = %self.entry.key, ticket, error = %error, "Ignored failure of superseded fetch");
                    return None;
                }
                counter!(METRIC_FETCH_TOTAL, "outcome" => "error").increment(1);
                warn!(
                    key = %self.entry.key,
                    ticket,
                    error = %error,
                    keeps_value = self.entry.value.is_some(),
                    "Fetch failed"
                );
                self.applied = ticket;
                self.inflight = None;
                self.dirty = false;
                self.entry.status = EntryStatus::Errored;
                self.entry.last_error = Some(error);
                None
            }
        }
    }
}

pub(crate) struct CacheInner<V> {
    config: CacheConfig,
    fetcher: Arc<dyn Fetcher<V>>,
    identity: IdentityContext,
    runtime: Handle,
    slots: Mutex<HashMap<ResourceKey, Slot<V>>>,
    /// Held from apply through delivery; never taken inside a callback.
    dispatch: Mutex<()>,
    next_subscriber: AtomicU64,
}

impl<V: Send + Sync + 'static> CacheInner<V> {
    /// Issue a new ticket for `key` and start its fetch on the runtime.
    ///
    /// The shared future is parked in `slot.inflight` for callers to join.
    fn start_fetch(self: &Arc<Self>, key: &ResourceKey, slot: &mut Slot<V>) {
        slot.issued += 1;
        let ticket = slot.issued;

        let fetcher = Arc::clone(&self.fetcher);
        let identity = self.identity.current();
        let fetch_key = key.clone();
        let future = async move {
            let started_at = Instant::now();
            let result = fetcher.fetch(&fetch_key, identity.as_deref()).await;
            histogram!(METRIC_FETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
            result.map(Arc::new)
        }
        .boxed()
        .shared();

        slot.inflight = Some(InFlight {
            ticket,
            future: future.clone(),
        });
        slot.dirty = false;
        slot.entry.status = EntryStatus::Fetching;
        debug!(key = %key, ticket, "Fetch started");

        let inner = Arc::downgrade(self);
        let driver_key = key.clone();
        self.runtime.spawn(async move {
            let result = future.await;
            if let Some(inner) = inner.upgrade() {
                inner.complete(&driver_key, ticket, result);
            }
        });
    }

    fn complete(&self, key: &ResourceKey, ticket: u64, result: FetchResult<V>) {
        let _dispatching = mutex_lock(&self.dispatch, SOURCE, "dispatch");
        let dispatch = {
            let mut slots = mutex_lock(&self.slots, SOURCE, "complete");
            match slots.get_mut(key) {
                Some(slot) => slot.apply(ticket, result),
                None => None,
            }
        };

        if let Some((snapshot, callbacks)) = dispatch {
            for callback in callbacks {
                callback(&snapshot);
            }
        }
    }
}

impl<V: Send + Sync + 'static> SubscriberRegistry for CacheInner<V> {
    fn remove_subscriber(&self, key: &ResourceKey, id: SubscriberId) {
        let mut slots = mutex_lock(&self.slots, SOURCE, "remove_subscriber");
        if let Some(slot) = slots.get_mut(key) {
            slot.subscribers.retain(|(subscriber, _)| *subscriber != id);
            debug!(key = %key, subscriber = id, remaining = slot.subscribers.len(), "Subscriber removed");
        }
    }
}

/// Keyed cache of server-derived values with request coalescing.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct ResourceCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for ResourceCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Non-owning handle for background tasks that must not keep the cache alive.
pub(crate) struct WeakResourceCache<V>(Weak<CacheInner<V>>);

impl<V> WeakResourceCache<V> {
    pub(crate) fn upgrade(&self) -> Option<ResourceCache<V>> {
        self.0.upgrade().map(|inner| ResourceCache { inner })
    }
}

impl<V: Send + Sync + 'static> ResourceCache<V> {
    /// Create a cache whose fetches run on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: CacheConfig, fetcher: Arc<dyn Fetcher<V>>, identity: IdentityContext) -> Self {
        Self::with_runtime(config, fetcher, identity, Handle::current())
    }

    pub fn with_runtime(
        config: CacheConfig,
        fetcher: Arc<dyn Fetcher<V>>,
        identity: IdentityContext,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                fetcher,
                identity,
                runtime,
                slots: Mutex::new(HashMap::new()),
                dispatch: Mutex::new(()),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakResourceCache<V> {
        WeakResourceCache(Arc::downgrade(&self.inner))
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.inner.identity
    }

    /// Return the entry for `key` without waiting.
    ///
    /// A key that was never fetched (or whose refresh was deferred) gets a
    /// fetch scheduled; the returned snapshot predates that fetch.
    pub fn read(&self, key: &ResourceKey) -> CacheEntry<V> {
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "read");
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()));
        let snapshot = slot.entry.clone();

        if slot.needs_fetch() {
            self.inner.start_fetch(key, slot);
        } else if slot.inflight.is_some() {
            counter!(METRIC_COALESCED_TOTAL).increment(1);
        }

        snapshot
    }

    /// Return the entry for `key` once any outstanding fetch has landed.
    ///
    /// Joins the fetch in flight if there is one; starts one under the same
    /// rules as [`read`](Self::read) otherwise. Fresh and errored entries are
    /// returned immediately.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn load(&self, key: &ResourceKey) -> CacheEntry<V> {
        let (ticket, future) = {
            let mut slots = mutex_lock(&self.inner.slots, SOURCE, "load");
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(key.clone()));

            if slot.inflight.is_some() {
                counter!(METRIC_COALESCED_TOTAL).increment(1);
            } else if slot.needs_fetch() {
                self.inner.start_fetch(key, slot);
            }

            match slot.inflight.as_ref() {
                Some(inflight) => (inflight.ticket, inflight.future.clone()),
                None => return slot.entry.clone(),
            }
        };

        let result = future.await;
        // The spawned driver may not have run yet; applying twice is a no-op.
        self.inner.complete(key, ticket, result);
        self.peek(key)
    }

    /// Return the entry for `key` without scheduling anything.
    pub fn peek(&self, key: &ResourceKey) -> CacheEntry<V> {
        let slots = mutex_lock(&self.inner.slots, SOURCE, "peek");
        slots
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_else(|| CacheEntry::idle(key.clone()))
    }

    /// Register `callback` for every version change of `key`.
    ///
    /// Schedules a fetch under the same rules as [`read`](Self::read).
    pub fn subscribe<F>(&self, key: &ResourceKey, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<V>) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        {
            let mut slots = mutex_lock(&self.inner.slots, SOURCE, "subscribe");
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(key.clone()));
            slot.subscribers.push((id, Arc::new(callback)));
            debug!(key = %key, subscriber = id, total = slot.subscribers.len(), "Subscriber added");

            if slot.needs_fetch() {
                self.inner.start_fetch(key, slot);
            } else if slot.inflight.is_some() {
                counter!(METRIC_COALESCED_TOTAL).increment(1);
            }
        }

        let registry = Arc::downgrade(&self.inner) as Weak<dyn SubscriberRegistry>;
        Subscription::new(key.clone(), id, registry)
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        let slots = mutex_lock(&self.inner.slots, SOURCE, "subscriber_count");
        slots.get(key).map_or(0, |slot| slot.subscribers.len())
    }

    /// Mark `key` stale and refresh it if anyone is watching.
    pub fn invalidate(&self, key: &ResourceKey) {
        self.invalidate_many(std::slice::from_ref(key));
    }

    /// Mark every key stale, then refresh the watched ones.
    ///
    /// All entries change status under a single lock acquisition before the
    /// first refresh starts. Unwatched keys are refreshed lazily by the next
    /// `read`, `load` or `subscribe`.
    pub fn invalidate_many<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a ResourceKey>,
    {
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "invalidate_many");

        let mut refresh: Vec<ResourceKey> = Vec::new();
        for key in keys {
            let Some(slot) = slots.get_mut(key) else {
                debug!(key = %key, "Invalidation skipped: key never read");
                continue;
            };
            if slot.entry.status != EntryStatus::Idle {
                slot.entry.status = EntryStatus::Stale;
            }
            if slot.inflight.is_some() {
                slot.dirty = true;
            }
            let watched = !slot.subscribers.is_empty();
            debug!(key = %key, watched, "Entry invalidated");
            if watched && !refresh.contains(key) {
                refresh.push(key.clone());
            }
        }

        for key in &refresh {
            if let Some(slot) = slots.get_mut(key) {
                self.inner.start_fetch(key, slot);
            }
        }
    }

    /// Invalidate every key the cache has seen.
    pub fn invalidate_all(&self) {
        let keys = self.keys();
        self.invalidate_many(&keys);
    }

    /// Keys with a slot, in key order.
    pub fn keys(&self) -> Vec<ResourceKey> {
        let slots = mutex_lock(&self.inner.slots, SOURCE, "keys");
        let mut keys: Vec<ResourceKey> = slots.keys().cloned().collect();
        keys.sort();
        keys
    }
}
