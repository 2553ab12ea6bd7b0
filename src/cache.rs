//! Expiring key/value cache with LRU eviction.
//!
//! Entries carry their own TTL and expire lazily on `get`/`has` (or in bulk
//! through `cleanup`). When the cache is full, inserting a new key evicts the
//! least recently used entry first.
//!
//! Recency is a monotonically increasing counter bumped on every hit and
//! every `set`; the entry with the smallest marker is the LRU victim.
//!
//! All methods take `&self`, so one instance can be shared across the
//! optimizer's parallel route tasks. `get_or_set` does not hold the lock
//! while the producer runs: two callers racing on the same cold key may
//! both compute, and the last write wins.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Default number of entries before LRU eviction kicks in.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default entry lifetime when `set` is called without a TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl: DEFAULT_TTL,
        }
    }
}

/// Diagnostic snapshot returned by [`ExpiringCache::stats`].
#[derive(Debug, Clone)]
pub struct CacheStats<K> {
    pub size: usize,
    pub keys: Vec<K>,
    /// Creation time of the oldest live entry.
    pub oldest_entry: Option<Instant>,
    /// Creation time of the newest live entry.
    pub newest_entry: Option<Instant>,
}

type EvictionCallback<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    marker: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    recency: BTreeMap<u64, K>,
    counter: u64,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn next_marker(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn touch(&mut self, key: &K) {
        let marker = self.next_marker();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.marker);
            entry.marker = marker;
            self.recency.insert(marker, key.clone());
        }
    }

    fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let (key, entry) = self.entries.remove_entry(key)?;
        self.recency.remove(&entry.marker);
        Some((key, entry.value))
    }

    fn remove_if_expired(&mut self, key: &K, now: Instant) -> Option<(K, V)> {
        let expired = self.entries.get(key).is_some_and(|entry| entry.is_expired(now));
        if expired { self.remove(key) } else { None }
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let key = self.recency.values().next()?.clone();
        self.remove(&key)
    }
}

/// Generic TTL + LRU cache. See the module docs for the eviction model.
pub struct ExpiringCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    config: CacheConfig,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                counter: 0,
            }),
            config,
            on_evict: None,
        }
    }

    /// Registers a callback invoked with every entry removed from the cache
    /// (delete, clear, expiry, LRU eviction). Overwrites by `set` do not
    /// trigger it.
    pub fn with_eviction_callback(
        mut self,
        callback: impl Fn(&K, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Runs after the lock is released so callbacks may touch the cache.
    fn notify(&self, removed: impl IntoIterator<Item = (K, V)>) {
        if let Some(callback) = &self.on_evict {
            for (key, value) in removed {
                callback(&key, &value);
            }
        }
    }

    /// Value for `key` unless absent or expired. A hit refreshes recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        if let Some(expired) = state.remove_if_expired(key, Instant::now()) {
            drop(state);
            self.notify([expired]);
            return None;
        }

        let value = state.entries.get(key).map(|entry| entry.value.clone())?;
        state.touch(key);
        Some(value)
    }

    /// Inserts with the configured default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut state = self.lock();
        let mut evicted = None;
        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_size {
            evicted = state.evict_lru();
        }

        let marker = state.next_marker();
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl,
            marker,
        };
        if let Some(previous) = state.entries.insert(key.clone(), entry) {
            state.recency.remove(&previous.marker);
        }
        state.recency.insert(marker, key);
        drop(state);

        if evicted.is_some() {
            trace!("evicted least recently used cache entry");
        }
        self.notify(evicted);
    }

    /// Same expiry rules as [`get`](Self::get), without touching recency.
    pub fn has(&self, key: &K) -> bool {
        let mut state = self.lock();
        if let Some(expired) = state.remove_if_expired(key, Instant::now()) {
            drop(state);
            self.notify([expired]);
            return false;
        }
        state.entries.contains_key(key)
    }

    pub fn delete(&self, key: &K) -> bool {
        let removed = self.lock().remove(key);
        let found = removed.is_some();
        self.notify(removed);
        found
    }

    pub fn clear(&self) {
        let drained: Vec<(K, V)> = {
            let mut state = self.lock();
            state.recency.clear();
            state.entries.drain().map(|(key, entry)| (key, entry.value)).collect()
        };
        self.notify(drained);
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let removed: Vec<(K, V)> = {
            let mut state = self.lock();
            let expired: Vec<K> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            expired.iter().filter_map(|key| state.remove(key)).collect()
        };

        let count = removed.len();
        if count > 0 {
            debug!(count, "removed expired cache entries");
        }
        self.notify(removed);
        count
    }

    /// Removes every entry whose key matches `predicate`.
    pub fn delete_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let removed: Vec<(K, V)> = {
            let mut state = self.lock();
            let matching: Vec<K> = state
                .entries
                .keys()
                .filter(|key| predicate(key))
                .cloned()
                .collect();
            matching.iter().filter_map(|key| state.remove(key)).collect()
        };
        let count = removed.len();
        self.notify(removed);
        count
    }

    /// Cached value for `key`, or the producer's result stored with the
    /// default TTL. The producer runs at most once per call.
    pub fn get_or_set(&self, key: K, producer: impl FnOnce() -> V) -> V {
        self.get_or_set_with_ttl(key, self.config.default_ttl, producer)
    }

    pub fn get_or_set_with_ttl(&self, key: K, ttl: Duration, producer: impl FnOnce() -> V) -> V {
        let infallible = || Ok::<V, std::convert::Infallible>(producer());
        match self.try_get_or_set(key, Some(ttl), infallible) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_set`](Self::get_or_set) with a fallible producer.
    /// Errors are returned as-is and nothing is cached.
    pub fn try_get_or_set<E>(
        &self,
        key: K,
        ttl: Option<Duration>,
        producer: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = producer()?;
        self.set_with_ttl(key, value.clone(), ttl.unwrap_or(self.config.default_ttl));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats<K> {
        let state = self.lock();
        let created = state.entries.values().map(|entry| entry.created_at);
        CacheStats {
            size: state.entries.len(),
            keys: state.entries.keys().cloned().collect(),
            oldest_entry: created.clone().min(),
            newest_entry: created.max(),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + AsRef<str>,
    V: Clone,
{
    /// Removes all keys in a `domain:` namespace (or any other prefix).
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let count = self.delete_where(|key| key.as_ref().starts_with(prefix));
        debug!(prefix, count, "invalidated cache prefix");
        count
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Runs [`cleanup`](Self::cleanup) every `interval` on a background
    /// thread. The thread holds only a weak reference and exits when the
    /// cache is dropped or the handle is stopped.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> std::io::Result<CleanupHandle> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("cache-cleanup".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match cache.upgrade() {
                            Some(cache) => {
                                cache.cleanup();
                            }
                            None => break,
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(CleanupHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl<K, V> Default for ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Stops the background cleanup thread when stopped or dropped.
pub struct CleanupHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    pub fn stop(self) {}
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The thread may already be gone; either way it stops.
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
