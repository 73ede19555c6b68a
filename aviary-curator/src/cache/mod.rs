//! In-process TTL cache with read-through and pattern invalidation
//!
//! Values are stored as JSON so any serde type can be cached and the backing
//! [`CacheStore`] can later be swapped for a shared store without touching
//! call sites. Expired entries are evicted lazily on read and proactively by
//! a [`Sweeper`](crate::sweeper::Sweeper) running [`TtlCache::purge_expired`].
//!
//! State is process-local: two instances of the service do not share a cache.

pub mod invalidation;
pub mod keys;

use aviary_common::time::saturating_add;
use aviary_common::{Clock, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::sweeper::Sweep;

/// TTL used by [`TtlCache::set_default`]
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A cached value and the instant after which it must not be returned
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Key/value storage behind [`TtlCache`]
///
/// Each method is atomic with respect to the others.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn insert(&self, key: String, entry: CacheEntry);
    fn remove(&self, key: &str) -> bool;
    /// Remove `key` only if it is still expired at `now`; returns whether it was removed
    fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> bool;
    /// Remove every key matching `predicate`; returns the number removed
    fn remove_where(&self, predicate: &dyn Fn(&str) -> bool) -> usize;
    /// Remove every entry expired at `now`; returns the number removed
    fn remove_expired(&self, now: DateTime<Utc>) -> usize;
    fn clear(&self);
    fn len(&self) -> usize;
}

/// [`CacheStore`] over a mutex-guarded `HashMap`
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries().get(key).cloned()
    }

    fn insert(&self, key: String, entry: CacheEntry) {
        self.entries().insert(key, entry);
    }

    fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn remove_where(&self, predicate: &dyn Fn(&str) -> bool) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    fn clear(&self) {
        self.entries().clear();
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Read-through TTL cache
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    in_flight: Arc<InFlightMap>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            default_ttl: DEFAULT_TTL,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cache over a fresh [`InMemoryCacheStore`]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()), clock)
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cached value for `key`, or `None` if missing or expired
    ///
    /// An expired entry is removed. An entry that does not decode as `T` is
    /// treated as a miss and removed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.store.get(key)?;
        let now = self.clock.now();

        if entry.is_expired(now) {
            self.store.remove_if_expired(key, now);
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape, evicting");
                self.store.remove(key);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let expires_at = saturating_add(self.clock.now(), ttl);
        self.store
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    /// Store `value` under `key` for the default TTL
    pub fn set_default<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_ttl)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.remove(key)
    }

    /// Delete every key the regex matches; returns the number deleted
    pub fn delete_pattern(&self, pattern: &Regex) -> usize {
        let removed = self.store.remove_where(&|key| pattern.is_match(key));
        debug!(pattern = %pattern, removed, "Cache pattern invalidation");
        removed
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry; returns the number removed
    pub fn purge_expired(&self) -> usize {
        self.store.remove_expired(self.clock.now())
    }

    /// Read-through lookup
    ///
    /// On a miss, `fetch` runs and a successful result is cached for `ttl`.
    /// Fetch errors propagate unchanged and nothing is cached. Concurrent misses
    /// for the same key each run their own fetch; see
    /// [`get_or_fetch_shared`](Self::get_or_fetch_shared) to share one.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Duration,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        debug!(key = %key, "Cache miss, fetching");
        let value = fetch().await?;
        self.store_fetched(key, &value, ttl);
        Ok(value)
    }

    /// Read-through lookup where concurrent misses for one key share a fetch
    ///
    /// The first caller fetches while later callers wait, then read the value
    /// it cached. If that fetch fails, the next waiter fetches in turn.
    pub async fn get_or_fetch_shared<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Duration,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let slot = InFlightSlot::claim(&self.in_flight, key);

        let _guard = slot.gate.lock().await;
        match self.get::<T>(key) {
            Some(value) => Ok(value),
            None => {
                let fetched = fetch().await;
                if let Ok(value) = &fetched {
                    self.store_fetched(key, value, ttl);
                }
                fetched
            }
        }
    }

    fn store_fetched<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.set(key, value, ttl) {
            warn!(key = %key, error = %e, "Failed to cache fetched value");
        }
    }
}

type InFlightMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// One caller's hold on the per-key fetch gate
///
/// Dropping the slot, on completion or when the caller's future is dropped,
/// removes the gate from the map once no other caller holds it.
struct InFlightSlot<'a> {
    in_flight: &'a InFlightMap,
    key: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlightSlot<'a> {
    fn claim(in_flight: &'a InFlightMap, key: &'a str) -> Self {
        let gate = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self {
            in_flight,
            key,
            gate,
        }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's reference plus ours
        let last_holder = Arc::strong_count(&self.gate) <= 2;
        let same_gate = in_flight
            .get(self.key)
            .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate));
        if last_holder && same_gate {
            in_flight.remove(self.key);
        }
    }
}

impl Sweep for TtlCache {
    fn name(&self) -> &str {
        "cache"
    }

    fn sweep(&self) -> Result<usize> {
        Ok(self.purge_expired())
    }
}
