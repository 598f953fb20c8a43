//! Bounded LRU/TTL cache for derived render artifacts.
//!
//! Artifacts own resources that must be released deliberately, so every
//! path out of the table runs `dispose` first. Disposal failures are
//! logged and swallowed; a leaked artifact must never take the cache
//! down with it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::error::ResourceError;

/// Default maximum number of cached artifacts.
pub const DEFAULT_MAX_ENTRIES: usize = 20;

/// Default time an entry may sit unaccessed before it expires.
pub const DEFAULT_TTL: Duration = Duration::from_secs(180);

/// Minimum time between proactive expiry sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A cached artifact that must release its resources before the cache
/// drops it.
pub trait Disposable {
    fn dispose(&mut self) -> Result<(), ResourceError>;
}

#[derive(Debug)]
struct CacheEntry<D> {
    artifact: D,
    last_accessed: Instant,
    /// Monotonic insertion/access counter. Breaks `Instant` ties so
    /// eviction order stays deterministic within one clock tick.
    stamp: u64,
}

/// LRU/TTL cache of disposable artifacts keyed by `K`.
///
/// A `get` hit refreshes recency; an expired entry is disposed and
/// removed on the access that discovers it. `maybe_sweep` bounds memory
/// under idle access by expiring entries proactively at most once per
/// `SWEEP_INTERVAL`.
#[derive(Debug)]
pub struct PictureCache<K, D> {
    entries: HashMap<K, CacheEntry<D>>,
    max_entries: usize,
    ttl: Duration,
    next_stamp: u64,
    last_sweep: Instant,
}

impl<K: Eq + Hash + Clone + Debug, D: Disposable> Default for PictureCache<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Debug, D: Disposable> PictureCache<K, D> {
    /// Create a cache with the default capacity and TTL.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }

    /// Create a cache holding at most `max_entries` artifacts, each
    /// expiring `ttl` after its last access.
    pub fn with_config(max_entries: usize, ttl: Duration) -> Self {
        Self::with_config_at(max_entries, ttl, Instant::now())
    }

    fn with_config_at(max_entries: usize, ttl: Duration, now: Instant) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            ttl,
            next_stamp: 0,
            last_sweep: now,
        }
    }

    /// Look up an artifact, refreshing its recency on a hit. An entry
    /// past its TTL is disposed and removed instead of returned.
    pub fn get(&mut self, key: &K) -> Option<&D> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &K, now: Instant) -> Option<&D> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.last_accessed) >= self.ttl,
            None => return None,
        };
        if expired {
            self.dispose_key(key);
            return None;
        }
        let stamp = self.take_stamp();
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.stamp = stamp;
        Some(&entry.artifact)
    }

    /// Insert an artifact. Replacing an existing key disposes the old
    /// artifact; inserting at capacity first evicts the least recently
    /// accessed entry.
    pub fn put(&mut self, key: K, artifact: D) {
        self.put_at(key, artifact, Instant::now());
    }

    fn put_at(&mut self, key: K, artifact: D, now: Instant) {
        if self.entries.contains_key(&key) {
            self.dispose_key(&key);
        } else if self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.last_accessed, entry.stamp))
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                self.dispose_key(&victim);
            }
        }
        let stamp = self.take_stamp();
        self.entries.insert(
            key,
            CacheEntry {
                artifact,
                last_accessed: now,
                stamp,
            },
        );
    }

    /// Dispose and remove one entry.
    /// Returns true if the key was present.
    pub fn remove(&mut self, key: &K) -> bool {
        if self.entries.contains_key(key) {
            self.dispose_key(key);
            true
        } else {
            false
        }
    }

    /// Dispose and remove every entry.
    pub fn clear(&mut self) {
        let keys: Vec<K> = self.entries.keys().cloned().collect();
        for key in &keys {
            self.dispose_key(key);
        }
    }

    /// Dispose and remove all expired entries, at most once per
    /// `SWEEP_INTERVAL`. Call this from a periodic tick.
    pub fn maybe_sweep(&mut self) {
        self.maybe_sweep_at(Instant::now());
    }

    fn maybe_sweep_at(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = now;

        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_accessed) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.dispose_key(key);
        }
        if !expired.is_empty() {
            log::debug!("swept {} expired cache entries", expired.len());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispose an entry in place, then drop it from the table.
    fn dispose_key(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key) {
            if let Err(err) = entry.artifact.dispose() {
                log::warn!("failed to dispose cached artifact {key:?}: {err}");
            }
        }
        self.entries.remove(key);
    }

    fn take_stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }
}
