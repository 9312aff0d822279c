//! L1 Cache - Volatile Memory Tier
//!
//! Bounded in-process map with least-recently-used eviction.
//!
//! # Design
//!
//! - A single `parking_lot::Mutex` serializes every operation, including
//!   reads (a hit moves the key to the most-recently-used position)
//! - Recency is a monotonically increasing tick per key; a `BTreeMap` from
//!   tick to key gives O(log n) access to the least-recently-used key
//! - Expiration is lazy: stale entries are dropped when read or swept
//! - `max_entries` is the binding capacity; `max_size_mb` is advisory

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::entry::CacheEntry;
use super::{DEFAULT_L1_MAX_ENTRIES, DEFAULT_L1_MAX_SIZE_MB};

/// L1 Cache configuration
#[derive(Debug, Clone)]
pub struct L1Config {
    /// Maximum number of entries (enforced)
    pub max_entries: usize,
    /// Soft memory budget in megabytes (reported, not enforced)
    pub max_size_mb: f64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_L1_MAX_ENTRIES,
            max_size_mb: DEFAULT_L1_MAX_SIZE_MB,
        }
    }
}

struct Slot {
    entry: CacheEntry,
    tick: u64,
}

#[derive(Default)]
struct L1State {
    map: HashMap<String, Slot>,
    /// tick -> key, oldest first
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl L1State {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.map.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.entry)
    }

    fn pop_lru(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.map.remove(&key);
        Some(key)
    }
}

/// L1 Cache - in-memory LRU tier
pub struct L1Cache {
    state: Mutex<L1State>,
    config: L1Config,
    /// Entries dropped to make room
    evictions: AtomicU64,
}

impl L1Cache {
    /// Create a new L1 cache with default configuration
    pub fn new() -> Self {
        Self::with_config(L1Config::default())
    }

    /// Create a new L1 cache with custom configuration
    pub fn with_config(config: L1Config) -> Self {
        Self {
            state: Mutex::new(L1State::default()),
            config,
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a live entry, marking it most-recently-used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock();

        let expired = state.map.get(key)?.entry.is_expired();
        if expired {
            debug!(key, "L1 entry expired");
            state.remove(key);
            return None;
        }

        let tick = state.bump();
        let slot = state.map.get_mut(key)?;
        let old_tick = std::mem::replace(&mut slot.tick, tick);
        slot.entry.record_hit();
        let entry = slot.entry.clone();

        state.order.remove(&old_tick);
        state.order.insert(tick, key.to_string());

        Some(entry)
    }

    /// Insert or overwrite an entry.
    ///
    /// Capacity is checked before every insert, even when the key is
    /// already present.
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        let mut state = self.state.lock();

        while state.map.len() >= self.config.max_entries && !state.order.is_empty() {
            if let Some(evicted) = state.pop_lru() {
                debug!(key = %evicted, "L1 evicted least-recently-used entry");
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let tick = state.bump();
        if let Some(old) = state.map.insert(key.clone(), Slot { entry, tick }) {
            state.order.remove(&old.tick);
        }
        state.order.insert(tick, key);
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().remove(key)
    }

    /// Check presence without touching recency or hit counters
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .map
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired())
    }

    /// Remove entries whose key contains `pattern` or whose tags intersect
    /// `tags`. Returns the number removed.
    pub fn invalidate<S: AsRef<str>>(&self, pattern: Option<&str>, tags: &[S]) -> usize {
        let mut state = self.state.lock();

        let doomed: Vec<String> = state
            .map
            .iter()
            .filter(|(key, slot)| {
                pattern.is_some_and(|p| key.contains(p)) || slot.entry.has_any_tag(tags)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();

        let expired: Vec<String> = state
            .map
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.map.clear();
        state.order.clear();
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get configured capacity
    pub fn max_entries(&self) -> usize {
        self.config.max_entries
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// L1 cache statistics
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct L1Stats {
    /// Number of entries
    pub entries: usize,
    /// Capacity in entries
    pub max_entries: usize,
    /// Entries as a percentage of capacity (0.0 - 100.0)
    pub usage_percent: f64,
    /// Advisory memory budget
    pub max_size_mb: f64,
    /// LRU evictions so far
    pub evictions: u64,
}

impl L1Cache {
    /// Get cache statistics
    pub fn stats(&self) -> L1Stats {
        let entries = self.len();
        let max_entries = self.max_entries();
        L1Stats {
            entries,
            max_entries,
            usage_percent: if max_entries == 0 {
                0.0
            } else {
                entries as f64 / max_entries as f64 * 100.0
            },
            max_size_mb: self.config.max_size_mb,
            evictions: self.evictions(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
