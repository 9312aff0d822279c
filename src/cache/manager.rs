//! Cache Manager - Unified Three-Tier Cache
//!
//! Orchestrates L1 (memory), L2 (session) and L3 (file) caches behind one
//! read/write API: cascading reads with write-back promotion, write-through
//! to the enabled tiers, tag/pattern invalidation and aggregate statistics.
//!
//! No operation here returns an error once the manager is constructed; a
//! tier that fails behaves as if it did not hold the value.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use super::l1::{L1Cache, L1Config};
use super::l2::{L2Cache, SessionScopes, SessionStore};
use super::l3::{L3Cache, L3Config};
use super::metrics::{CacheMetrics, CacheStats, MetricsSnapshot};
use super::{
    DEFAULT_L1_MAX_ENTRIES, DEFAULT_L1_MAX_SIZE_MB, DEFAULT_L3_CACHE_DIR, DEFAULT_L3_MAX_SIZE_MB,
    DEFAULT_TTL,
};
use crate::error::{Error, Result};

/// Cache tier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// L1 - process memory
    L1,
    /// L2 - session store
    L2,
    /// L3 - cache directory
    L3,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1 (Memory)"),
            CacheTier::L2 => write!(f, "L2 (Session)"),
            CacheTier::L3 => write!(f, "L3 (File)"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn default_l1_max_entries() -> usize {
    DEFAULT_L1_MAX_ENTRIES
}

fn default_l1_max_size_mb() -> f64 {
    DEFAULT_L1_MAX_SIZE_MB
}

fn default_true() -> bool {
    true
}

fn default_l3_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_L3_CACHE_DIR)
}

fn default_l3_max_size_mb() -> f64 {
    DEFAULT_L3_MAX_SIZE_MB
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// L1 capacity in entries
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,
    /// L1 advisory memory budget
    #[serde(default = "default_l1_max_size_mb")]
    pub l1_max_size_mb: f64,
    /// Enable the session tier
    #[serde(default = "default_true")]
    pub l2_enabled: bool,
    /// Enable the file tier
    #[serde(default = "default_true")]
    pub l3_enabled: bool,
    /// File tier directory
    #[serde(default = "default_l3_cache_dir")]
    pub l3_cache_dir: PathBuf,
    /// File tier size cap
    #[serde(default = "default_l3_max_size_mb")]
    pub l3_max_size_mb: f64,
    /// TTL used by `CacheManager::default_options`
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: DEFAULT_L1_MAX_ENTRIES,
            l1_max_size_mb: DEFAULT_L1_MAX_SIZE_MB,
            l2_enabled: true,
            l3_enabled: true,
            l3_cache_dir: default_l3_cache_dir(),
            l3_max_size_mb: DEFAULT_L3_MAX_SIZE_MB,
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.l1_max_entries == 0 {
            return Err(Error::Config("l1_max_entries must be at least 1".into()));
        }
        if !(self.l3_max_size_mb > 0.0) {
            return Err(Error::Config(format!(
                "l3_max_size_mb must be positive, got {}",
                self.l3_max_size_mb
            )));
        }
        Ok(())
    }

    /// Default TTL for writes
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn l1_config(&self) -> L1Config {
        L1Config {
            max_entries: self.l1_max_entries,
            max_size_mb: self.l1_max_size_mb,
        }
    }

    pub fn l3_config(&self) -> L3Config {
        L3Config {
            cache_dir: self.l3_cache_dir.clone(),
            max_size_mb: self.l3_max_size_mb,
        }
    }
}

// =============================================================================
// Operation options
// =============================================================================

/// Per-write options
#[derive(Debug, Clone, PartialEq)]
pub struct SetOptions {
    /// Time-to-live
    pub ttl: Duration,
    /// Group labels
    pub tags: Vec<String>,
    /// Also write to the durable file tier
    pub persistent: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            tags: Vec::new(),
            persistent: false,
        }
    }
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

/// Which tiers a `clear` applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierSelection {
    pub l1: bool,
    pub l2: bool,
    pub l3: bool,
}

impl TierSelection {
    pub const ALL: TierSelection = TierSelection {
        l1: true,
        l2: true,
        l3: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.l1 || self.l2 || self.l3)
    }
}

impl FromStr for TierSelection {
    type Err = Error;

    /// Accepts `all` or any string containing `l1`, `l2` and/or `l3`
    /// (`"l1"`, `"l1l2"`, `"l2,l3"`, ...).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "all" {
            return Ok(Self::ALL);
        }

        let selection = Self {
            l1: s.contains("l1"),
            l2: s.contains("l2"),
            l3: s.contains("l3"),
        };
        if selection.is_empty() {
            return Err(Error::Config(format!("unknown cache level selection '{}'", s)));
        }
        Ok(selection)
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Cache lookup result
#[derive(Debug, Clone)]
pub struct CacheResult {
    /// The cached entry
    pub entry: CacheEntry,
    /// Which tier the entry was found in
    pub tier: CacheTier,
}

/// Unified cache manager
pub struct CacheManager {
    l1: L1Cache,
    l2: Option<L2Cache>,
    l3: Option<L3Cache>,
    config: CacheConfig,
    metrics: Arc<CacheMetrics>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Create a manager with default configuration and thread-scoped sessions
    pub fn new() -> Result<Self> {
        Self::with_config(CacheConfig::default())
    }

    /// Create a manager with thread-scoped sessions backing L2
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        Self::with_session_store(config, Arc::new(SessionScopes::new()))
    }

    /// Create a manager with a caller-provided session store.
    ///
    /// Fails only if the configuration is invalid or the L3 directory
    /// cannot be created.
    pub fn with_session_store(config: CacheConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        config.validate()?;

        let l3 = if config.l3_enabled {
            Some(L3Cache::new(config.l3_config())?)
        } else {
            None
        };
        Ok(Self::assemble(config, store, l3))
    }

    /// Build with L3 disabled, for when the cache directory is unusable
    pub(crate) fn without_file_tier(mut config: CacheConfig, store: Arc<dyn SessionStore>) -> Self {
        config.l3_enabled = false;
        Self::assemble(config, store, None)
    }

    fn assemble(config: CacheConfig, store: Arc<dyn SessionStore>, l3: Option<L3Cache>) -> Self {
        let l1 = L1Cache::with_config(config.l1_config());
        let l2 = config.l2_enabled.then(|| L2Cache::new(store));

        info!(
            l1_max_entries = config.l1_max_entries,
            l2_enabled = config.l2_enabled,
            l3_enabled = l3.is_some(),
            l3_cache_dir = %config.l3_cache_dir.display(),
            "Multi-tier cache initialized"
        );

        Self {
            l1,
            l2,
            l3,
            config,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Look up an entry, cascading L1 → L2 → L3.
    ///
    /// With `promote`, a hit in a slower tier is copied into every faster
    /// enabled tier.
    pub fn lookup(&self, key: &str, promote: bool) -> Option<CacheResult> {
        let result = self.find(key, promote);
        self.record_lookup(result.as_ref().map(|r| r.tier));
        result
    }

    /// The read cascade without touching the hit/miss counters
    fn find(&self, key: &str, promote: bool) -> Option<CacheResult> {
        if let Some(entry) = self.l1.get(key) {
            return Some(CacheResult {
                entry,
                tier: CacheTier::L1,
            });
        }

        if let Some(l2) = &self.l2 {
            if let Some(entry) = l2.get(key) {
                if promote {
                    self.l1.set(key, entry.clone());
                }
                return Some(CacheResult {
                    entry,
                    tier: CacheTier::L2,
                });
            }
        }

        if let Some(l3) = &self.l3 {
            if let Some(entry) = l3.get(key) {
                if promote {
                    self.l1.set(key, entry.clone());
                    if let Some(l2) = &self.l2 {
                        l2.set(key, &entry);
                    }
                }
                return Some(CacheResult {
                    entry,
                    tier: CacheTier::L3,
                });
            }
        }

        None
    }

    fn record_lookup(&self, tier: Option<CacheTier>) {
        match tier {
            Some(CacheTier::L1) => self.metrics.record_tier1_hit(),
            Some(CacheTier::L2) => self.metrics.record_tier2_hit(),
            Some(CacheTier::L3) => self.metrics.record_tier3_hit(),
            None => self.metrics.record_miss(),
        }
    }

    /// Get a value with promotion
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_with(key, true)
    }

    /// Get a value, choosing whether slower-tier hits are promoted
    pub fn get_with(&self, key: &str, promote: bool) -> Option<Value> {
        self.lookup(key, promote).map(|r| r.entry.into_value())
    }

    /// Get a value or `default` on a miss
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Get and deserialize a value.
    ///
    /// A value of the wrong shape counts as absent, and is recorded as a
    /// miss rather than a tier hit.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(result) = self.find(key, true) else {
            self.record_lookup(None);
            return None;
        };

        match serde_json::from_value(result.entry.into_value()) {
            Ok(typed) => {
                self.record_lookup(Some(result.tier));
                Some(typed)
            }
            Err(e) => {
                debug!(key, error = %e, "Cached value has unexpected shape");
                self.record_lookup(None);
                None
            }
        }
    }

    /// Store a value in L1, L2 (if enabled) and, when `persistent`, L3
    pub fn set(&self, key: &str, value: Value, options: &SetOptions) {
        let entry = CacheEntry::new(value, options.ttl, options.tags.iter().cloned());

        if let Some(l2) = &self.l2 {
            l2.set(key, &entry);
        }
        if options.persistent {
            match &self.l3 {
                Some(l3) => l3.set(key, &entry),
                None => debug!(key, "Persistent write requested but L3 is disabled"),
            }
        }
        self.l1.set(key, entry);

        self.metrics.record_write();
    }

    /// Serialize and store a value; returns false if it could not be encoded
    pub fn set_serialized<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: &SetOptions,
    ) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.set(key, value, options);
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Value not cacheable");
                false
            }
        }
    }

    /// Cache-aside: return the cached value or compute, store and return it.
    ///
    /// Concurrent misses on the same key each run `compute`.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F, options: &SetOptions) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(cached) = self.get_as::<T>(key) {
            return cached;
        }

        let value = compute();
        self.set_serialized(key, &value, options);
        value
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for fallible
    /// computations. Errors are returned to the caller and never cached.
    pub fn try_get_or_compute<T, E, F>(
        &self,
        key: &str,
        compute: F,
        options: &SetOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        if let Some(cached) = self.get_as::<T>(key) {
            return Ok(cached);
        }

        let value = compute()?;
        self.set_serialized(key, &value, options);
        Ok(value)
    }

    /// Remove a key from every enabled tier
    pub fn delete(&self, key: &str) -> bool {
        let mut deleted = self.l1.remove(key).is_some();
        if let Some(l2) = &self.l2 {
            deleted |= l2.remove(key);
        }
        if let Some(l3) = &self.l3 {
            deleted |= l3.remove(key);
        }
        deleted
    }

    /// Check presence in any tier without promoting or counting a lookup
    pub fn contains(&self, key: &str) -> bool {
        self.l1.contains(key)
            || self.l2.as_ref().is_some_and(|l2| l2.contains(key))
            || self.l3.as_ref().is_some_and(|l3| l3.contains(key))
    }

    /// Invalidate by key substring and/or tags across every enabled tier.
    ///
    /// An entry matching either filter is removed. L3 ignores `pattern`.
    pub fn invalidate<S: AsRef<str>>(&self, pattern: Option<&str>, tags: &[S]) -> usize {
        let l1 = self.l1.invalidate(pattern, tags);
        let l2 = self.l2.as_ref().map_or(0, |l2| l2.invalidate(pattern, tags));
        let l3 = self.l3.as_ref().map_or(0, |l3| l3.invalidate(pattern, tags));
        let total = l1 + l2 + l3;

        self.metrics.record_evictions(total as u64);
        info!(
            pattern = pattern.unwrap_or(""),
            tags = ?tags.iter().map(|t| t.as_ref()).collect::<Vec<&str>>(),
            l1,
            l2,
            l3,
            total,
            "Cache invalidated"
        );
        total
    }

    /// Invalidate entries carrying any of `tags`
    pub fn invalidate_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        self.invalidate(None, tags)
    }

    /// Invalidate entries whose key contains `pattern`
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.invalidate::<&str>(Some(pattern), &[])
    }

    /// Clear the selected tiers (disabled tiers are skipped)
    pub fn clear(&self, levels: TierSelection) {
        if levels.l1 {
            self.l1.clear();
        }
        if levels.l2 {
            if let Some(l2) = &self.l2 {
                l2.clear();
            }
        }
        if levels.l3 {
            if let Some(l3) = &self.l3 {
                l3.clear();
            }
        }
        info!(l1 = levels.l1, l2 = levels.l2, l3 = levels.l3, "Cache cleared");
    }

    /// Clear tiers named by a level string such as `"l1"`, `"l1l2"` or `"all"`.
    ///
    /// An unrecognized level string clears nothing.
    pub fn clear_levels(&self, levels: &str) {
        match levels.parse::<TierSelection>() {
            Ok(selection) => self.clear(selection),
            Err(e) => warn!(error = %e, "Ignoring clear request"),
        }
    }

    /// Clear every tier
    pub fn clear_all(&self) {
        self.clear(TierSelection::ALL);
    }

    /// Aggregate counters merged with live tier sizes
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            counters: self.metrics.snapshot(),
            tier1: self.l1.stats(),
            tier2_size: self.l2.as_ref().map_or(0, L2Cache::size),
            tier3_size: self.l3.as_ref().map_or(0, L3Cache::size),
        }
    }

    /// Counter snapshot only
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get reference to L1 cache
    pub fn l1(&self) -> &L1Cache {
        &self.l1
    }

    /// Get reference to L2 cache, if enabled
    pub fn l2(&self) -> Option<&L2Cache> {
        self.l2.as_ref()
    }

    /// Get reference to L3 cache, if enabled
    pub fn l3(&self) -> Option<&L3Cache> {
        self.l3.as_ref()
    }

    /// Write options seeded with the configured default TTL
    pub fn default_options(&self) -> SetOptions {
        SetOptions::new().ttl(self.config.default_ttl())
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
