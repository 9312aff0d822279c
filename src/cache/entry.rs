//! Cache Entry Types
//!
//! The atomic unit of cached state shared (by copy) between all tiers.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DEFAULT_TTL;

/// A cached value together with its freshness and grouping metadata.
///
/// Values are immutable once constructed; a `set` with an existing key
/// always produces a brand-new entry. Only the hit counter changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached payload
    value: Value,
    /// Construction time
    created_at: DateTime<Utc>,
    /// Time-to-live
    ttl: Duration,
    /// Group labels for bulk invalidation
    #[serde(default)]
    tags: BTreeSet<String>,
    /// Successful reads served from this entry
    #[serde(default)]
    hits: u64,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new<I, S>(value: Value, ttl: Duration, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value,
            created_at: Utc::now(),
            ttl,
            tags: tags.into_iter().map(Into::into).collect(),
            hits: 0,
        }
    }

    /// Create an untagged entry with the default TTL
    pub fn untagged(value: Value) -> Self {
        Self::new(value, DEFAULT_TTL, std::iter::empty::<String>())
    }

    /// Override the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Get the cached value
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the entry, returning the value
    pub fn into_value(self) -> Value {
        self.value
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[inline]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Record a successful read and return the new hit count
    #[inline]
    pub fn record_hit(&mut self) -> u64 {
        self.hits += 1;
        self.hits
    }

    /// Age of the entry relative to `now`.
    ///
    /// A creation time in the future (clock step backwards) yields zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Age of the entry
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// Whether the entry is stale at `now` (strictly older than its TTL)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) > self.ttl
    }

    /// Check if expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether any of `tags` is attached to this entry
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
fn fx_hash(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(0x517cc1b727220a95);
    }
    hash
}

/// Filesystem-safe, process-stable digest of a cache key (32 hex chars).
///
/// Two independently seeded passes give a 128-bit name so that distinct
/// keys map to distinct files in practice.
pub fn key_digest(key: &str) -> String {
    let hi = fx_hash(key.as_bytes(), 0x517cc1b727220a95);
    let lo = fx_hash(key.as_bytes(), 0x9e3779b97f4a7c15 ^ key.len() as u64);
    format!("{:016x}{:016x}", hi, lo)
}

// =============================================================================
// Tests
// =============================================================================
