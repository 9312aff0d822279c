//! Cache Metrics Collection
//!
//! Process-wide hit/miss/write/eviction counters owned by the cache manager,
//! plus Prometheus text exposition of a stats report.

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use super::l1::L1Stats;
use crate::error::Result;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    tier1_hits: AtomicU64,
    tier2_hits: AtomicU64,
    tier3_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tier1_hit(&self) {
        self.tier1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier2_hit(&self) {
        self.tier2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier3_hit(&self) {
        self.tier3_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn tier1_hits(&self) -> u64 {
        self.tier1_hits.load(Ordering::Relaxed)
    }

    pub fn tier2_hits(&self) -> u64 {
        self.tier2_hits.load(Ordering::Relaxed)
    }

    pub fn tier3_hits(&self) -> u64 {
        self.tier3_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_counts(
            self.tier1_hits(),
            self.tier2_hits(),
            self.tier3_hits(),
            self.misses(),
            self.writes(),
            self.evictions(),
        )
    }
}

/// Point-in-time counter values with derived rates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub tier1_hits: u64,
    pub tier2_hits: u64,
    pub tier3_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub total_hits: u64,
    /// Hits as a percentage of lookups (0.0 - 100.0); 0.0 before any lookup
    pub hit_rate: f64,
}

impl MetricsSnapshot {
    fn from_counts(
        tier1_hits: u64,
        tier2_hits: u64,
        tier3_hits: u64,
        misses: u64,
        writes: u64,
        evictions: u64,
    ) -> Self {
        let total_hits = tier1_hits + tier2_hits + tier3_hits;
        let lookups = total_hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            total_hits as f64 / lookups as f64 * 100.0
        };

        Self {
            tier1_hits,
            tier2_hits,
            tier3_hits,
            misses,
            writes,
            evictions,
            total_hits,
            hit_rate,
        }
    }
}

/// Aggregate statistics merged with live per-tier sizes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub tier1: L1Stats,
    pub tier2_size: usize,
    pub tier3_size: usize,
}

impl CacheStats {
    /// Render the report in Prometheus text exposition format
    pub fn to_prometheus(&self) -> Result<String> {
        let registry = Registry::new_custom(Some("cache_multi".to_string()), None)?;

        let counters: [(&str, &str, u64); 6] = [
            ("tier1_hits", "Lookups served by the memory tier", self.counters.tier1_hits),
            ("tier2_hits", "Lookups served by the session tier", self.counters.tier2_hits),
            ("tier3_hits", "Lookups served by the file tier", self.counters.tier3_hits),
            ("misses", "Lookups that missed every tier", self.counters.misses),
            ("writes", "Values written through the cache", self.counters.writes),
            ("evictions", "Entries removed by invalidation", self.counters.evictions),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(format!("{}_total", name), help))?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        }

        let sizes: [(&str, &str, usize); 3] = [
            ("tier1_entries", "Entries in the memory tier", self.tier1.entries),
            ("tier2_entries", "Entries in the session tier", self.tier2_size),
            ("tier3_entries", "Files in the durable tier", self.tier3_size),
        ];
        for (name, help, value) in sizes {
            let gauge = IntGauge::with_opts(Opts::new(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let hit_rate = Gauge::with_opts(Opts::new("hit_rate_percent", "Hit rate over all lookups"))?;
        hit_rate.set(self.counters.hit_rate);
        registry.register(Box::new(hit_rate))?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

// =============================================================================
// Tests
// =============================================================================
