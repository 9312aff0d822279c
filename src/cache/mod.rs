//! Three-Tiered Cache System
//!
//! Hierarchical cache with L1 (process memory), L2 (session store) and
//! L3 (cache directory) tiers behind a single manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        Cache Manager                                      │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  L1 Cache (Memory)    │ L2 Cache (Session)  │ L3 Cache (File)           │
//! │  ┌────────────────┐   │ ┌────────────────┐  │ ┌────────────────────┐    │
//! │  │ HashMap + LRU  │   │ │ SessionStore   │  │ │ <digest>.cache     │    │
//! │  │ 500 entries    │   │ │ (per session)  │  │ │ 100MB, oldest-out  │    │
//! │  └────────────────┘   │ └────────────────┘  │ └────────────────────┘    │
//! │         │             │         │           │           │               │
//! │         └─────────────┴─────────┴───────────┴───────────┘               │
//! │                              │                                           │
//! │                 Cascading reads + write-back promotion                   │
//! │                 TTL expiry, tag / pattern invalidation                   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Read path
//!
//! `get` tries L1, then L2, then L3. A hit below L1 is copied into every
//! faster enabled tier. A full miss returns `None`; `get_or_compute` then
//! runs the caller's closure and writes the result back.
//!
//! # Write path
//!
//! `set` always writes L1 and (when enabled) L2. L3 is written only for
//! persistent writes.
//!
//! # Failure model
//!
//! Tier errors never reach the caller. A cache whose every tier is broken
//! still behaves correctly; it just always recomputes.

mod entry;
mod global;
mod l1;
mod l2;
mod l3;
mod manager;
mod memoize;
mod metrics;
#[cfg(test)]
mod proptest;

pub use entry::{key_digest, CacheEntry};
pub use global::{global, init_global, init_global_with_store, is_initialized};
pub use l1::{L1Cache, L1Config, L1Stats};
pub use l2::{InMemorySessionStore, L2Cache, SessionGuard, SessionScopes, SessionStore};
pub use l3::{L3Cache, L3Config};
pub use manager::{CacheConfig, CacheManager, CacheResult, CacheTier, SetOptions, TierSelection};
pub use memoize::{CacheKeyArg, CallArgs, Memoize};
pub use metrics::{CacheMetrics, CacheStats, MetricsSnapshot};

use std::time::Duration;

/// Default time-to-live for entries (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default L1 capacity in entries
pub const DEFAULT_L1_MAX_ENTRIES: usize = 500;

/// Default L1 advisory memory budget (50MB)
pub const DEFAULT_L1_MAX_SIZE_MB: f64 = 50.0;

/// Default L3 directory
pub const DEFAULT_L3_CACHE_DIR: &str = ".cache";

/// Default L3 size cap (100MB)
pub const DEFAULT_L3_MAX_SIZE_MB: f64 = 100.0;

/// Fraction of the L3 cap to trim down to once it is exceeded
pub const L3_CLEANUP_TARGET: f64 = 0.8;

/// Extension of L3 entry files
pub const CACHE_FILE_EXTENSION: &str = "cache";

/// Namespace for cache keys inside a session store
pub const L2_KEY_PREFIX: &str = "_cache_";

// =============================================================================
// Tests
// =============================================================================
