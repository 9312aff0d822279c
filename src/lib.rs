//! cache-multi - Multi-Tier Cache for the family planner
//!
//! An in-process hierarchical cache with three cascading tiers unified
//! behind one read/write API:
//!
//! ```text
//! caller → CacheManager::get(key)
//!            → L1 (memory, LRU) → L2 (session store) → L3 (cache directory)
//!            → miss: compute, then write back through the tiers
//! ```
//!
//! # Features
//!
//! - TTL expiration (lazy, checked on read)
//! - LRU eviction in the memory tier
//! - Tag and key-pattern group invalidation
//! - Opt-in durable writes that survive restarts
//! - Memoization of function calls keyed by their arguments
//! - Process-wide shared instance
//!
//! # Modules
//!
//! - [`cache`] - Cache tiers, manager, memoization and statistics
//! - [`error`] - Error types

pub mod cache;
pub mod error;

// Re-export commonly used types
pub use cache::{
    global, init_global, CacheConfig, CacheEntry, CacheManager, CacheStats, CacheTier, Memoize,
    SetOptions, TierSelection,
};
pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
