//! Property-Based Tests for the Cache Tiers
//!
//! # Test Properties
//!
//! 1. **Roundtrip**: set(k, v) then get(k) returns v
//! 2. **LRU Order**: N+1 inserts into an N-entry L1 evict exactly the first key
//! 3. **Tag Invalidation**: invalidating tag t removes exactly the entries tagged t
//! 4. **Monotonic Stats**: counters never decrease and hit rate stays in [0, 100]

#![cfg(test)]

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use super::entry::CacheEntry;
use super::l1::{L1Cache, L1Config};
use super::l2::InMemorySessionStore;
use super::manager::{CacheConfig, CacheManager, SetOptions};

// =============================================================================
// Property Strategies
// =============================================================================

/// Arbitrary JSON values (null, bool, integer, string, list, map)
fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,4}:[0-9]{1,3}"
}

fn memory_manager() -> CacheManager {
    let config = CacheConfig {
        l3_enabled: false,
        ..Default::default()
    };
    CacheManager::with_session_store(config, Arc::new(InMemorySessionStore::new())).unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    Set(String, i64, Vec<String>),
    Get(String),
    Invalidate(String),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let tag = "[gh]";
    prop_oneof![
        (key_strategy(), any::<i64>(), prop::collection::vec(tag, 0..2))
            .prop_map(|(k, v, t)| Op::Set(k, v, t)),
        key_strategy().prop_map(Op::Get),
        tag.prop_map(Op::Invalidate),
        Just(Op::Clear),
    ]
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: a fresh value is read back unchanged.
    #[test]
    fn prop_roundtrip(key in key_strategy(), value in json_strategy()) {
        let cache = memory_manager();
        cache.set(&key, value.clone(), &SetOptions::default());
        prop_assert_eq!(cache.get(&key), Some(value));
    }

    /// Property: without reads, the first inserted key is the one evicted.
    #[test]
    fn prop_lru_evicts_first_inserted(capacity in 1usize..16) {
        let cache = L1Cache::with_config(L1Config { max_entries: capacity, ..Default::default() });
        for i in 0..=capacity {
            cache.set(format!("k{}", i), CacheEntry::untagged(Value::from(i)));
        }

        prop_assert_eq!(cache.len(), capacity);
        prop_assert!(!cache.contains("k0"));
        for i in 1..=capacity {
            let key = format!("k{}", i);
            prop_assert!(cache.contains(&key));
        }
    }

    /// Property: touching the oldest key moves eviction to the next oldest.
    #[test]
    fn prop_lru_get_protects(capacity in 2usize..16) {
        let cache = L1Cache::with_config(L1Config { max_entries: capacity, ..Default::default() });
        for i in 0..capacity {
            cache.set(format!("k{}", i), CacheEntry::untagged(Value::from(i)));
        }
        prop_assert!(cache.get("k0").is_some());
        cache.set("new", CacheEntry::untagged(Value::Null));

        prop_assert!(cache.contains("k0"));
        prop_assert!(!cache.contains("k1"));
    }

    /// Property: tag invalidation removes exactly the tagged entries.
    #[test]
    fn prop_tag_invalidation(
        entries in prop::collection::btree_map(
            key_strategy(),
            prop::collection::btree_set("[a-d]", 0..3),
            1..20,
        ),
        target in "[a-d]",
    ) {
        let cache = memory_manager();
        for (key, tags) in &entries {
            cache.set(key, Value::from(key.as_str()), &SetOptions::new().tags(tags.iter().cloned()));
        }

        let tagged: BTreeSet<&String> = entries
            .iter()
            .filter(|(_, tags)| tags.contains(&target))
            .map(|(k, _)| k)
            .collect();

        let removed = cache.invalidate_tags(&[target.as_str()]);
        // Each entry lives in L1 and L2
        prop_assert_eq!(removed, tagged.len() * 2);

        for key in entries.keys() {
            prop_assert_eq!(cache.contains(key), !tagged.contains(key));
        }
    }

    /// Property: counters are non-decreasing and the hit rate is a percentage.
    #[test]
    fn prop_stats_monotonic(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let cache = memory_manager();
        let mut previous = cache.metrics();

        for op in ops {
            match op {
                Op::Set(key, value, tags) => {
                    cache.set(&key, Value::from(value), &SetOptions::new().tags(tags));
                }
                Op::Get(key) => {
                    cache.get(&key);
                }
                Op::Invalidate(tag) => {
                    cache.invalidate_tags(&[tag]);
                }
                Op::Clear => cache.clear_all(),
            }

            let current = cache.metrics();
            prop_assert!(current.tier1_hits >= previous.tier1_hits);
            prop_assert!(current.tier2_hits >= previous.tier2_hits);
            prop_assert!(current.tier3_hits >= previous.tier3_hits);
            prop_assert!(current.misses >= previous.misses);
            prop_assert!(current.writes >= previous.writes);
            prop_assert!(current.evictions >= previous.evictions);
            prop_assert!((0.0..=100.0).contains(&current.hit_rate));
            previous = current;
        }
    }
}
