//! Multi-Tier Cache Integration Tests
//!
//! End-to-end behaviour through the public API:
//! - Cascading reads, promotion and persistence
//! - Group invalidation
//! - Cache-aside computation and memoization
//! - Degradation when a tier's backing store fails

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::{json, Value};
use tempfile::TempDir;

use cache_multi::cache::{
    CacheConfig, CacheManager, CacheTier, InMemorySessionStore, L1Cache, L1Config, L3Cache,
    L3Config, Memoize, SessionScopes, SessionStore, SetOptions, TierSelection,
};
use cache_multi::{CacheEntry, Error};

fn config_in(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        l3_cache_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

fn with_store(dir: &TempDir, store: Arc<dyn SessionStore>) -> CacheManager {
    CacheManager::with_session_store(config_in(dir), store).unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

mod scenario_tests {
    use super::*;

    #[test]
    fn test_set_then_get_is_l1_hit() {
        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));

        cache.set("x", json!(42), &SetOptions::new().ttl(Duration::from_secs(300)));

        assert_eq!(cache.get("x"), Some(json!(42)));
        assert_eq!(cache.stats().counters.tier1_hits, 1);
    }

    #[test]
    fn test_lru_touch_protects_key() {
        let l1 = L1Cache::with_config(L1Config {
            max_entries: 3,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            l1.set(key, CacheEntry::untagged(json!(key)));
        }
        assert!(l1.get("a").is_some());
        l1.set("d", CacheEntry::untagged(json!("d")));

        assert!(l1.get("b").is_none());
        assert_eq!(l1.get("a").unwrap().value(), &json!("a"));
        assert_eq!(l1.evictions(), 1);
    }

    #[test]
    fn test_tag_invalidation_leaves_other_groups() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            l2_enabled: false,
            ..config_in(&dir)
        };
        let cache = CacheManager::with_config(config).unwrap();

        cache.set("p:1", json!("v1"), &SetOptions::new().tag("g"));
        cache.set("p:2", json!("v2"), &SetOptions::new().tag("g"));
        cache.set("q:1", json!("v3"), &SetOptions::new().tag("h"));

        assert_eq!(cache.invalidate_tags(&["g"]), 2);
        assert_eq!(cache.get("q:1"), Some(json!("v3")));
        assert_eq!(cache.get("p:1"), None);
        assert_eq!(cache.metrics().evictions, 2);
    }

    #[test]
    fn test_get_or_compute_computes_once() {
        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));
        let calls = AtomicUsize::new(0);
        let options = SetOptions::new().ttl(Duration::from_secs(60));

        for _ in 0..2 {
            let value: u64 = cache.get_or_compute(
                "k",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    99
                },
                &options,
            );
            assert_eq!(value, 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_manager_reads_durable_entry() {
        let dir = TempDir::new().unwrap();

        let first = with_store(&dir, Arc::new(InMemorySessionStore::new()));
        first.set("durable", json!({"n": 1}), &SetOptions::new().persistent(true));

        let second = with_store(&dir, Arc::new(InMemorySessionStore::new()));
        let entry = second.l3().unwrap().get("durable").unwrap();
        assert_eq!(entry.value(), &json!({"n": 1}));

        let result = second.lookup("durable", true).unwrap();
        assert_eq!(result.tier, CacheTier::L3);
    }
}

// =============================================================================
// Tier interaction
// =============================================================================

mod tier_tests {
    use super::*;

    #[test]
    fn test_promotion_only_when_requested() {
        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));

        cache.set("k", json!([1, 2]), &SetOptions::new().persistent(true));
        cache.clear(TierSelection {
            l1: true,
            l2: true,
            l3: false,
        });

        assert_eq!(cache.get_with("k", false), Some(json!([1, 2])));
        assert!(!cache.l1().contains("k"));

        assert_eq!(cache.get_with("k", true), Some(json!([1, 2])));
        assert!(cache.l1().contains("k"));
        assert!(cache.l2().unwrap().contains("k"));
        assert_eq!(cache.lookup("k", true).unwrap().tier, CacheTier::L1);
    }

    #[test]
    fn test_persistence_is_opt_in() {
        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));

        cache.set("volatile", json!(1), &SetOptions::default());
        cache.set("durable", json!(2), &SetOptions::new().persistent(true));
        cache.clear_levels("l1l2");

        // Read the directory directly, bypassing the manager
        let l3 = L3Cache::new(L3Config {
            cache_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        assert!(l3.get("volatile").is_none());
        assert_eq!(l3.get("durable").unwrap().value(), &json!(2));
    }

    #[test]
    fn test_expired_durable_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));
        let l3 = cache.l3().unwrap();

        let stale = CacheEntry::new(json!("old"), Duration::from_secs(1), ["g"])
            .with_created_at(chrono::Utc::now() - chrono::Duration::seconds(10));
        l3.set("stale", &stale);
        assert_eq!(l3.size(), 1);

        assert_eq!(cache.get("stale"), None);
        assert_eq!(l3.size(), 0);
    }

    #[test]
    fn test_clear_all_empties_directory() {
        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));

        for i in 0..5 {
            cache.set(&format!("k{}", i), json!(i), &SetOptions::new().persistent(true));
        }
        assert_eq!(cache.stats().tier3_size, 5);

        cache.clear_all();
        let stats = cache.stats();
        assert_eq!(stats.tier1.entries, 0);
        assert_eq!(stats.tier2_size, 0);
        assert_eq!(stats.tier3_size, 0);
    }

    #[test]
    fn test_cache_dir_lost_while_live_degrades_to_memory() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let config = CacheConfig {
            l3_cache_dir: cache_dir.clone(),
            ..Default::default()
        };
        let cache =
            CacheManager::with_session_store(config, Arc::new(InMemorySessionStore::new())).unwrap();

        cache.set("before", json!("kept"), &SetOptions::new().persistent(true));
        std::fs::remove_dir_all(&cache_dir).unwrap();

        cache.set("after", json!({"n": 2}), &SetOptions::new().persistent(true));
        assert!(cache.l3().unwrap().get("after").is_none());
        assert_eq!(cache.lookup("after", true).unwrap().tier, CacheTier::L1);
        assert_eq!(cache.get("before"), Some(json!("kept")));

        cache.clear_levels("l1l2");
        assert_eq!(cache.get("after"), None);
        assert_eq!(cache.stats().tier3_size, 0);
        assert_eq!(cache.invalidate_tags(&["any"]), 0);
    }

    #[test]
    fn test_unusable_cache_dir_fails_construction() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let config = CacheConfig {
            l3_cache_dir: blocker.join("cache"),
            ..Default::default()
        };
        assert_matches!(CacheManager::with_config(config), Err(Error::CacheDir { .. }));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.yaml");
        std::fs::write(
            &path,
            format!(
                "l1_max_entries: 2\nl3_cache_dir: {}\ndefault_ttl_secs: 60\n",
                dir.path().join("store").display()
            ),
        )
        .unwrap();

        let config = CacheConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.l1_max_entries, 2);
        assert_eq!(config.default_ttl(), Duration::from_secs(60));

        let cache = CacheManager::with_config(config).unwrap();
        assert!(dir.path().join("store").is_dir());
        assert_eq!(cache.stats().tier1.max_entries, 2);
    }
}

// =============================================================================
// Sessions and degradation
// =============================================================================

mod session_tests {
    use super::*;
    use cache_multi::Result;

    /// Store that fails every call
    struct BrokenStore;

    impl SessionStore for BrokenStore {
        fn read(&self, _: &str) -> Result<Option<Value>> {
            Err(Error::SessionStore("connection refused".into()))
        }
        fn write(&self, _: &str, _: Value) -> Result<()> {
            Err(Error::SessionStore("connection refused".into()))
        }
        fn delete(&self, _: &str) -> Result<bool> {
            Err(Error::SessionStore("connection refused".into()))
        }
        fn contains(&self, _: &str) -> Result<bool> {
            Err(Error::SessionStore("connection refused".into()))
        }
        fn keys(&self) -> Result<Vec<String>> {
            Err(Error::SessionStore("connection refused".into()))
        }
    }

    fn run_workload(cache: &CacheManager) -> Vec<Option<Value>> {
        cache.set("a", json!(1), &SetOptions::new().tag("t"));
        cache.set("b", json!(2), &SetOptions::new().persistent(true));
        cache.clear_levels("l1");

        let mut results = vec![cache.get("a"), cache.get("b"), cache.get("missing")];
        cache.invalidate_tags(&["t"]);
        results.push(cache.get("a"));
        results
    }

    #[test]
    fn test_broken_session_store_matches_disabled_tier() {
        let broken_dir = TempDir::new().unwrap();
        let broken = with_store(&broken_dir, Arc::new(BrokenStore));

        let disabled_dir = TempDir::new().unwrap();
        let disabled = CacheManager::with_config(CacheConfig {
            l2_enabled: false,
            ..config_in(&disabled_dir)
        })
        .unwrap();

        assert_eq!(run_workload(&broken), run_workload(&disabled));
        assert_eq!(broken.stats().tier2_size, 0);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = TempDir::new().unwrap();
        let scopes = Arc::new(SessionScopes::new());
        let cache = with_store(&dir, scopes.clone());

        {
            let _guard = SessionScopes::enter("alice");
            cache.set("draft", json!("alice's plan"), &SetOptions::default());
        }
        cache.clear_levels("l1");

        {
            let _guard = SessionScopes::enter("bob");
            assert_eq!(cache.get("draft"), None);
        }
        {
            let _guard = SessionScopes::enter("alice");
            let result = cache.lookup("draft", true).unwrap();
            assert_eq!(result.tier, CacheTier::L2);
        }

        assert!(scopes.end_session("alice"));
        assert_eq!(SessionScopes::current(), None);
    }
}

// =============================================================================
// Concurrency and memoization
// =============================================================================

mod concurrency_tests {
    use super::*;

    #[test]
    fn test_concurrent_misses_may_compute_more_than_once() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(with_store(&dir, Arc::new(InMemorySessionStore::new())));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let value: String = cache.get_or_compute(
                        "report",
                        || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            "weekly".to_string()
                        },
                        &SetOptions::default(),
                    );
                    value
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "weekly");
        }

        // No single-flight: at least one, at most one per thread
        let calls = calls.load(Ordering::SeqCst);
        assert!((1..=4).contains(&calls));
        assert_eq!(cache.get("report"), Some(json!("weekly")));
    }

    #[test]
    fn test_memoize_excludes_session_handles() {
        struct Db;
        cache_multi::session_handle!(Db);

        let dir = TempDir::new().unwrap();
        let cache = with_store(&dir, Arc::new(InMemorySessionStore::new()));
        let calls = AtomicUsize::new(0);
        let memo = Memoize::new("meals_for_week").tag("meals");

        let first_db = Db;
        let second_db = Db;
        let week = 12u32;

        for db in [&first_db, &second_db] {
            let meals: Vec<String> = memo.call(&cache, &[db, &week], &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                vec!["soup".to_string()]
            });
            assert_eq!(meals, vec!["soup".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.invalidate_tags(&["meals"]), 2);
    }
}
