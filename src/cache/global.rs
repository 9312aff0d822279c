//! Process-wide cache instance
//!
//! The first caller constructs the shared [`CacheManager`]; every later
//! caller, on any thread, gets the same instance. Construction runs at most
//! once even under concurrent first access.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{error, warn};

use super::l2::{SessionScopes, SessionStore};
use super::manager::{CacheConfig, CacheManager};
use crate::error::Result;

static GLOBAL: OnceCell<CacheManager> = OnceCell::new();

/// Initialize the shared cache with an explicit configuration.
///
/// Returns the existing instance (and logs a warning) if the cache was
/// already initialized. Construction errors are returned, leaving the
/// cache uninitialized.
pub fn init_global(config: CacheConfig) -> Result<&'static CacheManager> {
    init_global_with_store(config, Arc::new(SessionScopes::new()))
}

/// Like [`init_global`] with a caller-provided session store
pub fn init_global_with_store(
    config: CacheConfig,
    store: Arc<dyn SessionStore>,
) -> Result<&'static CacheManager> {
    let mut constructed = false;
    let cache = GLOBAL.get_or_try_init(|| {
        constructed = true;
        CacheManager::with_session_store(config, store)
    })?;

    if !constructed {
        warn!("Global cache already initialized; new configuration ignored");
    }
    Ok(cache)
}

/// The shared cache, constructed with defaults on first use.
///
/// If the default cache directory cannot be created the instance runs
/// without the file tier rather than failing.
pub fn global() -> &'static CacheManager {
    GLOBAL.get_or_init(|| {
        let config = CacheConfig::default();
        let store: Arc<dyn SessionStore> = Arc::new(SessionScopes::new());
        CacheManager::with_session_store(config.clone(), store.clone()).unwrap_or_else(|e| {
            error!(error = %e, "Global cache falling back to memory and session tiers");
            CacheManager::without_file_tier(config, store)
        })
    })
}

/// Whether the shared cache has been constructed
pub fn is_initialized() -> bool {
    GLOBAL.get().is_some()
}

// =============================================================================
// Tests
// =============================================================================
