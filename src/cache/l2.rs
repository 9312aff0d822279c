//! L2 Cache - Session-Scoped Tier
//!
//! Entries live in an external per-session key-value store that this crate
//! does not own. The tier converts each `CacheEntry` to a plain JSON object
//! on write and rebuilds it on read.
//!
//! # Availability
//!
//! When the store reports an error (most commonly: no session is active on
//! the calling thread) every operation degrades to a miss or a no-op. The
//! tier never returns an error to its caller.
//!
//! # Design
//!
//! - `SessionStore` is the port; `SessionScopes` is the default adapter
//!   keyed by a thread-local session id; `InMemorySessionStore` is a single
//!   always-available session for tests and single-user tools
//! - Cache keys are namespaced with `L2_KEY_PREFIX` so they can share the
//!   session with unrelated state
//! - No eviction here; the store owns its own lifecycle

use std::cell::RefCell;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::entry::CacheEntry;
use super::L2_KEY_PREFIX;
use crate::error::{Error, Result};

/// External session key-value store
pub trait SessionStore: Send + Sync {
    /// Read a plain value
    fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Write a plain value
    fn write(&self, key: &str, value: Value) -> Result<()>;

    /// Delete a key, returning whether it was present
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a key exists
    fn contains(&self, key: &str) -> Result<bool>;

    /// List every key in the active session
    fn keys(&self) -> Result<Vec<String>>;
}

// =============================================================================
// In-memory single-session store
// =============================================================================

/// A single session that is always available
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    data: DashMap<String, Value>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn write(&self, key: &str, value: Value) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.iter().map(|e| e.key().clone()).collect())
    }
}

// =============================================================================
// Thread-scoped sessions
// =============================================================================

thread_local! {
    static ACTIVE_SESSION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Restores the previously active session when dropped
#[must_use = "the session is only active while the guard is alive"]
#[derive(Debug)]
pub struct SessionGuard {
    previous: Option<String>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_SESSION.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Session store partitioned by the session id active on the calling thread.
///
/// A request handler calls [`SessionScopes::enter`] with its session id and
/// keeps the guard for the lifetime of the request. Outside a guard the
/// store reports [`Error::SessionUnavailable`].
#[derive(Debug, Default)]
pub struct SessionScopes {
    sessions: DashMap<String, DashMap<String, Value>>,
}

impl SessionScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `session_id` the active session for this thread
    pub fn enter(session_id: impl Into<String>) -> SessionGuard {
        let id = session_id.into();
        let previous = ACTIVE_SESSION.with(|cell| cell.borrow_mut().replace(id));
        SessionGuard { previous }
    }

    /// Session id active on this thread, if any
    pub fn current() -> Option<String> {
        ACTIVE_SESSION.with(|cell| cell.borrow().clone())
    }

    /// Drop all state held for a session
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Number of sessions holding state
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn active_id() -> Result<String> {
        Self::current().ok_or(Error::SessionUnavailable)
    }

    /// Run `f` against the active session's map, if it holds any state.
    ///
    /// Lookups never create a session; only writes do.
    fn inspect<T>(&self, absent: T, f: impl FnOnce(&DashMap<String, Value>) -> T) -> Result<T> {
        let id = Self::active_id()?;
        Ok(match self.sessions.get(&id) {
            Some(session) => f(session.value()),
            None => absent,
        })
    }
}

impl SessionStore for SessionScopes {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        self.inspect(None, |s| s.get(key).map(|v| v.value().clone()))
    }

    fn write(&self, key: &str, value: Value) -> Result<()> {
        let id = Self::active_id()?;
        self.sessions
            .entry(id)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.inspect(false, |s| s.remove(key).is_some())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.inspect(false, |s| s.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inspect(Vec::new(), |s| s.iter().map(|e| e.key().clone()).collect())
    }
}

// =============================================================================
// L2 tier
// =============================================================================

/// L2 Cache - session-scoped tier
pub struct L2Cache {
    store: Arc<dyn SessionStore>,
}

impl L2Cache {
    /// Create a new L2 cache over the given store
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn store_key(key: &str) -> String {
        format!("{}{}", L2_KEY_PREFIX, key)
    }

    fn decode(raw: Value) -> Option<CacheEntry> {
        match serde_json::from_value(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "L2 entry could not be decoded");
                None
            }
        }
    }

    /// Get a live entry
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let store_key = Self::store_key(key);

        let raw = match self.store.read(&store_key) {
            Ok(raw) => raw?,
            Err(e) => {
                debug!(key, error = %e, "L2 read unavailable");
                return None;
            }
        };

        let Some(mut entry) = Self::decode(raw) else {
            let _ = self.store.delete(&store_key);
            return None;
        };

        if entry.is_expired() {
            debug!(key, "L2 entry expired");
            let _ = self.store.delete(&store_key);
            return None;
        }

        entry.record_hit();
        self.write_raw(&store_key, &entry);
        Some(entry)
    }

    /// Store an entry
    pub fn set(&self, key: &str, entry: &CacheEntry) {
        self.write_raw(&Self::store_key(key), entry);
    }

    fn write_raw(&self, store_key: &str, entry: &CacheEntry) {
        let raw = match serde_json::to_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(key = store_key, error = %e, "L2 entry could not be encoded");
                return;
            }
        };
        if let Err(e) = self.store.write(store_key, raw) {
            debug!(key = store_key, error = %e, "L2 write unavailable");
        }
    }

    /// Remove an entry, returning whether it was present
    pub fn remove(&self, key: &str) -> bool {
        self.store.delete(&Self::store_key(key)).unwrap_or_else(|e| {
            debug!(key, error = %e, "L2 delete unavailable");
            false
        })
    }

    /// Check presence without touching hit counters
    pub fn contains(&self, key: &str) -> bool {
        match self.store.read(&Self::store_key(key)) {
            Ok(Some(raw)) => Self::decode(raw).is_some_and(|e| !e.is_expired()),
            _ => false,
        }
    }

    /// Cache keys (without prefix) held in the active session
    fn cache_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(L2_KEY_PREFIX).map(str::to_string))
                .collect(),
            Err(e) => {
                debug!(error = %e, "L2 key listing unavailable");
                Vec::new()
            }
        }
    }

    /// Remove entries whose key contains `pattern` or whose tags intersect
    /// `tags`. Returns the number removed.
    pub fn invalidate<S: AsRef<str>>(&self, pattern: Option<&str>, tags: &[S]) -> usize {
        let mut removed = 0;

        for key in self.cache_keys() {
            let store_key = Self::store_key(&key);
            let matches = pattern.is_some_and(|p| key.contains(p))
                || (!tags.is_empty()
                    && matches!(
                        self.store.read(&store_key).ok().flatten().and_then(Self::decode),
                        Some(entry) if entry.has_any_tag(tags)
                    ));

            if matches && self.store.delete(&store_key).unwrap_or(false) {
                removed += 1;
            }
        }

        removed
    }

    /// Remove every cache entry from the active session
    pub fn clear(&self) {
        for key in self.cache_keys() {
            let _ = self.store.delete(&Self::store_key(&key));
        }
    }

    /// Number of cache entries in the active session
    pub fn size(&self) -> usize {
        self.cache_keys().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
