//! L3 Cache - Durable File Tier
//!
//! One JSON file per key under a cache directory, surviving process
//! restarts and shareable between processes pointed at the same directory.
//!
//! # Design
//!
//! - File name is `<key_digest>.cache`; keys cannot be recovered from it,
//!   so pattern invalidation is not supported here (tags are)
//! - Writes go to a uniquely named temp file which is then renamed over the
//!   target, so readers never observe a partial file
//! - Before each write the directory is trimmed oldest-modified-first to
//!   80% of `max_size_mb` once it exceeds the cap
//! - Temp files abandoned by a crashed writer count toward the cap and are
//!   reclaimed by the same pass once they are `STALE_TEMP_AGE` old
//! - All I/O failures after construction are logged and become misses

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::entry::{key_digest, CacheEntry};
use super::{CACHE_FILE_EXTENSION, DEFAULT_L3_CACHE_DIR, DEFAULT_L3_MAX_SIZE_MB, L3_CLEANUP_TARGET};
use crate::error::{Error, Result};

/// L3 Cache configuration
#[derive(Debug, Clone)]
pub struct L3Config {
    /// Cache directory path
    pub cache_dir: PathBuf,
    /// Size cap in megabytes (enforced on write)
    pub max_size_mb: f64,
}

impl Default for L3Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_L3_CACHE_DIR),
            max_size_mb: DEFAULT_L3_MAX_SIZE_MB,
        }
    }
}

impl L3Config {
    /// Size cap in bytes
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0) as u64
    }
}

/// Extension of in-flight write files
const TEMP_FILE_EXTENSION: &str = "tmp";

/// Age after which a temp file is assumed abandoned
const STALE_TEMP_AGE: Duration = Duration::from_secs(600);

/// A cache or temp file found on disk
struct CacheFile {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

impl CacheFile {
    fn is_stale_temp(&self, now: SystemTime) -> bool {
        now.duration_since(self.modified)
            .is_ok_and(|age| age >= STALE_TEMP_AGE)
    }
}

/// L3 Cache - durable file tier
pub struct L3Cache {
    config: L3Config,
}

impl L3Cache {
    /// Open (creating if needed) the cache directory.
    ///
    /// Fails if the directory cannot be created.
    pub fn new(config: L3Config) -> Result<Self> {
        fs::create_dir_all(&config.cache_dir).map_err(|e| Error::CacheDir {
            path: config.cache_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(dir = %config.cache_dir.display(), "L3 cache directory ready");
        Ok(Self { config })
    }

    /// Cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.{}", key_digest(key), CACHE_FILE_EXTENSION))
    }

    fn read_entry(path: &Path) -> Result<CacheEntry> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Get a live entry.
    ///
    /// The returned entry's hit counter is bumped; the file is not rewritten.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }

        let mut entry = match Self::read_entry(&path) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "L3 read failed");
                return None;
            }
        };

        if entry.is_expired() {
            debug!(key, "L3 entry expired");
            if let Err(e) = fs::remove_file(&path) {
                debug!(key, error = %e, "L3 failed to remove expired entry");
            }
            return None;
        }

        entry.record_hit();
        Some(entry)
    }

    /// Persist an entry
    pub fn set(&self, key: &str, entry: &CacheEntry) {
        self.cleanup_if_needed();

        let path = self.path_for(key);
        if let Err(e) = self.write_atomic(&path, entry) {
            warn!(key, path = %path.display(), error = %e, "L3 write failed");
        }
    }

    fn write_atomic(&self, path: &Path, entry: &CacheEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        let temp_path = path.with_extension(format!(
            "{}.{}",
            uuid::Uuid::new_v4().simple(),
            TEMP_FILE_EXTENSION
        ));

        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        let renamed = written.and_then(|_| fs::rename(&temp_path, path));

        if let Err(e) = renamed {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove an entry, returning whether a file was deleted
    pub fn remove(&self, key: &str) -> bool {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key, error = %e, "L3 remove failed");
                }
                false
            }
        }
    }

    /// Check presence without touching hit counters
    pub fn contains(&self, key: &str) -> bool {
        Self::read_entry(&self.path_for(key)).is_ok_and(|e| !e.is_expired())
    }

    /// Remove entries whose tags intersect `tags`.
    ///
    /// `pattern` cannot be evaluated against hashed file names and is
    /// ignored. Unreadable files are skipped.
    pub fn invalidate<S: AsRef<str>>(&self, pattern: Option<&str>, tags: &[S]) -> usize {
        if let Some(pattern) = pattern {
            debug!(pattern, "L3 does not support pattern invalidation");
        }
        if tags.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for file in self.cache_files() {
            let entry = match Self::read_entry(&file.path) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(path = %file.path.display(), error = %e, "L3 skipping unreadable file");
                    continue;
                }
            };
            if entry.has_any_tag(tags) && fs::remove_file(&file.path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Delete every file in the cache directory, returning the count
    pub fn clear(&self) -> usize {
        let entries = match fs::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.config.cache_dir.display(), error = %e, "L3 clear failed");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "L3 failed to delete file"),
                }
            }
        }
        removed
    }

    /// Number of cache files
    pub fn size(&self) -> usize {
        self.cache_files().len()
    }

    /// Total bytes held by cache files
    pub fn total_bytes(&self) -> u64 {
        self.cache_files().iter().map(|f| f.len).sum()
    }

    fn cache_files(&self) -> Vec<CacheFile> {
        self.files_with_extension(CACHE_FILE_EXTENSION)
    }

    fn temp_files(&self) -> Vec<CacheFile> {
        self.files_with_extension(TEMP_FILE_EXTENSION)
    }

    fn files_with_extension(&self, extension: &str) -> Vec<CacheFile> {
        let entries = match fs::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.config.cache_dir.display(), error = %e, "L3 directory unreadable");
                return Vec::new();
            }
        };

        entries
            .flatten()
            .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some(extension))
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                meta.is_file().then(|| CacheFile {
                    path: e.path(),
                    len: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                })
            })
            .collect()
    }

    /// Remove abandoned temp files and, if the directory has grown past the
    /// cap, trim cache files oldest-first down to 80% of it.
    ///
    /// Temp files still being written count toward the cap but are never
    /// deleted. Returns the number of files deleted.
    pub fn cleanup_if_needed(&self) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut total: u64 = 0;

        for temp in self.temp_files() {
            if temp.is_stale_temp(now) && fs::remove_file(&temp.path).is_ok() {
                debug!(path = %temp.path.display(), "L3 removed abandoned temp file");
                removed += 1;
            } else {
                total += temp.len;
            }
        }

        let max_bytes = self.config.max_size_bytes();
        let mut files = self.cache_files();
        total += files.iter().map(|f| f.len).sum::<u64>();

        if total <= max_bytes {
            return removed;
        }

        let target = (max_bytes as f64 * L3_CLEANUP_TARGET) as u64;
        files.sort_by_key(|f| f.modified);

        for file in files {
            if total <= target {
                break;
            }
            match fs::remove_file(&file.path) {
                Ok(()) => {
                    total = total.saturating_sub(file.len);
                    removed += 1;
                }
                Err(e) => debug!(path = %file.path.display(), error = %e, "L3 cleanup skip"),
            }
        }

        debug!(removed, remaining_bytes = total, "L3 cleanup finished");
        removed
    }
}

// =============================================================================
// Tests
// =============================================================================
