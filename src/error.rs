//! Error types for the multi-tier cache
//!
//! Only construction paths surface these to callers. Ordinary cache
//! operations log and swallow tier failures so the cache degrades to a miss.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No session context is active for the calling thread
    #[error("No active session context")]
    SessionUnavailable,

    /// Session store backend failure
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Cache directory could not be prepared
    #[error("Cache directory {path} is unusable: {reason}")]
    CacheDir { path: String, reason: String },

    /// Metrics rendering failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
