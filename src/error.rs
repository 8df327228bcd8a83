//! Error types for the cache subsystem
//!
//! Provides unified error handling using thiserror. A cache miss is never an
//! error; lookups return `Option` instead.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache subsystem.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Time-to-live above the hard ceiling
    #[error("TTL of {ttl:?} exceeds the maximum of {max:?}")]
    InvalidTtl { ttl: Duration, max: Duration },

    /// Malformed cache handle (limit, name, durations)
    #[error("Invalid cache spec: {0}")]
    InvalidSpec(String),

    /// Malformed configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The third-party engine refused a lifecycle operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// A loader failed; shared by every caller waiting on the same key
    #[error("Loader failed for key {key}: {cause}")]
    LoaderFailed {
        key: String,
        cause: Arc<anyhow::Error>,
    },

    /// `get_or_load` was called on a cache built without a default loader
    #[error("No default loader configured for cache {0}")]
    NoLoader(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;
