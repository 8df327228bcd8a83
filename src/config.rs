//! Configuration Module
//!
//! Handles loading and managing cache subsystem configuration from
//! environment variables.

use std::env;
use std::str::FromStr;

use crate::backend::BackendKind;
use crate::cache::{IntegrityMode, DEFAULT_TRAVERSAL_LIMIT};
use crate::error::{CacheError, Result};

/// Cache subsystem configuration.
///
/// Every value can be set through an environment variable; unset variables
/// fall back to the defaults, malformed ones are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend used by `CacheManager::get_cache`
    pub backend: BackendKind,
    /// Maximum chain nodes visited by one traversal of a native store
    pub traversal_limit: usize,
    /// Panic instead of warning when a native store's chain looks corrupt
    pub strict_integrity: bool,
    /// Maximum number of live reclaimable values across native stores
    pub soft_value_budget: Option<usize>,
    /// Housekeeping task interval in seconds
    pub housekeeping_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `native` or `moka` (default: native)
    /// - `CACHE_TRAVERSAL_LIMIT` - Traversal bound (default: 1000000)
    /// - `CACHE_STRICT_INTEGRITY` - `true`/`false` (default: false)
    /// - `CACHE_SOFT_VALUE_BUDGET` - Live value budget (default: none)
    /// - `CACHE_HOUSEKEEPING_INTERVAL` - Seconds between purges (default: 60)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            backend: parse_var(&lookup, "CACHE_BACKEND")?.unwrap_or(defaults.backend),
            traversal_limit: parse_var(&lookup, "CACHE_TRAVERSAL_LIMIT")?
                .unwrap_or(defaults.traversal_limit),
            strict_integrity: parse_var(&lookup, "CACHE_STRICT_INTEGRITY")?
                .unwrap_or(defaults.strict_integrity),
            soft_value_budget: parse_var(&lookup, "CACHE_SOFT_VALUE_BUDGET")?,
            housekeeping_interval: parse_var(&lookup, "CACHE_HOUSEKEEPING_INTERVAL")?
                .unwrap_or(defaults.housekeeping_interval),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the subsystem cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.traversal_limit == 0 {
            return Err(CacheError::InvalidConfig(
                "traversal limit must be positive".to_string(),
            ));
        }
        if self.housekeeping_interval == 0 {
            return Err(CacheError::InvalidConfig(
                "housekeeping interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn integrity_mode(&self) -> IntegrityMode {
        if self.strict_integrity {
            IntegrityMode::Strict
        } else {
            IntegrityMode::Lenient
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Native,
            traversal_limit: DEFAULT_TRAVERSAL_LIMIT,
            strict_integrity: false,
            soft_value_budget: None,
            housekeeping_interval: 60,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|err| {
            CacheError::InvalidConfig(format!("{}='{}': {}", name, raw, err))
        }),
    }
}
