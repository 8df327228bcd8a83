//! Backend Module
//!
//! The two interchangeable store implementations:
//! - `NativeStore`: the in-crate TTL store behind a mutex
//! - `MokaStore`: bridge to the moka engine, registered with a shared
//!   `LockingEngineManager`

pub mod manager;
mod moka_store;
mod native;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

pub use moka_store::MokaStore;
pub use manager::{EngineManager, LockingEngineManager, ManagedCache};
pub use native::NativeStore;

// == Backend Kind ==
/// Which implementation backs a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Native,
    Moka,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => f.write_str("native"),
            BackendKind::Moka => f.write_str("moka"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(BackendKind::Native),
            "moka" => Ok(BackendKind::Moka),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown cache backend '{}', expected 'native' or 'moka'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("native".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert_eq!(" MOKA ".parse::<BackendKind>().unwrap(), BackendKind::Moka);
        assert!(matches!(
            "ehcache".parse::<BackendKind>(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_backend_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&BackendKind::Moka).unwrap(), "\"moka\"");
        assert_eq!(BackendKind::Native.to_string(), "native");
    }
}
