//! Cache Tier Definitions
//!
//! A tier names one physical storage backend behind the manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Cache Tier
// =============================================================================

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Process-lifetime in-memory map
    #[default]
    Memory,
    /// Persisted key/value files on local disk
    Local,
    /// HTTP responses keyed by request identity
    Http,
}

impl CacheTier {
    /// Tiers searched by a generic lookup, in order
    pub fn lookup_order() -> &'static [CacheTier] {
        &[CacheTier::Memory, CacheTier::Local]
    }

    /// Every tier the manager owns
    pub fn all() -> &'static [CacheTier] {
        &[CacheTier::Memory, CacheTier::Local, CacheTier::Http]
    }

    /// Position in per-tier arrays
    #[inline]
    pub(crate) fn index(&self) -> usize {
        match self {
            CacheTier::Memory => 0,
            CacheTier::Local => 1,
            CacheTier::Http => 2,
        }
    }

    /// Whether values in this tier survive a restart
    pub fn is_persistent(&self) -> bool {
        matches!(self, CacheTier::Local)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Memory => "memory",
            CacheTier::Local => "local",
            CacheTier::Http => "http",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTier {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(CacheTier::Memory),
            "local" | "disk" => Ok(CacheTier::Local),
            "http" => Ok(CacheTier::Http),
            other => Err(crate::error::Error::Configuration(format!(
                "unknown cache tier '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order() {
        assert_eq!(
            CacheTier::lookup_order(),
            &[CacheTier::Memory, CacheTier::Local]
        );
        assert_eq!(CacheTier::all().len(), 3);
    }

    #[test]
    fn test_indices_are_distinct() {
        let mut seen: Vec<usize> = CacheTier::all().iter().map(|t| t.index()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Memory".parse::<CacheTier>().unwrap(), CacheTier::Memory);
        assert_eq!("disk".parse::<CacheTier>().unwrap(), CacheTier::Local);
        assert!("tape".parse::<CacheTier>().is_err());
        assert_eq!(CacheTier::Http.to_string(), "http");
        assert!(CacheTier::Local.is_persistent());
    }
}
