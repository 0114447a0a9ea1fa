//! Cache Storage Backends
//!
//! Implementations for each tier's physical storage. Backends only store;
//! admission, eviction and expiry are decided by the manager.

mod http;
mod local;
mod memory;

pub use http::HttpResponseStorage;
pub use local::{LocalStorage, PersistedEntry};
pub use memory::MemoryStorage;

use crate::cache::entry::CacheEntry;
use crate::cache::pattern::KeyPattern;
use crate::cache::tier::CacheTier;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

// =============================================================================
// Write Outcome
// =============================================================================

/// Why a backend declined a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The write would push the backend past its byte quota
    QuotaExceeded { required: u64, available: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::QuotaExceeded {
                required,
                available,
            } => write!(
                f,
                "quota exceeded ({} bytes required, {} available)",
                required, available
            ),
        }
    }
}

/// Result of a backend write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped(SkipReason),
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

// =============================================================================
// StorageBackend Trait
// =============================================================================

/// Trait for tier-specific storage operations
///
/// A key maps to at most one entry per backend. `get` never updates access
/// bookkeeping; the manager persists it explicitly through `touch`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the tier this storage serves
    fn tier(&self) -> CacheTier;

    /// Get an entry by key
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any previous entry for the key
    async fn set(&self, entry: CacheEntry) -> Result<WriteOutcome>;

    /// Delete an entry by key
    ///
    /// Returns true if an entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys currently stored, optionally filtered by a pattern
    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>>;

    /// Clear all entries
    async fn clear(&self) -> Result<()>;

    /// Current entry count
    fn size(&self) -> usize;

    /// Current stored bytes
    fn size_bytes(&self) -> u64;

    /// Record a successful read on the stored entry
    ///
    /// Returns false if the key is not present.
    async fn touch(&self, key: &str, now_ms: u64) -> Result<bool>;

    /// Check if storage is available/healthy
    async fn health_check(&self) -> Result<bool>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cache::entry::{CacheEntry, CacheValue};
    use serde_json::json;

    /// Helper to create a test entry holding a JSON string
    pub fn text_entry(key: &str, text: &str, now_ms: u64) -> CacheEntry {
        CacheEntry::new(key, CacheValue::from(json!(text)), now_ms)
    }
}
