//! Cache Events
//!
//! Events emitted by the manager for monitoring and status display.

use crate::cache::tier::CacheTier;
use crate::cache::storage::SkipReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events emitted by the cache system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Entry was stored
    Set {
        key: String,
        tier: CacheTier,
        size_bytes: u64,
    },

    /// Cache hit
    Hit { key: String, tier: CacheTier },

    /// Cache miss (absent or expired in every searched tier)
    Miss { key: String },

    /// Entry was removed by an explicit delete
    Delete { key: String, tier: CacheTier },

    /// Entry was evicted by the manager
    Evict {
        key: String,
        tier: CacheTier,
        reason: EvictionReason,
    },

    /// The active strategy refused a write
    Rejected {
        key: String,
        tier: CacheTier,
        strategy: String,
    },

    /// The backend declined a write
    WriteSkipped {
        key: String,
        tier: CacheTier,
        reason: String,
    },

    /// Pattern invalidation finished
    Invalidated { pattern: String, removed: usize },

    /// A new strategy became active
    StrategyChanged {
        from: String,
        to: String,
        generation: u64,
    },

    /// All tiers cleared
    Cleared,

    /// Every entry was re-checked against the active strategy
    Revalidated { checked: usize, removed: usize },
}

/// Reason for eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    /// Capacity pressure from an insert
    Capacity,
    /// Entry expired (TTL)
    Expired,
    /// Entry no longer admitted by the active strategy
    Strategy,
    /// Removed by pattern invalidation
    Invalidated,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Capacity => write!(f, "capacity"),
            EvictionReason::Expired => write!(f, "expired"),
            EvictionReason::Strategy => write!(f, "strategy"),
            EvictionReason::Invalidated => write!(f, "invalidated"),
        }
    }
}

impl CacheEvent {
    pub fn set(key: &str, tier: CacheTier, size_bytes: u64) -> Self {
        CacheEvent::Set {
            key: key.to_string(),
            tier,
            size_bytes,
        }
    }

    pub fn hit(key: &str, tier: CacheTier) -> Self {
        CacheEvent::Hit {
            key: key.to_string(),
            tier,
        }
    }

    pub fn miss(key: &str) -> Self {
        CacheEvent::Miss {
            key: key.to_string(),
        }
    }

    pub fn delete(key: &str, tier: CacheTier) -> Self {
        CacheEvent::Delete {
            key: key.to_string(),
            tier,
        }
    }

    pub fn evict(key: &str, tier: CacheTier, reason: EvictionReason) -> Self {
        CacheEvent::Evict {
            key: key.to_string(),
            tier,
            reason,
        }
    }

    pub fn rejected(key: &str, tier: CacheTier, strategy: &str) -> Self {
        CacheEvent::Rejected {
            key: key.to_string(),
            tier,
            strategy: strategy.to_string(),
        }
    }

    pub fn write_skipped(key: &str, tier: CacheTier, reason: SkipReason) -> Self {
        CacheEvent::WriteSkipped {
            key: key.to_string(),
            tier,
            reason: reason.to_string(),
        }
    }

    /// Get the key associated with this event (if any)
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Set { key, .. }
            | CacheEvent::Hit { key, .. }
            | CacheEvent::Miss { key }
            | CacheEvent::Delete { key, .. }
            | CacheEvent::Evict { key, .. }
            | CacheEvent::Rejected { key, .. }
            | CacheEvent::WriteSkipped { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Get the tier associated with this event (if any)
    pub fn tier(&self) -> Option<CacheTier> {
        match self {
            CacheEvent::Set { tier, .. }
            | CacheEvent::Hit { tier, .. }
            | CacheEvent::Delete { tier, .. }
            | CacheEvent::Evict { tier, .. }
            | CacheEvent::Rejected { tier, .. }
            | CacheEvent::WriteSkipped { tier, .. } => Some(*tier),
            _ => None,
        }
    }
}

impl fmt::Display for CacheEvent {
    /// One-line status text
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::Set {
                key,
                tier,
                size_bytes,
            } => write!(f, "stored {} in {} ({} bytes)", key, tier, size_bytes),
            CacheEvent::Hit { key, tier } => write!(f, "hit {} in {}", key, tier),
            CacheEvent::Miss { key } => write!(f, "miss {}", key),
            CacheEvent::Delete { key, tier } => write!(f, "deleted {} from {}", key, tier),
            CacheEvent::Evict { key, tier, reason } => {
                write!(f, "evicted {} from {} ({})", key, tier, reason)
            }
            CacheEvent::Rejected { key, tier, strategy } => {
                write!(f, "{} rejected {} for {}", strategy, key, tier)
            }
            CacheEvent::WriteSkipped { key, tier, reason } => {
                write!(f, "skipped write of {} to {}: {}", key, tier, reason)
            }
            CacheEvent::Invalidated { pattern, removed } => {
                write!(f, "invalidated {} entries matching {}", removed, pattern)
            }
            CacheEvent::StrategyChanged {
                from,
                to,
                generation,
            } => write!(f, "strategy {} -> {} (generation {})", from, to, generation),
            CacheEvent::Cleared => write!(f, "cleared all tiers"),
            CacheEvent::Revalidated { checked, removed } => {
                write!(f, "revalidated {} entries, removed {}", checked, removed)
            }
        }
    }
}
