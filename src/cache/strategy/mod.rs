//! Cache Strategies
//!
//! A strategy decides, from entry metadata alone, whether a candidate may be
//! admitted, which entries must go when one is inserted or when the cache is
//! swept, and whether an entry is still fresh. The manager applies those
//! decisions; strategies never touch storage.
//!
//! [`Strategy`] is a closed set of variants, each implementing
//! [`CacheStrategy`]. Build them through [`StrategyFactory`], which rejects
//! invalid parameters up front.

mod adaptive;
mod factory;
mod hybrid;
mod lfu;
mod lru;
mod pattern;
mod size;
mod ttl;
mod type_based;

pub use adaptive::{AdaptiveConfig, AdaptiveStrategy};
pub use factory::{StrategyConfig, StrategyFactory};
pub use hybrid::HybridStrategy;
pub use lfu::LfuStrategy;
pub use lru::LruStrategy;
pub use pattern::PatternStrategy;
pub use size::SizeBasedStrategy;
pub use ttl::TtlStrategy;
pub use type_based::TypeBasedStrategy;

use crate::cache::entry::EntryMetadata;
use std::fmt;

// =============================================================================
// Strategy Contract
// =============================================================================

/// What prompted an eviction decision
#[derive(Debug, Clone, Copy)]
pub enum EvictionTrigger<'a> {
    /// A candidate is about to be written (capacity pressure)
    Insert(&'a EntryMetadata),
    /// Periodic or explicit maintenance pass
    Sweep,
}

impl<'a> EvictionTrigger<'a> {
    /// The candidate's key, if any
    pub fn candidate_key(&self) -> Option<&'a str> {
        match self {
            EvictionTrigger::Insert(candidate) => Some(candidate.key.as_str()),
            EvictionTrigger::Sweep => None,
        }
    }
}

/// Admission, eviction and freshness decisions over entry metadata
pub trait CacheStrategy: Send + Sync + fmt::Debug {
    /// Human-readable name including parameters
    fn name(&self) -> String;

    /// Whether the candidate may be written
    fn should_admit(&self, _candidate: &EntryMetadata, _current: &[EntryMetadata]) -> bool {
        true
    }

    /// Keys to evict, in eviction order
    ///
    /// `current` holds the tier's entries least recently used first. The
    /// candidate of an insert trigger is never selected.
    fn select_evictions(
        &self,
        _current: &[EntryMetadata],
        _trigger: EvictionTrigger<'_>,
        _now_ms: u64,
    ) -> Vec<String> {
        Vec::new()
    }

    /// Whether the entry is stale at `now_ms`
    fn is_expired(&self, entry: &EntryMetadata, now_ms: u64) -> bool {
        entry.is_expired_at(now_ms)
    }

    /// Feedback from a lookup
    fn observe(&self, _hit: bool) {}

    /// Whether access counts survive an overwrite of the same key
    fn carries_frequency(&self) -> bool {
        false
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// The active strategy of a cache manager
#[derive(Debug)]
pub enum Strategy {
    Ttl(TtlStrategy),
    Lru(LruStrategy),
    Lfu(LfuStrategy),
    SizeBased(SizeBasedStrategy),
    TypeBased(TypeBasedStrategy),
    PatternBased(PatternStrategy),
    Hybrid(HybridStrategy),
    Adaptive(AdaptiveStrategy),
}

/// Capacity of the default LRU strategy
pub const DEFAULT_LRU_CAPACITY: usize = 1000;

impl Strategy {
    fn inner(&self) -> &dyn CacheStrategy {
        match self {
            Strategy::Ttl(s) => s,
            Strategy::Lru(s) => s,
            Strategy::Lfu(s) => s,
            Strategy::SizeBased(s) => s,
            Strategy::TypeBased(s) => s,
            Strategy::PatternBased(s) => s,
            Strategy::Hybrid(s) => s,
            Strategy::Adaptive(s) => s,
        }
    }

    /// Variant name without parameters
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Ttl(_) => "ttl",
            Strategy::Lru(_) => "lru",
            Strategy::Lfu(_) => "lfu",
            Strategy::SizeBased(_) => "size",
            Strategy::TypeBased(_) => "type",
            Strategy::PatternBased(_) => "pattern",
            Strategy::Hybrid(_) => "hybrid",
            Strategy::Adaptive(_) => "adaptive",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Lru(LruStrategy::new(DEFAULT_LRU_CAPACITY))
    }
}

impl CacheStrategy for Strategy {
    fn name(&self) -> String {
        self.inner().name()
    }

    fn should_admit(&self, candidate: &EntryMetadata, current: &[EntryMetadata]) -> bool {
        self.inner().should_admit(candidate, current)
    }

    fn select_evictions(
        &self,
        current: &[EntryMetadata],
        trigger: EvictionTrigger<'_>,
        now_ms: u64,
    ) -> Vec<String> {
        self.inner().select_evictions(current, trigger, now_ms)
    }

    fn is_expired(&self, entry: &EntryMetadata, now_ms: u64) -> bool {
        self.inner().is_expired(entry, now_ms)
    }

    fn observe(&self, hit: bool) {
        self.inner().observe(hit)
    }

    fn carries_frequency(&self) -> bool {
        self.inner().carries_frequency()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// =============================================================================
// Shared Selection Helpers
// =============================================================================

/// Victims needed to keep `current` (plus an inserted candidate) within
/// `capacity`, smallest `order` key first
pub(crate) fn select_over_capacity<K, F>(
    current: &[EntryMetadata],
    trigger: EvictionTrigger<'_>,
    capacity: usize,
    order: F,
) -> Vec<String>
where
    K: Ord,
    F: Fn(&EntryMetadata) -> K,
{
    let candidate = trigger.candidate_key();
    let grows = candidate.map_or(false, |key| !current.iter().any(|m| m.key == key));
    let projected = current.len() + usize::from(grows);
    let excess = projected.saturating_sub(capacity);
    if excess == 0 {
        return Vec::new();
    }

    let mut victims: Vec<&EntryMetadata> = current
        .iter()
        .filter(|m| Some(m.key.as_str()) != candidate)
        .collect();
    victims.sort_by_key(|m| order(*m));
    victims
        .into_iter()
        .take(excess)
        .map(|m| m.key.clone())
        .collect()
}

/// Entries the predicate marks, excluding an inserted candidate
pub(crate) fn select_where<F>(current: &[EntryMetadata], trigger: EvictionTrigger<'_>, pred: F) -> Vec<String>
where
    F: Fn(&EntryMetadata) -> bool,
{
    let candidate = trigger.candidate_key();
    current
        .iter()
        .filter(|m| Some(m.key.as_str()) != candidate && pred(m))
        .map(|m| m.key.clone())
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cache::entry::{CacheEntry, CacheValue, EntryMetadata};
    use crate::cache::tier::CacheTier;
    use serde_json::json;

    /// Metadata with explicit timestamps and sequence numbers
    pub fn meta(key: &str, created_at_ms: u64, seq: u64) -> EntryMetadata {
        let entry = CacheEntry::new(key, CacheValue::from(json!(key)), created_at_ms);
        let mut m = EntryMetadata::from_entry(&entry, CacheTier::Memory);
        m.insert_seq = seq;
        m.access_seq = seq;
        m
    }

    pub fn keys(metas: &[EntryMetadata]) -> Vec<&str> {
        metas.iter().map(|m| m.key.as_str()).collect()
    }
}
