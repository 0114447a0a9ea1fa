//! Strategy composition

use crate::cache::entry::EntryMetadata;
use crate::cache::strategy::{CacheStrategy, EvictionTrigger, Strategy};
use indexmap::IndexSet;

/// Composes member strategies
///
/// - admission: every member must admit
/// - eviction: union of the members' sets, first-seen order, no duplicates
/// - expiry: stale if any member says so
#[derive(Debug)]
pub struct HybridStrategy {
    members: Vec<Strategy>,
}

impl HybridStrategy {
    pub(crate) fn new(members: Vec<Strategy>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[Strategy] {
        &self.members
    }
}

impl CacheStrategy for HybridStrategy {
    fn name(&self) -> String {
        let names: Vec<String> = self.members.iter().map(CacheStrategy::name).collect();
        format!("hybrid({})", names.join(", "))
    }

    fn should_admit(&self, candidate: &EntryMetadata, current: &[EntryMetadata]) -> bool {
        self.members
            .iter()
            .all(|s| s.should_admit(candidate, current))
    }

    fn select_evictions(
        &self,
        current: &[EntryMetadata],
        trigger: EvictionTrigger<'_>,
        now_ms: u64,
    ) -> Vec<String> {
        let mut victims = IndexSet::new();
        for member in &self.members {
            victims.extend(member.select_evictions(current, trigger, now_ms));
        }
        victims.into_iter().collect()
    }

    fn is_expired(&self, entry: &EntryMetadata, now_ms: u64) -> bool {
        self.members.iter().any(|s| s.is_expired(entry, now_ms))
    }

    fn observe(&self, hit: bool) {
        for member in &self.members {
            member.observe(hit);
        }
    }

    fn carries_frequency(&self) -> bool {
        self.members.iter().any(CacheStrategy::carries_frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;
    use crate::cache::strategy::{LfuStrategy, LruStrategy, SizeBasedStrategy, TtlStrategy};
    use std::time::Duration;

    fn ttl_lru(ttl_ms: u64, capacity: usize) -> HybridStrategy {
        HybridStrategy::new(vec![
            Strategy::Ttl(TtlStrategy::new(Duration::from_millis(ttl_ms))),
            Strategy::Lru(LruStrategy::new(capacity)),
        ])
    }

    #[test]
    fn test_admission_is_conjunction() {
        let hybrid = HybridStrategy::new(vec![
            Strategy::Lru(LruStrategy::new(10)),
            Strategy::SizeBased(SizeBasedStrategy::new(10)),
        ]);
        let mut m = meta("k", 0, 1);
        m.size_bytes = 5;
        assert!(hybrid.should_admit(&m, &[]));
        m.size_bytes = 50;
        assert!(!hybrid.should_admit(&m, &[]));
    }

    #[test]
    fn test_eviction_is_union_without_duplicates() {
        let hybrid = ttl_lru(1_000, 1);
        let current = vec![meta("a", 0, 1), meta("b", 10, 2)];

        // TTL selects both, LRU selects "a": union keeps first-seen order
        let victims = hybrid.select_evictions(&current, EvictionTrigger::Sweep, 5_000);
        assert_eq!(victims, vec!["a", "b"]);

        // Nothing expired yet: LRU capacity alone
        let candidate = meta("c", 20, 3);
        let victims = hybrid.select_evictions(&current, EvictionTrigger::Insert(&candidate), 20);
        assert_eq!(victims, vec!["a", "b"]);
    }

    #[test]
    fn test_expiry_and_frequency() {
        let hybrid = ttl_lru(1_000, 1);
        assert!(hybrid.is_expired(&meta("a", 0, 1), 1_000));
        assert!(!hybrid.is_expired(&meta("a", 0, 1), 999));
        assert!(!hybrid.carries_frequency());
        assert_eq!(hybrid.name(), "hybrid(ttl(1000ms), lru(1))");

        let with_lfu = HybridStrategy::new(vec![Strategy::Lfu(LfuStrategy::new(0, 5))]);
        assert!(with_lfu.carries_frequency());
    }
}
