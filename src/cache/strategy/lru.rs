//! Least-recently-used strategy

use crate::cache::entry::EntryMetadata;
use crate::cache::strategy::{select_over_capacity, CacheStrategy, EvictionTrigger};

/// Admits everything; keeps at most `capacity` entries per tier
///
/// Victims are the oldest `last_accessed_at`, refined by the logical access
/// sequence and then insertion order.
#[derive(Debug, Clone)]
pub struct LruStrategy {
    capacity: usize,
}

impl LruStrategy {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl CacheStrategy for LruStrategy {
    fn name(&self) -> String {
        format!("lru({})", self.capacity)
    }

    fn select_evictions(
        &self,
        current: &[EntryMetadata],
        trigger: EvictionTrigger<'_>,
        _now_ms: u64,
    ) -> Vec<String> {
        select_over_capacity(current, trigger, self.capacity, EntryMetadata::recency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;

    #[test]
    fn test_evicts_least_recently_used() {
        let strategy = LruStrategy::new(2);
        let a = meta("a", 0, 1);
        let mut b = meta("b", 0, 2);
        let mut c = meta("c", 0, 3);

        // a was read after b was written
        let mut a_read = a.clone();
        a_read.access_seq = 10;

        let current = vec![b.clone(), a_read];
        let victims = strategy.select_evictions(&current, EvictionTrigger::Insert(&c), 0);
        assert_eq!(victims, vec!["b"]);

        // Wall clock dominates the logical tick
        b.last_accessed_ms = 50;
        c.last_accessed_ms = 10;
        let current = vec![a, b, c];
        let victims = LruStrategy::new(1).select_evictions(&current, EvictionTrigger::Sweep, 0);
        assert_eq!(victims, vec!["a", "c"]);
    }

    #[test]
    fn test_within_capacity() {
        let strategy = LruStrategy::new(3);
        let current = vec![meta("a", 0, 1), meta("b", 0, 2)];
        let candidate = meta("c", 0, 3);
        assert!(strategy
            .select_evictions(&current, EvictionTrigger::Insert(&candidate), 0)
            .is_empty());
        assert!(strategy.should_admit(&candidate, &current));
    }
}
