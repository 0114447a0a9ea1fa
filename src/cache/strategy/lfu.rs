//! Least-frequently-used strategy

use crate::cache::entry::EntryMetadata;
use crate::cache::strategy::{select_over_capacity, select_where, CacheStrategy, EvictionTrigger};
use indexmap::IndexSet;

/// Capacity used when an LFU strategy is built from a minimum count alone
pub const DEFAULT_LFU_CAPACITY: usize = 100;

/// Keeps at most `capacity` entries, evicting the least read first
///
/// Ties go to the oldest `created_at`, then insertion order. A sweep also
/// sheds entries read fewer than `min_access_count` times. Access counts
/// survive overwrites of the same key.
#[derive(Debug, Clone)]
pub struct LfuStrategy {
    min_access_count: u64,
    capacity: usize,
}

impl LfuStrategy {
    pub(crate) fn new(min_access_count: u64, capacity: usize) -> Self {
        Self {
            min_access_count,
            capacity,
        }
    }

    pub fn min_access_count(&self) -> u64 {
        self.min_access_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl CacheStrategy for LfuStrategy {
    fn name(&self) -> String {
        format!("lfu(min={}, capacity={})", self.min_access_count, self.capacity)
    }

    fn select_evictions(
        &self,
        current: &[EntryMetadata],
        trigger: EvictionTrigger<'_>,
        _now_ms: u64,
    ) -> Vec<String> {
        let over = select_over_capacity(current, trigger, self.capacity, EntryMetadata::frequency);
        match trigger {
            EvictionTrigger::Insert(_) => over,
            EvictionTrigger::Sweep => {
                let mut victims: IndexSet<String> = select_where(current, trigger, |m| {
                    m.access_count < self.min_access_count
                })
                .into_iter()
                .collect();
                victims.extend(over);
                victims.into_iter().collect()
            }
        }
    }

    fn carries_frequency(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;

    fn counted(key: &str, created: u64, seq: u64, count: u64) -> EntryMetadata {
        let mut m = meta(key, created, seq);
        m.access_count = count;
        m
    }

    #[test]
    fn test_evicts_least_frequent() {
        let strategy = LfuStrategy::new(0, 2);
        let current = vec![counted("hot", 0, 1, 9), counted("cold", 0, 2, 1)];
        let candidate = meta("new", 0, 3);

        let victims = strategy.select_evictions(&current, EvictionTrigger::Insert(&candidate), 0);
        assert_eq!(victims, vec!["cold"]);
        assert!(strategy.carries_frequency());
    }

    #[test]
    fn test_ties_go_to_oldest() {
        let strategy = LfuStrategy::new(0, 1);
        let current = vec![counted("young", 50, 1, 2), counted("old", 10, 2, 2)];
        let victims = strategy.select_evictions(&current, EvictionTrigger::Sweep, 0);
        assert_eq!(victims, vec!["old"]);
    }

    #[test]
    fn test_sweep_sheds_rarely_read() {
        let strategy = LfuStrategy::new(2, DEFAULT_LFU_CAPACITY);
        let current = vec![
            counted("a", 0, 1, 0),
            counted("b", 0, 2, 5),
            counted("c", 0, 3, 1),
        ];

        let victims = strategy.select_evictions(&current, EvictionTrigger::Sweep, 0);
        assert_eq!(victims, vec!["a", "c"]);

        // Inserts only react to capacity
        let candidate = meta("d", 0, 4);
        assert!(strategy
            .select_evictions(&current, EvictionTrigger::Insert(&candidate), 0)
            .is_empty());
    }
}
