//! Size gate

use crate::cache::entry::EntryMetadata;
use crate::cache::strategy::CacheStrategy;

/// Rejects candidates larger than `max_bytes`; never evicts
#[derive(Debug, Clone)]
pub struct SizeBasedStrategy {
    max_bytes: u64,
}

impl SizeBasedStrategy {
    pub(crate) fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

impl CacheStrategy for SizeBasedStrategy {
    fn name(&self) -> String {
        format!("size({}b)", self.max_bytes)
    }

    fn should_admit(&self, candidate: &EntryMetadata, _current: &[EntryMetadata]) -> bool {
        candidate.size_bytes <= self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;
    use crate::cache::strategy::EvictionTrigger;

    #[test]
    fn test_gate() {
        let strategy = SizeBasedStrategy::new(100);
        let mut m = meta("k", 0, 1);

        m.size_bytes = 100;
        assert!(strategy.should_admit(&m, &[]));
        m.size_bytes = 101;
        assert!(!strategy.should_admit(&m, &[]));

        assert!(strategy
            .select_evictions(&[m], EvictionTrigger::Sweep, 0)
            .is_empty());
    }
}
