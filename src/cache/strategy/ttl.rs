//! Time-to-live strategy

use crate::cache::entry::{expired, ttl_millis, EntryMetadata};
use crate::cache::strategy::{select_where, CacheStrategy, EvictionTrigger};
use std::time::Duration;

/// Admits everything; entries go stale `ttl` after creation
///
/// An entry's own TTL takes precedence over the strategy default.
#[derive(Debug, Clone)]
pub struct TtlStrategy {
    ttl_ms: u64,
}

impl TtlStrategy {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl_millis(ttl),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    #[inline]
    pub(crate) fn expired_with(ttl_ms: u64, entry: &EntryMetadata, now_ms: u64) -> bool {
        expired(entry.created_at_ms, Some(entry.ttl_ms.unwrap_or(ttl_ms)), now_ms)
    }
}

impl CacheStrategy for TtlStrategy {
    fn name(&self) -> String {
        format!("ttl({}ms)", self.ttl_ms)
    }

    fn select_evictions(
        &self,
        current: &[EntryMetadata],
        trigger: EvictionTrigger<'_>,
        now_ms: u64,
    ) -> Vec<String> {
        select_where(current, trigger, |m| self.is_expired(m, now_ms))
    }

    fn is_expired(&self, entry: &EntryMetadata, now_ms: u64) -> bool {
        Self::expired_with(self.ttl_ms, entry, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;

    #[test]
    fn test_expiry_boundary() {
        let strategy = TtlStrategy::new(Duration::from_millis(5_000));
        let entry = meta("k", 1_000, 1);

        assert!(!strategy.is_expired(&entry, 5_999));
        assert!(strategy.is_expired(&entry, 6_000));
        assert!(strategy.is_expired(&entry, 60_000));
    }

    #[test]
    fn test_entry_ttl_takes_precedence() {
        let strategy = TtlStrategy::new(Duration::from_millis(5_000));
        let mut entry = meta("k", 0, 1);
        entry.ttl_ms = Some(100);
        assert!(strategy.is_expired(&entry, 100));

        entry.ttl_ms = Some(60_000);
        assert!(!strategy.is_expired(&entry, 10_000));
    }

    #[test]
    fn test_sweep_selects_expired() {
        let strategy = TtlStrategy::new(Duration::from_millis(1_000));
        let current = vec![meta("old", 0, 1), meta("new", 900, 2)];

        let victims = strategy.select_evictions(&current, EvictionTrigger::Sweep, 1_500);
        assert_eq!(victims, vec!["old"]);
        assert!(strategy.should_admit(&meta("x", 0, 3), &current));
        assert_eq!(strategy.name(), "ttl(1000ms)");
    }
}
