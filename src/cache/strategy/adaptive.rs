//! Self-tuning strategy
//!
//! Wraps LRU and TTL logic whose capacity and TTL move with the observed hit
//! rate. Lookups are counted into fixed-size windows; at the end of each
//! window:
//!
//! | window hit rate      | adjustment                                |
//! |----------------------|-------------------------------------------|
//! | `< low_water`        | capacity and TTL grow by `step`           |
//! | `> high_water`       | capacity and TTL shrink by `step`         |
//! | otherwise            | unchanged                                 |
//!
//! Results are clamped to the configured bounds.

use crate::cache::entry::EntryMetadata;
use crate::cache::strategy::{
    select_over_capacity, select_where, CacheStrategy, EvictionTrigger, TtlStrategy,
};
use crate::error::{Error, Result};
use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Tuning parameters for [`AdaptiveStrategy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub initial_capacity: usize,
    pub min_capacity: usize,
    pub max_capacity: usize,
    pub initial_ttl_ms: u64,
    pub min_ttl_ms: u64,
    pub max_ttl_ms: u64,
    /// Lookups per evaluation window
    pub window: u64,
    /// Relative adjustment per window (0.1 = 10%)
    pub step: f64,
    pub low_water: f64,
    pub high_water: f64,
    /// Window hit rates kept for inspection
    pub history_len: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1000,
            min_capacity: 100,
            max_capacity: 10_000,
            initial_ttl_ms: 5 * 60 * 1000,
            min_ttl_ms: 60 * 1000,
            max_ttl_ms: 60 * 60 * 1000,
            window: 100,
            step: 0.1,
            low_water: 0.5,
            high_water: 0.8,
            history_len: 32,
        }
    }
}

impl AdaptiveConfig {
    /// Check bounds and thresholds for consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidStrategy(format!("adaptive: {}", msg)));

        if self.min_capacity == 0 || self.min_ttl_ms == 0 {
            return invalid("minimum capacity and TTL must be positive");
        }
        if self.min_capacity > self.max_capacity
            || !(self.min_capacity..=self.max_capacity).contains(&self.initial_capacity)
        {
            return invalid("capacity bounds must satisfy min <= initial <= max");
        }
        if self.min_ttl_ms > self.max_ttl_ms
            || !(self.min_ttl_ms..=self.max_ttl_ms).contains(&self.initial_ttl_ms)
        {
            return invalid("TTL bounds must satisfy min <= initial <= max");
        }
        if self.window == 0 || self.history_len == 0 {
            return invalid("window and history length must be positive");
        }
        if !(self.step > 0.0 && self.step < 1.0) {
            return invalid("step must be within (0, 1)");
        }
        if !(0.0..=1.0).contains(&self.low_water)
            || !(0.0..=1.0).contains(&self.high_water)
            || self.low_water >= self.high_water
        {
            return invalid("water marks must satisfy 0 <= low < high <= 1");
        }
        Ok(())
    }
}

// =============================================================================
// Adaptive Strategy
// =============================================================================

#[derive(Debug)]
struct TuningState {
    capacity: usize,
    ttl_ms: u64,
    window_hits: u64,
    window_total: u64,
    history: VecDeque<f64>,
}

/// LRU + TTL with self-tuning capacity and TTL
#[derive(Debug)]
pub struct AdaptiveStrategy {
    config: AdaptiveConfig,
    state: Mutex<TuningState>,
}

impl AdaptiveStrategy {
    /// Build from a validated config
    pub(crate) fn new(config: AdaptiveConfig) -> Self {
        let state = TuningState {
            capacity: config.initial_capacity,
            ttl_ms: config.initial_ttl_ms,
            window_hits: 0,
            window_total: 0,
            history: VecDeque::with_capacity(config.history_len),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Current capacity bound
    pub fn effective_capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Current default TTL
    pub fn effective_ttl(&self) -> Duration {
        Duration::from_millis(self.state.lock().ttl_ms)
    }

    /// Hit rates of completed windows, oldest first
    pub fn history(&self) -> Vec<f64> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Scale by `factor`, moving at least one unit, clamped to `[min, max]`
    fn scaled(value: u64, factor: f64, grow: bool, min: u64, max: u64) -> u64 {
        let mut next = (value as f64 * factor).round() as u64;
        if next == value {
            next = if grow {
                value.saturating_add(1)
            } else {
                value.saturating_sub(1)
            };
        }
        next.clamp(min, max)
    }

    fn end_window(&self, state: &mut TuningState) {
        let rate = state.window_hits as f64 / state.window_total as f64;
        state.window_hits = 0;
        state.window_total = 0;

        if state.history.len() == self.config.history_len {
            state.history.pop_front();
        }
        state.history.push_back(rate);

        let c = &self.config;
        let grow = if rate < c.low_water {
            true
        } else if rate > c.high_water {
            false
        } else {
            return;
        };
        let factor = if grow { 1.0 + c.step } else { 1.0 - c.step };

        state.capacity = Self::scaled(
            state.capacity as u64,
            factor,
            grow,
            c.min_capacity as u64,
            c.max_capacity as u64,
        ) as usize;
        state.ttl_ms = Self::scaled(state.ttl_ms, factor, grow, c.min_ttl_ms, c.max_ttl_ms);

        debug!(
            hit_rate = rate,
            capacity = state.capacity,
            ttl_ms = state.ttl_ms,
            "Adaptive strategy retuned"
        );
    }
}

impl CacheStrategy for AdaptiveStrategy {
    fn name(&self) -> String {
        let state = self.state.lock();
        format!("adaptive(capacity={}, ttl={}ms)", state.capacity, state.ttl_ms)
    }

    fn select_evictions(
        &self,
        current: &[EntryMetadata],
        trigger: EvictionTrigger<'_>,
        now_ms: u64,
    ) -> Vec<String> {
        let (capacity, ttl_ms) = {
            let state = self.state.lock();
            (state.capacity, state.ttl_ms)
        };

        let mut victims: IndexSet<String> = select_where(current, trigger, |m| {
            TtlStrategy::expired_with(ttl_ms, m, now_ms)
        })
        .into_iter()
        .collect();
        victims.extend(select_over_capacity(
            current,
            trigger,
            capacity,
            EntryMetadata::recency,
        ));
        victims.into_iter().collect()
    }

    fn is_expired(&self, entry: &EntryMetadata, now_ms: u64) -> bool {
        let ttl_ms = self.state.lock().ttl_ms;
        TtlStrategy::expired_with(ttl_ms, entry, now_ms)
    }

    fn observe(&self, hit: bool) {
        let mut state = self.state.lock();
        state.window_total += 1;
        if hit {
            state.window_hits += 1;
        }
        if state.window_total >= self.config.window {
            self.end_window(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;

    fn small_config() -> AdaptiveConfig {
        AdaptiveConfig {
            initial_capacity: 10,
            min_capacity: 5,
            max_capacity: 12,
            initial_ttl_ms: 1_000,
            min_ttl_ms: 500,
            max_ttl_ms: 2_000,
            window: 10,
            history_len: 3,
            ..Default::default()
        }
    }

    fn feed(strategy: &AdaptiveStrategy, hits: u64, misses: u64) {
        for _ in 0..hits {
            strategy.observe(true);
        }
        for _ in 0..misses {
            strategy.observe(false);
        }
    }

    #[test]
    fn test_low_hit_rate_grows() {
        let strategy = AdaptiveStrategy::new(small_config());
        feed(&strategy, 2, 8);
        assert_eq!(strategy.effective_capacity(), 11);
        assert_eq!(strategy.effective_ttl(), Duration::from_millis(1_100));

        feed(&strategy, 0, 10);
        feed(&strategy, 0, 10);
        assert_eq!(strategy.effective_capacity(), 12);
        assert_eq!(strategy.history(), vec![0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_high_hit_rate_shrinks() {
        let strategy = AdaptiveStrategy::new(small_config());
        feed(&strategy, 9, 1);
        assert_eq!(strategy.effective_capacity(), 9);
        assert_eq!(strategy.effective_ttl(), Duration::from_millis(900));

        for _ in 0..10 {
            feed(&strategy, 10, 0);
        }
        assert_eq!(strategy.effective_capacity(), 5);
        assert_eq!(strategy.effective_ttl(), Duration::from_millis(500));
        assert_eq!(strategy.history().len(), 3);
    }

    #[test]
    fn test_middle_band_holds() {
        let strategy = AdaptiveStrategy::new(small_config());
        feed(&strategy, 6, 4);
        assert_eq!(strategy.effective_capacity(), 10);
        feed(&strategy, 3, 0);
        assert_eq!(strategy.history(), vec![0.6]);
    }

    #[test]
    fn test_evicts_with_effective_parameters() {
        let strategy = AdaptiveStrategy::new(AdaptiveConfig {
            initial_capacity: 5,
            ..small_config()
        });
        let current: Vec<_> = (0..5).map(|i| meta(&format!("k{}", i), i * 100, i)).collect();
        let candidate = meta("new", 900, 9);

        let victims = strategy.select_evictions(&current, EvictionTrigger::Insert(&candidate), 900);
        assert_eq!(victims, vec!["k0"]);

        // k0 and k1 are past the 1000ms TTL at t=1100
        let victims = strategy.select_evictions(&current, EvictionTrigger::Sweep, 1_100);
        assert_eq!(victims, vec!["k0", "k1"]);
        assert!(strategy.is_expired(&current[0], 1_000));
    }

    #[test]
    fn test_validate() {
        assert!(AdaptiveConfig::default().validate().is_ok());
        assert!(small_config().validate().is_ok());

        let bad = AdaptiveConfig {
            min_capacity: 50,
            max_capacity: 10,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = AdaptiveConfig {
            low_water: 0.9,
            high_water: 0.8,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = AdaptiveConfig {
            step: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
