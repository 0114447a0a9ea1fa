//! Strategy Factory
//!
//! Every constructor validates its parameters and fails with
//! [`Error::InvalidStrategy`] (or [`Error::InvalidPattern`]) instead of
//! producing a strategy that misbehaves later.

use crate::cache::entry::TypeTag;
use crate::cache::pattern::KeyPattern;
use crate::cache::strategy::lfu::DEFAULT_LFU_CAPACITY;
use crate::cache::strategy::{
    AdaptiveConfig, AdaptiveStrategy, HybridStrategy, LfuStrategy, LruStrategy, PatternStrategy,
    SizeBasedStrategy, Strategy, TtlStrategy, TypeBasedStrategy, DEFAULT_LRU_CAPACITY,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Strategy Configuration
// =============================================================================

/// Declarative strategy description (config files, CLI)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Ttl {
        ttl_ms: u64,
    },
    Lru {
        capacity: usize,
    },
    Lfu {
        #[serde(default)]
        min_access_count: u64,
        #[serde(default = "default_lfu_capacity")]
        capacity: usize,
    },
    SizeBased {
        max_bytes: u64,
    },
    TypeBased {
        allowed: Vec<TypeTag>,
    },
    PatternBased {
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    Hybrid {
        strategies: Vec<StrategyConfig>,
    },
    Adaptive(AdaptiveConfig),
}

fn default_lfu_capacity() -> usize {
    DEFAULT_LFU_CAPACITY
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Lru {
            capacity: DEFAULT_LRU_CAPACITY,
        }
    }
}

// =============================================================================
// Strategy Factory
// =============================================================================

/// Validated strategy constructors
pub struct StrategyFactory;

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::InvalidStrategy(msg.into()))
}

impl StrategyFactory {
    /// Entries expire `ttl` after creation
    pub fn create_ttl(ttl: Duration) -> Result<Strategy> {
        if ttl.is_zero() {
            return invalid("ttl must be positive");
        }
        Ok(Strategy::Ttl(TtlStrategy::new(ttl)))
    }

    /// At most `capacity` entries per tier, least recently used evicted first
    pub fn create_lru(capacity: usize) -> Result<Strategy> {
        if capacity == 0 {
            return invalid("lru capacity must be positive");
        }
        Ok(Strategy::Lru(LruStrategy::new(capacity)))
    }

    /// Least frequently used with the default capacity
    pub fn create_lfu(min_access_count: u64) -> Result<Strategy> {
        Self::create_lfu_with_capacity(min_access_count, DEFAULT_LFU_CAPACITY)
    }

    pub fn create_lfu_with_capacity(min_access_count: u64, capacity: usize) -> Result<Strategy> {
        if capacity == 0 {
            return invalid("lfu capacity must be positive");
        }
        Ok(Strategy::Lfu(LfuStrategy::new(min_access_count, capacity)))
    }

    /// Reject values whose estimated size exceeds `max_bytes`
    pub fn create_size_based(max_bytes: u64) -> Result<Strategy> {
        if max_bytes == 0 {
            return invalid("size limit must be positive");
        }
        Ok(Strategy::SizeBased(SizeBasedStrategy::new(max_bytes)))
    }

    /// Admit only the listed value types
    pub fn create_type_based(allowed: impl IntoIterator<Item = TypeTag>) -> Result<Strategy> {
        let strategy = TypeBasedStrategy::new(allowed);
        if strategy.allowed().is_empty() {
            return invalid("type-based strategy needs at least one allowed type");
        }
        Ok(Strategy::TypeBased(strategy))
    }

    /// Admit keys matching an include pattern and no exclude pattern
    ///
    /// Pattern strings follow [`KeyPattern`]'s parsing rules.
    pub fn create_pattern_based<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Strategy> {
        if include.is_empty() {
            return invalid("pattern-based strategy needs at least one include pattern");
        }
        let include = KeyPattern::parse_all(include)?;
        let exclude = KeyPattern::parse_all(exclude)?;
        Ok(Strategy::PatternBased(PatternStrategy::new(include, exclude)))
    }

    /// Compose strategies (AND admission, union eviction)
    pub fn create_hybrid(strategies: Vec<Strategy>) -> Result<Strategy> {
        if strategies.is_empty() {
            return invalid("hybrid strategy needs at least one member");
        }
        Ok(Strategy::Hybrid(HybridStrategy::new(strategies)))
    }

    /// Self-tuning LRU + TTL with default tuning
    pub fn create_adaptive() -> Result<Strategy> {
        Self::create_adaptive_with(AdaptiveConfig::default())
    }

    pub fn create_adaptive_with(config: AdaptiveConfig) -> Result<Strategy> {
        config.validate()?;
        Ok(Strategy::Adaptive(AdaptiveStrategy::new(config)))
    }

    /// Build from a declarative description
    pub fn from_config(config: &StrategyConfig) -> Result<Strategy> {
        match config {
            StrategyConfig::Ttl { ttl_ms } => Self::create_ttl(Duration::from_millis(*ttl_ms)),
            StrategyConfig::Lru { capacity } => Self::create_lru(*capacity),
            StrategyConfig::Lfu {
                min_access_count,
                capacity,
            } => Self::create_lfu_with_capacity(*min_access_count, *capacity),
            StrategyConfig::SizeBased { max_bytes } => Self::create_size_based(*max_bytes),
            StrategyConfig::TypeBased { allowed } => Self::create_type_based(allowed.iter().copied()),
            StrategyConfig::PatternBased { include, exclude } => {
                Self::create_pattern_based(include, exclude)
            }
            StrategyConfig::Hybrid { strategies } => {
                let members = strategies
                    .iter()
                    .map(Self::from_config)
                    .collect::<Result<Vec<_>>>()?;
                Self::create_hybrid(members)
            }
            StrategyConfig::Adaptive(adaptive) => Self::create_adaptive_with(adaptive.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::CacheStrategy;
    use assert_matches::assert_matches;

    #[test]
    fn test_rejects_invalid_parameters() {
        assert_matches!(StrategyFactory::create_ttl(Duration::ZERO), Err(Error::InvalidStrategy(_)));
        assert_eq!(
            StrategyFactory::create_ttl(Duration::from_micros(500)).unwrap().name(),
            "ttl(1ms)"
        );
        assert_matches!(StrategyFactory::create_lru(0), Err(Error::InvalidStrategy(_)));
        assert_matches!(
            StrategyFactory::create_lfu_with_capacity(1, 0),
            Err(Error::InvalidStrategy(_))
        );
        assert_matches!(StrategyFactory::create_size_based(0), Err(Error::InvalidStrategy(_)));
        assert_matches!(
            StrategyFactory::create_type_based(Vec::new()),
            Err(Error::InvalidStrategy(_))
        );
        let none: [&str; 0] = [];
        assert_matches!(
            StrategyFactory::create_pattern_based(&none, &none),
            Err(Error::InvalidStrategy(_))
        );
        assert_matches!(
            StrategyFactory::create_pattern_based(&["/(/"], &[]),
            Err(Error::InvalidPattern { .. })
        );
        assert_matches!(StrategyFactory::create_hybrid(vec![]), Err(Error::InvalidStrategy(_)));
        assert_matches!(
            StrategyFactory::create_adaptive_with(AdaptiveConfig {
                min_ttl_ms: 10_000,
                max_ttl_ms: 1_000,
                ..Default::default()
            }),
            Err(Error::InvalidStrategy(_))
        );
    }

    #[test]
    fn test_builds_valid_strategies() {
        let lfu = StrategyFactory::create_lfu(3).unwrap();
        assert_eq!(lfu.name(), "lfu(min=3, capacity=100)");

        let hybrid = StrategyFactory::create_hybrid(vec![
            StrategyFactory::create_ttl(Duration::from_secs(1)).unwrap(),
            StrategyFactory::create_lru(1).unwrap(),
        ])
        .unwrap();
        assert_eq!(hybrid.kind(), "hybrid");

        let adaptive = StrategyFactory::create_adaptive().unwrap();
        assert_eq!(adaptive.kind(), "adaptive");
    }

    #[test]
    fn test_from_yaml_config() {
        let yaml = r#"
type: hybrid
strategies:
  - type: ttl
    ttl_ms: 1000
  - type: lfu
    min_access_count: 2
  - type: pattern_based
    include: ["user:*"]
    exclude: ["user:secret*"]
  - type: type_based
    allowed: [object, string]
  - type: adaptive
    window: 50
"#;
        let config: StrategyConfig = serde_yaml::from_str(yaml).unwrap();
        let strategy = StrategyFactory::from_config(&config).unwrap();
        assert_eq!(strategy.kind(), "hybrid");
        assert!(strategy.carries_frequency());
        let Strategy::Hybrid(hybrid) = &strategy else {
            panic!("expected hybrid");
        };
        assert_eq!(hybrid.members().len(), 5);
        let Strategy::Adaptive(adaptive) = &hybrid.members()[4] else {
            panic!("expected adaptive");
        };
        assert_eq!(adaptive.config().window, 50);
        assert_eq!(adaptive.config().initial_capacity, 1000);
    }

    #[test]
    fn test_default_config() {
        let strategy = StrategyFactory::from_config(&StrategyConfig::default()).unwrap();
        assert_eq!(strategy.name(), "lru(1000)");
    }
}
