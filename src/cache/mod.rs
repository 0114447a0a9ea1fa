//! Unified Caching System
//!
//! One manager in front of three storage backends:
//! - **Memory**: process-lifetime concurrent map
//! - **Local**: one JSON file per entry, survives restarts
//! - **Http**: fetched responses keyed by request identity
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Cache Manager                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────────────┐   │
//! │  │   Memory     │  │    Local     │  │      HTTP responses          │   │
//! │  │  (DashMap)   │  │ (JSON files) │  │  (identity → response)       │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────────────┘   │
//! │         │                  │                       │                     │
//! │         └──────────────────┼───────────────────────┘                     │
//! │                            │                                             │
//! │               ┌────────────┴────────────┐                                │
//! │               │  Entry Tracker          │◄── Strategy (admission,        │
//! │               │  (per-tier recency)     │    eviction, expiry)           │
//! │               └─────────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  • TTL / LRU / LFU / size / type / pattern / hybrid / adaptive          │
//! │  • Hot strategy swap with lazy re-evaluation                             │
//! │  • Conditional HTTP revalidation and shared in-flight fetches            │
//! │  • Cache-line aligned metrics   • Event broadcast                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use unified_cache::cache::{CacheManager, SetOptions, StrategyFactory};
//! use unified_cache::config::CacheManagerConfig;
//! use std::time::Duration;
//!
//! let cache = CacheManager::builder(CacheManagerConfig::default())
//!     .strategy(StrategyFactory::create_ttl(Duration::from_secs(60))?)
//!     .build()
//!     .await?;
//!
//! cache.set_any("user:1", &user, SetOptions::default()).await?;
//! let user: Option<User> = cache.get_any("user:1").await?;
//! let page = cache.get_http("https://example.com/api").await?;
//! ```

pub mod clock;
pub mod entry;
pub mod events;
pub mod http;
pub mod manager;
pub mod metrics;
pub mod pattern;
pub mod storage;
pub mod strategy;
pub mod tier;
pub mod tracker;

pub use clock::{Clock, ClockRef, ManualClock, SystemClock};
pub use entry::{CacheEntry, CacheValue, EntryMetadata, TypeTag};
pub use events::{CacheEvent, EvictionReason};
pub use http::{HttpFetcher, HttpFetcherRef, HttpRequest, HttpResponse, ReqwestFetcher};
pub use manager::{
    CacheManager, CacheManagerBuilder, RevalidationReport, SetOptions, SetOutcome, WarmupEntry,
    WarmupReport,
};
pub use metrics::{MetricsSnapshot, TierMetricsSnapshot};
pub use pattern::KeyPattern;
pub use storage::{SkipReason, StorageBackend, WriteOutcome};
pub use strategy::{CacheStrategy, Strategy, StrategyConfig, StrategyFactory};
pub use tier::CacheTier;
