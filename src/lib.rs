//! Unified Cache
//!
//! A client-side cache manager putting memory, local-disk and HTTP-response
//! storage behind one API, with pluggable admission/eviction strategies.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Cache Manager                                   │
//! │   set_any / get_any / remove_any / invalidate / warmup / get_http           │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    Strategy     │  │  Entry Tracker  │  │      Metrics & Events       │  │
//! │  │ (hot-swappable) │  │ (recency index) │  │  (atomics, broadcast)       │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────────────────────┘  │
//! │           └────────────────────┤                                             │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                          Storage Backends                                    │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │     Memory      │  │      Local      │  │       HTTP responses        │  │
//! │  │    (DashMap)    │  │  (JSON files)   │  │  (+ HttpFetcher, reqwest)   │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Manager, strategies, storage backends
//! - [`config`]: Manager configuration (YAML loadable)
//! - [`error`]: Error types and handling

pub mod cache;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cache::{
    CacheEvent, CacheManager, CacheManagerBuilder, CacheStrategy, CacheTier, CacheValue,
    HttpFetcher, HttpRequest, HttpResponse, KeyPattern, MetricsSnapshot, SetOptions, SetOutcome,
    Strategy, StrategyConfig, StrategyFactory, WarmupEntry, WarmupReport,
};

pub use config::{CacheManagerConfig, HttpCacheConfig, LocalStorageConfig};

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
