//! Cache Manager
//!
//! Coordinates the storage backends, the entry tracker and the active
//! strategy. Every read, write and delete goes through here, so metrics and
//! events always agree with what the backends hold.
//!
//! Strategy swaps are lazy: each tracked entry remembers the strategy
//! generation it was admitted under, and an entry from an older generation is
//! re-checked the next time it is read. [`CacheManager::revalidate_all`]
//! applies the active strategy to everything at once.

mod http;

use crate::cache::clock::{ClockRef, SystemClock};
use crate::cache::entry::{ttl_millis, CacheEntry, CacheValue, EntryMetadata};
use crate::cache::events::{CacheEvent, EvictionReason};
use crate::cache::http::{HttpFetcherRef, ReqwestFetcher};
use crate::cache::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::cache::pattern::KeyPattern;
use crate::cache::storage::{
    HttpResponseStorage, LocalStorage, MemoryStorage, SkipReason, StorageBackend, WriteOutcome,
};
use crate::cache::strategy::{CacheStrategy, EvictionTrigger, Strategy, StrategyFactory};
use crate::cache::tier::CacheTier;
use crate::cache::tracker::EntryTracker;
use crate::config::CacheManagerConfig;
use crate::error::Result;
use bytes::Bytes;
use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Operation Types
// =============================================================================

/// Per-write options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry TTL; overrides any strategy default
    pub ttl: Option<Duration>,
    /// Target tier (None = configured default)
    pub storage: Option<CacheTier>,
}

impl SetOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            storage: None,
        }
    }

    pub fn storage(tier: CacheTier) -> Self {
        Self {
            ttl: None,
            storage: Some(tier),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn in_storage(mut self, tier: CacheTier) -> Self {
        self.storage = Some(tier);
        self
    }
}

/// What happened to a write
///
/// Rejections and skips are regular outcomes, not errors: the previous
/// value for the key (if any) is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Written; `evicted` entries were removed to make room
    Stored { tier: CacheTier, evicted: usize },
    /// The active strategy refused the entry
    Rejected,
    /// The backend declined the write
    Skipped(SkipReason),
}

impl SetOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, SetOutcome::Stored { .. })
    }
}

/// One entry for [`CacheManager::warmup`]
#[derive(Debug, Clone, PartialEq)]
pub struct WarmupEntry {
    pub key: String,
    pub value: CacheValue,
    pub ttl: Option<Duration>,
    pub storage: Option<CacheTier>,
}

impl WarmupEntry {
    pub fn new(key: impl Into<String>, value: impl Into<CacheValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
            storage: None,
        }
    }

    pub fn from_serializable<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(key, CacheValue::from_serializable(value)?))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn in_storage(mut self, tier: CacheTier) -> Self {
        self.storage = Some(tier);
        self
    }
}

/// Outcome counts of a warmup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub stored: usize,
    pub rejected: usize,
    pub skipped: usize,
    /// Entries whose write failed with an error
    pub failed: usize,
}

impl WarmupReport {
    pub fn total(&self) -> usize {
        self.stored + self.rejected + self.skipped + self.failed
    }
}

/// Result of [`CacheManager::revalidate_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationReport {
    pub checked: usize,
    pub removed: usize,
}

/// Strategy and the generation it became active in
#[derive(Debug, Clone)]
struct ActiveStrategy {
    strategy: Arc<Strategy>,
    generation: u64,
}

/// Outcome of checking a stored entry against the active strategy
enum Validity {
    Fresh,
    Stale,
    Rejected,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`CacheManager`]
pub struct CacheManagerBuilder {
    config: CacheManagerConfig,
    strategy: Option<Strategy>,
    clock: Option<ClockRef>,
    fetcher: Option<HttpFetcherRef>,
}

impl CacheManagerBuilder {
    /// Use this strategy instead of the one in the config
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Time source (defaults to the system clock)
    pub fn clock(mut self, clock: ClockRef) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Network port for the HTTP tier (defaults to reqwest)
    pub fn fetcher(mut self, fetcher: HttpFetcherRef) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Open the backends and restore the local index
    pub async fn build(self) -> Result<Arc<CacheManager>> {
        let config = self.config;
        config.validate()?;

        let strategy = match self.strategy {
            Some(strategy) => strategy,
            None => StrategyFactory::from_config(&config.strategy)?,
        };
        let local = LocalStorage::with_config(&config.local, config.namespace.clone()).await?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        let manager = Arc::new(CacheManager {
            memory: MemoryStorage::new(),
            local,
            http: HttpResponseStorage::new(),
            tracker: EntryTracker::new(),
            active: RwLock::new(ActiveStrategy {
                strategy: Arc::new(strategy),
                generation: 0,
            }),
            metrics: MetricsRecorder::new(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Arc::new(ReqwestFetcher::new())),
            in_flight: DashMap::new(),
            next_flight_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            event_tx,
            config,
        });

        manager.restore_local_index().await?;

        if let Some(interval) = manager.config.sweep_interval() {
            let _ = manager.spawn_sweeper(interval, manager.shutdown.child_token());
        }

        info!(
            namespace = %manager.config.namespace,
            root = %manager.local.root_path().display(),
            strategy = %manager.strategy_name(),
            "Cache manager initialized"
        );
        Ok(manager)
    }
}

// =============================================================================
// Cache Manager
// =============================================================================

/// Unified cache over memory, local and HTTP-response storage
pub struct CacheManager {
    memory: MemoryStorage,
    local: LocalStorage,
    http: HttpResponseStorage,
    /// Metadata the strategies decide on
    tracker: EntryTracker,
    active: RwLock<ActiveStrategy>,
    metrics: MetricsRecorder,
    clock: ClockRef,
    fetcher: HttpFetcherRef,
    /// Shared HTTP fetches by request identity
    in_flight: DashMap<String, http::InFlight>,
    next_flight_id: AtomicU64,
    /// Stops the background sweeper
    shutdown: CancellationToken,
    event_tx: broadcast::Sender<CacheEvent>,
    config: CacheManagerConfig,
}

impl CacheManager {
    pub fn builder(config: CacheManagerConfig) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            strategy: None,
            clock: None,
            fetcher: None,
        }
    }

    /// Build with the system clock and the reqwest fetcher
    pub async fn new(config: CacheManagerConfig) -> Result<Arc<Self>> {
        Self::builder(config).build().await
    }

    pub fn config(&self) -> &CacheManagerConfig {
        &self.config
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    /// Emit an event
    fn emit_event(&self, event: CacheEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.event_tx.send(event);
    }

    /// Get storage for a tier
    fn storage(&self, tier: CacheTier) -> &dyn StorageBackend {
        match tier {
            CacheTier::Memory => &self.memory,
            CacheTier::Local => &self.local,
            CacheTier::Http => &self.http,
        }
    }

    fn active(&self) -> ActiveStrategy {
        self.active.read().clone()
    }

    /// Seed the tracker with entries persisted by earlier runs
    async fn restore_local_index(&self) -> Result<()> {
        let mut entries = Vec::new();
        for key in self.local.keys(None).await? {
            if let Some(entry) = self.local.get(&key).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| (e.last_accessed_ms, e.created_at_ms));

        for entry in &entries {
            self.tracker
                .track(EntryMetadata::from_entry(entry, CacheTier::Local), 0);
        }
        if !entries.is_empty() {
            info!(entries = entries.len(), "Restored local cache index");
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a serializable value
    pub async fn set_any<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<SetOutcome> {
        self.set_value(key, CacheValue::from_serializable(value)?, options)
            .await
    }

    /// Store raw bytes
    pub async fn set_bytes(
        &self,
        key: &str,
        bytes: impl Into<Bytes>,
        options: SetOptions,
    ) -> Result<SetOutcome> {
        self.set_value(key, CacheValue::Binary(bytes.into()), options)
            .await
    }

    /// Store a cache value
    pub async fn set_value(
        &self,
        key: &str,
        value: CacheValue,
        options: SetOptions,
    ) -> Result<SetOutcome> {
        let tier = options.storage.unwrap_or(self.config.default_storage);
        let now_ms = self.clock.now_ms();
        let entry = CacheEntry::new(key, value, now_ms)
            .with_ttl(options.ttl.map(ttl_millis));
        self.write_entry(tier, entry, now_ms, &self.active()).await
    }

    /// Admission, write, then capacity eviction
    async fn write_entry(
        &self,
        tier: CacheTier,
        mut entry: CacheEntry,
        now_ms: u64,
        active: &ActiveStrategy,
    ) -> Result<SetOutcome> {
        let strategy = active.strategy.as_ref();

        if strategy.carries_frequency() {
            if let Some(previous) = self.tracker.get(tier, &entry.key) {
                entry.access_count = previous.access_count;
            }
        }

        let candidate = EntryMetadata::from_entry(&entry, tier);
        let current = self.tracker.snapshot(tier);

        if !strategy.should_admit(&candidate, &current) {
            let name = strategy.name();
            self.metrics.tier(tier).record_rejection();
            debug!(key = %entry.key, tier = %tier, strategy = %name, "Write rejected by strategy");
            self.emit_event(CacheEvent::rejected(&entry.key, tier, &name));
            return Ok(SetOutcome::Rejected);
        }

        let victims =
            strategy.select_evictions(&current, EvictionTrigger::Insert(&candidate), now_ms);

        let key = entry.key.clone();
        let size_bytes = entry.size_bytes;
        if let WriteOutcome::Skipped(reason) = self.storage(tier).set(entry).await? {
            self.metrics.tier(tier).record_skipped_write();
            warn!(key = %key, tier = %tier, reason = %reason, "Cache write skipped");
            self.emit_event(CacheEvent::write_skipped(&key, tier, reason));
            return Ok(SetOutcome::Skipped(reason));
        }

        self.tracker.track(candidate, active.generation);
        self.metrics.tier(tier).record_set();
        debug!(key = %key, tier = %tier, size = size_bytes, "Stored cache entry");
        self.emit_event(CacheEvent::set(&key, tier, size_bytes));

        let mut evicted = 0;
        for victim in &victims {
            let reason = eviction_reason(strategy, current.iter().find(|m| &m.key == victim), now_ms);
            if self.evict(tier, victim, reason).await? {
                evicted += 1;
            }
        }

        Ok(SetOutcome::Stored { tier, evicted })
    }

    /// Remove an entry on the manager's own initiative
    async fn evict(&self, tier: CacheTier, key: &str, reason: EvictionReason) -> Result<bool> {
        let removed = self.storage(tier).delete(key).await?;
        self.tracker.remove(tier, key);
        if removed {
            self.metrics.tier(tier).record_eviction();
            debug!(key = %key, tier = %tier, reason = %reason, "Evicted cache entry");
            self.emit_event(CacheEvent::evict(key, tier, reason));
        }
        Ok(removed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Typed lookup across memory, then local
    pub async fn get_any<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_value(key)
            .await?
            .map(|value| value.into_typed(key))
            .transpose()
    }

    /// Typed lookup in one tier
    pub async fn get_from<T: DeserializeOwned>(&self, key: &str, tier: CacheTier) -> Result<Option<T>> {
        self.get_entry(key, tier)
            .await?
            .map(|entry| entry.value.into_typed(key))
            .transpose()
    }

    /// Lookup across memory, then local
    ///
    /// Records exactly one hit (on the tier that served it) or one miss.
    /// A tier that fails is logged and skipped.
    pub async fn get_value(&self, key: &str) -> Result<Option<CacheValue>> {
        let now_ms = self.clock.now_ms();
        let active = self.active();

        for &tier in CacheTier::lookup_order() {
            match self.lookup(tier, key, now_ms, &active).await {
                Ok(Some(entry)) => {
                    self.record_lookup(tier, key, true, &active);
                    return Ok(Some(entry.value));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, tier = %tier, error = %e, "Tier lookup failed");
                }
            }
        }

        // Misses of a full search are booked on the first tier searched
        self.record_lookup(CacheTier::Memory, key, false, &active);
        Ok(None)
    }

    /// Lookup in one tier, returning the entry with its bookkeeping
    pub async fn get_entry(&self, key: &str, tier: CacheTier) -> Result<Option<CacheEntry>> {
        let now_ms = self.clock.now_ms();
        let active = self.active();
        let entry = self.lookup(tier, key, now_ms, &active).await?;
        self.record_lookup(tier, key, entry.is_some(), &active);
        Ok(entry)
    }

    /// Fetch, validate and touch one entry; no hit/miss accounting
    async fn lookup(
        &self,
        tier: CacheTier,
        key: &str,
        now_ms: u64,
        active: &ActiveStrategy,
    ) -> Result<Option<CacheEntry>> {
        let storage = self.storage(tier);
        let Some(mut entry) = storage.get(key).await? else {
            // The backend may have dropped it (self-heal); forget the metadata
            self.tracker.remove(tier, key);
            return Ok(None);
        };

        match self.validity(tier, &entry, now_ms, active) {
            Validity::Fresh => {}
            Validity::Stale => {
                self.evict(tier, key, EvictionReason::Expired).await?;
                return Ok(None);
            }
            Validity::Rejected => {
                self.evict(tier, key, EvictionReason::Strategy).await?;
                return Ok(None);
            }
        }

        storage.touch(key, now_ms).await?;
        self.tracker.access(tier, key, now_ms);
        entry.record_access(now_ms);
        Ok(Some(entry))
    }

    /// Check a stored entry against the active strategy
    ///
    /// Entries admitted under an older generation get their admission
    /// re-checked once; survivors are stamped with the current generation.
    fn validity(
        &self,
        tier: CacheTier,
        entry: &CacheEntry,
        now_ms: u64,
        active: &ActiveStrategy,
    ) -> Validity {
        let strategy = active.strategy.as_ref();
        let metadata = match self.tracker.get(tier, &entry.key) {
            Some(metadata) => metadata,
            None => self
                .tracker
                .track(EntryMetadata::from_entry(entry, tier), 0),
        };

        if metadata.generation < active.generation {
            if !strategy.should_admit(&metadata, &self.tracker.snapshot(tier)) {
                return Validity::Rejected;
            }
            self.tracker
                .set_generation(tier, &entry.key, active.generation);
        }

        if strategy.is_expired(&metadata, now_ms) {
            Validity::Stale
        } else {
            Validity::Fresh
        }
    }

    fn record_lookup(&self, tier: CacheTier, key: &str, hit: bool, active: &ActiveStrategy) {
        let metrics = self.metrics.tier(tier);
        if hit {
            metrics.record_hit();
            debug!(key = %key, tier = %tier, "Cache hit");
            self.emit_event(CacheEvent::hit(key, tier));
        } else {
            metrics.record_miss();
            debug!(key = %key, tier = %tier, "Cache miss");
            self.emit_event(CacheEvent::miss(key));
        }
        active.strategy.observe(hit);
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Remove a key from every tier
    ///
    /// Returns true if any tier held it.
    pub async fn remove_any(&self, key: &str) -> Result<bool> {
        let mut removed = false;
        for &tier in CacheTier::all() {
            if self.storage(tier).delete(key).await? {
                self.metrics.tier(tier).record_deletes(1);
                self.emit_event(CacheEvent::delete(key, tier));
                removed = true;
            }
            self.tracker.remove(tier, key);
        }
        debug!(key = %key, removed, "Removed cache entry");
        Ok(removed)
    }

    /// Empty every tier and reset all counters
    pub async fn clear_all(&self) -> Result<()> {
        for &tier in CacheTier::all() {
            self.storage(tier).clear().await?;
        }
        self.tracker.clear_all();
        self.metrics.reset();
        info!("Cache cleared");
        self.emit_event(CacheEvent::Cleared);
        Ok(())
    }

    /// Remove every key matching a pattern from every tier
    ///
    /// `pattern` is a prefix, a glob (`user:*`) or a `/regex/`. Returns the
    /// number of entries removed; repeating the call removes nothing.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let pattern: KeyPattern = pattern.parse()?;
        self.invalidate_pattern(&pattern).await
    }

    pub async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<usize> {
        let mut removed = 0;
        for &tier in CacheTier::all() {
            let storage = self.storage(tier);
            for key in storage.keys(Some(pattern)).await? {
                if storage.delete(&key).await? {
                    removed += 1;
                    self.metrics.tier(tier).record_deletes(1);
                    self.emit_event(CacheEvent::evict(&key, tier, EvictionReason::Invalidated));
                }
                self.tracker.remove(tier, &key);
            }
        }

        info!(pattern = %pattern, removed, "Invalidated cache entries");
        self.emit_event(CacheEvent::Invalidated {
            pattern: pattern.to_string(),
            removed,
        });
        Ok(removed)
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Bulk write; individual failures are counted, not fatal
    pub async fn warmup(&self, entries: impl IntoIterator<Item = WarmupEntry>) -> WarmupReport {
        let mut report = WarmupReport::default();
        for item in entries {
            let options = SetOptions {
                ttl: item.ttl,
                storage: item.storage,
            };
            match self.set_value(&item.key, item.value, options).await {
                Ok(SetOutcome::Stored { .. }) => report.stored += 1,
                Ok(SetOutcome::Rejected) => report.rejected += 1,
                Ok(SetOutcome::Skipped(_)) => report.skipped += 1,
                Err(e) => {
                    warn!(key = %item.key, error = %e, "Warmup write failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            stored = report.stored,
            rejected = report.rejected,
            skipped = report.skipped,
            failed = report.failed,
            "Cache warmup finished"
        );
        report
    }

    // =========================================================================
    // Strategy
    // =========================================================================

    /// Name of the active strategy
    pub fn strategy_name(&self) -> String {
        self.active.read().strategy.name()
    }

    /// The active strategy
    pub fn strategy(&self) -> Arc<Strategy> {
        Arc::clone(&self.active.read().strategy)
    }

    /// Swap the active strategy
    ///
    /// Stored entries are re-checked lazily on their next read. Returns the
    /// new strategy generation.
    pub fn set_strategy(&self, strategy: Strategy) -> u64 {
        let to = strategy.name();
        let (from, generation) = {
            let mut active = self.active.write();
            let from = active.strategy.name();
            active.generation += 1;
            active.strategy = Arc::new(strategy);
            (from, active.generation)
        };

        info!(from = %from, to = %to, generation, "Cache strategy changed");
        self.emit_event(CacheEvent::StrategyChanged {
            from,
            to,
            generation,
        });
        generation
    }

    /// Apply the active strategy to every stored entry now
    ///
    /// Expired and no-longer-admitted entries are evicted, then the sweep
    /// evictions of the strategy run over the survivors.
    pub async fn revalidate_all(&self) -> Result<RevalidationReport> {
        let now_ms = self.clock.now_ms();
        let active = self.active();
        let strategy = active.strategy.as_ref();
        let mut report = RevalidationReport::default();

        for &tier in CacheTier::all() {
            let snapshot = self.tracker.snapshot(tier);
            report.checked += snapshot.len();

            let mut survivors = Vec::with_capacity(snapshot.len());
            for metadata in &snapshot {
                let reason = if strategy.is_expired(metadata, now_ms) {
                    Some(EvictionReason::Expired)
                } else if !strategy.should_admit(metadata, &snapshot) {
                    Some(EvictionReason::Strategy)
                } else {
                    None
                };

                match reason {
                    Some(reason) => {
                        if self.evict(tier, &metadata.key, reason).await? {
                            report.removed += 1;
                        }
                    }
                    None => {
                        self.tracker
                            .set_generation(tier, &metadata.key, active.generation);
                        survivors.push(metadata.clone());
                    }
                }
            }

            report.removed += self.evict_swept(tier, &survivors, now_ms, strategy).await?;
        }

        info!(checked = report.checked, removed = report.removed, "Cache revalidated");
        self.emit_event(CacheEvent::Revalidated {
            checked: report.checked,
            removed: report.removed,
        });
        Ok(report)
    }

    // =========================================================================
    // Sweeping
    // =========================================================================

    /// Evict expired entries and whatever the strategy sheds on a sweep
    pub async fn sweep(&self) -> Result<usize> {
        let now_ms = self.clock.now_ms();
        let active = self.active();
        let mut removed = 0;
        for &tier in CacheTier::all() {
            let snapshot = self.tracker.snapshot(tier);
            removed += self
                .evict_swept(tier, &snapshot, now_ms, &active.strategy)
                .await?;
        }
        if removed > 0 {
            debug!(removed, "Cache sweep finished");
        }
        Ok(removed)
    }

    async fn evict_swept(
        &self,
        tier: CacheTier,
        current: &[EntryMetadata],
        now_ms: u64,
        strategy: &Strategy,
    ) -> Result<usize> {
        let mut victims: IndexSet<String> = current
            .iter()
            .filter(|m| strategy.is_expired(m, now_ms))
            .map(|m| m.key.clone())
            .collect();
        victims.extend(strategy.select_evictions(current, EvictionTrigger::Sweep, now_ms));

        let mut removed = 0;
        for victim in &victims {
            let reason = eviction_reason(strategy, current.iter().find(|m| &m.key == victim), now_ms);
            if self.evict(tier, victim, reason).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires or the
    /// manager is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        if let Err(e) = manager.sweep().await {
                            warn!(error = %e, "Background sweep failed");
                        }
                    }
                }
            }
            debug!("Cache sweeper stopped");
        })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Counters and entry counts per tier
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.strategy_name(), |tier| self.storage(tier).size() as u64)
    }

    /// Bytes held by a tier's backend
    pub fn size_bytes(&self, tier: CacheTier) -> u64 {
        self.storage(tier).size_bytes()
    }

    /// Tracked entries of a tier, least recently used first
    pub fn entries(&self, tier: CacheTier, pattern: Option<&KeyPattern>) -> Vec<EntryMetadata> {
        self.tracker
            .snapshot(tier)
            .into_iter()
            .filter(|m| pattern.map_or(true, |p| p.matches(&m.key)))
            .collect()
    }

    /// Check every backend
    pub async fn health_check(&self) -> bool {
        let mut healthy = true;
        for &tier in CacheTier::all() {
            match self.storage(tier).health_check().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(tier = %tier, "Storage unhealthy");
                    healthy = false;
                }
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Storage health check failed");
                    healthy = false;
                }
            }
        }
        healthy
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn eviction_reason(
    strategy: &Strategy,
    metadata: Option<&EntryMetadata>,
    now_ms: u64,
) -> EvictionReason {
    match metadata {
        Some(m) if strategy.is_expired(m, now_ms) => EvictionReason::Expired,
        _ => EvictionReason::Capacity,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::http::{HttpFetcher, HttpRequest, HttpResponse};
    use crate::config::LocalStorageConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    pub const START_MS: u64 = 1_000_000;

    /// Scripted fetcher; answers `200 ok` once the script runs out
    #[derive(Default)]
    pub struct MockFetcher {
        script: Mutex<VecDeque<Result<HttpResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
        /// When set, every fetch waits for a permit
        gate: Option<Arc<Semaphore>>,
        started: AtomicUsize,
        completed: AtomicUsize,
        ended: AtomicUsize,
    }

    struct EndGuard<'a>(&'a AtomicUsize);

    impl Drop for EndGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl MockFetcher {
        pub fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        pub fn respond(&self, response: HttpResponse) {
            self.script.lock().push_back(Ok(response));
        }

        pub fn fail(&self, error: crate::error::Error) {
            self.script.lock().push_back(Err(error));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }

        pub fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        pub fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }

        /// Fetches that finished or were dropped
        pub fn ended(&self) -> usize {
            self.ended.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpFetcher for MockFetcher {
        async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().push(request.clone());
            self.started.fetch_add(1, Ordering::SeqCst);
            let _end = EndGuard(&self.ended);

            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            self.completed.fetch_add(1, Ordering::SeqCst);

            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| Ok(HttpResponse::new(&request.url, 200, "ok")))
        }
    }

    /// A manager on a temp dir with simulated time
    pub struct Harness {
        pub manager: Arc<CacheManager>,
        pub clock: Arc<ManualClock>,
        pub fetcher: Arc<MockFetcher>,
        pub dir: TempDir,
    }

    impl Harness {
        pub fn advance(&self, ms: u64) {
            self.clock.advance(Duration::from_millis(ms));
        }
    }

    pub fn config_in(dir: &TempDir) -> CacheManagerConfig {
        CacheManagerConfig {
            namespace: "test".into(),
            local: LocalStorageConfig {
                root_path: dir.path().to_path_buf(),
                capacity_bytes: None,
            },
            ..Default::default()
        }
    }

    pub async fn harness(strategy: Strategy) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        harness_with(config, dir, strategy, MockFetcher::default()).await
    }

    pub async fn harness_with(
        config: CacheManagerConfig,
        dir: TempDir,
        strategy: Strategy,
        fetcher: MockFetcher,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(START_MS));
        let fetcher = Arc::new(fetcher);
        let manager = CacheManager::builder(config)
            .strategy(strategy)
            .clock(clock.clone())
            .fetcher(fetcher.clone())
            .build()
            .await
            .unwrap();
        Harness {
            manager,
            clock,
            fetcher,
            dir,
        }
    }
}
