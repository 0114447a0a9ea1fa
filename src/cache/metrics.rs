//! Cache Metrics
//!
//! Cache-line aligned per-tier counters, snapshots for export, and
//! Prometheus text exposition.

use crate::cache::tier::CacheTier;
use crate::error::{Error, Result};
use chrono::Utc;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Cache Line Size
// =============================================================================

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Per-Tier Metrics (Cache-Line Aligned)
// =============================================================================

/// Counters for a single tier, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct TierMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
    pub evictions: AtomicU64,
    /// Writes refused by the active strategy
    pub rejections: AtomicU64,
    /// Writes the backend declined (quota)
    pub skipped_writes: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
}

// Verify size at compile time
const _: () = assert!(std::mem::size_of::<TierMetrics>() <= CACHE_LINE_SIZE);

impl Default for TierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TierMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            skipped_writes: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record explicit deletes (remove, invalidate)
    #[inline]
    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_skipped_write(&self) {
        self.skipped_writes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.evictions,
            &self.rejections,
            &self.skipped_writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.touch();
    }

    /// Update last update timestamp
    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Calculate hit ratio (0.0 when nothing was read)
    pub fn hit_rate(&self) -> f64 {
        hit_rate(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Create a snapshot; the caller supplies the live entry count
    pub fn snapshot(&self, tier: CacheTier, entries: u64) -> TierMetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        TierMetricsSnapshot {
            tier,
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, misses),
            entries,
        }
    }
}

#[inline]
fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Point-in-time snapshot of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierMetricsSnapshot {
    pub tier: CacheTier,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub rejections: u64,
    pub skipped_writes: u64,
    pub hit_rate: f64,
    /// Live entries in the backend
    pub entries: u64,
}

impl TierMetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Aggregate metrics across all tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Name of the active strategy
    pub strategy: String,
    pub tiers: Vec<TierMetricsSnapshot>,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_entries: u64,
    pub hit_rate: f64,
}

impl MetricsSnapshot {
    pub fn from_tiers(strategy: impl Into<String>, tiers: Vec<TierMetricsSnapshot>) -> Self {
        let total_hits = tiers.iter().map(|t| t.hits).sum();
        let total_misses = tiers.iter().map(|t| t.misses).sum();
        let total_entries = tiers.iter().map(|t| t.entries).sum();
        Self {
            strategy: strategy.into(),
            tiers,
            total_hits,
            total_misses,
            total_entries,
            hit_rate: hit_rate(total_hits, total_misses),
        }
    }

    /// Stats for one tier
    pub fn tier(&self, tier: CacheTier) -> Option<&TierMetricsSnapshot> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    /// Pretty JSON for status output
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> Result<String> {
        let registry = Registry::new();
        let counters = IntGaugeVec::new(
            Opts::new("unified_cache_operations", "Cache operations by tier and kind"),
            &["tier", "op"],
        )
        .map_err(prom_err)?;
        let entries = IntGaugeVec::new(
            Opts::new("unified_cache_entries", "Live entries by tier")
                .const_label("strategy", self.strategy.clone()),
            &["tier"],
        )
        .map_err(prom_err)?;
        registry.register(Box::new(counters.clone())).map_err(prom_err)?;
        registry.register(Box::new(entries.clone())).map_err(prom_err)?;

        for t in &self.tiers {
            let tier = t.tier.as_str();
            for (op, value) in [
                ("hit", t.hits),
                ("miss", t.misses),
                ("set", t.sets),
                ("delete", t.deletes),
                ("eviction", t.evictions),
                ("rejection", t.rejections),
                ("skipped_write", t.skipped_writes),
            ] {
                counters.with_label_values(&[tier, op]).set(value as i64);
            }
            entries.with_label_values(&[tier]).set(t.entries as i64);
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(prom_err)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

// =============================================================================
// Metrics Recorder
// =============================================================================

/// Counters for every tier
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    tiers: [TierMetrics; 3],
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get metrics for a specific tier
    #[inline]
    pub fn tier(&self, tier: CacheTier) -> &TierMetrics {
        &self.tiers[tier.index()]
    }

    /// Zero all tiers
    pub fn reset(&self) {
        for tier in &self.tiers {
            tier.reset();
        }
    }

    /// Snapshot with entry counts supplied per tier
    pub fn snapshot(
        &self,
        strategy: impl Into<String>,
        entries: impl Fn(CacheTier) -> u64,
    ) -> MetricsSnapshot {
        let tiers = CacheTier::all()
            .iter()
            .map(|t| self.tier(*t).snapshot(*t, entries(*t)))
            .collect();
        MetricsSnapshot::from_tiers(strategy, tiers)
    }
}
