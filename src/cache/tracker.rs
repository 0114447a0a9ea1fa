//! Entry Tracker
//!
//! Per-tier index of entry metadata in recency order (front = least recently
//! used, back = most recently used). Strategies decide on snapshots of this
//! index; they never touch storage.

use crate::cache::entry::EntryMetadata;
use crate::cache::tier::CacheTier;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Tier Index
// =============================================================================

/// Metadata for a single tier
#[derive(Debug, Default)]
struct TierIndex {
    entries: IndexMap<String, EntryMetadata>,
}

impl TierIndex {
    /// Track a new or replaced entry (moves to back = most recently used)
    fn track(&mut self, metadata: EntryMetadata) {
        self.entries.shift_remove(&metadata.key);
        self.entries.insert(metadata.key.clone(), metadata);
    }

    /// Record access (moves to back = most recently used)
    fn access(&mut self, key: &str, now_ms: u64, access_seq: u64) -> Option<EntryMetadata> {
        let mut metadata = self.entries.shift_remove(key)?;
        metadata.last_accessed_ms = now_ms;
        metadata.access_count += 1;
        metadata.access_seq = access_seq;
        self.entries.insert(key.to_string(), metadata.clone());
        Some(metadata)
    }

    fn remove(&mut self, key: &str) -> Option<EntryMetadata> {
        self.entries.shift_remove(key)
    }
}

// =============================================================================
// Entry Tracker
// =============================================================================

/// Metadata index across all tiers
#[derive(Debug, Default)]
pub struct EntryTracker {
    tiers: [RwLock<TierIndex>; 3],
    /// Insertion order, shared by all tiers
    insert_seq: AtomicU64,
    /// Logical recency clock, shared by all tiers
    access_seq: AtomicU64,
}

impl EntryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn tier(&self, tier: CacheTier) -> &RwLock<TierIndex> {
        &self.tiers[tier.index()]
    }

    #[inline]
    fn next_access_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Track a freshly written entry
    ///
    /// Assigns insertion and recency sequence numbers and stamps the strategy
    /// generation it was admitted under.
    pub fn track(&self, mut metadata: EntryMetadata, generation: u64) -> EntryMetadata {
        metadata.insert_seq = self.insert_seq.fetch_add(1, Ordering::Relaxed) + 1;
        metadata.access_seq = self.next_access_seq();
        metadata.generation = generation;
        self.tier(metadata.tier).write().track(metadata.clone());
        metadata
    }

    /// Record a successful read
    pub fn access(&self, tier: CacheTier, key: &str, now_ms: u64) -> Option<EntryMetadata> {
        let seq = self.next_access_seq();
        self.tier(tier).write().access(key, now_ms, seq)
    }

    /// Mark an entry as validated under a strategy generation
    pub fn set_generation(&self, tier: CacheTier, key: &str, generation: u64) {
        if let Some(metadata) = self.tier(tier).write().entries.get_mut(key) {
            metadata.generation = generation;
        }
    }

    pub fn get(&self, tier: CacheTier, key: &str) -> Option<EntryMetadata> {
        self.tier(tier).read().entries.get(key).cloned()
    }

    pub fn remove(&self, tier: CacheTier, key: &str) -> Option<EntryMetadata> {
        self.tier(tier).write().remove(key)
    }

    /// All metadata for a tier, least recently used first
    pub fn snapshot(&self, tier: CacheTier) -> Vec<EntryMetadata> {
        self.tier(tier).read().entries.values().cloned().collect()
    }

    pub fn clear_all(&self) {
        for tier in CacheTier::all() {
            self.tier(*tier).write().entries.clear();
        }
    }
}
