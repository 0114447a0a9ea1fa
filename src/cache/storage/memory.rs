//! In-Memory Storage
//!
//! Process-lifetime storage backed by DashMap for concurrent access.

use crate::cache::entry::CacheEntry;
use crate::cache::pattern::KeyPattern;
use crate::cache::storage::{StorageBackend, WriteOutcome};
use crate::cache::tier::CacheTier;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory storage backed by DashMap
pub struct MemoryStorage {
    tier: CacheTier,
    entries: DashMap<String, CacheEntry>,
    size_bytes: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tier: CacheTier::Memory,
            entries: DashMap::new(),
            size_bytes: AtomicU64::new(0),
        }
    }

    /// Re-label the tier this map serves
    pub(crate) fn serving(mut self, tier: CacheTier) -> Self {
        self.tier = tier;
        self
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn tier(&self) -> CacheTier {
        self.tier
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, entry: CacheEntry) -> Result<WriteOutcome> {
        let new_size = entry.size_bytes;
        if let Some(previous) = self.entries.insert(entry.key.clone(), entry) {
            self.size_bytes
                .fetch_sub(previous.size_bytes, Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(new_size, Ordering::Relaxed);
        Ok(WriteOutcome::Written)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .map(|r| r.key().clone())
            .filter(|k| pattern.map_or(true, |p| p.matches(k)))
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    async fn touch(&self, key: &str, now_ms: u64) -> Result<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.record_access(now_ms);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::test_support::text_entry;

    #[tokio::test]
    async fn test_basic_operations() {
        let storage = MemoryStorage::new();

        let entry = text_entry("file1", "hello world", 0);
        assert!(storage.set(entry.clone()).await.unwrap().is_written());
        assert_eq!(storage.size(), 1);
        assert_eq!(storage.size_bytes(), 13);

        let retrieved = storage.get("file1").await.unwrap().unwrap();
        assert_eq!(retrieved, entry);

        assert!(storage.delete("file1").await.unwrap());
        assert!(!storage.delete("file1").await.unwrap());
        assert_eq!(storage.size(), 0);
        assert_eq!(storage.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_update_existing() {
        let storage = MemoryStorage::new();

        storage.set(text_entry("file1", "short", 0)).await.unwrap();
        assert_eq!(storage.size_bytes(), 7);

        storage
            .set(text_entry("file1", "much longer data here", 0))
            .await
            .unwrap();
        assert_eq!(storage.size_bytes(), 23);
        assert_eq!(storage.size(), 1);
    }

    #[tokio::test]
    async fn test_keys_with_pattern() {
        let storage = MemoryStorage::new();
        storage.set(text_entry("user:1", "a", 0)).await.unwrap();
        storage.set(text_entry("user:2", "b", 0)).await.unwrap();
        storage.set(text_entry("session:1", "c", 0)).await.unwrap();

        assert_eq!(storage.keys(None).await.unwrap().len(), 3);
        let pattern = KeyPattern::prefix("user:");
        let mut keys = storage.keys(Some(&pattern)).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:1", "user:2"]);

        storage.clear().await.unwrap();
        assert_eq!(storage.size(), 0);
        assert_eq!(storage.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_touch() {
        let storage = MemoryStorage::new();
        storage.set(text_entry("file1", "data", 10)).await.unwrap();

        assert!(storage.touch("file1", 50).await.unwrap());
        assert!(!storage.touch("missing", 50).await.unwrap());

        let entry = storage.get("file1").await.unwrap().unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed_ms, 50);
    }
}
