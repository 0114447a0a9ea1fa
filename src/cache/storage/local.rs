//! Local Disk Storage
//!
//! Persisted key/value store: one JSON file per entry under a cache
//! directory. The file name is the URL-encoded `<namespace>:<key>`, so
//! several namespaces can share a directory without seeing each other.
//!
//! Every file update goes through a uniquely named temp file and a rename,
//! under a per-key lock, so concurrent reads of a key never observe (or
//! clobber) a half-written file.

use crate::cache::entry::{CacheEntry, CacheValue};
use crate::cache::pattern::KeyPattern;
use crate::cache::storage::{SkipReason, StorageBackend, WriteOutcome};
use crate::cache::tier::CacheTier;
use crate::config::LocalStorageConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const FILE_EXTENSION: &str = "json";

/// Number of key locks; keys hashing to the same stripe share one
const LOCK_STRIPES: usize = 64;

// =============================================================================
// Persisted Layout
// =============================================================================

/// On-disk representation of one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub value: CacheValue,
    pub created_at: u64,
    pub ttl_millis: Option<u64>,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<u64>,
}

impl PersistedEntry {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            value: entry.value.clone(),
            created_at: entry.created_at_ms,
            ttl_millis: entry.ttl_ms,
            access_count: entry.access_count,
            last_accessed_at: Some(entry.last_accessed_ms),
        }
    }

    fn into_entry(self, key: &str) -> CacheEntry {
        let mut entry = CacheEntry::new(key, self.value, self.created_at).with_ttl(self.ttl_millis);
        entry.access_count = self.access_count;
        entry.last_accessed_ms = self.last_accessed_at.unwrap_or(self.created_at);
        entry
    }
}

// =============================================================================
// Local Storage
// =============================================================================

/// Local disk cache storage
pub struct LocalStorage {
    root_path: PathBuf,
    namespace: String,
    /// key -> bytes on disk
    index: RwLock<HashMap<String, u64>>,
    size_bytes: AtomicU64,
    capacity_bytes: Option<u64>,
    /// Serialises reads and writes of the files of one key
    locks: Vec<Mutex<()>>,
    temp_seq: AtomicU64,
}

impl LocalStorage {
    /// Open storage under `root_path` for the given namespace
    pub async fn with_path(root_path: impl Into<PathBuf>, namespace: impl Into<String>) -> Result<Self> {
        Self::with_config(
            &LocalStorageConfig {
                root_path: root_path.into(),
                ..Default::default()
            },
            namespace,
        )
        .await
    }

    /// Open storage with full config
    ///
    /// The namespace may not contain `:`, which separates it from the key in
    /// file names.
    pub async fn with_config(config: &LocalStorageConfig, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains(':') {
            return Err(Error::Configuration(format!(
                "local namespace '{}' must be non-empty and contain no ':'",
                namespace
            )));
        }

        fs::create_dir_all(&config.root_path).await?;

        let storage = Self {
            root_path: config.root_path.clone(),
            namespace,
            index: RwLock::new(HashMap::new()),
            size_bytes: AtomicU64::new(0),
            capacity_bytes: config.capacity_bytes,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            temp_seq: AtomicU64::new(0),
        };

        storage.rebuild_index().await?;
        Ok(storage)
    }

    /// Rebuild index from disk, keeping only this namespace's files
    async fn rebuild_index(&self) -> Result<()> {
        let mut found = HashMap::new();
        let mut total_size = 0u64;

        let mut dir = fs::read_dir(&self.root_path).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            let path = dir_entry.path();
            let Some(key) = self.key_from_path(&path) else {
                continue;
            };
            match dir_entry.metadata().await {
                Ok(meta) if meta.is_file() => {
                    total_size += meta.len();
                    found.insert(key, meta.len());
                }
                _ => continue,
            }
        }

        debug!(
            root = %self.root_path.display(),
            namespace = %self.namespace,
            entries = found.len(),
            bytes = total_size,
            "Rebuilt local cache index"
        );

        *self.index.write() = found;
        self.size_bytes.store(total_size, Ordering::Relaxed);
        Ok(())
    }

    /// Get file path for a key
    fn file_path(&self, key: &str) -> PathBuf {
        let namespaced = format!("{}:{}", self.namespace, key);
        self.root_path.join(format!(
            "{}.{}",
            urlencoding::encode(&namespaced),
            FILE_EXTENSION
        ))
    }

    /// Recover the key from a file path, if it belongs to this namespace
    fn key_from_path(&self, path: &Path) -> Option<String> {
        if path.extension()? != FILE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let decoded = urlencoding::decode(stem).ok()?;
        decoded
            .strip_prefix(&self.namespace)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::to_string)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn lock_for(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.locks[hasher.finish() as usize % self.locks.len()]
    }

    /// Drop an unreadable file and its index entry
    async fn heal(&self, key: &str, path: &Path, reason: impl std::fmt::Display) {
        warn!(
            key = %key,
            path = %path.display(),
            error = %reason,
            "Discarding unreadable cache file"
        );
        let _ = fs::remove_file(path).await;
        self.forget(key);
    }

    fn forget(&self, key: &str) -> bool {
        match self.index.write().remove(key) {
            Some(len) => {
                self.size_bytes.fetch_sub(len, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn record(&self, key: &str, len: u64) {
        let previous = self.index.write().insert(key.to_string(), len);
        if let Some(old) = previous {
            self.size_bytes.fetch_sub(old, Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(len, Ordering::Relaxed);
    }

    /// Write the serialized entry through a temp file and rename
    ///
    /// A full disk or exhausted filesystem quota is a skip, not an error.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<WriteOutcome> {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.tmp", seq));

        let result = match fs::write(&tmp, bytes).await {
            Ok(()) => fs::rename(&tmp, path).await.map_err(|e| ("rename", e)),
            Err(e) => Err(("write", e)),
        };

        match result {
            Ok(()) => Ok(WriteOutcome::Written),
            Err((operation, e)) => {
                let _ = fs::remove_file(&tmp).await;
                skip_on_disk_full(operation, e, bytes.len() as u64)
            }
        }
    }

    /// Read one entry; the caller holds the key's lock
    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        if !self.index.read().contains_key(key) {
            return Ok(None);
        }

        let path = self.file_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.forget(key);
                return Ok(None);
            }
            Err(e) => return Err(Error::storage("local", "read", e)),
        };

        match serde_json::from_slice::<PersistedEntry>(&raw) {
            Ok(persisted) => Ok(Some(persisted.into_entry(key))),
            Err(e) => {
                self.heal(key, &path, e).await;
                Ok(None)
            }
        }
    }
}

/// Map a failed file write to a write outcome
fn skip_on_disk_full(operation: &str, error: io::Error, required: u64) -> Result<WriteOutcome> {
    match error.kind() {
        io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
            warn!(operation, error = %error, "Local cache disk is full");
            Ok(WriteOutcome::Skipped(SkipReason::QuotaExceeded {
                required,
                available: 0,
            }))
        }
        _ => Err(Error::storage("local", operation, error)),
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn tier(&self) -> CacheTier {
        CacheTier::Local
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let _guard = self.lock_for(key).lock().await;
        self.read_entry(key).await
    }

    async fn set(&self, entry: CacheEntry) -> Result<WriteOutcome> {
        let bytes = serde_json::to_vec(&PersistedEntry::from_entry(&entry))?;
        let new_size = bytes.len() as u64;
        let _guard = self.lock_for(&entry.key).lock().await;

        if let Some(capacity) = self.capacity_bytes {
            let old_size = self.index.read().get(&entry.key).copied().unwrap_or(0);
            let used = self.size_bytes.load(Ordering::Relaxed).saturating_sub(old_size);
            if used + new_size > capacity {
                return Ok(WriteOutcome::Skipped(SkipReason::QuotaExceeded {
                    required: new_size,
                    available: capacity.saturating_sub(used),
                }));
            }
        }

        let outcome = self.write_file(&self.file_path(&entry.key), &bytes).await?;
        if outcome.is_written() {
            self.record(&entry.key, new_size);
        }
        Ok(outcome)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.lock_for(key).lock().await;
        if !self.forget(key) {
            return Ok(false);
        }
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(Error::storage("local", "delete", e)),
        }
    }

    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>> {
        Ok(self
            .index
            .read()
            .keys()
            .filter(|k| pattern.map_or(true, |p| p.matches(k)))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let keys: Vec<String> = self.index.read().keys().cloned().collect();
        for key in keys {
            let _guard = self.lock_for(&key).lock().await;
            self.forget(&key);
            let _ = fs::remove_file(self.file_path(&key)).await;
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.index.read().len()
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    async fn touch(&self, key: &str, now_ms: u64) -> Result<bool> {
        let _guard = self.lock_for(key).lock().await;
        let Some(mut entry) = self.read_entry(key).await? else {
            return Ok(false);
        };
        entry.record_access(now_ms);

        // Bookkeeping is rewritten in place; the quota only gates new values
        let bytes = serde_json::to_vec(&PersistedEntry::from_entry(&entry))?;
        match self.write_file(&self.file_path(key), &bytes).await? {
            WriteOutcome::Written => self.record(key, bytes.len() as u64),
            WriteOutcome::Skipped(reason) => {
                debug!(key = %key, reason = %reason, "Access bookkeeping not persisted");
            }
        }
        Ok(true)
    }

    async fn health_check(&self) -> Result<bool> {
        let test_path = self.root_path.join(".health_check");
        match fs::write(&test_path, b"ok").await {
            Ok(_) => {
                let _ = fs::remove_file(&test_path).await;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}
