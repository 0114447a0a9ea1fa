//! HTTP Response Storage
//!
//! Cached responses keyed by request identity (see
//! [`HttpRequest::identity`](crate::cache::http::HttpRequest::identity)).

use crate::cache::entry::CacheEntry;
use crate::cache::http::HttpResponse;
use crate::cache::pattern::KeyPattern;
use crate::cache::storage::{MemoryStorage, StorageBackend, WriteOutcome};
use crate::cache::tier::CacheTier;
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Response store; only `CacheValue::Response` entries are accepted
pub struct HttpResponseStorage {
    inner: MemoryStorage,
}

impl HttpResponseStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new().serving(CacheTier::Http),
        }
    }

    /// Cached response for an identity, with its entry metadata
    pub async fn response(&self, identity: &str) -> Result<Option<(CacheEntry, HttpResponse)>> {
        Ok(self.inner.get(identity).await?.and_then(|entry| {
            let response = entry.value.as_response()?.clone();
            Some((entry, response))
        }))
    }
}

impl Default for HttpResponseStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for HttpResponseStorage {
    fn tier(&self) -> CacheTier {
        CacheTier::Http
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.inner.get(key).await
    }

    async fn set(&self, entry: CacheEntry) -> Result<WriteOutcome> {
        if entry.value.as_response().is_none() {
            return Err(Error::storage(
                "http",
                "set",
                format!("entry '{}' is a {}, not a response", entry.key, entry.type_tag),
            ));
        }
        self.inner.set(entry).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn size_bytes(&self) -> u64 {
        self.inner.size_bytes()
    }

    async fn touch(&self, key: &str, now_ms: u64) -> Result<bool> {
        self.inner.touch(key, now_ms).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheValue;
    use crate::cache::http::HttpRequest;
    use serde_json::json;

    #[tokio::test]
    async fn test_stores_responses_by_identity() {
        let storage = HttpResponseStorage::new();
        let identity = HttpRequest::get("https://api.test/a").identity(&[]);
        let response = HttpResponse::new("https://api.test/a", 200, "body").with_header("ETag", "\"1\"");

        let entry = CacheEntry::new(&identity, CacheValue::from(response.clone()), 0);
        assert!(storage.set(entry).await.unwrap().is_written());

        let (entry, cached) = storage.response(&identity).await.unwrap().unwrap();
        assert_eq!(cached, response);
        assert_eq!(entry.key, "GET https://api.test/a");
        assert_eq!(storage.tier(), CacheTier::Http);
        assert!(storage.response("GET https://api.test/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_response_values() {
        let storage = HttpResponseStorage::new();
        let entry = CacheEntry::new("k", CacheValue::from(json!(1)), 0);
        let err = storage.set(entry).await.unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(storage.size(), 0);
    }
}
