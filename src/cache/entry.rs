//! Cache Entry Types
//!
//! Defines cached values, entries, and the lightweight metadata view that
//! strategies make their decisions on.

use crate::cache::http::HttpResponse;
use crate::cache::tier::CacheTier;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Type Tag
// =============================================================================

/// Coarse classification of a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
    Binary,
    Response,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Null => "null",
            TypeTag::Binary => "binary",
            TypeTag::Response => "response",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "object" => Ok(TypeTag::Object),
            "array" => Ok(TypeTag::Array),
            "string" => Ok(TypeTag::String),
            "number" => Ok(TypeTag::Number),
            "boolean" | "bool" => Ok(TypeTag::Boolean),
            "null" => Ok(TypeTag::Null),
            "binary" | "bytes" => Ok(TypeTag::Binary),
            "response" => Ok(TypeTag::Response),
            other => Err(Error::InvalidStrategy(format!("unknown type tag '{}'", other))),
        }
    }
}

// =============================================================================
// Cache Value
// =============================================================================

/// Opaque cached payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheValue {
    /// Any serde-serializable value, stored as JSON
    Json(serde_json::Value),
    /// Raw bytes
    Binary(Bytes),
    /// A cached HTTP response
    Response(HttpResponse),
}

impl CacheValue {
    /// Serialize a typed value into a cache value
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(CacheValue::Json(serde_json::to_value(value)?))
    }

    /// Classify the value
    pub fn type_tag(&self) -> TypeTag {
        match self {
            CacheValue::Json(serde_json::Value::Object(_)) => TypeTag::Object,
            CacheValue::Json(serde_json::Value::Array(_)) => TypeTag::Array,
            CacheValue::Json(serde_json::Value::String(_)) => TypeTag::String,
            CacheValue::Json(serde_json::Value::Number(_)) => TypeTag::Number,
            CacheValue::Json(serde_json::Value::Bool(_)) => TypeTag::Boolean,
            CacheValue::Json(serde_json::Value::Null) => TypeTag::Null,
            CacheValue::Binary(_) => TypeTag::Binary,
            CacheValue::Response(_) => TypeTag::Response,
        }
    }

    /// Estimated serialized size in bytes
    pub fn estimated_size(&self) -> u64 {
        match self {
            CacheValue::Json(value) => serde_json::to_vec(value)
                .map(|v| v.len() as u64)
                .unwrap_or(0),
            CacheValue::Binary(bytes) => bytes.len() as u64,
            CacheValue::Response(response) => response.estimated_size(),
        }
    }

    /// Convert into a caller-chosen type
    pub fn into_typed<T: DeserializeOwned>(self, key: &str) -> Result<T> {
        let json = match self {
            CacheValue::Json(value) => value,
            CacheValue::Binary(bytes) => serde_json::to_value(bytes)?,
            CacheValue::Response(response) => serde_json::to_value(response)?,
        };
        serde_json::from_value(json).map_err(|e| Error::TypeMismatch {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Borrow the HTTP response if this value holds one
    pub fn as_response(&self) -> Option<&HttpResponse> {
        match self {
            CacheValue::Response(response) => Some(response),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        CacheValue::Json(value)
    }
}

impl From<Bytes> for CacheValue {
    fn from(bytes: Bytes) -> Self {
        CacheValue::Binary(bytes)
    }
}

impl From<HttpResponse> for CacheValue {
    fn from(response: HttpResponse) -> Self {
        CacheValue::Response(response)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached entry with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Key, unique within a backend and namespace
    pub key: String,
    /// The cached payload
    pub value: CacheValue,
    /// Creation time (millis)
    pub created_at_ms: u64,
    /// Last successful read (millis)
    pub last_accessed_ms: u64,
    /// Successful reads since creation
    pub access_count: u64,
    /// Time-to-live in milliseconds (None = never expires by itself)
    pub ttl_ms: Option<u64>,
    /// Estimated serialized size
    pub size_bytes: u64,
    /// Coarse type of `value`
    pub type_tag: TypeTag,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: impl Into<String>, value: CacheValue, now_ms: u64) -> Self {
        let size_bytes = value.estimated_size();
        let type_tag = value.type_tag();
        Self {
            key: key.into(),
            value,
            created_at_ms: now_ms,
            last_accessed_ms: now_ms,
            access_count: 0,
            ttl_ms: None,
            size_bytes,
            type_tag,
        }
    }

    /// Set the time-to-live
    pub fn with_ttl(mut self, ttl_ms: Option<u64>) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Record a successful read
    pub fn record_access(&mut self, now_ms: u64) {
        self.last_accessed_ms = now_ms;
        self.access_count += 1;
    }

    /// Check if the entry's own TTL has elapsed
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        expired(self.created_at_ms, self.ttl_ms, now_ms)
    }

    /// Milliseconds since creation
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }
}

/// Whole milliseconds of a TTL
///
/// A non-zero TTL below one millisecond rounds up to 1ms; durations past
/// `u64::MAX` milliseconds saturate.
pub fn ttl_millis(ttl: Duration) -> u64 {
    let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 && !ttl.is_zero() {
        1
    } else {
        ms
    }
}

#[inline]
pub(crate) fn expired(created_at_ms: u64, ttl_ms: Option<u64>, now_ms: u64) -> bool {
    match ttl_ms {
        Some(ttl) => now_ms.saturating_sub(created_at_ms) >= ttl,
        None => false,
    }
}

// =============================================================================
// Entry Metadata (what strategies see)
// =============================================================================

/// Lightweight metadata for strategy decisions
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMetadata {
    pub key: String,
    pub tier: CacheTier,
    pub created_at_ms: u64,
    pub last_accessed_ms: u64,
    pub access_count: u64,
    pub ttl_ms: Option<u64>,
    pub size_bytes: u64,
    pub type_tag: TypeTag,
    /// Insertion order within the tier
    pub insert_seq: u64,
    /// Logical recency tick, refreshed on every write and read
    pub access_seq: u64,
    /// Strategy generation this entry was last validated under
    pub generation: u64,
}

impl EntryMetadata {
    /// Create from a cache entry (sequence numbers are assigned by the tracker)
    pub fn from_entry(entry: &CacheEntry, tier: CacheTier) -> Self {
        Self {
            key: entry.key.clone(),
            tier,
            created_at_ms: entry.created_at_ms,
            last_accessed_ms: entry.last_accessed_ms,
            access_count: entry.access_count,
            ttl_ms: entry.ttl_ms,
            size_bytes: entry.size_bytes,
            type_tag: entry.type_tag,
            insert_seq: 0,
            access_seq: 0,
            generation: 0,
        }
    }

    /// Check if the entry's own TTL has elapsed
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        expired(self.created_at_ms, self.ttl_ms, now_ms)
    }

    /// Ordering key for recency (smaller = less recently used)
    #[inline]
    pub fn recency(&self) -> (u64, u64, u64) {
        (self.last_accessed_ms, self.access_seq, self.insert_seq)
    }

    /// Ordering key for frequency (smaller = better eviction victim)
    #[inline]
    pub fn frequency(&self) -> (u64, u64, u64) {
        (self.access_count, self.created_at_ms, self.insert_seq)
    }
}
