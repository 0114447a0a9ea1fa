//! HTTP Fetching
//!
//! Request/response types for the HTTP-response tier and the [`HttpFetcher`]
//! port wrapping the actual network call.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const HEADER_ETAG: &str = "etag";
pub const HEADER_LAST_MODIFIED: &str = "last-modified";
pub const HEADER_CACHE_CONTROL: &str = "cache-control";
pub const HEADER_IF_NONE_MATCH: &str = "if-none-match";
pub const HEADER_IF_MODIFIED_SINCE: &str = "if-modified-since";

pub const STATUS_NOT_MODIFIED: u16 = 304;

// =============================================================================
// Request
// =============================================================================

/// An HTTP request routed through the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Upper-case method
    pub method: String,
    pub url: String,
    /// Header names are stored lower-cased
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    /// Plain GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header (name is lower-cased)
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Header lookup (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Deterministic cache key for this request
    ///
    /// `METHOD URL`, followed by `|name=value` for each vary header present
    /// on the request, in sorted name order.
    pub fn identity(&self, vary_headers: &[String]) -> String {
        let mut identity = format!("{} {}", self.method.to_ascii_uppercase(), self.url);
        let mut vary: Vec<String> = vary_headers
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        vary.sort_unstable();
        vary.dedup();
        for name in vary {
            if let Some(value) = self.headers.get(&name) {
                identity.push('|');
                identity.push_str(&name);
                identity.push('=');
                identity.push_str(value);
            }
        }
        identity
    }
}

// =============================================================================
// Response
// =============================================================================

/// A fetched (or cached) HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    /// Header names are stored lower-cased
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Add a header (name is lower-cased)
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Header lookup (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(HEADER_ETAG)
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header(HEADER_LAST_MODIFIED)
    }

    /// Whether a conditional revalidation is possible
    pub fn has_validators(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == STATUS_NOT_MODIFIED
    }

    /// Parsed `Cache-Control` directives relevant to storage
    pub fn cache_control(&self) -> CacheControl {
        self.header(HEADER_CACHE_CONTROL)
            .map(CacheControl::parse)
            .unwrap_or_default()
    }

    /// Body as UTF-8 text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub(crate) fn estimated_size(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.body.len() + headers + self.url.len()) as u64
    }
}

/// Storage-relevant `Cache-Control` directives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age_secs: Option<u64>,
}

impl CacheControl {
    pub fn parse(header: &str) -> Self {
        let mut cc = CacheControl::default();
        for directive in header.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            if directive == "no-store" {
                cc.no_store = true;
            } else if directive == "no-cache" {
                cc.no_cache = true;
            } else if let Some(age) = directive.strip_prefix("max-age=") {
                cc.max_age_secs = age.trim_matches('"').parse().ok();
            }
        }
        cc
    }
}

// =============================================================================
// Fetcher Port
// =============================================================================

/// The wrapped network call
///
/// Implementations perform exactly one request and never consult the cache.
/// Non-2xx statuses are returned as responses; only transport failures are
/// errors.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Type alias for Arc'd HttpFetcher
pub type HttpFetcherRef = Arc<dyn HttpFetcher>;

/// `reqwest`-backed fetcher
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::Network {
                url: request.url.clone(),
                reason: format!("invalid method '{}': {}", request.method, e),
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_deterministic() {
        let vary = vec!["Accept".to_string(), "accept-language".to_string()];
        let a = HttpRequest::get("https://api.test/items")
            .with_header("Accept-Language", "en")
            .with_header("Accept", "application/json")
            .with_header("X-Trace", "1");
        let b = HttpRequest::get("https://api.test/items")
            .with_header("accept", "application/json")
            .with_header("accept-language", "en")
            .with_header("x-trace", "2");

        assert_eq!(a.identity(&vary), b.identity(&vary));
        assert_eq!(
            a.identity(&vary),
            "GET https://api.test/items|accept=application/json|accept-language=en"
        );
        assert_eq!(a.identity(&[]), "GET https://api.test/items");
    }

    #[test]
    fn test_validators() {
        let plain = HttpResponse::new("u", 200, "x");
        assert!(!plain.has_validators());

        let tagged = plain.clone().with_header("ETag", "\"v1\"");
        assert!(tagged.has_validators());
        assert_eq!(tagged.etag(), Some("\"v1\""));

        let dated = plain.with_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert!(dated.has_validators());
    }

    #[test]
    fn test_cache_control() {
        let cc = CacheControl::parse("public, max-age=60");
        assert_eq!(cc.max_age_secs, Some(60));
        assert!(!cc.no_store);

        let cc = CacheControl::parse("no-store, No-Cache");
        assert!(cc.no_store);
        assert!(cc.no_cache);
        assert_eq!(cc.max_age_secs, None);

        let resp = HttpResponse::new("u", 200, "").with_header("Cache-Control", "max-age=5");
        assert_eq!(resp.cache_control().max_age_secs, Some(5));
    }

    #[test]
    fn test_body_helpers() {
        let resp = HttpResponse::new("u", 200, r#"{"n":3}"#);
        assert_eq!(resp.text(), r#"{"n":3}"#);
        let v: serde_json::Value = resp.json().unwrap();
        assert_eq!(v["n"], 3);
        assert!(resp.is_success());
        assert!(!resp.is_not_modified());
    }
}
