//! HTTP path of the cache manager
//!
//! Fresh responses are served from the HTTP tier. Stale or absent ones go to
//! the network; stale responses carrying validators are revalidated with a
//! conditional request. Concurrent identical requests share one fetch, which
//! is dropped once its last waiter cancels.

use super::{ActiveStrategy, CacheManager, Validity};
use crate::cache::entry::{CacheEntry, CacheValue};
use crate::cache::events::EvictionReason;
use crate::cache::http::{
    HttpRequest, HttpResponse, HEADER_CACHE_CONTROL, HEADER_IF_MODIFIED_SINCE,
    HEADER_IF_NONE_MATCH,
};
use crate::cache::storage::StorageBackend;
use crate::cache::tier::CacheTier;
use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type SharedFetch = Shared<BoxFuture<'static, std::result::Result<HttpResponse, Arc<Error>>>>;

/// A network fetch awaited by every concurrent request with the same identity
pub(super) struct InFlight {
    id: u64,
    fetch: SharedFetch,
    waiters: Arc<AtomicUsize>,
}

impl CacheManager {
    /// GET through the cache
    pub async fn get_http(self: &Arc<Self>, url: &str) -> Result<HttpResponse> {
        self.get_http_with(HttpRequest::get(url), CancellationToken::new())
            .await
    }

    /// Request through the cache, abandoning the wait when `cancel` fires
    ///
    /// A fresh cached response is a hit and never touches the network.
    /// Anything else is a miss: the response is fetched (conditionally when
    /// the stale copy has an ETag or Last-Modified) and stored if cacheable.
    /// Cancelling writes nothing.
    pub async fn get_http_with(
        self: &Arc<Self>,
        request: HttpRequest,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        let identity = request.identity(&self.config.http.vary_headers);
        let now_ms = self.clock.now_ms();
        let active = self.active();

        let stale = match self.http.response(&identity).await? {
            Some((entry, response)) => match self.validity(CacheTier::Http, &entry, now_ms, &active) {
                Validity::Fresh => {
                    self.http.touch(&identity, now_ms).await?;
                    self.tracker.access(CacheTier::Http, &identity, now_ms);
                    self.record_lookup(CacheTier::Http, &identity, true, &active);
                    return Ok(response);
                }
                Validity::Stale if response.has_validators() => Some(response),
                Validity::Stale => {
                    self.evict(CacheTier::Http, &identity, EvictionReason::Expired)
                        .await?;
                    None
                }
                Validity::Rejected => {
                    self.evict(CacheTier::Http, &identity, EvictionReason::Strategy)
                        .await?;
                    None
                }
            },
            None => {
                self.tracker.remove(CacheTier::Http, &identity);
                None
            }
        };
        self.record_lookup(CacheTier::Http, &identity, false, &active);

        let request = match &stale {
            Some(cached) => conditional(request, cached),
            None => request,
        };

        if self.config.http.dedupe_in_flight {
            self.fetch_shared(identity, request, stale, cancel).await
        } else {
            let url = request.url.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled { url }),
                result = self.fetch_and_store(&identity, request, stale) => result,
            }
        }
    }

    /// GET from the network, skipping the cache read but storing the result
    pub async fn force_get_http(&self, url: &str) -> Result<HttpResponse> {
        self.force_get_http_with(HttpRequest::get(url), CancellationToken::new())
            .await
    }

    pub async fn force_get_http_with(
        &self,
        request: HttpRequest,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        let identity = request.identity(&self.config.http.vary_headers);
        let url = request.url.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled { url }),
            result = self.fetch_and_store(&identity, request, None) => result,
        }
    }

    /// Join (or start) the shared fetch for an identity
    async fn fetch_shared(
        self: &Arc<Self>,
        identity: String,
        request: HttpRequest,
        stale: Option<HttpResponse>,
        cancel: CancellationToken,
    ) -> Result<HttpResponse> {
        let url = request.url.clone();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { url });
        }

        let (id, fetch, waiters) = {
            let flight = self.in_flight.entry(identity.clone()).or_insert_with(|| {
                let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
                let manager = Arc::clone(self);
                let key = identity.clone();
                let fetch = async move {
                    let result = manager
                        .fetch_and_store(&key, request, stale)
                        .await
                        .map_err(Arc::new);
                    manager.in_flight.remove_if(&key, |_, flight| flight.id == id);
                    result
                }
                .boxed()
                .shared();

                debug!(identity = %identity, "Started shared fetch");
                InFlight {
                    id,
                    fetch,
                    waiters: Arc::new(AtomicUsize::new(0)),
                }
            });
            flight.waiters.fetch_add(1, Ordering::SeqCst);
            (flight.id, flight.fetch.clone(), Arc::clone(&flight.waiters))
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = fetch => Some(result),
        };
        let remaining = waiters.fetch_sub(1, Ordering::SeqCst) - 1;

        match outcome {
            Some(result) => {
                result.map_err(|e| Arc::try_unwrap(e).unwrap_or_else(Error::SharedFetch))
            }
            None => {
                if remaining == 0 {
                    self.in_flight.remove_if(&identity, |_, flight| flight.id == id);
                    debug!(identity = %identity, "Abandoned shared fetch");
                }
                Err(Error::Cancelled { url })
            }
        }
    }

    /// One network round trip, then write-back
    async fn fetch_and_store(
        &self,
        identity: &str,
        request: HttpRequest,
        stale: Option<HttpResponse>,
    ) -> Result<HttpResponse> {
        debug!(
            identity = %identity,
            conditional = stale.is_some(),
            "Fetching from network"
        );
        let response = self.fetcher.fetch(&request).await?;
        let now_ms = self.clock.now_ms();
        let active = self.active();

        if response.is_not_modified() {
            let Some(cached) = stale else {
                return Ok(response);
            };
            let ttl_ms = if response.header(HEADER_CACHE_CONTROL).is_some() {
                self.response_ttl_ms(&response)
            } else {
                self.response_ttl_ms(&cached)
            };
            debug!(identity = %identity, ttl_ms, "Cached response revalidated");
            self.store_response(identity, cached.clone(), ttl_ms, now_ms, &active)
                .await;
            return Ok(cached);
        }

        if !response.is_success() {
            debug!(identity = %identity, status = response.status, "Response not cacheable");
            return Ok(response);
        }

        if response.cache_control().no_store {
            if stale.is_some() {
                self.evict(CacheTier::Http, identity, EvictionReason::Expired)
                    .await?;
            }
            debug!(identity = %identity, "Response marked no-store");
            return Ok(response);
        }

        let ttl_ms = self.response_ttl_ms(&response);
        self.store_response(identity, response.clone(), ttl_ms, now_ms, &active)
            .await;
        Ok(response)
    }

    /// TTL from `Cache-Control`, else the configured default
    fn response_ttl_ms(&self, response: &HttpResponse) -> u64 {
        let cc = response.cache_control();
        if cc.no_cache {
            // stored, but revalidated on every use
            return 0;
        }
        cc.max_age_secs
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(self.config.http.default_ttl_ms)
    }

    /// Write a response through admission; failures only cost the cache copy
    async fn store_response(
        &self,
        identity: &str,
        response: HttpResponse,
        ttl_ms: u64,
        now_ms: u64,
        active: &ActiveStrategy,
    ) {
        let entry = CacheEntry::new(identity, CacheValue::Response(response), now_ms)
            .with_ttl(Some(ttl_ms));
        if let Err(e) = self
            .write_entry(CacheTier::Http, entry, now_ms, active)
            .await
        {
            warn!(identity = %identity, error = %e, "Failed to store response");
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight_waiters(&self, identity: &str) -> usize {
        self.in_flight
            .get(identity)
            .map(|flight| flight.waiters.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

/// Add validators from a cached response
fn conditional(mut request: HttpRequest, cached: &HttpResponse) -> HttpRequest {
    if let Some(etag) = cached.etag() {
        request = request.with_header(HEADER_IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = cached.last_modified() {
        request = request.with_header(HEADER_IF_MODIFIED_SINCE, last_modified);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::cache::entry::TypeTag;
    use crate::cache::strategy::{Strategy, StrategyFactory};
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    const URL: &str = "https://api.test/items";
    const IDENTITY: &str = "GET https://api.test/items";

    fn lru() -> Strategy {
        StrategyFactory::create_lru(100).unwrap()
    }

    async fn gated(dedupe: bool) -> (Harness, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.http.dedupe_in_flight = dedupe;
        let h = harness_with(config, dir, lru(), MockFetcher::gated(gate.clone())).await;
        (h, gate)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    fn http_stats(h: &Harness) -> (u64, u64, u64) {
        let stats = h.manager.get_metrics();
        let http = stats.tier(CacheTier::Http).unwrap();
        (http.hits, http.misses, http.sets)
    }

    #[tokio::test]
    async fn test_fresh_response_skips_network() {
        let h = harness(lru()).await;
        h.fetcher
            .respond(HttpResponse::new(URL, 200, "first").with_header("Cache-Control", "max-age=60"));

        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "first");
        h.advance(59_999);
        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "first");

        assert_eq!(h.fetcher.started(), 1);
        assert_eq!(http_stats(&h), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_max_age_expiry_refetches() {
        let h = harness(lru()).await;
        h.fetcher
            .respond(HttpResponse::new(URL, 200, "one").with_header("Cache-Control", "max-age=1"));
        h.fetcher.respond(HttpResponse::new(URL, 200, "two"));

        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "one");
        h.advance(1_000);
        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "two");

        // No validators: the second request is unconditional
        let requests = h.fetcher.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].header(HEADER_IF_NONE_MATCH), None);
        assert_eq!(http_stats(&h), (0, 2, 2));
    }

    #[tokio::test]
    async fn test_stale_etag_revalidates_with_304() {
        let h = harness(lru()).await;
        h.fetcher.respond(
            HttpResponse::new(URL, 200, "body")
                .with_header("ETag", "\"v1\"")
                .with_header("Cache-Control", "max-age=1"),
        );
        h.fetcher.respond(HttpResponse::new(URL, 304, ""));

        h.manager.get_http(URL).await.unwrap();
        h.advance(1_000);
        let revalidated = h.manager.get_http(URL).await.unwrap();
        assert_eq!(revalidated.status, 200);
        assert_eq!(revalidated.text(), "body");

        let requests = h.fetcher.requests();
        assert_eq!(requests[1].header(HEADER_IF_NONE_MATCH), Some("\"v1\""));

        // The refreshed entry is fresh again for another max-age
        h.advance(999);
        h.manager.get_http(URL).await.unwrap();
        assert_eq!(h.fetcher.started(), 2);
        assert_eq!(http_stats(&h), (1, 2, 2));
    }

    #[tokio::test]
    async fn test_last_modified_revalidation() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.http.default_ttl_ms = 10;
        let h = harness_with(config, dir, lru(), MockFetcher::default()).await;

        let stamp = "Wed, 21 Oct 2015 07:28:00 GMT";
        h.fetcher
            .respond(HttpResponse::new(URL, 200, "v1").with_header("Last-Modified", stamp));
        h.fetcher.respond(HttpResponse::new(URL, 200, "v2"));

        h.manager.get_http(URL).await.unwrap();
        h.advance(10);
        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "v2");
        assert_eq!(
            h.fetcher.requests()[1].header(HEADER_IF_MODIFIED_SINCE),
            Some(stamp)
        );
    }

    #[tokio::test]
    async fn test_uncacheable_responses_are_not_stored() {
        let h = harness(lru()).await;
        h.fetcher
            .respond(HttpResponse::new(URL, 200, "private").with_header("Cache-Control", "no-store"));
        h.fetcher.respond(HttpResponse::new(URL, 503, "busy"));

        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "private");
        let busy = h.manager.get_http(URL).await.unwrap();
        assert_eq!(busy.status, 503);
        assert_eq!(h.manager.get_metrics().tier(CacheTier::Http).unwrap().entries, 0);

        // Falls through to the default 200 and is finally stored
        h.manager.get_http(URL).await.unwrap();
        h.manager.get_http(URL).await.unwrap();
        assert_eq!(h.fetcher.started(), 3);
        assert_eq!(http_stats(&h), (1, 3, 1));
    }

    #[tokio::test]
    async fn test_network_failure_writes_nothing() {
        let h = harness(lru()).await;
        h.fetcher.fail(Error::Network {
            url: URL.into(),
            reason: "connection reset".into(),
        });

        let err = h.manager.get_http(URL).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.manager.get_metrics().tier(CacheTier::Http).unwrap().entries, 0);
        assert_eq!(h.manager.in_flight_len(), 0);

        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "ok");
    }

    #[tokio::test]
    async fn test_force_get_bypasses_read() {
        let h = harness(lru()).await;
        h.fetcher.respond(HttpResponse::new(URL, 200, "one"));
        h.fetcher.respond(HttpResponse::new(URL, 200, "two"));

        h.manager.get_http(URL).await.unwrap();
        assert_eq!(h.manager.force_get_http(URL).await.unwrap().text(), "two");
        assert_eq!(h.manager.get_http(URL).await.unwrap().text(), "two");

        assert_eq!(h.fetcher.started(), 2);
        assert_eq!(http_stats(&h), (1, 1, 2));
    }

    #[tokio::test]
    async fn test_vary_headers_split_identity() {
        let h = harness(lru()).await;
        let json = HttpRequest::get(URL).with_header("Accept", "application/json");
        let html = HttpRequest::get(URL).with_header("Accept", "text/html");

        for request in [json.clone(), html, json.with_header("X-Trace", "2")] {
            h.manager
                .get_http_with(request, CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(h.fetcher.started(), 2);
    }

    #[tokio::test]
    async fn test_responses_go_through_admission() {
        let strategy = StrategyFactory::create_type_based([TypeTag::Object]).unwrap();
        let h = harness(strategy).await;

        h.manager.get_http(URL).await.unwrap();
        h.manager.get_http(URL).await.unwrap();
        assert_eq!(h.fetcher.started(), 2);
        assert_eq!(h.manager.get_metrics().tier(CacheTier::Http).unwrap().rejections, 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let (h, gate) = gated(true).await;
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let manager = h.manager.clone();
                tokio::spawn(async move { manager.get_http(URL).await })
            })
            .collect();

        wait_until(|| h.manager.in_flight_waiters(IDENTITY) == 3).await;
        gate.add_permits(3);

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().text(), "ok");
        }
        assert_eq!(h.fetcher.started(), 1);
        assert_eq!(h.manager.in_flight_len(), 0);
        assert_eq!(http_stats(&h), (0, 3, 1));
    }

    #[tokio::test]
    async fn test_without_dedupe_each_request_fetches() {
        let (h, gate) = gated(false).await;
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let manager = h.manager.clone();
                tokio::spawn(async move { manager.get_http(URL).await })
            })
            .collect();

        wait_until(|| h.fetcher.started() == 2).await;
        gate.add_permits(2);
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(h.fetcher.completed(), 2);
    }

    #[tokio::test]
    async fn test_cancelling_last_waiter_drops_fetch() {
        let (h, _gate) = gated(true).await;
        let cancel = CancellationToken::new();
        let task = {
            let manager = h.manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                manager
                    .get_http_with(HttpRequest::get(URL), cancel)
                    .await
            })
        };

        wait_until(|| h.fetcher.started() == 1).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(h.manager.in_flight_len(), 0);
        assert_eq!((h.fetcher.completed(), h.fetcher.ended()), (0, 1));
        assert_eq!(http_stats(&h), (0, 1, 0));
    }

    #[tokio::test]
    async fn test_cancelling_one_waiter_keeps_shared_fetch() {
        let (h, gate) = gated(true).await;
        let cancel = CancellationToken::new();
        let cancelled = {
            let manager = h.manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                manager
                    .get_http_with(HttpRequest::get(URL), cancel)
                    .await
            })
        };
        let patient = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.get_http(URL).await })
        };

        wait_until(|| h.manager.in_flight_waiters(IDENTITY) == 2).await;
        cancel.cancel();
        assert!(cancelled.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(h.manager.in_flight_waiters(IDENTITY), 1);

        gate.add_permits(1);
        assert_eq!(patient.await.unwrap().unwrap().text(), "ok");
        assert_eq!(h.fetcher.completed(), 1);
        assert_eq!(h.manager.get_metrics().tier(CacheTier::Http).unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_precancelled_request_never_fetches() {
        for dedupe in [true, false] {
            let (h, _gate) = gated(dedupe).await;
            let cancel = CancellationToken::new();
            cancel.cancel();

            let err = h
                .manager
                .get_http_with(HttpRequest::get(URL), cancel.clone())
                .await
                .unwrap_err();
            assert!(err.is_cancelled());
            assert!(h
                .manager
                .force_get_http_with(HttpRequest::get(URL), cancel)
                .await
                .unwrap_err()
                .is_cancelled());
            assert_eq!(h.fetcher.started(), 0);
        }
    }
}
