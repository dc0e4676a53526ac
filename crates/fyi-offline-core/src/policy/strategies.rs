//! Network-first and cache-first serving.
//!
//! Neither strategy ever returns an error: a network failure falls back to
//! the cache or to the synthesized 503 "Offline" response.

use tracing::{debug, warn};

use crate::cache::{Cache, PendingWrite};
use crate::fetch::Fetcher;
use crate::models::{Request, RequestKey, Response, ResponseType};

/// Result of a network-first lookup.
#[derive(Debug)]
pub struct NetworkFirst {
    pub response: Response,
    /// Copy of a 200 response for the host to store once the caller has it.
    pub pending_write: Option<PendingWrite>,
}

/// Try the network, fall back to the cache.
///
/// Offline fallback order: the cached entry for this request, then
/// `offline_document` for navigations, then 503 "Offline".
pub async fn network_first(
    request: &Request,
    cache: &Cache,
    fetcher: &dyn Fetcher,
    offline_document: &RequestKey,
) -> NetworkFirst {
    match fetcher.fetch(request).await {
        Ok(response) if response.status == 200 => {
            let pending_write = PendingWrite::new(cache.name(), request.key(), response.clone());
            NetworkFirst {
                response,
                pending_write: Some(pending_write),
            }
        }
        Ok(response) => {
            debug!(url = %request.url, status = response.status, "Not caching non-200 response");
            NetworkFirst {
                response,
                pending_write: None,
            }
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Network failed, falling back to cache");
            NetworkFirst {
                response: offline_fallback(request, cache, offline_document).await,
                pending_write: None,
            }
        }
    }
}

async fn offline_fallback(request: &Request, cache: &Cache, offline_document: &RequestKey) -> Response {
    if let Some(cached) = cache.lookup(&request.key()).await {
        return cached;
    }
    if request.is_navigation() {
        if let Some(document) = cache.lookup(offline_document).await {
            debug!(url = %request.url, "Serving cached offline document for navigation");
            return document;
        }
    }
    Response::offline()
}

/// Serve from the cache; on a miss fetch, store if usable, and return.
///
/// Opaque cross-origin responses are stored as-is since their status
/// cannot be checked.
pub async fn cache_first(request: &Request, cache: &Cache, fetcher: &dyn Fetcher) -> Response {
    let key = request.key();
    if let Some(cached) = cache.lookup(&key).await {
        debug!(url = %request.url, "Cache hit");
        return cached;
    }

    debug!(url = %request.url, "Cache miss");
    let response = match fetcher.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %request.url, error = %e, "Network failed with nothing cached");
            return Response::offline();
        }
    };

    let storable = match response.response_type {
        ResponseType::Opaque => true,
        ResponseType::Basic => response.status == 200,
        ResponseType::Cors | ResponseType::Error => false,
    };
    if storable {
        cache.put_quietly(&key, &response).await;
    }
    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::fetch::FetchError;

    #[derive(Default)]
    struct StubFetcher {
        responses: HashMap<String, Response>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| FetchError::Unreachable(request.url.to_string()))
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryCacheStorage::new()), "test")
    }

    #[tokio::test]
    async fn test_network_first_returns_pending_write_for_200() {
        let mut fetcher = StubFetcher::default();
        fetcher
            .responses
            .insert("https://fyi.example/app.js".into(), Response::new(200, "live"));
        let cache = cache();
        let doc = RequestKey::get(&url("https://fyi.example/index.html"));

        let req = Request::get(url("https://fyi.example/app.js"));
        let result = network_first(&req, &cache, &fetcher, &doc).await;

        assert_eq!(result.response.text(), "live");
        let write = result.pending_write.unwrap();
        assert_eq!(write.key, req.key());
        assert_eq!(write.cache_name, "test");
        // Nothing is stored until the host commits the write
        assert!(cache.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_network_first_404_not_cached_and_not_replaced() {
        let mut fetcher = StubFetcher::default();
        fetcher
            .responses
            .insert("https://fyi.example/old.js".into(), Response::new(404, "gone"));
        let cache = cache();
        let req = Request::get(url("https://fyi.example/old.js"));
        cache.put(&req.key(), &Response::new(200, "stale")).await.unwrap();
        let doc = RequestKey::get(&url("https://fyi.example/index.html"));

        let result = network_first(&req, &cache, &fetcher, &doc).await;
        assert_eq!(result.response.status, 404);
        assert!(result.pending_write.is_none());
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_cors_response() {
        let mut fetcher = StubFetcher::default();
        fetcher.responses.insert(
            "https://fonts.googleapis.com/css2?family=Inter".into(),
            Response::new(200, "@font-face{}").with_type(ResponseType::Cors),
        );
        let cache = cache();
        let req = Request::get(url("https://fonts.googleapis.com/css2?family=Inter"));

        let resp = cache_first(&req, &cache, &fetcher).await;
        assert_eq!(resp.status, 200);
        assert!(cache.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_offline_miss() {
        let fetcher = StubFetcher::default();
        let cache = cache();
        let req = Request::get(url("https://fyi.example/icon.png"));

        let resp = cache_first(&req, &cache, &fetcher).await;
        assert_eq!(resp.status, 503);
        assert_eq!(resp.text(), "Offline");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
