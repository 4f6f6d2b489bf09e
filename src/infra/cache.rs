//! TTL-bound page cache for rendered responses.
//!
//! Entries expire by age alone; writes never invalidate them. Callers that
//! need freshness immediately after a deploy or data import call
//! [`PageCache::clear`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use metrics::counter;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

#[derive(Clone, Default)]
pub struct PageCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    page: CachedPage,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

impl PageCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch a live entry. Expired entries are removed on the way out.
    pub async fn get(&self, key: &str) -> Option<CachedPage> {
        {
            let guard = self.entries.read().await;
            match guard.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.page.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut guard = self.entries.write().await;
        if guard.get(key).is_some_and(CacheEntry::is_expired) {
            guard.remove(key);
        }
        None
    }

    pub async fn put(&self, key: String, page: CachedPage, ttl: Duration) {
        let mut guard = self.entries.write().await;
        guard.insert(
            key,
            CacheEntry {
                page,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached page for `key`, rendering and storing it on a miss.
    ///
    /// Within one TTL window every caller sees the byte-identical response
    /// stored by the first renderer. The render closure may decline caching
    /// by returning `Err`; the error is handed back untouched.
    pub async fn get_or_render<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        render: F,
    ) -> Result<CachedPage, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedPage, E>>,
    {
        if let Some(page) = self.get(key).await {
            counter!("brusio_page_cache_hit_total").increment(1);
            return Ok(page);
        }

        counter!("brusio_page_cache_miss_total").increment(1);
        let page = render().await?;
        self.put(key.to_string(), page.clone(), ttl).await;
        counter!("brusio_page_cache_store_total").increment(1);
        Ok(page)
    }

    /// Drop every entry, regardless of age.
    pub async fn clear(&self) {
        let mut guard = self.entries.write().await;
        guard.clear();
    }
}

/// A buffered response ready to be replayed from the cache.
#[derive(Clone)]
pub struct CachedPage {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl CachedPage {
    pub fn new(status: StatusCode, headers: &axum::http::HeaderMap, body: Bytes) -> Self {
        let mut stored_headers = Vec::with_capacity(headers.len());
        for (name, value) in headers.iter() {
            stored_headers.push((name.clone(), value.clone()));
        }

        Self {
            status,
            headers: stored_headers,
            body,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        response
    }
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("failed to buffer response body: {0}")]
    Buffer(String),
}

/// Only successful, cookie-free responses belong in the cache.
pub fn should_store_response(response: &Response) -> bool {
    use axum::http::header;

    if !response.status().is_success() {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    true
}

/// Drain a streaming body into memory so the response can be both served and
/// cached. On failure the caller gets an empty-bodied response back to return
/// downstream.
pub async fn buffer_response(
    response: Response,
) -> Result<(Response, CachedPage), (Response, CacheStoreError)> {
    let (parts, body) = response.into_parts();
    match BodyExt::collect(body).await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let cached = CachedPage::new(parts.status, &parts.headers, bytes.clone());
            let rebuilt = Response::from_parts(parts, Body::from(bytes));
            Ok((rebuilt, cached))
        }
        Err(error) => {
            let rebuilt = Response::from_parts(parts, Body::empty());
            Err((rebuilt, CacheStoreError::Buffer(error.to_string())))
        }
    }
}

/// State handed to the cache middleware layer.
#[derive(Clone)]
pub struct CacheState {
    pub cache: PageCache,
    pub ttl: Duration,
}

/// Serve cached GET responses, rendering and storing on a miss.
///
/// Non-GET requests and responses that fail [`should_store_response`] pass
/// through uncached.
pub async fn page_cache_layer(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let log_key = key.clone();
    let rendered = state
        .cache
        .get_or_render(&key, state.ttl, move || async move {
            let response = next.run(request).await;
            if !should_store_response(&response) {
                return Err(response);
            }
            match buffer_response(response).await {
                Ok((_, cached)) => Ok(cached),
                Err((rebuilt, error)) => {
                    warn!(key = %log_key, error = %error, "failed to buffer response for cache");
                    Err(rebuilt)
                }
            }
        })
        .await;

    match rendered {
        Ok(page) => page.into_response(),
        Err(passthrough) => passthrough,
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::http::HeaderMap;

    use super::*;

    fn page(body: &str) -> CachedPage {
        CachedPage::new(StatusCode::OK, &HeaderMap::new(), Bytes::from(body.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn serves_stored_page_within_ttl() {
        let cache = PageCache::new();
        let ttl = Duration::from_secs(20);

        let first = cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("v1")) })
            .await
            .unwrap();
        let second = cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("v2")) })
            .await
            .unwrap();

        assert_eq!(first.body(), second.body());
        assert_eq!(second.body(), "v1");
    }

    #[tokio::test(start_paused = true)]
    async fn rerenders_after_ttl_elapses() {
        let cache = PageCache::new();
        let ttl = Duration::from_secs(20);

        cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("v1")) })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(21)).await;

        let refreshed = cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("v2")) })
            .await
            .unwrap();

        assert_eq!(refreshed.body(), "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_live_entries() {
        let cache = PageCache::new();
        let ttl = Duration::from_secs(60);

        cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("v1")) })
            .await
            .unwrap();

        cache.clear().await;

        let refreshed = cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("v2")) })
            .await
            .unwrap();

        assert_eq!(refreshed.body(), "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn render_error_is_not_cached() {
        let cache = PageCache::new();
        let ttl = Duration::from_secs(20);

        let result = cache
            .get_or_render("index", ttl, || async { Err::<CachedPage, &str>("boom") })
            .await;
        assert!(result.is_err());

        let after = cache
            .get_or_render("index", ttl, || async { Ok::<_, Infallible>(page("ok")) })
            .await
            .unwrap();
        assert_eq!(after.body(), "ok");
    }
}
