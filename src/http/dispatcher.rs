//! GET/POST request dispatch.
//!
//! # Flow
//! ```text
//! ProxyRequest
//!     → cache resolve (version not found → configured status, no fetch)
//!     → cache lookup (hit → respond)
//!     → live fetch (transport failure → 500)
//!     → spawn cache store (failures logged only)
//!     → respond with allow-listed headers
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use tokio::runtime::Handle;

use crate::cache::{CacheError, CacheStore, LookupContext};
use crate::http::client::OriginClient;
use crate::http::request::ProxyRequest;
use crate::http::response;
use crate::observability::metrics::{self, ResponseSource};

/// Serves GET/POST through the optional cache and the origin.
pub struct RequestDispatcher {
    client: OriginClient,
    cache: Option<Arc<dyn CacheStore>>,
    executor: Handle,
    version_not_found_status: StatusCode,
}

impl RequestDispatcher {
    pub fn new(
        client: OriginClient,
        cache: Option<Arc<dyn CacheStore>>,
        executor: Handle,
        version_not_found_status: StatusCode,
    ) -> Self {
        Self {
            client,
            cache,
            executor,
            version_not_found_status,
        }
    }

    pub async fn handle(&self, request: ProxyRequest) -> Response<Body> {
        let start = Instant::now();
        let method = request.method.to_string();

        let mut context = None;
        if let Some(cache) = &self.cache {
            match self.consult(cache.as_ref(), &request).await {
                Consulted::Hit(response) => {
                    metrics::record_request(&method, response.status().as_u16(), ResponseSource::Cache, start);
                    return response;
                }
                Consulted::Miss(ctx) => context = ctx,
                Consulted::Refused(response) => {
                    metrics::record_request(&method, response.status().as_u16(), ResponseSource::Proxy, start);
                    return response;
                }
            }
        }

        let fetched = self
            .client
            .fetch(request.method.clone(), &request.url, &request.headers, request.body.clone())
            .await;

        let mut fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Origin fetch failed");
                let response = response::transport_failure(&e);
                metrics::record_request(&method, response.status().as_u16(), ResponseSource::Proxy, start);
                return response;
            }
        };

        if let (Some(cache), Some(context)) = (&self.cache, context) {
            self.spawn_store(Arc::clone(cache), &context, fetched.clone());
            // Names the key the background write targets; the write may still fail.
            fetched.set_provenance(&context.key, context.timestamp);
        }

        metrics::record_request(&method, fetched.status, ResponseSource::Origin, start);
        response::render(&fetched)
    }

    async fn consult(&self, cache: &dyn CacheStore, request: &ProxyRequest) -> Consulted {
        let cache_request = request.cache_request();
        let context = match cache.resolve(&cache_request).await {
            Ok(context) => context,
            Err(CacheError::VersionNotFound(not_found)) => {
                metrics::record_cache_lookup("version_not_found");
                return Consulted::Refused(response::version_not_found(self.version_not_found_status, &not_found));
            }
            Err(e) => {
                metrics::record_cache_lookup("error");
                tracing::error!(url = %request.url, error = %e, "Error resolving cache key");
                return Consulted::Miss(None);
            }
        };

        match cache.lookup(&context).await {
            Ok(Some(cached)) => {
                metrics::record_cache_lookup("hit");
                tracing::debug!(url = %request.url, key = %context.key, "Cache hit");
                Consulted::Hit(response::render(&cached))
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                tracing::debug!(url = %request.url, key = %context.key, insert = context.insert, "Cache miss");
                Consulted::Miss(Some(context))
            }
            Err(CacheError::VersionNotFound(not_found)) => {
                metrics::record_cache_lookup("version_not_found");
                Consulted::Refused(response::version_not_found(self.version_not_found_status, &not_found))
            }
            Err(e) => {
                metrics::record_cache_lookup("error");
                tracing::error!(url = %request.url, key = %context.key, error = %e, "Error reading from cache");
                Consulted::Miss(Some(context))
            }
        }
    }

    fn spawn_store(&self, cache: Arc<dyn CacheStore>, context: &LookupContext, fetched: crate::cache::CachedResponse) {
        let context = context.clone();
        self.executor.spawn(async move {
            match cache.store(&context, fetched).await {
                Ok(()) => metrics::record_cache_store(true),
                Err(e) => {
                    metrics::record_cache_store(false);
                    tracing::error!(key = %context.key, error = %e, "Failed to store response in cache");
                }
            }
        });
    }
}

enum Consulted {
    Hit(Response<Body>),
    /// Fetch live; store under the context if there is one.
    Miss(Option<LookupContext>),
    Refused(Response<Body>),
}
