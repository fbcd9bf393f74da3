use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheError, CacheRequest, CacheStore, CachedResponse};
use crate::http::response;

type SharedCache = State<Arc<dyn CacheStore>>;

fn default_method() -> String {
    "GET".to_string()
}

fn default_code() -> u16 {
    200
}

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
}

impl CacheQuery {
    fn cache_request(&self) -> CacheRequest {
        CacheRequest::new(self.method.to_ascii_uppercase(), self.url.clone())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RequestEntry {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResponseEntry {
    pub url: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "default_code")]
    pub code: u16,
    #[serde(default)]
    pub headers: serde_json::Map<String, serde_json::Value>,
    pub body: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WaybackEntry {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Body of `POST /cache`.
#[derive(Debug, Deserialize, Serialize)]
pub struct PutEntry {
    pub request: RequestEntry,
    pub response: ResponseEntry,
    #[serde(default)]
    pub wayback: Option<WaybackEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Versions {
    pub fingerprint: String,
    pub timestamps: Vec<i64>,
}

pub enum AdminError {
    Cache(CacheError),
    BadHeader(String),
}

impl From<CacheError> for AdminError {
    fn from(e: CacheError) -> Self {
        AdminError::Cache(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminError::Cache(CacheError::VersionNotFound(not_found)) => {
                response::text(StatusCode::NOT_FOUND, format!("{}\n", not_found))
            }
            AdminError::Cache(e) => {
                tracing::error!(error = %e, "Admin cache operation failed");
                response::text(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e))
            }
            AdminError::BadHeader(name) => {
                response::text(StatusCode::BAD_REQUEST, format!("invalid header {:?}\n", name))
            }
        }
    }
}

/// `GET /cache?url=..&method=..`
pub async fn get_cache(State(cache): SharedCache, Query(query): Query<CacheQuery>) -> Result<Response<Body>, AdminError> {
    match cache.get(&query.cache_request()).await? {
        Some(cached) => Ok(response::render(&cached)),
        None => Ok(response::text(StatusCode::NOT_FOUND, "Page not found in cache")),
    }
}

/// `POST /cache`: unconditional insert, at the given wayback time if any.
pub async fn put_cache(State(cache): SharedCache, Json(entry): Json<PutEntry>) -> Result<&'static str, AdminError> {
    let request = CacheRequest::new(entry.request.method.to_ascii_uppercase(), entry.request.url)
        .with_body(entry.request.body.map(Bytes::from));
    let timestamp = entry.wayback.and_then(|w| w.timestamp);

    let headers = header_map(&entry.response.headers)?;
    let mut stored = CachedResponse::new(entry.response.url, entry.response.code, headers, entry.response.body);
    stored.error = entry.response.error;

    let context = cache.resolve_for_insert(&request, timestamp);
    cache.store(&context, stored).await?;
    tracing::info!(key = %context.key, "Admin inserted cache entry");
    Ok("ok")
}

/// `GET /cache/versions?url=..&method=..`
pub async fn get_versions(State(cache): SharedCache, Query(query): Query<CacheQuery>) -> Result<Json<Versions>, AdminError> {
    let request = query.cache_request();
    let timestamps = cache.versions(&request).await?;
    Ok(Json(Versions {
        fingerprint: request.fingerprint().to_string(),
        timestamps,
    }))
}

fn header_map(headers: &serde_json::Map<String, serde_json::Value>) -> Result<HeaderMap, AdminError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| AdminError::BadHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(&value).map_err(|_| AdminError::BadHeader(name.clone()))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::setup_admin_router;
    use crate::cache::InMemoryCache;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = InMemoryCache::in_memory().into_shared();
        let app = setup_admin_router(Arc::clone(&cache));

        let entry = serde_json::json!({
            "request": {"method": "GET", "url": "http://example.com/"},
            "response": {
                "url": "http://example.com/",
                "code": 404,
                "headers": {"Content-Type": "text/plain", "X-Secret": "no"},
                "body": "meh"
            }
        });
        let put = Request::post("/cache")
            .header("content-type", "application/json")
            .body(Body::from(entry.to_string()))
            .unwrap();
        let response = app.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");

        let get = Request::get("/cache?url=http%3A%2F%2Fexample.com%2F").body(Body::empty()).unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert!(response.headers().get("x-secret").is_none());
        assert!(response.headers().get("x-proxy-cache-key").is_some());
        assert_eq!(body_string(response).await, "meh");
    }

    #[tokio::test]
    async fn missing_entry_is_404() {
        let app = setup_admin_router(InMemoryCache::in_memory().into_shared());
        let get = Request::get("/cache?url=http%3A%2F%2Fnowhere%2F").body(Body::empty()).unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "Page not found in cache");
    }

    #[tokio::test]
    async fn versions_are_empty_for_untimed_cache() {
        let app = setup_admin_router(InMemoryCache::in_memory().into_shared());
        let get = Request::get("/cache/versions?url=http%3A%2F%2Fexample.com%2F")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let versions: Versions = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(versions.timestamps.is_empty());
        assert_eq!(versions.fingerprint.len(), 64);
    }

    #[tokio::test]
    async fn invalid_header_is_rejected() {
        let app = setup_admin_router(InMemoryCache::in_memory().into_shared());
        let entry = serde_json::json!({
            "request": {"url": "http://example.com/"},
            "response": {"url": "http://example.com/", "headers": {"bad name": "x"}, "body": ""}
        });
        let put = Request::post("/cache")
            .header("content-type", "application/json")
            .body(Body::from(entry.to_string()))
            .unwrap();
        let response = app.oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
