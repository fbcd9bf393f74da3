//! Cached response value.

use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;

/// Header carrying the resolved storage key.
pub const CACHE_KEY_HEADER: &str = "x-proxy-cache-key";

/// Header carrying the resolved snapshot timestamp (wayback caches only).
pub const SNAPSHOT_TIMESTAMP_HEADER: &str = "x-wayback-timestamp";

/// A response as produced by a live fetch or read back from a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    /// URL of the originating request.
    pub url: String,
    /// Error message for origin error statuses (`HTTP 404: Not Found`).
    pub error: Option<String>,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            error: None,
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach the provenance headers for a storage key and snapshot time.
    pub fn set_provenance(&mut self, key: &str, timestamp: Option<i64>) {
        if let Ok(value) = HeaderValue::from_str(key) {
            self.headers.insert(CACHE_KEY_HEADER, value);
        }
        if let Some(ts) = timestamp {
            self.headers.insert(SNAPSHOT_TIMESTAMP_HEADER, HeaderValue::from(ts));
        }
    }

    /// Remove provenance headers; they are never persisted.
    pub fn strip_provenance(&mut self) {
        self.headers.remove(CACHE_KEY_HEADER);
        self.headers.remove(SNAPSHOT_TIMESTAMP_HEADER);
    }
}
