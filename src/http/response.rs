//! Client-facing response rendering.
//!
//! # Responsibilities
//! - Pass through status and an allow-list of origin headers
//! - Expose cache provenance headers
//! - Map proxy-side failures to status codes

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Response, StatusCode};
use hyper::ext::ReasonPhrase;

use crate::cache::{CachedResponse, VersionNotFound, CACHE_KEY_HEADER, SNAPSHOT_TIMESTAMP_HEADER};
use crate::http::error::ProxyError;

/// Origin headers forwarded to the client.
const PASSTHROUGH_HEADERS: [HeaderName; 7] = [
    header::DATE,
    header::CACHE_CONTROL,
    header::SERVER,
    header::CONTENT_TYPE,
    header::LOCATION,
    HeaderName::from_static(CACHE_KEY_HEADER),
    HeaderName::from_static(SNAPSHOT_TIMESTAMP_HEADER),
];

/// Render a fetched or cached response for the client.
pub fn render(response: &CachedResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for name in PASSTHROUGH_HEADERS.iter() {
            if let Some(value) = response.headers.get(name) {
                if !value.is_empty() {
                    headers.insert(name.clone(), value.clone());
                }
            }
        }
    }
    builder
        .body(Body::from(response.body.clone()))
        .unwrap_or_else(|_| text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n"))
}

/// A transport-level failure talking to the origin.
pub fn transport_failure(err: &ProxyError) -> Response<Body> {
    text(StatusCode::INTERNAL_SERVER_ERROR, format!("Internal server error:\n{}", err))
}

/// An explicit wayback version that does not exist.
pub fn version_not_found(status: StatusCode, not_found: &VersionNotFound) -> Response<Body> {
    let mut response = text(status, format!("{}\n", not_found));
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(b"Wayback Page Not Found"));
    response
}

/// Map a proxy-side error to a client response.
pub fn proxy_error(err: &ProxyError) -> Response<Body> {
    match err {
        ProxyError::BodyTooLarge(_) => text(StatusCode::PAYLOAD_TOO_LARGE, format!("{}\n", err)),
        ProxyError::Connect { .. } => text(StatusCode::BAD_GATEWAY, format!("{}\n", err)),
        e if e.is_client_error() => text(StatusCode::BAD_REQUEST, format!("{}\n", err)),
        _ => transport_failure(err),
    }
}

/// Plain-text response.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[tokio::test]
    async fn only_allowed_headers_pass() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("a=b"));
        headers.insert(header::LOCATION, HeaderValue::from_static("http://example.com/next"));
        headers.insert(header::SERVER, HeaderValue::from_static(""));
        headers.insert("x-internal", HeaderValue::from_static("1"));
        let mut cached = CachedResponse::new("http://example.com/", 302, headers, "moved");
        cached.set_provenance("ab/cd/abcd.gz", Some(1000));

        let response = render(&cached);
        assert_eq!(response.status(), StatusCode::FOUND);
        let headers = response.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(headers.get(header::LOCATION).unwrap(), "http://example.com/next");
        assert_eq!(headers.get(CACHE_KEY_HEADER).unwrap(), "ab/cd/abcd.gz");
        assert_eq!(headers.get(SNAPSHOT_TIMESTAMP_HEADER).unwrap(), "1000");
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert!(headers.get(header::SERVER).is_none());
        assert!(headers.get("x-internal").is_none());

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body.as_ref(), b"moved");
    }

    #[tokio::test]
    async fn version_not_found_uses_configured_status() {
        let status = StatusCode::from_u16(523).unwrap();
        let response = version_not_found(
            status,
            &VersionNotFound {
                url: "http://example.com/".to_string(),
                timestamp: 1000,
                within: Some(0),
            },
        );
        assert_eq!(response.status().as_u16(), 523);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("http://example.com/"));
        assert!(body.contains("1000"));
        assert!(body.contains("within 0"));
    }

    #[test]
    fn client_errors_map_to_400() {
        let err = ProxyError::BadRequest("no host".to_string());
        assert_eq!(proxy_error(&err).status(), StatusCode::BAD_REQUEST);
        assert_eq!(proxy_error(&ProxyError::BodyTooLarge(1)).status(), StatusCode::PAYLOAD_TOO_LARGE);
        let timeout = ProxyError::Timeout(std::time::Duration::from_secs(1));
        assert_eq!(proxy_error(&timeout).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
