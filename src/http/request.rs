//! Inbound request preparation.
//!
//! # Responsibilities
//! - Reconstruct the absolute target URL (absolute-form or Host header)
//! - Consume and strip the wayback control headers
//! - Drop hop-by-hop headers before forwarding
//! - Buffer the body; a bodyless GET is treated as having no body

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Method, Request};
use bytes::Bytes;

use crate::cache::{CacheRequest, WaybackDirectives};
use crate::http::error::ProxyError;

/// Requested capture time (seconds since epoch).
pub const WAYBACK_TIMESTAMP_HEADER: &str = "x-wayback-timestamp";

/// Tolerance window in seconds.
pub const WAYBACK_WITHIN_HEADER: &str = "x-wayback-within";

const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A GET/POST request ready for cache resolution and forwarding.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub directives: WaybackDirectives,
}

impl ProxyRequest {
    /// Build from an inbound request, buffering at most `max_body` bytes.
    pub async fn from_request<B>(request: Request<B>, max_body: usize) -> Result<Self, ProxyError>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<axum::BoxError>,
    {
        let (parts, body) = request.into_parts();
        let url = absolute_url(&parts.uri, &parts.headers)?;

        let mut headers = parts.headers;
        let directives = take_directives(&mut headers)?;
        strip_hop_by_hop(&mut headers);

        let body = axum::body::to_bytes(Body::new(body), max_body)
            .await
            .map_err(|_| ProxyError::BodyTooLarge(max_body))?;
        let body = if parts.method == Method::GET && body.is_empty() {
            None
        } else {
            Some(body)
        };

        Ok(Self {
            method: parts.method,
            url,
            headers,
            body,
            directives,
        })
    }

    pub fn cache_request(&self) -> CacheRequest {
        CacheRequest::new(self.method.as_str(), self.url.clone())
            .with_body(self.body.clone())
            .with_directives(self.directives)
    }
}

/// The absolute URL a forward-proxy request targets.
pub fn absolute_url(uri: &axum::http::Uri, headers: &HeaderMap) -> Result<String, ProxyError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.to_string());
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProxyError::BadRequest(format!("cannot determine target of {}", uri)))?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(format!("http://{}{}", host, path))
}

/// Remove and parse the wayback control headers.
pub fn take_directives(headers: &mut HeaderMap) -> Result<WaybackDirectives, ProxyError> {
    let timestamp = take_seconds(headers, WAYBACK_TIMESTAMP_HEADER)?;
    let within = take_seconds(headers, WAYBACK_WITHIN_HEADER)?;
    Ok(WaybackDirectives { timestamp, within })
}

fn take_seconds(headers: &mut HeaderMap, name: &'static str) -> Result<Option<i64>, ProxyError> {
    let Some(value) = headers.remove(name) else {
        return Ok(None);
    };
    let raw = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
    match raw.parse::<i64>() {
        Ok(seconds) if seconds >= 0 => Ok(Some(seconds)),
        _ => Err(ProxyError::InvalidDirective { header: name, value: raw }),
    }
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}
