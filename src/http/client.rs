//! Outbound origin client.
//!
//! Redirects are never followed and any method is forwarded as-is.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request};
use bytes::Bytes;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::cache::CachedResponse;
use crate::http::error::ProxyError;

#[derive(Clone)]
pub struct OriginClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl OriginClient {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            timeout,
            max_body_bytes,
        }
    }

    /// Fetch `url` and buffer the complete response.
    ///
    /// Origin 4xx/5xx statuses are successful fetches; only transport
    /// failures are errors.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<CachedResponse, ProxyError> {
        let mut request = Request::builder().method(method).uri(url);
        if let Some(out) = request.headers_mut() {
            out.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let request = request.body(body.map(Body::from).unwrap_or_else(Body::empty))?;

        let exchange = async {
            let response = self.client.request(request).await?;
            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), self.max_body_bytes)
                .await
                .map_err(ProxyError::Body)?;
            Ok::<_, ProxyError>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))??;

        let mut response = CachedResponse::new(url, parts.status.as_u16(), parts.headers, body);
        if parts.status.is_client_error() || parts.status.is_server_error() {
            response.error = Some(format!(
                "HTTP {}: {}",
                parts.status.as_u16(),
                parts.status.canonical_reason().unwrap_or("Unknown")
            ));
        }
        Ok(response)
    }
}
