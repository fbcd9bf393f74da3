//! Forward proxy server.
//!
//! # Responsibilities
//! - Accept connections on the bounded listener
//! - Serve HTTP/1.1 with upgrades so CONNECT can become a tunnel
//! - Route by method: GET/POST to the dispatcher, CONNECT to the tunnel
//! - Drain in-flight connections on shutdown

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::cache::CacheStore;
use crate::config::ProxyConfig;
use crate::http::client::OriginClient;
use crate::http::dispatcher::RequestDispatcher;
use crate::http::request::ProxyRequest;
use crate::http::response;
use crate::http::tunnel::TunnelBridge;
use crate::net::{ConnectionTracker, Listener};

/// Per-request routing shared by every connection.
struct ProxyService {
    dispatcher: RequestDispatcher,
    tunnel: TunnelBridge,
    max_body_bytes: usize,
}

impl ProxyService {
    async fn serve(&self, request: Request<Incoming>) -> Response<Body> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        );

        async move {
            let response = match *request.method() {
                Method::CONNECT => self.tunnel.handle(request).await,
                Method::GET | Method::POST => {
                    match ProxyRequest::from_request(request, self.max_body_bytes).await {
                        Ok(request) => self.dispatcher.handle(request).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "Rejected request");
                            response::proxy_error(&e)
                        }
                    }
                }
                _ => method_not_allowed(),
            };
            tracing::info!(status = response.status().as_u16(), "Request finished");
            response
        }
        .instrument(span)
        .await
    }
}

fn method_not_allowed() -> Response<Body> {
    let mut response = response::text(StatusCode::METHOD_NOT_ALLOWED, "Only GET, POST and CONNECT are proxied\n");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, POST, CONNECT"));
    response
}

/// Forward proxy bound to one listener.
pub struct ProxyServer {
    service: Arc<ProxyService>,
    tracker: ConnectionTracker,
    executor: Handle,
    shutdown_grace: Duration,
}

impl ProxyServer {
    /// `executor` runs connection tasks, tunnels and background cache writes.
    pub fn new(config: &ProxyConfig, cache: Option<Arc<dyn CacheStore>>, executor: Handle) -> Self {
        let tracker = ConnectionTracker::new();
        let client = OriginClient::new(
            Duration::from_secs(config.timeouts.request_secs),
            config.limits.max_body_bytes,
        );
        let version_not_found_status =
            StatusCode::from_u16(config.cache.version_not_found_status).unwrap_or(StatusCode::NOT_FOUND);

        let service = ProxyService {
            dispatcher: RequestDispatcher::new(client, cache, executor.clone(), version_not_found_status),
            tunnel: TunnelBridge::new(
                Duration::from_secs(config.timeouts.connect_secs),
                executor.clone(),
                tracker.clone(),
            ),
            max_body_bytes: config.limits.max_body_bytes,
        };

        Self {
            service: Arc::new(service),
            tracker,
            executor,
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        }
    }

    /// Accept until `shutdown` fires, then wait for connections to drain.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, max_connections = listener.max_connections(), "Proxy listening");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => break,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed");
                    continue;
                }
            };

            let guard = self.tracker.track();
            let service = Arc::clone(&self.service);
            self.executor.spawn(async move {
                let connection_id = guard.id();
                tracing::debug!(connection_id = %connection_id, peer = %peer, "Connection accepted");

                let svc = service_fn(move |request| {
                    let service = Arc::clone(&service);
                    async move { Ok::<_, Infallible>(service.serve(request).await) }
                });

                let served = http1::Builder::new()
                    .preserve_header_case(true)
                    .title_case_headers(true)
                    .serve_connection(TokioIo::new(stream), svc)
                    .with_upgrades()
                    .await;
                if let Err(e) = served {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Connection ended with error");
                }

                drop(permit);
                drop(guard);
            });
        }

        tracing::info!(active = self.tracker.active_count(), "Proxy stopped accepting, draining");
        if !self.tracker.drain(self.shutdown_grace).await {
            tracing::warn!(active = self.tracker.active_count(), "Drain timed out");
        }
        Ok(())
    }
}
