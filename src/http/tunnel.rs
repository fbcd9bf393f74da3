//! CONNECT tunneling.
//!
//! The upstream connection is opened before answering, so a connect
//! failure is reported as 502 and no tunnel bytes ever flow. After the
//! 200 the client connection is upgraded and relayed opaquely.
//!
//! The success line is `HTTP/1.1 200 Connection established`: hyper writes
//! the status line with the connection's own version, so only the reason
//! phrase is ours.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use hyper::ext::ReasonPhrase;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;

use crate::http::error::ProxyError;
use crate::http::response;
use crate::net::ConnectionTracker;
use crate::observability::metrics;

const PUMP_BUFFER: usize = 16 * 1024;

pub struct TunnelBridge {
    connect_timeout: Duration,
    executor: Handle,
    tracker: ConnectionTracker,
}

impl TunnelBridge {
    pub fn new(connect_timeout: Duration, executor: Handle, tracker: ConnectionTracker) -> Self {
        Self {
            connect_timeout,
            executor,
            tracker,
        }
    }

    pub async fn handle(&self, request: Request<hyper::body::Incoming>) -> Response<Body> {
        let target = match connect_target(request.uri()) {
            Ok(target) => target,
            Err(e) => {
                metrics::record_tunnel("bad_request");
                return response::proxy_error(&e);
            }
        };

        let upstream = match self.connect(&target).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "Tunnel connect failed");
                metrics::record_tunnel("connect_failed");
                return response::proxy_error(&e);
            }
        };
        metrics::record_tunnel("established");

        let guard = self.tracker.track();
        self.executor.spawn(async move {
            match hyper::upgrade::on(request).await {
                Ok(upgraded) => {
                    tracing::debug!(target = %target, "Tunnel open");
                    let (sent, received) = bridge(TokioIo::new(upgraded), upstream).await;
                    metrics::record_tunnel_bytes("client_to_upstream", sent);
                    metrics::record_tunnel_bytes("upstream_to_client", received);
                    tracing::debug!(target = %target, sent, received, "Tunnel closed");
                }
                Err(e) => tracing::warn!(target = %target, error = %e, "Tunnel upgrade failed"),
            }
            drop(guard);
        });

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        response
            .extensions_mut()
            .insert(ReasonPhrase::from_static(b"Connection established"));
        response
    }

    async fn connect(&self, target: &str) -> Result<TcpStream, ProxyError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(source)) => Err(ProxyError::Connect {
                target: target.to_string(),
                source,
            }),
            Err(_) => Err(ProxyError::Connect {
                target: target.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    }
}

/// `host:port` from an authority-form CONNECT target. The port is required.
pub fn connect_target(uri: &axum::http::Uri) -> Result<String, ProxyError> {
    let authority = uri
        .authority()
        .ok_or_else(|| ProxyError::BadRequest(format!("CONNECT target must be host:port, got {uri}")))?;
    let port = authority
        .port_u16()
        .ok_or_else(|| ProxyError::BadRequest(format!("CONNECT target {authority} has no port")))?;
    Ok(format!("{}:{}", authority.host(), port))
}

/// Relay bytes both ways until each direction reaches EOF.
///
/// EOF on one side shuts down the write half of the other. Returns
/// `(client_to_upstream, upstream_to_client)` byte counts.
pub async fn bridge<C, U>(client: C, upstream: U) -> (u64, u64)
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    tokio::join!(
        pump(&mut client_read, &mut upstream_write),
        pump(&mut upstream_read, &mut client_write),
    )
}

async fn pump<R, W>(reader: &mut R, writer: &mut W) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Tunnel read ended");
                break;
            }
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            tracing::debug!(error = %e, "Tunnel write ended");
            break;
        }
        total += n as u64;
    }
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_requires_port() {
        let uri: axum::http::Uri = "example.com:443".parse().unwrap();
        assert_eq!(connect_target(&uri).unwrap(), "example.com:443");

        let uri: axum::http::Uri = "example.com".parse().unwrap();
        assert!(matches!(connect_target(&uri), Err(ProxyError::BadRequest(_))));
    }

    #[tokio::test]
    async fn bytes_flow_both_ways_and_close_propagates() {
        let (client, mut client_peer) = tokio::io::duplex(64);
        let (upstream, mut upstream_peer) = tokio::io::duplex(64);
        let relay = tokio::spawn(bridge(client, upstream));

        client_peer.write_all(b"hello upstream").await.unwrap();
        let mut buf = [0u8; 14];
        upstream_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello upstream");

        upstream_peer.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");

        // Client goes away; upstream must see EOF.
        drop(client_peer);
        let mut rest = Vec::new();
        upstream_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        drop(upstream_peer);

        let (sent, received) = tokio::time::timeout(Duration::from_secs(5), relay)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, 14);
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn large_payload_is_relayed_intact() {
        let (client, mut client_peer) = tokio::io::duplex(1024);
        let (upstream, mut upstream_peer) = tokio::io::duplex(1024);
        let relay = tokio::spawn(bridge(client, upstream));

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client_peer.write_all(&payload).await.unwrap();
            client_peer.shutdown().await.unwrap();
            client_peer
        });

        let mut received = Vec::new();
        upstream_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);

        drop(upstream_peer);
        drop(writer.await.unwrap());
        let (sent, _) = relay.await.unwrap();
        assert_eq!(sent, 100_000);
    }
}
