//! CONNECT tunneling through the proxy.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wayback_proxy::config::ProxyConfig;

mod common;

async fn connect(proxy: SocketAddr, target: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "proxy closed before finishing the response head");
        head.push(byte[0]);
    }
    (stream, String::from_utf8(head).unwrap())
}

#[tokio::test]
async fn tunnel_relays_both_directions() {
    let echo = common::start_echo().await;
    let (proxy, _shutdown) = common::start_proxy(ProxyConfig::default(), None).await;

    let (mut stream, head) = connect(proxy, &echo.to_string()).await;
    assert!(head.starts_with("HTTP/1.1 200 Connection established\r\n"), "{head}");

    stream.write_all(b"ping over tunnel").await.unwrap();
    let mut buf = [0u8; 16];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"ping over tunnel");

    // Closing our side must close the upstream, which closes back to us.
    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn tunnel_carries_binary_data_intact() {
    let echo = common::start_echo().await;
    let (proxy, _shutdown) = common::start_proxy(ProxyConfig::default(), None).await;
    let (stream, _) = connect(proxy, &echo.to_string()).await;
    let (mut read, mut write) = stream.into_split();

    let payload: Vec<u8> = (0..256 * 1024u32).map(|i| (i * 7 % 256) as u8).collect();
    let expected = payload.clone();
    let writer = tokio::spawn(async move {
        write.write_all(&payload).await.unwrap();
        write.shutdown().await.unwrap();
    });

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), read.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    writer.await.unwrap();
    assert_eq!(received.len(), expected.len());
    assert!(received == expected);
}

#[tokio::test]
async fn connect_failure_is_reported_before_tunneling() {
    let dead = common::closed_port().await;
    let (proxy, _shutdown) = common::start_proxy(ProxyConfig::default(), None).await;

    let (_stream, head) = connect(proxy, &dead.to_string()).await;
    assert!(head.starts_with("HTTP/1.1 502"), "{head}");
}

#[tokio::test]
async fn upstream_close_reaches_the_client() {
    // An upstream that greets and hangs up.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"bye").await.unwrap();
        socket.shutdown().await.unwrap();
    });

    let (proxy, _shutdown) = common::start_proxy(ProxyConfig::default(), None).await;
    let (mut stream, head) = connect(proxy, &upstream.to_string()).await;
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"bye");
}
