//! Forward proxy HTTP handling.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 with upgrades, method routing)
//!     → request.rs (absolute URL, wayback directives, body)
//!     → dispatcher.rs (cache resolve/lookup, origin fetch via client.rs, store)
//!     → response.rs (allow-listed headers, error statuses)
//!
//! CONNECT
//!     → tunnel.rs (upstream connect, upgrade, byte relay)
//! ```

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod response;
pub mod server;
pub mod tunnel;

pub use client::OriginClient;
pub use dispatcher::RequestDispatcher;
pub use error::ProxyError;
pub use request::{ProxyRequest, WAYBACK_TIMESTAMP_HEADER, WAYBACK_WITHIN_HEADER};
pub use server::ProxyServer;
pub use tunnel::TunnelBridge;
