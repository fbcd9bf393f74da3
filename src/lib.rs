//! Forward HTTP proxy with a pluggable response cache, including a
//! time-versioned "wayback" cache.

pub mod admin;
pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use cache::{CacheStore, InMemoryCache, SnapshotFileCache, WaybackCache};
pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
