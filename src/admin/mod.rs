//! Administrative cache API.
//!
//! Served on its own listener. Every endpoint delegates to the
//! [`CacheStore`](crate::cache::CacheStore) contract.

pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::cache::CacheStore;
use self::handlers::{get_cache, get_versions, put_cache};

pub fn setup_admin_router(cache: Arc<dyn CacheStore>) -> Router {
    Router::new()
        .route("/cache", get(get_cache).post(put_cache))
        .route("/cache/versions", get(get_versions))
        .layer(TraceLayer::new_for_http())
        .with_state(cache)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(
    listener: tokio::net::TcpListener,
    cache: Arc<dyn CacheStore>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> std::io::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, setup_admin_router(cache))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
